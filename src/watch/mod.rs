//! The filesystem crawler.
//!
//! Wraps a [`Catalog`] with a notify watcher. Bursts of filesystem events
//! are debounced into a single re-enumeration, the set of watched
//! directories is reconciled after every walk, and each walk schedules a
//! background pass that probes metadata for entries that never had one.
//! The crawler also watches its own executable: a modified binary makes
//! the event loop return so the supervisor can restart the process.

use crate::catalog::Catalog;
use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How long a burst of events may keep growing before the refresh fires.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(10);

struct WatchState {
    /// Absolute directories currently watched.
    watched: BTreeSet<PathBuf>,
    /// Generation token: stale preload passes notice it moved and stop.
    last_update: Instant,
}

struct Shared {
    catalog: Arc<Catalog>,
    /// `None` once closed.
    watcher: Mutex<Option<RecommendedWatcher>>,
    state: Mutex<WatchState>,
}

/// Filesystem-change watcher driving catalog refreshes.
pub struct Crawler {
    shared: Arc<Shared>,
    refresh_tx: mpsc::Sender<()>,
    events: Option<mpsc::Receiver<notify::Result<notify::Event>>>,
}

impl Crawler {
    /// Create the watcher, perform the initial enumeration, and start the
    /// debounce worker. Must be called within a tokio runtime.
    pub fn new(catalog: Arc<Catalog>, debounce: Duration) -> Result<Crawler> {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let watcher = notify::recommended_watcher(move |res| {
            // Drop events on overflow; a dropped event at worst delays the
            // refresh until the next one.
            let _ = event_tx.try_send(res);
        })
        .context("cannot create filesystem watcher")?;

        let shared = Arc::new(Shared {
            catalog,
            watcher: Mutex::new(Some(watcher)),
            state: Mutex::new(WatchState {
                watched: BTreeSet::new(),
                last_update: Instant::now(),
            }),
        });
        refresh(&shared);

        let (refresh_tx, refresh_rx) = mpsc::channel(1000);
        tokio::spawn(debounce_loop(shared.clone(), refresh_rx, debounce));

        Ok(Crawler {
            shared,
            refresh_tx,
            events: Some(event_rx),
        })
    }

    /// The main event loop.
    ///
    /// Returns `Ok(())` on interruption or when the executable on disk was
    /// replaced (the caller restarts the process in that case), `Err` when
    /// the watcher itself fails.
    pub async fn watch_files(&mut self) -> Result<()> {
        let exe = std::env::current_exe().context("cannot locate own executable")?;
        let exe_mtime = std::fs::metadata(&exe)
            .and_then(|m| m.modified())
            .context("cannot stat own executable")?;
        self.watch_path(&exe)?;

        let mut events = self
            .events
            .take()
            .context("watch loop already consumed")?;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted");
                    return Ok(());
                }
                event = events.recv() => match event {
                    None => anyhow::bail!("filesystem watcher shut down"),
                    Some(Err(e)) => {
                        return Err(e).context("filesystem watcher failed");
                    }
                    Some(Ok(event)) => {
                        if is_content_write(&event.kind) {
                            // Content writes don't change presence.
                            continue;
                        }
                        debug!("fs event: {:?} {:?}", event.kind, event.paths);
                        if event.paths.iter().any(|p| *p == exe) {
                            let changed = std::fs::metadata(&exe)
                                .and_then(|m| m.modified())
                                .map(|m| m != exe_mtime)
                                .unwrap_or(false);
                            if changed {
                                info!("executable changed on disk; exiting for restart");
                                return Ok(());
                            }
                            continue;
                        }
                        // Coalesced by the debounce loop; drop on overflow.
                        let _ = self.refresh_tx.try_send(());
                    }
                }
            }
        }
    }

    /// Stop watching everything. Idempotent; returns the last unwatch
    /// error observed.
    pub fn close(&self) -> Result<()> {
        let mut st = self.shared.state.lock();
        let mut guard = self.shared.watcher.lock();
        let mut last_err = None;
        if let Some(watcher) = guard.as_mut() {
            for dir in std::mem::take(&mut st.watched) {
                if let Err(e) = watcher.unwatch(&dir) {
                    warn!("failed to unwatch {}: {e}", dir.display());
                    last_err = Some(e);
                }
            }
        }
        *guard = None;
        match last_err {
            Some(e) => Err(e).context("closing watcher"),
            None => Ok(()),
        }
    }

    /// Absolute directories currently watched.
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        self.shared.state.lock().watched.iter().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn refresh_now(&self) {
        refresh(&self.shared);
    }

    fn watch_path(&self, path: &std::path::Path) -> Result<()> {
        let mut guard = self.shared.watcher.lock();
        let watcher = guard.as_mut().context("watcher closed")?;
        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .with_context(|| format!("cannot watch {}", path.display()))
    }
}

/// Events the crawler ignores outright.
fn is_content_write(kind: &notify::EventKind) -> bool {
    use notify::event::ModifyKind;
    matches!(
        kind,
        notify::EventKind::Access(_) | notify::EventKind::Modify(ModifyKind::Data(_))
    )
}

/// Consume refresh signals: the first one arms the timer, later ones are
/// absorbed without resetting it, and when it fires the catalog is walked.
async fn debounce_loop(shared: Arc<Shared>, mut rx: mpsc::Receiver<()>, debounce: Duration) {
    while rx.recv().await.is_some() {
        info!("will refresh in {:.0?}", debounce);
        let delay = tokio::time::sleep(debounce);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                _ = &mut delay => break,
                more = rx.recv() => {
                    if more.is_none() {
                        return;
                    }
                }
            }
        }
        let refresh_shared = shared.clone();
        if tokio::task::spawn_blocking(move || refresh(&refresh_shared))
            .await
            .is_err()
        {
            warn!("refresh task panicked");
        }
    }
}

/// Re-enumerate the catalog, reconcile the watch set against the observed
/// directories, and schedule a metadata preload tagged with the new
/// generation.
fn refresh(shared: &Arc<Shared>) {
    let root = shared.catalog.root_dir().to_path_buf();
    let observed: BTreeSet<PathBuf> = shared
        .catalog
        .enumerate()
        .into_iter()
        .map(|d| root.join(d))
        .collect();

    let mut st = shared.state.lock();
    let mut guard = shared.watcher.lock();
    if let Some(watcher) = guard.as_mut() {
        for gone in st.watched.difference(&observed) {
            if let Err(e) = watcher.unwatch(gone) {
                warn!("failed to unwatch {}: {e}", gone.display());
            } else {
                debug!("unwatching {}", gone.display());
            }
        }
        let mut added = 0usize;
        for new in observed.difference(&st.watched) {
            if let Err(e) = watcher.watch(new, RecursiveMode::NonRecursive) {
                warn!("failed to watch {}: {e}", new.display());
            } else {
                added += 1;
            }
        }
        info!("watching {added} new directories");
    }
    drop(guard);
    st.watched = observed;
    st.last_update = Instant::now();
    let token = st.last_update;
    drop(st);

    let preload_shared = shared.clone();
    tokio::task::spawn_blocking(move || preload_infos(&preload_shared, token));
}

/// Probe every entry that was never probed, stopping early when a newer
/// enumeration has replaced our generation.
fn preload_infos(shared: &Shared, token: Instant) {
    loop {
        if shared.state.lock().last_update != token {
            info!("a new refresh happened; stopping metadata preload early");
            return;
        }
        let Some(entry) = shared.catalog.find_entry_to_preload() else {
            break;
        };
        entry.info();
    }
    shared.catalog.set_updating_infos(false);
    info!("metadata preload done");
}
