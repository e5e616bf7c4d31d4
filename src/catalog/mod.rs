//! The media catalog: a concurrency-safe tree of video files below one
//! library root.
//!
//! The catalog owns the tree shape behind a reader/writer lock. Lookups
//! take the read side and hand out snapshots; enumeration holds the write
//! side for the duration of the walk. Each entry carries its own lock, so
//! slow per-file work (probing, transcoding progress) never blocks the
//! structural lock. Lock order is always catalog before entry.

pub mod entry;
pub mod tree;

pub use entry::{cached_rel_path, Entry};
pub use tree::Directory;

use crate::av::ALL_DEVICES;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Source extensions the scanner recognizes, lowercase.
const VIDEO_EXTENSIONS: &[&str] = &["avi", "m4v", "mkv", "mp4", "mpeg", "mpg", "mov", "wmv"];

/// Check if a path has a recognized video extension.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

struct CatalogState {
    tree: Directory,
    /// True from the start of an enumeration until the following metadata
    /// preload pass drains.
    updating_infos: bool,
}

/// Owner of the directory tree and its configuration.
pub struct Catalog {
    root_dir: PathBuf,
    cache_dir: PathBuf,
    preferred_lang: String,
    state: RwLock<CatalogState>,
}

impl Catalog {
    /// Create a catalog over `root_dir`, keeping renditions under
    /// `cache_dir` (created if missing).
    pub fn new(root_dir: &Path, cache_dir: &Path, preferred_lang: &str) -> Result<Catalog> {
        let root_dir = std::path::absolute(root_dir)
            .with_context(|| format!("cannot resolve root directory {}", root_dir.display()))?;
        match std::fs::metadata(cache_dir) {
            Ok(m) if m.is_dir() => {}
            _ => {
                std::fs::create_dir(cache_dir).with_context(|| {
                    format!("cannot create cache directory {}", cache_dir.display())
                })?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = std::fs::set_permissions(
                        cache_dir,
                        std::fs::Permissions::from_mode(0o777),
                    );
                }
            }
        }
        Ok(Catalog {
            root_dir,
            cache_dir: cache_dir.to_path_buf(),
            preferred_lang: preferred_lang.to_string(),
            state: RwLock::new(CatalogState {
                tree: Directory::default(),
                updating_infos: true,
            }),
        })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn preferred_lang(&self) -> &str {
        &self.preferred_lang
    }

    /// Look up one entry by its slash-separated relative path.
    pub fn lookup_entry(&self, rel: &str) -> Option<Arc<Entry>> {
        self.state.read().tree.lookup_entry(rel).cloned()
    }

    /// Look up a directory and return a snapshot of it.
    ///
    /// The snapshot duplicates the tree shape and shares the entries, so
    /// the caller can iterate it without holding the catalog lock.
    pub fn lookup_dir(&self, rel: &str) -> Option<Directory> {
        self.state.read().tree.lookup_dir(rel).cloned()
    }

    /// True while discovered files still await their first probe.
    pub fn is_updating_infos(&self) -> bool {
        self.state.read().updating_infos
    }

    pub(crate) fn set_updating_infos(&self, updating: bool) {
        self.state.write().updating_infos = updating;
    }

    /// Some entry that was never probed, if any remain.
    pub fn find_entry_to_preload(&self) -> Option<Arc<Entry>> {
        self.state.read().tree.find_needing_probe()
    }

    /// Walk the library root and reconcile the tree with what is on disk.
    ///
    /// Newly observed files are added, vanished ones swept out, and empty
    /// directories pruned. Walk errors are logged; partial results stand.
    /// Returns the relative paths of every directory observed (the root
    /// itself included), which the crawler uses to reconcile its watches.
    pub fn enumerate(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        let mut found = 0usize;

        let mut st = self.state.write();
        st.updating_infos = true;
        st.tree.reset_cold();
        let walk = WalkDir::new(&self.root_dir)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden_name(e.file_name()));
        for item in walk {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    warn!("walk error under {}: {e}", self.root_dir.display());
                    continue;
                }
            };
            let Ok(rel) = item.path().strip_prefix(&self.root_dir) else {
                continue;
            };
            if item.file_type().is_dir() {
                dirs.push(rel.to_path_buf());
            } else if is_video_file(item.path()) {
                found += 1;
                self.add_file_locked(&mut st.tree, to_slash(rel));
            }
        }
        st.tree.trim_cold();
        drop(st);

        info!("found {found} video files under {}", self.root_dir.display());
        dirs
    }

    /// Record one discovered file under its slash-separated relative path.
    pub(crate) fn add_file(&self, rel: &str) {
        let mut st = self.state.write();
        self.add_file_locked(&mut st.tree, rel.to_string());
    }

    fn add_file_locked(&self, tree: &mut Directory, rel: String) {
        let parts: Vec<&str> = rel.split('/').collect();
        let Some((base, dir_parts)) = parts.split_last() else {
            return;
        };
        if let Some(existing) = tree.entry_at(dir_parts, base) {
            // Rediscovered; keep the record and everything it has learned.
            existing.set_cold(false);
            return;
        }
        let entry = Entry::new(rel.clone(), &self.preferred_lang, &self.root_dir);
        for device in ALL_DEVICES {
            let rendition = self.cache_dir.join(entry.cached_path(device));
            if std::fs::metadata(&rendition).map(|m| m.len() > 0).unwrap_or(false) {
                entry.mark_cached(device);
            }
        }
        tree.insert(dir_parts, base.to_string(), entry);
    }
}

fn is_hidden_name(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn to_slash(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::Device;
    use tempfile::tempdir;

    #[test]
    fn test_new_creates_cache_dir() {
        let tmp = tempdir().unwrap();
        let cache = tmp.path().join("cache");
        assert!(!cache.exists());
        let cat = Catalog::new(tmp.path(), &cache, "eng").unwrap();
        assert!(cache.is_dir());
        assert!(cat.is_updating_infos());
    }

    #[test]
    fn test_new_fails_when_cache_dir_unmakeable() {
        let tmp = tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        assert!(Catalog::new(tmp.path(), &blocker.join("cache"), "eng").is_err());
    }

    #[test]
    fn test_add_file_then_lookup() {
        let tmp = tempdir().unwrap();
        let cat = Catalog::new(tmp.path(), &tmp.path().join(".cache"), "eng").unwrap();
        cat.add_file("foo/bar.mp4");
        let e = cat.lookup_entry("foo/bar.mp4").expect("entry");
        assert_eq!(e.rel(), "foo/bar.mp4");
        let dir = cat.lookup_dir("foo").expect("dir");
        assert!(dir.lookup_entry("bar.mp4").is_some());
        // Re-adding keeps the same record.
        cat.add_file("foo/bar.mp4");
        assert!(Arc::ptr_eq(&e, &cat.lookup_entry("foo/bar.mp4").unwrap()));
    }

    #[test]
    fn test_add_file_detects_existing_renditions() {
        let tmp = tempdir().unwrap();
        let cache = tmp.path().join(".cache");
        let dongle = cache.join("streaming-dongle/movies");
        std::fs::create_dir_all(&dongle).unwrap();
        std::fs::write(dongle.join("a.mp4"), b"rendition").unwrap();
        // Zero-size files do not count.
        let laptop = cache.join("laptop/movies");
        std::fs::create_dir_all(&laptop).unwrap();
        std::fs::write(laptop.join("a.mp4"), b"").unwrap();

        let cat = Catalog::new(tmp.path(), &cache, "eng").unwrap();
        cat.add_file("movies/a.mkv");
        let e = cat.lookup_entry("movies/a.mkv").unwrap();
        assert!(e.is_cached(Device::StreamingDongle));
        assert!(!e.is_cached(Device::Laptop));
        assert!(!e.is_cached(Device::Preview));
    }

    #[test]
    fn test_is_video_file() {
        for name in ["a.avi", "a.m4v", "a.mkv", "a.mp4", "a.mpeg", "a.mpg", "a.mov", "a.wmv"] {
            assert!(is_video_file(Path::new(name)), "{name}");
        }
        assert!(is_video_file(Path::new("A.MKV")));
        assert!(!is_video_file(Path::new("a.srt")));
        assert!(!is_video_file(Path::new("a.webm")));
        assert!(!is_video_file(Path::new("noext")));
    }
}
