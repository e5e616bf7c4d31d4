//! Serialized transcoding queue.
//!
//! Requests go through a bounded channel into a single worker task, so at
//! most one encoder runs at a time and requests are processed strictly in
//! submission order. Shutdown discards what is still queued but lets the
//! in-flight encode finish.

use crate::av::{self, Device};
use crate::catalog::{Catalog, Entry};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Sized for bursts: a whole library queued at once must not block the
/// callers that queued it.
const QUEUE_CAPACITY: usize = 10_240;

struct Request {
    device: Device,
    entry: Arc<Entry>,
}

/// Owner of the request channel and the worker task.
pub struct TranscodeQueue {
    tx: mpsc::Sender<Option<Request>>,
    closing: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TranscodeQueue {
    /// Start the worker. Must be called within a tokio runtime.
    pub fn new(catalog: Arc<Catalog>) -> TranscodeQueue {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let closing = Arc::new(AtomicBool::new(false));
        let worker = tokio::spawn(run(catalog, rx, closing.clone()));
        TranscodeQueue {
            tx,
            closing,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue one rendition.
    ///
    /// Marks the entry as transcoding immediately. Callers are expected to
    /// check [`Entry::is_cached`] and [`Entry::is_transcoding`] first; the
    /// queue does not deduplicate. Blocks only once the channel is full.
    pub async fn transcode(&self, device: Device, entry: Arc<Entry>) {
        entry.begin_transcoding();
        if self.tx.send(Some(Request { device, entry })).await.is_err() {
            warn!("transcode queue is shut down; request dropped");
        }
    }

    /// Discard pending requests, let the in-flight encode finish, and stop
    /// the worker. No encode starts after this returns.
    pub async fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let _ = self.tx.send(None).await;
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn run(
    catalog: Arc<Catalog>,
    mut rx: mpsc::Receiver<Option<Request>>,
    closing: Arc<AtomicBool>,
) {
    while let Some(msg) = rx.recv().await {
        let Some(req) = msg else {
            break;
        };
        if closing.load(Ordering::SeqCst) {
            debug!("discarding queued transcode for {}", req.entry.rel());
            continue;
        }

        // The probe may block for a while on cold storage.
        let probe_entry = req.entry.clone();
        let info = tokio::task::spawn_blocking(move || probe_entry.info())
            .await
            .unwrap_or(None);
        let Some(info) = info else {
            warn!("skipping transcode of unidentified {}", req.entry.rel());
            req.entry.finish_transcoding(req.device, false);
            continue;
        };

        let src = req.entry.src_path();
        let dst = catalog.cache_dir().join(req.entry.cached_path(req.device));
        let progress_entry = req.entry.clone();
        let result = av::transcode(req.device, &src, &dst, &info, move |frame| {
            progress_entry.record_frame(frame)
        })
        .await;
        req.entry.finish_transcoding(req.device, result.is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_unidentified_entry_is_skipped_but_flag_clears() {
        let tmp = tempdir().unwrap();
        let catalog =
            Arc::new(Catalog::new(tmp.path(), &tmp.path().join(".cache"), "eng").unwrap());
        // The file does not exist on disk, so identification fails and
        // sticks; the worker must bail before touching any encoder.
        catalog.add_file("a/missing.mkv");
        let entry = catalog.lookup_entry("a/missing.mkv").unwrap();

        let queue = TranscodeQueue::new(catalog.clone());
        queue.transcode(Device::StreamingDongle, entry.clone()).await;

        for _ in 0..200 {
            if !entry.is_transcoding() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!entry.is_transcoding());
        assert!(!entry.is_cached(Device::StreamingDongle));
        assert!(entry.try_info().is_none());

        queue.close().await;
    }

    #[tokio::test]
    async fn test_close_stops_worker() {
        let tmp = tempdir().unwrap();
        let catalog =
            Arc::new(Catalog::new(tmp.path(), &tmp.path().join(".cache"), "eng").unwrap());
        let queue = TranscodeQueue::new(catalog);
        queue.close().await;
        // A second close must not hang.
        queue.close().await;
    }
}
