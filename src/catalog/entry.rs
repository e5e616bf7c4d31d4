//! Per-file catalog record.

use crate::av::{self, Device, MediaInfo};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Cache-relative path of the rendition of `rel` for `device`.
///
/// The device's short name becomes the leading directory component and the
/// source extension is replaced with the device container.
pub fn cached_rel_path(rel: &str, device: Device) -> String {
    let ext_len = Path::new(rel)
        .extension()
        .map(|e| e.len() + 1)
        .unwrap_or(0);
    let stem = &rel[..rel.len() - ext_len];
    format!("{}/{}.{}", device.as_str(), stem, device.container())
}

/// One source video file.
///
/// The immutable identity is `rel`, the slash-normalized path below the
/// library root. Everything mutable sits behind the entry's own lock so
/// readers never contend with catalog-wide operations.
pub struct Entry {
    rel: String,
    preferred_lang: String,
    root_dir: PathBuf,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    info: Option<Arc<MediaInfo>>,
    /// Sticky probe failure; suppresses retry until the entry is rebuilt.
    info_err: Option<String>,
    cached: HashSet<Device>,
    transcoding: bool,
    frame: u64,
    /// Mark bit of the refresh sweep.
    cold: bool,
}

impl Entry {
    pub(crate) fn new(rel: String, preferred_lang: &str, root_dir: &Path) -> Arc<Entry> {
        Arc::new(Entry {
            rel,
            preferred_lang: preferred_lang.to_string(),
            root_dir: root_dir.to_path_buf(),
            state: Mutex::new(State::default()),
        })
    }

    /// Path relative to the library root, always with forward slashes.
    pub fn rel(&self) -> &str {
        &self.rel
    }

    /// Absolute path of the source file.
    pub fn src_path(&self) -> PathBuf {
        self.root_dir.join(&self.rel)
    }

    /// Cache-relative path of this entry's rendition for `device`.
    pub fn cached_path(&self, device: Device) -> String {
        cached_rel_path(&self.rel, device)
    }

    pub fn is_cached(&self, device: Device) -> bool {
        self.state.lock().cached.contains(&device)
    }

    pub fn is_transcoding(&self) -> bool {
        self.state.lock().transcoding
    }

    /// Last frame count reported by the encoder.
    pub fn frame(&self) -> u64 {
        self.state.lock().frame
    }

    /// Transcoding progress for `device` as a display string.
    ///
    /// "100%" once the rendition exists, "N/A" while the file is
    /// unidentified or its frame count is unknown.
    pub fn percent(&self, device: Device) -> String {
        if self.is_cached(device) {
            return "100%".to_string();
        }
        let Some(info) = self.info() else {
            return "N/A".to_string();
        };
        let Some(total) = info.total_frames.filter(|&t| t > 0) else {
            return "N/A".to_string();
        };
        format!("{:.1}%", 100.0 * self.frame() as f64 / total as f64)
    }

    /// Metadata, probing the file on first call.
    ///
    /// A failed probe is sticky: the error is recorded and later calls
    /// return `None` without touching the file again.
    pub fn info(&self) -> Option<Arc<MediaInfo>> {
        let src = self.src_path();
        let mut st = self.state.lock();
        if st.info.is_none() && st.info_err.is_none() {
            match av::identify(&src, &self.preferred_lang) {
                Ok(info) => st.info = Some(Arc::new(info)),
                Err(e) => {
                    warn!("{}: {e}", src.display());
                    st.info_err = Some(e.to_string());
                }
            }
        }
        st.info.clone()
    }

    /// Metadata only if it has been loaded already; never probes.
    pub fn try_info(&self) -> Option<Arc<MediaInfo>> {
        self.state.lock().info.clone()
    }

    pub(crate) fn needs_probe(&self) -> bool {
        let st = self.state.lock();
        st.info.is_none() && st.info_err.is_none()
    }

    pub(crate) fn set_cold(&self, cold: bool) {
        self.state.lock().cold = cold;
    }

    pub(crate) fn is_cold(&self) -> bool {
        self.state.lock().cold
    }

    pub(crate) fn mark_cached(&self, device: Device) {
        self.state.lock().cached.insert(device);
    }

    pub(crate) fn begin_transcoding(&self) {
        let mut st = self.state.lock();
        st.transcoding = true;
        st.frame = 0;
    }

    pub(crate) fn finish_transcoding(&self, device: Device, success: bool) {
        let mut st = self.state.lock();
        st.transcoding = false;
        if success {
            st.cached.insert(device);
        }
    }

    pub(crate) fn record_frame(&self, frame: u64) {
        self.state.lock().frame = frame;
    }

    #[cfg(test)]
    pub(crate) fn inject_info(&self, info: MediaInfo) {
        self.state.lock().info = Some(Arc::new(info));
    }
}
