//! Identifies and transcodes video files via ffprobe and ffmpeg.

pub mod device;
pub mod encode;
pub mod error;
pub mod probe;
mod progress;

pub use device::{build_args, Device, ALL_DEVICES};
pub use encode::transcode;
pub use error::{Error, Result};
pub use probe::{analyze, identify, probe, MediaInfo, ProbeOutput};
