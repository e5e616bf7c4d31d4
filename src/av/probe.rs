//! ffprobe invocation and stream identification.
//!
//! [`probe`] shells out to ffprobe and returns its JSON output typed;
//! [`analyze`] turns that output into a [`MediaInfo`] by picking the one
//! real video stream and the best audio stream for a preferred language.
//! The two halves are split so identification is testable on synthesized
//! JSON without the binary installed.

use crate::av::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

/// One stream in the container as reported by ffprobe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stream {
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub codec_name: String,
    #[serde(default)]
    pub codec_type: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub bit_rate: String,
    /// Integer as a decimal string, possibly absent.
    #[serde(default)]
    pub nb_frames: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// The detected file format as reported by ffprobe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Format {
    #[serde(default)]
    pub format_name: String,
    #[serde(default)]
    pub format_long_name: String,
    /// Seconds as a decimal string.
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub bit_rate: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// A chapter marker as reported by ffprobe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// The raw ffprobe output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeOutput {
    #[serde(default)]
    pub streams: Vec<Stream>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub format: Format,
}

/// The analyzed information about one video file.
#[derive(Debug, Clone, Serialize)]
pub struct MediaInfo {
    /// Copy of `format.format_name`.
    pub container: String,
    /// Rounded human readable duration; empty when the container does not
    /// report one.
    pub duration: String,
    pub video_index: i64,
    pub video_codec: String,
    pub audio_index: i64,
    pub audio_codec: String,
    pub audio_lang: String,
    /// Frame count of the chosen video stream, when the container knows it.
    pub total_frames: Option<u64>,
    /// The untouched probe output.
    pub raw: ProbeOutput,
}

/// Run ffprobe on a file and return the typed output.
pub fn probe(src: &Path) -> Result<ProbeOutput> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-show_chapters",
        ])
        .arg(src)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found("ffprobe")
            } else {
                Error::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::tool_failed("ffprobe", stderr.to_string()));
    }

    Ok(serde_json::from_slice(&output.stdout)?)
}

/// Probe a file and analyze its streams.
///
/// `lang` is the preferred audio language, e.g. "eng" or "fre".
pub fn identify(src: &Path, lang: &str) -> Result<MediaInfo> {
    let raw = probe(src)?;
    analyze(src, raw, lang)
}

/// Analyze probe output: pick the video stream and the preferred audio
/// stream, and render the duration.
pub fn analyze(src: &Path, raw: ProbeOutput, lang: &str) -> Result<MediaInfo> {
    let duration = match raw.format.duration.as_str() {
        "" => String::new(),
        text => {
            let secs: f64 = text
                .parse()
                .map_err(|_| Error::parse_error("ffprobe", format!("bad duration {text:?}")))?;
            format_duration(secs)
        }
    };

    let mut videos: Vec<usize> = Vec::new();
    let mut audios: Vec<usize> = Vec::new();
    for (i, s) in raw.streams.iter().enumerate() {
        match s.codec_type.as_str() {
            "video" => {
                if s.tags.get("mimetype").map(String::as_str) == Some("image/jpeg") {
                    // Embedded cover art, not a playable stream.
                    continue;
                }
                videos.push(i);
            }
            "audio" => {
                // Audio tracks without a codec do show up in the wild.
                if !s.codec_name.is_empty() {
                    audios.push(i);
                }
            }
            "data" | "subtitle" => {}
            other => {
                return Err(Error::identify(src, format!("unknown stream type {other:?}")));
            }
        }
    }

    if videos.len() > 1 {
        return Err(Error::identify(src, "too many video streams"));
    }
    let video = match videos.first() {
        Some(&i) => &raw.streams[i],
        None => return Err(Error::identify(src, "no video stream found")),
    };

    let mut info = MediaInfo {
        container: raw.format.format_name.clone(),
        duration,
        video_index: video.index,
        video_codec: video.codec_name.clone(),
        audio_index: 0,
        audio_codec: String::new(),
        audio_lang: String::new(),
        total_frames: video.nb_frames.parse().ok(),
        raw: ProbeOutput::default(),
    };

    // Walk audio streams in file order, latching onto the first one that
    // matches the preferred language.
    for &i in &audios {
        if info.audio_lang == lang {
            continue;
        }
        let s = &raw.streams[i];
        info.audio_index = s.index;
        info.audio_codec = s.codec_name.clone();
        info.audio_lang = s.tags.get("language").cloned().unwrap_or_default();
    }

    info.raw = raw;
    Ok(info)
}

/// Render a duration the way a human wants to read it: minutes above an
/// hour, seconds above a minute, milliseconds below that. At most two
/// units are shown.
fn format_duration(secs: f64) -> String {
    let text = if secs > 3600.0 {
        render_hms((secs / 60.0).round() as u64 * 60)
    } else if secs > 60.0 {
        render_hms(secs.round() as u64)
    } else {
        let ms = (secs * 1000.0).round() as u64;
        if ms >= 60_000 {
            render_hms(ms / 1000)
        } else if ms >= 1000 {
            let frac = format!("{:03}", ms % 1000);
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                format!("{}s", ms / 1000)
            } else {
                format!("{}.{}s", ms / 1000, frac)
            }
        } else {
            return format!("{ms}ms");
        }
    };
    let text = text.replacen("m0s", "m", 1);
    text.replacen("h0m", "h", 1)
}

fn render_hms(total_secs: u64) -> String {
    let h = total_secs / 3600;
    let m = (total_secs % 3600) / 60;
    let s = total_secs % 60;
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else {
        format!("{m}m{s}s")
    }
}
