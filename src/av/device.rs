//! Playback device profiles and codec acceptance policy.
//!
//! A [`Device`] decides which codecs can be stream-copied, which container
//! the rendition uses, and which ffmpeg flags produce it. The tables are
//! deliberately conservative: anything not listed gets re-encoded.

use crate::av::probe::MediaInfo;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A playback target a rendition is produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Device {
    /// Streaming dongle plugged into a TV. Decodes H.264 and passes AC3
    /// through to the television.
    StreamingDongle,
    /// Newer dongle revision that additionally decodes H.265.
    StreamingDongleHd,
    /// Laptop playback. No AC3 support at all; the file is meant to be
    /// copied onto the device, so the encoder favors size over speed.
    Laptop,
    /// Animated WEBP preview thumbnail. Always re-encoded, audio dropped.
    Preview,
}

/// Every device a rendition can be produced for.
pub const ALL_DEVICES: [Device; 4] = [
    Device::StreamingDongle,
    Device::StreamingDongleHd,
    Device::Laptop,
    Device::Preview,
];

impl Device {
    /// Short name, also the top-level directory of the cache layout.
    pub fn as_str(self) -> &'static str {
        match self {
            Device::StreamingDongle => "streaming-dongle",
            Device::StreamingDongleHd => "streaming-dongle-hd",
            Device::Laptop => "laptop",
            Device::Preview => "preview",
        }
    }

    /// Container extension of the rendition, without the dot.
    pub fn container(self) -> &'static str {
        match self {
            Device::Preview => "webp",
            _ => "mp4",
        }
    }

    /// Whether this device plays the given video codec without re-encoding.
    ///
    /// Codec names are ffprobe `codec_name` values.
    pub fn supports_video(self, codec: &str) -> bool {
        // The preview is always synthesized, never copied.
        if self == Device::Preview {
            return false;
        }
        match codec {
            "mpeg1video" | "mpeg2video" | "h264" | "vp8" => true,
            "h265" => self == Device::StreamingDongleHd,
            // mpeg4, msmpeg4v3, svq3, wmv1
            _ => false,
        }
    }

    /// Whether this device plays the given audio codec without re-encoding.
    pub fn supports_audio(self, codec: &str) -> bool {
        // The preview drops audio entirely, so anything "works".
        if self == Device::Preview {
            return true;
        }
        match codec {
            // The dongles pass AC3 through to the TV; the laptop cannot
            // decode it at all.
            "ac3" => self != Device::Laptop,
            "aac" | "mp2" | "mp3" => true,
            // pcm_u8, wmav2, dts
            _ => false,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_DEVICES
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("unknown device {s:?}"))
    }
}

/// Build the full ffmpeg argument vector for one rendition.
///
/// The order is load-bearing: input, output format, stream selection,
/// video flags, audio flags, metadata, output path.
pub fn build_args(device: Device, info: &MediaInfo, src: &Path, dst: &Path) -> Vec<String> {
    let container = device.container();
    let mut args: Vec<String> = vec![
        "-i".into(),
        src.to_string_lossy().into_owned(),
        "-f".into(),
        container.into(),
    ];
    if container == "mp4" {
        // faststart moves the moov atom up front so playback can begin
        // before the download completes.
        args.push("-movflags".into());
        args.push("+faststart".into());
        args.push("-map".into());
        args.push(format!("0:{}", info.video_index));
        args.push("-map".into());
        args.push(format!("0:{}", info.audio_index));
    }

    if device == Device::Preview {
        // 30 seconds sampled at 2fps starting one minute in, 320px wide.
        args.extend(
            [
                "-itsoffset",
                "1:00",
                "-itsscale",
                "2",
                "-t",
                "30",
                "-vcodec",
                "libwebp",
                "-filter:v",
                "fps=fps=2",
                "-lossless",
                "0",
                "-compression_level",
                "3",
                "-loop",
                "1",
                "-s",
                "320:-1",
            ]
            .map(String::from),
        );
    } else if device.supports_video(&info.video_codec) {
        args.push("-c:v".into());
        args.push("copy".into());
    } else {
        args.push("-c:v".into());
        args.push("h264".into());
        match device {
            Device::StreamingDongle | Device::StreamingDongleHd => {
                // Encode fast; files are throwaway, bitrate matters more
                // than size. yuv420p keeps High 10 profiles out.
                args.extend(
                    ["-preset", "faster", "-crf", "21", "-level", "4.1", "-pix_fmt", "yuv420p"]
                        .map(String::from),
                );
            }
            Device::Laptop => {
                // The file ends up stored on the device. Keep it small.
                args.extend(["-preset", "slow", "-crf", "21"].map(String::from));
            }
            Device::Preview => unreachable!(),
        }
    }

    if device == Device::Preview {
        args.push("-an".into());
    } else if device.supports_audio(&info.audio_codec) {
        args.push("-c:a".into());
        args.push("copy".into());
    } else {
        args.push("-c:a".into());
        args.push("aac".into());
    }

    match info.audio_lang.as_str() {
        "" | "und" => {}
        lang => {
            args.push("-metadata:s:a:0".into());
            args.push(format!("language={lang}"));
        }
    }

    args.push(dst.to_string_lossy().into_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::probe::tests::info_fixture;

    #[test]
    fn test_container_per_device() {
        assert_eq!(Device::StreamingDongle.container(), "mp4");
        assert_eq!(Device::StreamingDongleHd.container(), "mp4");
        assert_eq!(Device::Laptop.container(), "mp4");
        assert_eq!(Device::Preview.container(), "webp");
    }

    #[test]
    fn test_video_acceptance() {
        for codec in ["mpeg1video", "mpeg2video", "h264", "vp8"] {
            assert!(Device::StreamingDongle.supports_video(codec), "{codec}");
            assert!(Device::StreamingDongleHd.supports_video(codec), "{codec}");
            assert!(Device::Laptop.supports_video(codec), "{codec}");
        }
        // h265 is the HD dongle's privilege.
        assert!(!Device::StreamingDongle.supports_video("h265"));
        assert!(Device::StreamingDongleHd.supports_video("h265"));
        assert!(!Device::Laptop.supports_video("h265"));

        assert!(!Device::StreamingDongle.supports_video("mpeg4"));
        assert!(!Device::Laptop.supports_video("wmv1"));
        assert!(!Device::Preview.supports_video("h264"));
    }

    #[test]
    fn test_audio_acceptance() {
        for codec in ["aac", "mp2", "mp3"] {
            assert!(Device::StreamingDongle.supports_audio(codec), "{codec}");
            assert!(Device::Laptop.supports_audio(codec), "{codec}");
        }
        assert!(Device::StreamingDongle.supports_audio("ac3"));
        assert!(Device::StreamingDongleHd.supports_audio("ac3"));
        assert!(!Device::Laptop.supports_audio("ac3"));
        assert!(!Device::StreamingDongle.supports_audio("dts"));
        assert!(Device::Preview.supports_audio("whatever"));
    }

    #[test]
    fn test_build_args_stream_copy() {
        let info = info_fixture("h264", "aac", "eng");
        let args = build_args(
            Device::StreamingDongle,
            &info,
            Path::new("/media/a.mkv"),
            Path::new("/cache/streaming-dongle/a.mp4"),
        );
        assert_eq!(
            args,
            [
                "-i",
                "/media/a.mkv",
                "-f",
                "mp4",
                "-movflags",
                "+faststart",
                "-map",
                "0:0",
                "-map",
                "0:1",
                "-c:v",
                "copy",
                "-c:a",
                "copy",
                "-metadata:s:a:0",
                "language=eng",
                "/cache/streaming-dongle/a.mp4",
            ]
        );
    }

    #[test]
    fn test_build_args_reencode_dongle() {
        let info = info_fixture("mpeg4", "dts", "und");
        let args = build_args(
            Device::StreamingDongleHd,
            &info,
            Path::new("in.avi"),
            Path::new("out.mp4"),
        );
        assert_eq!(
            args,
            [
                "-i", "in.avi", "-f", "mp4", "-movflags", "+faststart", "-map", "0:0", "-map",
                "0:1", "-c:v", "h264", "-preset", "faster", "-crf", "21", "-level", "4.1",
                "-pix_fmt", "yuv420p", "-c:a", "aac", "out.mp4",
            ]
        );
    }

    #[test]
    fn test_build_args_laptop_preset() {
        let info = info_fixture("wmv1", "wmav2", "");
        let args = build_args(Device::Laptop, &info, Path::new("in.wmv"), Path::new("out.mp4"));
        let joined = args.join(" ");
        assert!(joined.contains("-c:v h264 -preset slow -crf 21"), "{joined}");
        assert!(joined.contains("-c:a aac"), "{joined}");
        assert!(!joined.contains("language="), "{joined}");
    }

    #[test]
    fn test_build_args_preview() {
        let info = info_fixture("h264", "aac", "fre");
        let args = build_args(Device::Preview, &info, Path::new("in.mp4"), Path::new("out.webp"));
        assert_eq!(
            args,
            [
                "-i",
                "in.mp4",
                "-f",
                "webp",
                "-itsoffset",
                "1:00",
                "-itsscale",
                "2",
                "-t",
                "30",
                "-vcodec",
                "libwebp",
                "-filter:v",
                "fps=fps=2",
                "-lossless",
                "0",
                "-compression_level",
                "3",
                "-loop",
                "1",
                "-s",
                "320:-1",
                "-an",
                "-metadata:s:a:0",
                "language=fre",
                "out.webp",
            ]
        );
    }
}
