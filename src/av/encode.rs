//! ffmpeg invocation with live progress reporting.

use crate::av::device::{build_args, Device};
use crate::av::error::{Error, Result};
use crate::av::probe::MediaInfo;
use crate::av::progress::serve_progress;
use std::path::Path;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Transcode `src` into the rendition for `device` at `dst`.
///
/// `report` receives the encoder's frame counter as it advances. A failed
/// encode removes whatever partial output was written before returning the
/// error.
pub async fn transcode<F>(
    device: Device,
    src: &Path,
    dst: &Path,
    info: &MediaInfo,
    report: F,
) -> Result<()>
where
    F: Fn(u64) + Send + Sync + 'static,
{
    if let Some(dir) = dst.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(serve_progress(listener, report));

    let mut args = vec![
        "-hide_banner".to_string(),
        "-progress".to_string(),
        format!("http://{addr}/progress"),
    ];
    args.extend(build_args(device, info, src, dst));
    info!("transcoding {}: ffmpeg {}", src.display(), args.join(" "));

    let output = tokio::process::Command::new("ffmpeg")
        .args(&args)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found("ffmpeg")
            } else {
                Error::Io(e)
            }
        });
    server.abort();
    let output = output?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!(
            "transcoding {} failed ({}):\n{}",
            src.display(),
            output.status,
            stderr
        );
        // Never leave a truncated rendition where the scanner would find it.
        let _ = std::fs::remove_file(dst);
        return Err(Error::tool_failed("ffmpeg", stderr.to_string()));
    }
    info!("transcoded {} for {}", src.display(), device);
    Ok(())
}
