//! One-shot progress listener for the encoder.
//!
//! ffmpeg is pointed at `-progress http://127.0.0.1:<port>/progress` and
//! streams `key=value` lines in the request body for the lifetime of the
//! encode. Only `frame=<int>` is surfaced; every other key is ignored.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::debug;

/// Split one progress line into key and value.
pub(crate) fn parse_progress_line(line: &str) -> Option<(&str, &str)> {
    line.split_once('=')
}

/// Serve progress connections until aborted by the caller.
///
/// The body is read line-wise without decoding the chunked framing; chunk
/// size lines contain no `=` and fall through the parser.
pub(crate) async fn serve_progress<F>(listener: TcpListener, report: F)
where
    F: Fn(u64) + Send + Sync + 'static,
{
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        let mut in_body = false;
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if !in_body {
                // Request line and headers end at the first blank line.
                if trimmed.is_empty() {
                    in_body = true;
                }
                continue;
            }
            if let Some(("frame", value)) = parse_progress_line(trimmed) {
                match value.trim().parse::<u64>() {
                    Ok(frame) => report(frame),
                    Err(_) => debug!("unparsable progress line {trimmed:?}"),
                }
            }
        }
        let mut stream = reader.into_inner();
        let _ = stream
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await;
    }
}
