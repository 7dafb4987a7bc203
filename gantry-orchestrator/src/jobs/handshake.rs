//! Handshake banner parsing and output-stream pumping

use gantry_core::wire::Handshake;
use regex::Regex;
use std::sync::OnceLock;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

static BANNER_RE: OnceLock<Regex> = OnceLock::new();

fn banner_re() -> &'static Regex {
    BANNER_RE.get_or_init(|| {
        Regex::new(r"JOBID: ([0-9]+) STEP: ([0-9]+) PORT: ([0-9]+) HOST: (\S+)")
            .expect("handshake banner pattern")
    })
}

/// Parses a worker handshake banner out of one output line.
///
/// Returns `None` for lines that are not a banner.
pub fn parse_handshake(line: &str) -> Option<Handshake> {
    let caps = banner_re().captures(line)?;
    Some(Handshake {
        job_id: caps[1].parse().ok()?,
        step_id: caps[2].parse().ok()?,
        port: caps[3].parse().ok()?,
        host: caps[4].to_string(),
    })
}

/// Forwards a child stream line by line into the submission's combined
/// output channel. Ends silently when the stream closes.
pub async fn pump_lines<R>(stream: R, lines: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream).lines();
    while let Ok(Some(line)) = reader.next_line().await {
        if lines.send(line).is_err() {
            break;
        }
    }
}
