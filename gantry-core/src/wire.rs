//! Worker wire protocol
//!
//! Two line-oriented exchanges share this module: the handshake banner a
//! freshly started worker prints on its output stream, and the JSON messages
//! spoken over the worker's TCP endpoint. Local-mode workers reuse the same
//! request shape over stdin and answer with a single `REPORT:` line.

use serde::{Deserialize, Serialize};

use crate::args::TaskArgs;
use crate::task::TaskReport;

/// The `JOBID: .. STEP: .. PORT: .. HOST: ..` banner.
///
/// Emitted exactly once by a worker as soon as its endpoint is bound; the
/// submitting side parses it out of the job's output stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub job_id: u64,
    pub step_id: u64,
    pub port: u16,
    pub host: String,
}

impl Handshake {
    /// Formats the banner line exactly as the worker prints it.
    pub fn banner(&self) -> String {
        format!(
            "JOBID: {} STEP: {} PORT: {} HOST: {}",
            self.job_id, self.step_id, self.port, self.host
        )
    }
}

/// One request to a worker endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    /// Run the named task with the given arguments.
    Call { name: String, args: TaskArgs },
    /// Orderly shutdown.
    Stop,
}

/// One response from a worker endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerResponse {
    /// Outcome of a `Call`, success or failure.
    Report { report: TaskReport },
    /// The worker could not service the request at all.
    Refused { message: String },
}

/// Prefix of the report line a local-mode worker writes on stdout.
pub const REPORT_PREFIX: &str = "REPORT: ";

/// Encodes the final line of a local-mode worker run.
pub fn encode_report_line(report: &TaskReport) -> String {
    let body = serde_json::to_string(report).expect("task report is valid json");
    format!("{REPORT_PREFIX}{body}")
}

/// Decodes a report line; `None` for lines that are not one.
pub fn decode_report_line(line: &str) -> Option<TaskReport> {
    let body = line.strip_prefix(REPORT_PREFIX)?;
    serde_json::from_str(body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskContext;
    use serde_json::json;

    #[test]
    fn test_banner_format() {
        let h = Handshake {
            job_id: 42,
            step_id: 0,
            port: 9000,
            host: "node07".to_string(),
        };
        assert_eq!(h.banner(), "JOBID: 42 STEP: 0 PORT: 9000 HOST: node07");
    }

    #[test]
    fn test_request_tag_format() {
        let req = WorkerRequest::Call {
            name: "echo".to_string(),
            args: TaskArgs::positional(vec![json!(1)]),
        };
        let encoded = serde_json::to_string(&req).unwrap();
        assert!(encoded.contains(r#""type":"call""#));

        let decoded: WorkerRequest = serde_json::from_str(&encoded).unwrap();
        assert_eq!(req, decoded);

        let stop: WorkerRequest = serde_json::from_str(r#"{"type":"stop"}"#).unwrap();
        assert_eq!(stop, WorkerRequest::Stop);
    }

    #[test]
    fn test_report_line_round_trip() {
        let report = TaskReport::succeeded(json!({"n": 1}), TaskContext::new());
        let line = encode_report_line(&report);
        assert!(line.starts_with(REPORT_PREFIX));

        let decoded = decode_report_line(&line).unwrap();
        assert_eq!(report, decoded);
    }

    #[test]
    fn test_decode_rejects_other_lines() {
        assert!(decode_report_line("plain output").is_none());
        assert!(decode_report_line("REPORT: not-json").is_none());
    }
}
