//! Wire types shared by the execution server and the execution client.
//!
//! JSON field names are camelCase. The server produces these, the host-side client
//! consumes them; neither side depends on the other's crate.

use serde::{Deserialize, Serialize};

// ─── Requests ────────────────────────────────────────────────────────────────

/// Body of `POST /bash/exec` and `POST /bash`.
///
/// `command` is optional at the type level so the server can answer a missing
/// command with HTTP 400 instead of a deserialization rejection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRequest {
    #[serde(default)]
    pub command: Option<String>,
    /// Timeout in milliseconds. Missing or zero selects the server default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Working directory. Missing selects the environment's working path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

impl ExecRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            timeout: None,
            cwd: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// Body of `POST /file/read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReadRequest {
    pub path: String,
}

/// Body of `POST /file/write`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWriteRequest {
    pub path: String,
    pub content: String,
}

// ─── Responses ───────────────────────────────────────────────────────────────

/// Outcome of one command execution.
///
/// `success` is true iff the process exited with status 0 and was not killed for
/// timeout. Non-zero exits, timeouts and transport failures are all data here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub exit_code: i32,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecutionResult {
    /// Result for a process that ran to completion.
    pub fn completed(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            success: exit_code == 0,
            stdout,
            stderr,
            exit_code,
            timed_out: false,
            error_message: None,
        }
    }

    /// Result for a process killed because it exceeded `timeout_ms`.
    pub fn timed_out(stdout: String, stderr: String, exit_code: i32, timeout_ms: u64) -> Self {
        Self {
            success: false,
            stdout,
            stderr,
            exit_code,
            timed_out: true,
            error_message: Some(format!("Command timed out after {}ms", timeout_ms)),
        }
    }

    /// Synthesized failure: exit code 1 and a descriptive message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 1,
            timed_out: false,
            error_message: Some(message.into()),
        }
    }
}

/// `GET /health` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

/// `POST /file/read` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReadResponse {
    pub success: bool,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /file/write` and `POST /cleanup` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ─── Streaming ───────────────────────────────────────────────────────────────

/// One event of the `POST /bash` NDJSON stream.
///
/// A stream starts with [`StreamEvent::Start`] and ends with exactly one of
/// [`StreamEvent::Exit`] or [`StreamEvent::Error`]. A `start` the client made up
/// for a stream the server never opened has no `pid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Start {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
    },
    Stdout {
        data: String,
    },
    Stderr {
        data: String,
    },
    Timeout {
        #[serde(rename = "timeoutMs")]
        timeout_ms: u64,
    },
    Exit {
        #[serde(rename = "exitCode")]
        exit_code: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signal: Option<String>,
        #[serde(rename = "timedOut")]
        timed_out: bool,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    /// `exit` and `error` end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exit { .. } | Self::Error { .. })
    }

    /// Encode as one NDJSON line (with trailing newline).
    pub fn to_ndjson(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"type":"error","message":"failed to encode event: {}"}}"#,
                e
            )
        });
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_execution_result_wire_shape() {
        let result = ExecutionResult::completed("hi\n".into(), "err\n".into(), 3);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "success": false,
                "stdout": "hi\n",
                "stderr": "err\n",
                "exitCode": 3,
                "timedOut": false
            })
        );
    }

    #[test]
    fn test_timed_out_result_is_not_success() {
        let result = ExecutionResult::timed_out(String::new(), String::new(), 143, 100);
        assert!(!result.success);
        assert!(result.timed_out);
        assert!(result.error_message.unwrap().contains("100ms"));
    }

    #[test]
    fn test_exec_request_missing_command_deserializes() {
        let req: ExecRequest = serde_json::from_value(json!({"timeout": 500})).unwrap();
        assert_eq!(req.command, None);
        assert_eq!(req.timeout, Some(500));
    }

    #[test]
    fn test_stream_event_tags() {
        let exit = StreamEvent::Exit {
            exit_code: Some(0),
            signal: None,
            timed_out: false,
        };
        assert_eq!(
            serde_json::to_value(&exit).unwrap(),
            json!({"type": "exit", "exitCode": 0, "timedOut": false})
        );
        assert!(exit.is_terminal());

        let line = StreamEvent::Stdout { data: "x".into() }.to_ndjson();
        assert_eq!(line, "{\"type\":\"stdout\",\"data\":\"x\"}\n");

        let parsed: StreamEvent =
            serde_json::from_str(r#"{"type":"timeout","timeoutMs":100}"#).unwrap();
        assert_eq!(parsed, StreamEvent::Timeout { timeout_ms: 100 });
        assert!(!parsed.is_terminal());
    }
}
