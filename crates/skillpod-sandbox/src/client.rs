//! Execution client: ensure the environment, then talk to its execution server.
//!
//! Errors from `ensure` propagate. Everything after the environment is usable is
//! reported as data: transport failures and malformed responses become a failed
//! [`ExecutionResult`], a broken stream ends with a synthetic `error` event.

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use skillpod_core::protocol::{
    ExecRequest, ExecutionResult, FileReadRequest, FileReadResponse, FileWriteRequest,
    StatusResponse, StreamEvent,
};

use crate::error::Result;
use crate::lifecycle::{EnvironmentManager, EnvironmentRecord};
use crate::naming::SkillId;
use crate::session::Session;

/// Added to the request timeout for the HTTP call, so the server's timeout fires first.
pub const CLIENT_TIMEOUT_GRACE: Duration = Duration::from_secs(5);
/// Timeout for file helpers and cleanup.
const HELPER_TIMEOUT: Duration = Duration::from_secs(30);
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// One command to run in a skill's environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub command: String,
    /// `None` or zero selects the configured default.
    pub timeout_ms: Option<u64>,
    /// `None` selects the environment's working path.
    pub working_directory: Option<String>,
}

impl ExecutionRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout_ms: None,
            working_directory: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }
}

pub struct ExecutionClient {
    manager: Arc<EnvironmentManager>,
    session: Arc<Session>,
    http: reqwest::Client,
    default_timeout_ms: u64,
}

impl ExecutionClient {
    pub fn new(manager: Arc<EnvironmentManager>, session: Arc<Session>, default_timeout_ms: u64) -> Self {
        Self {
            manager,
            session,
            http: reqwest::Client::new(),
            default_timeout_ms: default_timeout_ms.max(1),
        }
    }

    pub fn manager(&self) -> &Arc<EnvironmentManager> {
        &self.manager
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn timeout_ms(&self, request: &ExecutionRequest) -> u64 {
        match request.timeout_ms {
            Some(ms) if ms > 0 => ms,
            _ => self.default_timeout_ms,
        }
    }

    fn wire_request(&self, request: &ExecutionRequest, timeout_ms: u64) -> ExecRequest {
        let cwd = request
            .working_directory
            .clone()
            .unwrap_or_else(|| self.manager.workdir().to_string());
        ExecRequest::new(request.command.clone())
            .with_timeout_ms(timeout_ms)
            .with_cwd(cwd)
    }

    async fn ensure(&self, skill: &SkillId) -> Result<EnvironmentRecord> {
        let record = self.manager.ensure(skill).await?;
        self.session.record(skill);
        Ok(record)
    }

    /// Run one command and wait for its buffered result.
    pub async fn execute(&self, skill: &SkillId, request: ExecutionRequest) -> Result<ExecutionResult> {
        if request.command.trim().is_empty() {
            return Ok(ExecutionResult::failure("Command must not be empty"));
        }
        let env = self.ensure(skill).await?;
        let timeout_ms = self.timeout_ms(&request);
        let body = self.wire_request(&request, timeout_ms);
        tracing::debug!(skill = %skill, endpoint = %env.endpoint, timeout_ms, "executing command");
        Ok(self.post_exec(&env.endpoint, &body, timeout_ms).await)
    }

    async fn post_exec(&self, endpoint: &str, body: &ExecRequest, timeout_ms: u64) -> ExecutionResult {
        let url = format!("{}/bash/exec", endpoint);
        let response = match self
            .http
            .post(&url)
            .json(body)
            .timeout(Duration::from_millis(timeout_ms) + CLIENT_TIMEOUT_GRACE)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return transport_failure(&e, timeout_ms),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return transport_failure(&e, timeout_ms),
        };
        if !status.is_success() {
            return ExecutionResult::failure(format!(
                "Execution server returned HTTP {}: {}",
                status.as_u16(),
                text.trim()
            ));
        }
        serde_json::from_str::<ExecutionResult>(&text).unwrap_or_else(|e| {
            ExecutionResult::failure(format!("Malformed response from execution server: {}", e))
        })
    }

    /// Run one command and receive its output as events.
    ///
    /// The receiver yields `start` first and exactly one terminal event
    /// (`exit` or `error`) last. When the server never sent `start` (empty
    /// command, transport failure) a synthetic one without a pid comes first.
    pub async fn execute_stream(
        &self,
        skill: &SkillId,
        request: ExecutionRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        if request.command.trim().is_empty() {
            fail_stream(&tx, &request.command, false, "Command must not be empty".to_string()).await;
            return Ok(rx);
        }
        let env = self.ensure(skill).await?;
        let timeout_ms = self.timeout_ms(&request);
        let body = self.wire_request(&request, timeout_ms);
        let http_request = self
            .http
            .post(format!("{}/bash", env.endpoint))
            .json(&body)
            .timeout(Duration::from_millis(timeout_ms) + CLIENT_TIMEOUT_GRACE);
        tokio::spawn(forward_stream(http_request, request.command, tx));
        Ok(rx)
    }

    pub async fn read_file(&self, skill: &SkillId, path: &str) -> Result<FileReadResponse> {
        let env = self.ensure(skill).await?;
        let body = FileReadRequest {
            path: path.to_string(),
        };
        Ok(self
            .post_helper(&env.endpoint, "/file/read", &body)
            .await
            .unwrap_or_else(|message| FileReadResponse {
                success: false,
                content: String::new(),
                error: Some(message),
            }))
    }

    pub async fn write_file(&self, skill: &SkillId, path: &str, content: &str) -> Result<StatusResponse> {
        let env = self.ensure(skill).await?;
        let body = FileWriteRequest {
            path: path.to_string(),
            content: content.to_string(),
        };
        Ok(self
            .post_helper(&env.endpoint, "/file/write", &body)
            .await
            .unwrap_or_else(status_failure))
    }

    /// Best-effort temp file removal inside the environment.
    pub async fn cleanup(&self, skill: &SkillId) -> Result<StatusResponse> {
        let env = self.ensure(skill).await?;
        Ok(self
            .post_helper(&env.endpoint, "/cleanup", &serde_json::json!({}))
            .await
            .unwrap_or_else(status_failure))
    }

    async fn post_helper<B, R>(&self, endpoint: &str, path: &str, body: &B) -> std::result::Result<R, String>
    where
        B: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let resp = self
            .http
            .post(format!("{}{}", endpoint, path))
            .json(body)
            .timeout(HELPER_TIMEOUT)
            .send()
            .await
            .map_err(|e| format!("Transport failure: {}", e))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("Transport failure: {}", e))?;
        serde_json::from_str::<R>(&text).map_err(|e| {
            if status.is_success() {
                format!("Malformed response from execution server: {}", e)
            } else {
                format!("Execution server returned HTTP {}: {}", status.as_u16(), text.trim())
            }
        })
    }
}

fn status_failure(message: String) -> StatusResponse {
    StatusResponse {
        success: false,
        error: Some(message),
    }
}

fn transport_failure(err: &reqwest::Error, timeout_ms: u64) -> ExecutionResult {
    if err.is_timeout() {
        ExecutionResult::failure(format!(
            "Execution request timed out after {}ms (+{}s grace)",
            timeout_ms,
            CLIENT_TIMEOUT_GRACE.as_secs()
        ))
    } else {
        ExecutionResult::failure(format!("Transport failure: {}", err))
    }
}

/// Read the NDJSON body and forward events until a terminal one.
async fn forward_stream(request: reqwest::RequestBuilder, command: String, tx: mpsc::Sender<StreamEvent>) {
    let mut started = false;
    let terminal = match request.send().await {
        Ok(resp) if resp.status().is_success() => relay_body(resp, &tx, &mut started).await,
        Ok(resp) => Some(format!(
            "Execution server returned HTTP {}",
            resp.status().as_u16()
        )),
        Err(e) => Some(format!("Transport failure: {}", e)),
    };
    if let Some(message) = terminal {
        fail_stream(&tx, &command, started, message).await;
    }
}

/// End a stream with an `error`, preceded by a pid-less `start` unless one was sent.
async fn fail_stream(tx: &mpsc::Sender<StreamEvent>, command: &str, started: bool, message: String) {
    if !started {
        let start = StreamEvent::Start {
            command: command.to_string(),
            pid: None,
        };
        if tx.send(start).await.is_err() {
            return;
        }
    }
    let _ = tx.send(StreamEvent::Error { message }).await;
}

/// Relay events. Returns the message of the synthetic error to append, if any.
async fn relay_body(
    resp: reqwest::Response,
    tx: &mpsc::Sender<StreamEvent>,
    started: &mut bool,
) -> Option<String> {
    let mut body = resp.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    loop {
        let chunk = match body.next().await {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Some(format!("Stream interrupted: {}", e)),
            None => break,
        };
        buffer.extend_from_slice(&chunk);
        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            match relay_line(&line, tx, started).await {
                LineOutcome::Continue => {}
                LineOutcome::Terminal => return None,
                LineOutcome::Closed => return None,
                LineOutcome::Malformed(message) => return Some(message),
            }
        }
    }
    // Trailing event without newline.
    if !buffer.is_empty() {
        match relay_line(&buffer, tx, started).await {
            LineOutcome::Terminal | LineOutcome::Closed => return None,
            LineOutcome::Malformed(message) => return Some(message),
            LineOutcome::Continue => {}
        }
    }
    Some("Stream ended without an exit event".to_string())
}

enum LineOutcome {
    Continue,
    Terminal,
    /// Receiver dropped.
    Closed,
    Malformed(String),
}

async fn relay_line(line: &[u8], tx: &mpsc::Sender<StreamEvent>, started: &mut bool) -> LineOutcome {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return LineOutcome::Continue;
    }
    let event: StreamEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => return LineOutcome::Malformed(format!("Malformed stream event: {}", e)),
    };
    let terminal = event.is_terminal();
    if tx.send(event).await.is_err() {
        return LineOutcome::Closed;
    }
    *started = true;
    if terminal {
        LineOutcome::Terminal
    } else {
        LineOutcome::Continue
    }
}
