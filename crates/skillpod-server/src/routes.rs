//! HTTP surface of the execution server.
//!
//! - `GET  /health`     → `{status, timestamp}`
//! - `POST /bash/exec`  → buffered result (200 even for non-zero exits)
//! - `POST /bash`       → NDJSON event stream
//! - `POST /file/read`, `POST /file/write` → `cat` redirections in the workdir
//! - `POST /cleanup`    → empty the temp directory

use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use skillpod_core::config::ServerConfig;
use skillpod_core::protocol::{
    ExecRequest, ExecutionResult, FileReadRequest, FileReadResponse, FileWriteRequest,
    HealthResponse, StatusResponse, StreamEvent,
};

use crate::error::ApiError;
use crate::events::EventSink;
use crate::process::{self, shell_quote, CommandSpec};

const STREAM_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn resolve_cwd(&self, cwd: Option<&str>) -> PathBuf {
        match cwd.map(str::trim) {
            Some(dir) if !dir.is_empty() => {
                let dir = Path::new(dir);
                if dir.is_absolute() {
                    dir.to_path_buf()
                } else {
                    self.config.workdir.join(dir)
                }
            }
            _ => self.config.workdir.clone(),
        }
    }

    fn command_spec(&self, command: &str, timeout_ms: Option<u64>, cwd: Option<&str>) -> CommandSpec {
        let timeout_ms = match timeout_ms {
            Some(ms) if ms > 0 => ms,
            _ => self.config.default_timeout_ms,
        };
        CommandSpec {
            command: command.to_string(),
            cwd: self.resolve_cwd(cwd),
            timeout: Duration::from_millis(timeout_ms),
            path_env: self.config.path.clone(),
            home: self.config.workdir.clone(),
            stdin: None,
            max_output: self.config.max_output_bytes,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/bash/exec", post(exec))
        .route("/bash", post(exec_stream))
        .route("/file/read", post(read_file))
        .route("/file/write", post(write_file))
        .route("/cleanup", post(cleanup))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

fn require_command(req: &ExecRequest) -> Result<&str, ApiError> {
    match req.command.as_deref() {
        Some(command) if !command.trim().is_empty() => Ok(command),
        _ => Err(ApiError::BadRequest("command is required".to_string())),
    }
}

async fn exec(
    State(state): State<AppState>,
    Json(req): Json<ExecRequest>,
) -> Result<Json<ExecutionResult>, ApiError> {
    let command = require_command(&req)?;
    let spec = state.command_spec(command, req.timeout, req.cwd.as_deref());
    tracing::info!(cwd = %spec.cwd.display(), timeout_ms = spec.timeout.as_millis() as u64, "exec");
    let result = process::run_buffered(spec).await;
    tracing::debug!(exit_code = result.exit_code, timed_out = result.timed_out, "exec finished");
    Ok(Json(result))
}

async fn exec_stream(
    State(state): State<AppState>,
    Json(req): Json<ExecRequest>,
) -> Result<Response, ApiError> {
    let command = require_command(&req)?;
    let spec = state.command_spec(command, req.timeout, req.cwd.as_deref());
    let (tx, rx) = mpsc::channel::<StreamEvent>(STREAM_CHANNEL_CAPACITY);
    tokio::spawn(stream_command(spec, tx));

    let lines = stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|event| (Ok::<_, Infallible>(event.to_ndjson()), rx))
    });
    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response())
}

async fn stream_command(spec: CommandSpec, tx: mpsc::Sender<StreamEvent>) {
    let command = spec.command.clone();
    match process::spawn(spec) {
        Err(e) => {
            tracing::warn!(error = %e, "spawn failed");
            EventSink::open(tx, &command, None)
                .await
                .error(e.to_string())
                .await;
        }
        Ok(running) => {
            let sink = EventSink::open(tx, &command, running.pid()).await;
            let outcome = process::supervise(running, Some(&sink)).await;
            match outcome.wait_error.clone() {
                Some(message) => sink.error(message).await,
                None => {
                    sink.exit(
                        Some(outcome.effective_exit_code()),
                        outcome.signal_name(),
                        outcome.timed_out,
                    )
                    .await
                }
            }
        }
    }
}

async fn read_file(
    State(state): State<AppState>,
    Json(req): Json<FileReadRequest>,
) -> Json<FileReadResponse> {
    let command = format!("cat -- {}", shell_quote(&req.path));
    let result = process::run_buffered(state.command_spec(&command, None, None)).await;
    Json(if result.success {
        FileReadResponse {
            success: true,
            content: result.stdout,
            error: None,
        }
    } else {
        FileReadResponse {
            success: false,
            content: String::new(),
            error: Some(failure_message(result)),
        }
    })
}

async fn write_file(
    State(state): State<AppState>,
    Json(req): Json<FileWriteRequest>,
) -> Json<StatusResponse> {
    let command = format!("cat > {}", shell_quote(&req.path));
    let mut spec = state.command_spec(&command, None, None);
    spec.stdin = Some(req.content);
    let result = process::run_buffered(spec).await;
    Json(if result.success {
        StatusResponse {
            success: true,
            error: None,
        }
    } else {
        StatusResponse {
            success: false,
            error: Some(failure_message(result)),
        }
    })
}

fn failure_message(result: ExecutionResult) -> String {
    let stderr = result.stderr.trim();
    if !stderr.is_empty() {
        stderr.to_string()
    } else {
        result
            .error_message
            .unwrap_or_else(|| format!("exit code {}", result.exit_code))
    }
}

async fn cleanup(State(state): State<AppState>) -> Json<StatusResponse> {
    let tmp = state.config.tmp_dir.display().to_string();
    let command = format!(
        "find {} -mindepth 1 -maxdepth 1 -exec rm -rf {{}} +",
        shell_quote(&tmp)
    );
    let spec = state.command_spec(&command, None, None);
    match process::spawn(spec) {
        Ok(running) => {
            let outcome = process::supervise(running, None).await;
            if outcome.effective_exit_code() != 0 {
                tracing::debug!(stderr = %outcome.stderr.trim(), "cleanup left some files");
            }
            Json(StatusResponse {
                success: true,
                error: None,
            })
        }
        Err(e) => Json(StatusResponse {
            success: false,
            error: Some(e.to_string()),
        }),
    }
}
