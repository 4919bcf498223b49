//! JSON-RPC 2.0 over stdio.
//!
//! **Entry**: `skillpod serve --stdio`
//!
//! Request: `{"jsonrpc":"2.0","id":1,"method":"exec","params":{...}}`, one per line.
//! Response: `{"jsonrpc":"2.0","id":1,"result":{...}}` or `{..., "error":{code, message}}`.
//!
//! Methods: `exec`, `read_file`, `write_file`, `stop`, `remove`, `logs`, `status`.
//! Requests run concurrently; responses may arrive out of order. Lines over 10 MB or
//! not valid UTF-8 are answered with an `id: null` error and skipped. On EOF, a stdin
//! read failure or Ctrl+C the loop waits for in-flight requests, then drains the
//! session unless `keep` is set.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use skillpod_sandbox::{ExecutionRequest, SandboxError, SkillId};

use crate::context::AppContext;

/// Maximum request line size (10 MB).
const MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const INTERNAL_ERROR: i64 = -32603;

#[derive(Debug)]
pub struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.into(),
        }
    }
}

impl From<SandboxError> for RpcError {
    fn from(err: SandboxError) -> Self {
        let code = match err {
            SandboxError::InvalidSkillId(_) => INVALID_PARAMS,
            _ => INTERNAL_ERROR,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

type RpcResult = std::result::Result<Value, RpcError>;

pub async fn serve_stdio(ctx: Arc<AppContext>, keep: bool) -> Result<()> {
    ctx.start_prewarm();
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut inflight = JoinSet::new();
    tokio::select! {
        _ = read_requests(&ctx, &mut reader, &tx, &mut inflight) => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted, shutting down"),
    }

    while inflight.join_next().await.is_some() {}

    if keep {
        tracing::info!(environments = ctx.session.len(), "keeping environments");
    } else {
        let report = ctx.drain_session().await;
        if !report.is_clean() {
            tracing::warn!(failed = report.failed.len(), "some environments were not cleaned up");
        }
    }

    drop(tx);
    writer
        .await
        .context("Writer task panicked")?
        .context("Failed to write to stdout")?;
    Ok(())
}

/// Read requests until EOF or a read failure, spawning one task per request.
async fn read_requests<R>(
    ctx: &Arc<AppContext>,
    reader: &mut R,
    tx: &mpsc::Sender<String>,
    inflight: &mut JoinSet<()>,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        let line = match read_line_limited(reader, MAX_REQUEST_SIZE).await {
            Ok(Some(RequestLine::Text(line))) => line,
            Ok(Some(RequestLine::Rejected(message))) => {
                let err = RpcError {
                    code: INVALID_REQUEST,
                    message: message.to_string(),
                };
                send(tx, response(Value::Null, Err(err))).await;
                continue;
            }
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed, shutting down");
                return;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let request: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                let err = RpcError {
                    code: PARSE_ERROR,
                    message: format!("Parse error: {}", e),
                };
                send(tx, response(Value::Null, Err(err))).await;
                continue;
            }
        };

        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let params = request
            .get("params")
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        let ctx = ctx.clone();
        let tx = tx.clone();
        inflight.spawn(async move {
            let result = dispatch_request(&ctx, &method, &params).await;
            send(&tx, response(id, result)).await;
        });
    }
}

// ─── Size-limited line reader ────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum RequestLine {
    Text(String),
    /// Oversized or not UTF-8. The rest of the line has been skipped.
    Rejected(&'static str),
}

/// Read one line, holding at most `limit` bytes of it. `Ok(None)` on EOF.
async fn read_line_limited<R>(reader: &mut R, limit: usize) -> io::Result<Option<RequestLine>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut oversized = false;
    loop {
        let available = match reader.fill_buf().await {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            if buf.is_empty() && !oversized {
                return Ok(None);
            }
            return Ok(Some(finish_line(buf, oversized)));
        }
        let newline = available.iter().position(|&b| b == b'\n');
        let len = newline.unwrap_or(available.len());
        if !oversized {
            if buf.len() + len > limit {
                oversized = true;
                buf = Vec::new();
            } else {
                buf.extend_from_slice(&available[..len]);
            }
        }
        match newline {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(Some(finish_line(buf, oversized)));
            }
            None => reader.consume(len),
        }
    }
}

fn finish_line(mut buf: Vec<u8>, oversized: bool) -> RequestLine {
    if oversized {
        return RequestLine::Rejected("Request exceeds 10MB size limit");
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    match String::from_utf8(buf) {
        Ok(line) => RequestLine::Text(line),
        Err(_) => RequestLine::Rejected("Invalid UTF-8"),
    }
}

async fn send(tx: &mpsc::Sender<String>, value: Value) {
    let _ = tx.send(value.to_string()).await;
}

fn response(id: Value, result: RpcResult) -> Value {
    match result {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err(e) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": e.code, "message": e.message}
        }),
    }
}

/// Dispatch one request to its handler.
pub async fn dispatch_request(ctx: &AppContext, method: &str, params: &Value) -> RpcResult {
    match method {
        "exec" => handle_exec(ctx, params).await,
        "read_file" => handle_read_file(ctx, params).await,
        "write_file" => handle_write_file(ctx, params).await,
        "stop" => handle_stop(ctx, params).await,
        "remove" => handle_remove(ctx, params).await,
        "logs" => handle_logs(ctx, params).await,
        "status" => handle_status(ctx, params).await,
        _ => Err(RpcError {
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {}", method),
        }),
    }
}

fn str_param<'a>(params: &'a Value, key: &str) -> std::result::Result<&'a str, RpcError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_params(format!("{} required", key)))
}

fn skill_param(params: &Value) -> std::result::Result<SkillId, RpcError> {
    Ok(SkillId::new(str_param(params, "skill")?)?)
}

fn to_value<T: serde::Serialize>(value: T) -> RpcResult {
    serde_json::to_value(value).map_err(|e| RpcError {
        code: INTERNAL_ERROR,
        message: e.to_string(),
    })
}

async fn handle_exec(ctx: &AppContext, params: &Value) -> RpcResult {
    let skill = skill_param(params)?;
    let mut request = ExecutionRequest::new(str_param(params, "command")?);
    request.timeout_ms = params.get("timeout").and_then(Value::as_u64);
    request.working_directory = params.get("cwd").and_then(Value::as_str).map(String::from);
    to_value(ctx.client.execute(&skill, request).await?)
}

async fn handle_read_file(ctx: &AppContext, params: &Value) -> RpcResult {
    let skill = skill_param(params)?;
    let path = str_param(params, "path")?;
    to_value(ctx.client.read_file(&skill, path).await?)
}

async fn handle_write_file(ctx: &AppContext, params: &Value) -> RpcResult {
    let skill = skill_param(params)?;
    let path = str_param(params, "path")?;
    let content = str_param(params, "content")?;
    to_value(ctx.client.write_file(&skill, path, content).await?)
}

async fn handle_stop(ctx: &AppContext, params: &Value) -> RpcResult {
    let skill = skill_param(params)?;
    let stopped = ctx.manager.stop(&skill).await?;
    Ok(json!({"stopped": stopped}))
}

async fn handle_remove(ctx: &AppContext, params: &Value) -> RpcResult {
    let skill = skill_param(params)?;
    let removed = ctx.manager.remove(&skill).await?;
    Ok(json!({"removed": removed}))
}

async fn handle_logs(ctx: &AppContext, params: &Value) -> RpcResult {
    let skill = skill_param(params)?;
    let tail = params.get("tail").and_then(Value::as_u64).unwrap_or(100) as usize;
    let logs = ctx.manager.logs(&skill, tail).await?;
    Ok(json!({"logs": logs}))
}

async fn handle_status(ctx: &AppContext, params: &Value) -> RpcResult {
    match params.get("skill").and_then(Value::as_str) {
        Some(skill) => {
            let skill = SkillId::new(skill)?;
            to_value(ctx.manager.status(&skill).await?)
        }
        None => to_value(ctx.manager.list().await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillpod_core::config::SandboxConfig;

    fn ctx() -> AppContext {
        AppContext::new(SandboxConfig {
            runtime: "skillpod-test-no-such-runtime".to_string(),
            prewarm: false,
            ..SandboxConfig::default()
        })
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let err = dispatch_request(&ctx(), "nope", &json!({})).await.unwrap_err();
        assert_eq!(err.code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_and_blank_skill_are_invalid_params() {
        let err = dispatch_request(&ctx(), "exec", &json!({"command": "true"}))
            .await
            .unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);

        let err = dispatch_request(&ctx(), "stop", &json!({"skill": " "}))
            .await
            .unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_unavailable_runtime_is_internal_error() {
        let err = dispatch_request(&ctx(), "exec", &json!({"skill": "pdf", "command": "true"}))
            .await
            .unwrap_err();
        assert_eq!(err.code, INTERNAL_ERROR);
        assert!(err.message.contains("unavailable"));
    }

    #[tokio::test]
    async fn test_oversized_line_is_rejected_and_skipped() {
        let input = format!("{}\n{{\"id\":1}}\n", "x".repeat(64));
        let mut reader = input.as_bytes();

        let first = read_line_limited(&mut reader, 16).await.unwrap();
        assert_eq!(first, Some(RequestLine::Rejected("Request exceeds 10MB size limit")));
        let second = read_line_limited(&mut reader, 16).await.unwrap();
        assert_eq!(second, Some(RequestLine::Text("{\"id\":1}".to_string())));
        assert_eq!(read_line_limited(&mut reader, 16).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_non_utf8_line_is_rejected_and_skipped() {
        let mut reader: &[u8] = b"\xff\xfe\r\nok\r\n";

        let first = read_line_limited(&mut reader, MAX_REQUEST_SIZE).await.unwrap();
        assert_eq!(first, Some(RequestLine::Rejected("Invalid UTF-8")));
        let second = read_line_limited(&mut reader, MAX_REQUEST_SIZE).await.unwrap();
        assert_eq!(second, Some(RequestLine::Text("ok".to_string())));
    }

    #[tokio::test]
    async fn test_bad_line_does_not_stop_later_requests() {
        let ctx = Arc::new(ctx());
        let (tx, mut rx) = mpsc::channel(16);
        let mut inflight = JoinSet::new();
        let mut reader: &[u8] =
            b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"nope\"}\n\xff\xfe\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"nope\"}\n";

        read_requests(&ctx, &mut reader, &tx, &mut inflight).await;
        while inflight.join_next().await.is_some() {}
        drop(tx);

        let mut responses = Vec::new();
        while let Some(line) = rx.recv().await {
            responses.push(serde_json::from_str::<Value>(&line).unwrap());
        }
        assert_eq!(responses.len(), 3);
        let code_for = |id: Value| {
            responses
                .iter()
                .find(|r| r["id"] == id)
                .map(|r| r["error"]["code"].clone())
        };
        assert_eq!(code_for(json!(1)), Some(json!(METHOD_NOT_FOUND)));
        assert_eq!(code_for(json!(2)), Some(json!(METHOD_NOT_FOUND)));
        assert_eq!(code_for(Value::Null), Some(json!(INVALID_REQUEST)));
    }

    #[test]
    fn test_response_envelope() {
        let ok = response(json!(1), Ok(json!({"x": 1})));
        assert_eq!(ok, json!({"jsonrpc": "2.0", "id": 1, "result": {"x": 1}}));
        let err = response(Value::Null, Err(RpcError::invalid_params("bad")));
        assert_eq!(err["error"]["code"], INVALID_PARAMS);
    }
}
