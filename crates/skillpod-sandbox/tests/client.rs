//! Execution client against a wiremock execution server.

mod common;

use std::sync::Arc;

use common::*;
use serde_json::json;
use skillpod_core::protocol::StreamEvent;
use skillpod_sandbox::fakes::{FakeContainer, FakeRuntime};
use skillpod_sandbox::{ExecutionClient, ExecutionRequest, SandboxError, Session};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Client whose "pdf" environment is already running on `port`.
fn client_for(port: u16) -> (Arc<FakeRuntime>, ExecutionClient) {
    let fake = Arc::new(
        FakeRuntime::new().with_container(&env_name("pdf"), FakeContainer::running(port)),
    );
    let manager = Arc::new(manager(&fake));
    let client = ExecutionClient::new(manager, Arc::new(Session::new()), 30_000);
    (fake, client)
}

#[tokio::test]
async fn test_execute_sends_defaults_and_returns_server_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bash/exec"))
        .and(body_partial_json(json!({
            "command": "echo hi; echo err 1>&2; exit 3",
            "timeout": 30000,
            "cwd": "/workspace"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "stdout": "hi\n",
            "stderr": "err\n",
            "exitCode": 3,
            "timedOut": false
        })))
        .expect(1)
        .mount(&server)
        .await;
    let (_fake, client) = client_for(server.address().port());

    let result = client
        .execute(&skill("pdf"), ExecutionRequest::new("echo hi; echo err 1>&2; exit 3"))
        .await
        .unwrap();

    assert!(!result.success);
    assert!(!result.timed_out);
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stdout, "hi\n");
    assert_eq!(result.stderr, "err\n");
    assert_eq!(client.session().skills(), vec![skill("pdf")]);
}

#[tokio::test]
async fn test_execute_passes_timeout_and_cwd() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bash/exec"))
        .and(body_partial_json(json!({"timeout": 100, "cwd": "/tmp"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "stdout": "",
            "stderr": "",
            "exitCode": 143,
            "timedOut": true,
            "errorMessage": "Command timed out after 100ms"
        })))
        .expect(1)
        .mount(&server)
        .await;
    let (_fake, client) = client_for(server.address().port());

    let request = ExecutionRequest::new("sleep 5")
        .with_timeout_ms(100)
        .with_working_directory("/tmp");
    let result = client.execute(&skill("pdf"), request).await.unwrap();

    assert!(result.timed_out);
    assert!(!result.success);
}

#[tokio::test]
async fn test_http_error_becomes_failed_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bash/exec"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    let (_fake, client) = client_for(server.address().port());

    let result = client
        .execute(&skill("pdf"), ExecutionRequest::new("true"))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.exit_code, 1);
    assert!(result.error_message.unwrap().contains("500"));
}

#[tokio::test]
async fn test_malformed_response_becomes_failed_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bash/exec"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;
    let (_fake, client) = client_for(server.address().port());

    let result = client
        .execute(&skill("pdf"), ExecutionRequest::new("true"))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.exit_code, 1);
    assert!(result.error_message.unwrap().contains("Malformed"));
}

#[tokio::test]
async fn test_transport_failure_is_data_not_error() {
    let (_fake, client) = client_for(closed_port());

    let result = client
        .execute(&skill("pdf"), ExecutionRequest::new("true"))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.exit_code, 1);
    assert!(result.error_message.is_some());
}

#[tokio::test]
async fn test_ensure_errors_propagate() {
    let fake = Arc::new(FakeRuntime::unavailable());
    let client = ExecutionClient::new(Arc::new(manager(&fake)), Arc::new(Session::new()), 1_000);

    let err = client
        .execute(&skill("pdf"), ExecutionRequest::new("true"))
        .await
        .unwrap_err();

    assert!(matches!(err, SandboxError::RuntimeUnavailable(_)));
    assert!(client.session().is_empty());
}

#[tokio::test]
async fn test_empty_command_is_rejected_before_ensure() {
    let (fake, client) = client_for(closed_port());

    let result = client
        .execute(&skill("pdf"), ExecutionRequest::new("   "))
        .await
        .unwrap();

    assert!(!result.success);
    assert!(fake.calls().is_empty());
}

async fn collect(mut rx: tokio::sync::mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_stream_relays_events_in_order() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"type\":\"start\",\"command\":\"echo hi\",\"pid\":42}\n",
        "{\"type\":\"stdout\",\"data\":\"hi\\n\"}\n",
        "{\"type\":\"exit\",\"exitCode\":0,\"timedOut\":false}\n",
    );
    Mock::given(method("POST"))
        .and(path("/bash"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/x-ndjson")
                .set_body_string(body),
        )
        .mount(&server)
        .await;
    let (_fake, client) = client_for(server.address().port());

    let rx = client
        .execute_stream(&skill("pdf"), ExecutionRequest::new("echo hi"))
        .await
        .unwrap();
    let events = collect(rx).await;

    assert_eq!(events.len(), 3);
    assert!(matches!(events[0], StreamEvent::Start { pid: Some(42), .. }));
    assert_eq!(events[1], StreamEvent::Stdout { data: "hi\n".into() });
    assert_eq!(
        events[2],
        StreamEvent::Exit {
            exit_code: Some(0),
            signal: None,
            timed_out: false
        }
    );
}

#[tokio::test]
async fn test_stream_without_terminal_event_gets_synthetic_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bash"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("{\"type\":\"start\",\"command\":\"x\"}\n{\"type\":\"stdout\",\"data\":\"a\"}\n"),
        )
        .mount(&server)
        .await;
    let (_fake, client) = client_for(server.address().port());

    let events = collect(
        client
            .execute_stream(&skill("pdf"), ExecutionRequest::new("x"))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(events.len(), 3);
    assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_stream_transport_failure_is_start_then_error() {
    let (_fake, client) = client_for(closed_port());

    let events = collect(
        client
            .execute_stream(&skill("pdf"), ExecutionRequest::new("x"))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], StreamEvent::Start { command, pid: None } if command == "x"));
    assert!(matches!(events[1], StreamEvent::Error { .. }));
}

#[tokio::test]
async fn test_stream_empty_command_is_start_then_error_without_ensure() {
    let (fake, client) = client_for(closed_port());

    let events = collect(
        client
            .execute_stream(&skill("pdf"), ExecutionRequest::new(" "))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], StreamEvent::Start { pid: None, .. }));
    assert!(matches!(&events[1], StreamEvent::Error { message } if message.contains("empty")));
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn test_stream_malformed_first_line_still_starts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bash"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json\n"))
        .mount(&server)
        .await;
    let (_fake, client) = client_for(server.address().port());

    let events = collect(
        client
            .execute_stream(&skill("pdf"), ExecutionRequest::new("x"))
            .await
            .unwrap(),
    )
    .await;

    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], StreamEvent::Start { pid: None, .. }));
    assert!(matches!(&events[1], StreamEvent::Error { message } if message.contains("Malformed")));
}

#[tokio::test]
async fn test_file_helpers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/file/read"))
        .and(body_partial_json(json!({"path": "notes.txt"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "content": "hello"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/file/write"))
        .and(body_partial_json(json!({"path": "out.txt", "content": "data"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;
    let (_fake, client) = client_for(server.address().port());

    let read = client.read_file(&skill("pdf"), "notes.txt").await.unwrap();
    assert!(read.success);
    assert_eq!(read.content, "hello");

    let write = client.write_file(&skill("pdf"), "out.txt", "data").await.unwrap();
    assert!(write.success);

    // No /cleanup mock: wiremock answers 404 with an empty body.
    let cleanup = client.cleanup(&skill("pdf")).await.unwrap();
    assert!(!cleanup.success);
    assert!(cleanup.error.unwrap().contains("404"));
}
