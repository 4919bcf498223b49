//! Lifecycle manager against the fake runtime and a wiremock health endpoint.

mod common;

use std::sync::Arc;

use common::*;
use skillpod_sandbox::fakes::{FakeContainer, FakeRuntime, RuntimeCall};
use skillpod_sandbox::naming::Naming;
use skillpod_sandbox::port::port_for;
use skillpod_sandbox::runtime::ContainerState;
use skillpod_sandbox::{EnvironmentStatus, SandboxError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_ensure_creates_environment_and_waits_for_health() {
    let server = healthy_server().await;
    let port = server.address().port();
    let fake = Arc::new(FakeRuntime::new().publishing_on(port));
    let manager = manager(&fake);

    let record = manager.ensure(&skill("pdf")).await.unwrap();

    assert_eq!(record.name, env_name("pdf"));
    assert_eq!(record.port, port);
    assert_eq!(record.status, EnvironmentStatus::Running);
    assert_eq!(record.endpoint, format!("http://127.0.0.1:{}", port));

    let calls = fake.calls();
    assert!(calls.contains(&RuntimeCall::Version));
    assert!(calls.contains(&RuntimeCall::Pull(IMAGE.to_string())));
    let run = calls
        .iter()
        .find_map(|c| match c {
            RuntimeCall::Run(spec) => Some(spec.clone()),
            _ => None,
        })
        .expect("container created");
    assert_eq!(run.host_port, port_for("pdf"));
    assert_eq!(run.container_port, 3000);
    assert_eq!(run.bind_host, "127.0.0.1");
    assert_eq!(run.image, IMAGE);
    assert_eq!(run.labels.get("skillpod.scope").map(String::as_str), Some(SCOPE));
}

#[tokio::test]
async fn test_ensure_twice_returns_same_endpoint_without_image_work() {
    let server = healthy_server().await;
    let fake = Arc::new(FakeRuntime::new().publishing_on(server.address().port()));
    let manager = manager(&fake);

    let first = manager.ensure(&skill("pdf")).await.unwrap();
    fake.clear_calls();
    let second = manager.ensure(&skill("pdf")).await.unwrap();

    assert_eq!(first.endpoint, second.endpoint);
    let calls = fake.calls();
    assert!(!calls.iter().any(RuntimeCall::is_image_call));
    assert!(!calls.iter().any(RuntimeCall::is_mutation));
}

#[tokio::test]
async fn test_running_environment_uses_fast_path_and_actual_port() {
    // No health mock: the fast path must not probe.
    let server = MockServer::start().await;
    let actual = server.address().port();
    assert_ne!(actual, port_for("pdf"));
    let fake = Arc::new(
        FakeRuntime::new().with_container(&env_name("pdf"), FakeContainer::running(actual)),
    );
    let manager = manager(&fake);

    let record = manager.ensure(&skill("pdf")).await.unwrap();

    assert_eq!(record.port, actual);
    assert_eq!(
        fake.calls(),
        vec![
            RuntimeCall::List {
                filter: env_name("pdf"),
                all: false
            },
            RuntimeCall::HostPort(env_name("pdf")),
        ]
    );
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_stopped_environment_is_started_not_recreated() {
    let server = healthy_server().await;
    let port = server.address().port();
    let fake = Arc::new(
        FakeRuntime::new()
            .with_image(IMAGE)
            .with_container(&env_name("pdf"), FakeContainer::stopped(port)),
    );
    let manager = manager(&fake);

    let record = manager.ensure(&skill("pdf")).await.unwrap();

    assert_eq!(record.port, port);
    let calls = fake.calls();
    assert!(calls.contains(&RuntimeCall::Start(env_name("pdf"))));
    assert!(!calls.iter().any(|c| matches!(c, RuntimeCall::Run(_))));
    assert!(!calls.iter().any(|c| matches!(c, RuntimeCall::Pull(_))));
}

#[tokio::test]
async fn test_health_polling_gives_up_after_configured_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;
    let fake = Arc::new(FakeRuntime::new().with_image(IMAGE).publishing_on(server.address().port()));
    let manager = manager_with(&fake, Naming::new(SCOPE, None), 4);

    let err = manager.ensure(&skill("pdf")).await.unwrap_err();

    assert!(matches!(
        err,
        SandboxError::HealthCheckTimeout { attempts: 4, .. }
    ));
    server.verify().await;
}

#[tokio::test]
async fn test_unavailable_runtime_fails_ensure() {
    let fake = Arc::new(FakeRuntime::unavailable());
    let manager = manager(&fake);

    let err = manager.ensure(&skill("pdf")).await.unwrap_err();

    assert!(matches!(err, SandboxError::RuntimeUnavailable(_)));
}

#[tokio::test]
async fn test_creation_conflict_adopts_winner_once() {
    let server = healthy_server().await;
    let port = server.address().port();
    let fake = Arc::new(
        FakeRuntime::new()
            .with_image(IMAGE)
            .losing_race_to(FakeContainer::running(port)),
    );
    let manager = manager(&fake);

    let record = manager.ensure(&skill("pdf")).await.unwrap();

    assert_eq!(record.port, port);
    let runs = fake
        .calls()
        .iter()
        .filter(|c| matches!(c, RuntimeCall::Run(_)))
        .count();
    assert_eq!(runs, 1);
}

#[tokio::test]
async fn test_persistent_conflict_is_reported() {
    let fake = Arc::new(FakeRuntime::new().with_image(IMAGE).always_conflicting());
    let manager = manager(&fake);

    let err = manager.ensure(&skill("pdf")).await.unwrap_err();

    assert!(matches!(err, SandboxError::CreationConflict { ref name } if *name == env_name("pdf")));
}

#[tokio::test]
async fn test_name_override_shares_one_environment() {
    let server = healthy_server().await;
    let fake = Arc::new(FakeRuntime::new().publishing_on(server.address().port()));
    let manager = manager_with(&fake, Naming::new(SCOPE, Some("shared".into())), 3);

    let a = manager.ensure(&skill("pdf")).await.unwrap();
    let b = manager.ensure(&skill("xlsx")).await.unwrap();

    assert_eq!(a.name, env_name("shared"));
    assert_eq!(a.name, b.name);
    let runs = fake
        .calls()
        .iter()
        .filter(|c| matches!(c, RuntimeCall::Run(_)))
        .count();
    assert_eq!(runs, 1);
}

#[tokio::test]
async fn test_stop_is_noop_when_not_running() {
    let fake = Arc::new(
        FakeRuntime::new().with_container(&env_name("pdf"), FakeContainer::stopped(3834)),
    );
    let manager = manager(&fake);

    assert!(!manager.stop(&skill("pdf")).await.unwrap());
    assert!(!manager.stop(&skill("absent")).await.unwrap());
    assert!(!fake.calls().iter().any(|c| matches!(c, RuntimeCall::Stop(_))));
}

#[tokio::test]
async fn test_remove_stops_then_removes() {
    let fake = Arc::new(
        FakeRuntime::new().with_container(&env_name("pdf"), FakeContainer::running(3834)),
    );
    let manager = manager(&fake);

    assert!(manager.remove(&skill("pdf")).await.unwrap());
    assert!(fake.container(&env_name("pdf")).is_none());

    let mutations: Vec<RuntimeCall> = fake
        .calls()
        .into_iter()
        .filter(RuntimeCall::is_mutation)
        .collect();
    assert_eq!(
        mutations,
        vec![
            RuntimeCall::Stop(env_name("pdf")),
            RuntimeCall::Remove(env_name("pdf")),
        ]
    );

    assert!(!manager.remove(&skill("pdf")).await.unwrap());
}

#[tokio::test]
async fn test_remove_failure_keeps_stop() {
    let fake = Arc::new(
        FakeRuntime::new()
            .failing_remove()
            .with_container(&env_name("pdf"), FakeContainer::running(3834)),
    );
    let manager = manager(&fake);

    let err = manager.remove(&skill("pdf")).await.unwrap_err();

    assert!(matches!(err, SandboxError::RemovalFailed { .. }));
    assert_eq!(
        fake.container(&env_name("pdf")).map(|c| c.state),
        Some(ContainerState::Stopped)
    );
}

#[tokio::test]
async fn test_status_and_list_are_read_only() {
    let fake = Arc::new(
        FakeRuntime::new()
            .with_container(&env_name("pdf"), FakeContainer::running(4100))
            .with_container(&env_name("xlsx"), FakeContainer::stopped(4101))
            .with_container("skillpod-other-00000000-pdf", FakeContainer::running(4102)),
    );
    let manager = manager(&fake);

    let pdf = manager.status(&skill("pdf")).await.unwrap().unwrap();
    assert_eq!(pdf.status, EnvironmentStatus::Running);
    assert_eq!(pdf.port, 4100);

    let xlsx = manager.status(&skill("xlsx")).await.unwrap().unwrap();
    assert_eq!(xlsx.status, EnvironmentStatus::Stopped);
    assert_eq!(xlsx.port, port_for("xlsx"));

    assert!(manager.status(&skill("absent")).await.unwrap().is_none());

    let names: Vec<String> = manager
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec![env_name("pdf"), env_name("xlsx")]);

    assert!(!fake.calls().iter().any(RuntimeCall::is_mutation));
    assert!(!fake.calls().iter().any(RuntimeCall::is_image_call));
}

#[tokio::test]
async fn test_logs_passthrough() {
    let fake = Arc::new(
        FakeRuntime::new().with_container(&env_name("pdf"), FakeContainer::running(4100)),
    );
    let manager = manager(&fake);

    let logs = manager.logs(&skill("pdf"), 50).await.unwrap();

    assert!(logs.contains("50"));
    assert!(fake.calls().contains(&RuntimeCall::Logs {
        name: env_name("pdf"),
        tail: 50
    }));
    assert!(manager.logs(&skill("absent"), 10).await.is_err());
}
