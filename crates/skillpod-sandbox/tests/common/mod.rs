#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use skillpod_sandbox::fakes::FakeRuntime;
use skillpod_sandbox::image::{ImageResolver, ImageSpec};
use skillpod_sandbox::naming::Naming;
use skillpod_sandbox::runtime::{BuildContext, ContainerRuntime};
use skillpod_sandbox::{EnvironmentManager, ManagerSettings, SkillId};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const IMAGE: &str = "acme/skill-runtime:1";
pub const SCOPE: &str = "app-1234abcd";
pub const CONTEXT: &str = "/work/app/docker";

pub fn skill(id: &str) -> SkillId {
    SkillId::new(id).unwrap()
}

pub fn env_name(id: &str) -> String {
    format!("skillpod-{}-{}", SCOPE, id)
}

pub fn settings(attempts: u32) -> ManagerSettings {
    ManagerSettings {
        host: "127.0.0.1".to_string(),
        container_port: 3000,
        health_attempts: attempts,
        health_interval: Duration::from_millis(10),
        mount_path: None,
        workdir: "/workspace".to_string(),
    }
}

pub fn resolver(fake: &Arc<FakeRuntime>) -> Arc<ImageResolver> {
    let runtime: Arc<dyn ContainerRuntime> = fake.clone();
    Arc::new(ImageResolver::new(
        runtime,
        ImageSpec {
            reference: IMAGE.to_string(),
            operator_supplied: true,
        },
        Some(BuildContext::dir(CONTEXT)),
    ))
}

pub fn manager_with(fake: &Arc<FakeRuntime>, naming: Naming, attempts: u32) -> EnvironmentManager {
    let runtime: Arc<dyn ContainerRuntime> = fake.clone();
    EnvironmentManager::new(runtime, resolver(fake), naming, settings(attempts))
}

pub fn manager(fake: &Arc<FakeRuntime>) -> EnvironmentManager {
    manager_with(fake, Naming::new(SCOPE, None), 3)
}

/// Execution server double answering `/health`.
pub async fn healthy_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "ok", "timestamp": "2026-01-01T00:00:00Z"})),
        )
        .mount(&server)
        .await;
    server
}

/// A local port with nothing listening on it.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
