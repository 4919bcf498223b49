//! Environment lifecycle: ensure, stop, remove, logs, status, list.
//!
//! One environment per (repo scope, effective name). Uniqueness is enforced by
//! querying the runtime before acting; the runtime's own name uniqueness is the
//! backstop when two processes race.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use skillpod_core::config::SandboxConfig;

use crate::error::{Result, RuntimeError, SandboxError};
use crate::image::ImageResolver;
use crate::naming::{Naming, SkillId, SCOPE_LABEL};
use crate::port::port_for;
use crate::runtime::{find_exact, ContainerRuntime, ContainerState, ContainerSummary, Mount, RunSpec};

/// Upper bound for a single health probe.
const HEALTH_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Address to publish environment ports on: the host the client connects to.
fn publish_host(host: &str) -> String {
    if host.eq_ignore_ascii_case("localhost") {
        "127.0.0.1".to_string()
    } else {
        host.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    Starting,
    Running,
    Stopped,
    Error,
}

impl fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentRecord {
    pub name: String,
    pub port: u16,
    pub status: EnvironmentStatus,
    pub endpoint: String,
}

/// Settings the manager needs from [`SandboxConfig`].
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub host: String,
    pub container_port: u16,
    pub health_attempts: u32,
    pub health_interval: Duration,
    pub mount_path: Option<PathBuf>,
    pub workdir: String,
}

impl ManagerSettings {
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            host: config.host.clone(),
            container_port: config.container_port,
            health_attempts: config.health_attempts.max(1),
            health_interval: Duration::from_millis(config.health_interval_ms),
            mount_path: config.mount_path.clone(),
            workdir: config.workdir.clone(),
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self::from_config(&SandboxConfig::default())
    }
}

pub struct EnvironmentManager {
    runtime: Arc<dyn ContainerRuntime>,
    resolver: Arc<ImageResolver>,
    naming: Naming,
    settings: ManagerSettings,
    http: reqwest::Client,
}

impl EnvironmentManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        resolver: Arc<ImageResolver>,
        naming: Naming,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            runtime,
            resolver,
            naming,
            settings,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(
        runtime: Arc<dyn ContainerRuntime>,
        resolver: Arc<ImageResolver>,
        config: &SandboxConfig,
    ) -> Self {
        let naming = Naming::for_workspace(&config.workspace, config.container_name.clone());
        Self::new(runtime, resolver, naming, ManagerSettings::from_config(config))
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    pub fn resolver(&self) -> &Arc<ImageResolver> {
        &self.resolver
    }

    /// Canonical working path inside environments.
    pub fn workdir(&self) -> &str {
        &self.settings.workdir
    }

    pub fn environment_name(&self, skill: &SkillId) -> String {
        self.naming.environment_name(skill)
    }

    fn endpoint(&self, port: u16) -> String {
        format!("http://{}:{}", self.settings.host, port)
    }

    fn record(&self, name: String, port: u16, status: EnvironmentStatus) -> EnvironmentRecord {
        EnvironmentRecord {
            endpoint: self.endpoint(port),
            name,
            port,
            status,
        }
    }

    /// Make sure the skill's environment exists, runs and answers health checks.
    pub async fn ensure(&self, skill: &SkillId) -> Result<EnvironmentRecord> {
        let name = self.environment_name(skill);
        let computed = port_for(skill.as_str());

        if let Some(existing) = find_exact(self.runtime.as_ref(), &name, false).await? {
            if existing.state == ContainerState::Running {
                let port = self.bound_port(&name, computed).await;
                tracing::debug!(skill = %skill, name = %name, port, "environment already running");
                return Ok(self.record(name, port, EnvironmentStatus::Running));
            }
        }

        self.check_runtime().await?;
        self.resolver.resolve().await?;

        tracing::info!(
            skill = %skill,
            name = %name,
            status = %EnvironmentStatus::Starting,
            image = self.resolver.reference(),
            "bringing up environment"
        );
        let port = self.materialize(&name, computed).await?;
        self.wait_healthy(&name, port).await?;
        tracing::info!(skill = %skill, name = %name, port, "environment ready");
        Ok(self.record(name, port, EnvironmentStatus::Running))
    }

    async fn check_runtime(&self) -> Result<()> {
        self.runtime.version().await.map(|_| ()).map_err(|e| match e {
            RuntimeError::Unavailable { .. } => e.into(),
            other => SandboxError::RuntimeUnavailable(other.to_string()),
        })
    }

    /// Start or create the container and return its bound host port.
    async fn materialize(&self, name: &str, computed: u16) -> Result<u16> {
        if let Some(port) = self.start_or_adopt(name, computed).await? {
            return Ok(port);
        }

        let spec = self.run_spec(name, computed);
        match self.runtime.run_container(&spec).await {
            Ok(()) => Ok(self.bound_port(name, computed).await),
            Err(RuntimeError::NameConflict { .. }) => {
                tracing::warn!(name, "creation conflict, re-checking existing environment");
                self.start_or_adopt(name, computed)
                    .await?
                    .ok_or_else(|| SandboxError::CreationConflict {
                        name: name.to_string(),
                    })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Existing container: start it unless running. `None` when absent.
    async fn start_or_adopt(&self, name: &str, computed: u16) -> Result<Option<u16>> {
        let Some(existing) = find_exact(self.runtime.as_ref(), name, true).await? else {
            return Ok(None);
        };
        if existing.state != ContainerState::Running {
            tracing::info!(name, state = ?existing.state, "starting existing environment");
            self.runtime.start_container(name).await?;
        }
        Ok(Some(self.bound_port(name, computed).await))
    }

    fn run_spec(&self, name: &str, host_port: u16) -> RunSpec {
        let mut labels = BTreeMap::new();
        labels.insert(SCOPE_LABEL.to_string(), self.naming.scope().to_string());
        let mut env = BTreeMap::new();
        env.insert("SKILLPOD_WORKDIR".to_string(), self.settings.workdir.clone());
        env.insert(
            "SKILLPOD_SERVER_PORT".to_string(),
            self.settings.container_port.to_string(),
        );
        RunSpec {
            name: name.to_string(),
            image: self.resolver.reference().to_string(),
            bind_host: publish_host(&self.settings.host),
            host_port,
            container_port: self.settings.container_port,
            mount: self.settings.mount_path.clone().map(|host_path| Mount { host_path }),
            env,
            labels,
        }
    }

    /// Port the runtime actually bound; the computed one when it cannot be read.
    async fn bound_port(&self, name: &str, computed: u16) -> u16 {
        match self.runtime.host_port(name, self.settings.container_port).await {
            Ok(Some(port)) => {
                if port != computed {
                    tracing::debug!(name, port, computed, "using bound port");
                }
                port
            }
            Ok(None) => {
                tracing::warn!(name, computed, "no bound port reported, using computed port");
                computed
            }
            Err(e) => {
                tracing::warn!(name, computed, error = %e, "port readback failed, using computed port");
                computed
            }
        }
    }

    async fn wait_healthy(&self, name: &str, port: u16) -> Result<()> {
        let url = format!("{}/health", self.endpoint(port));
        let attempts = self.settings.health_attempts;
        for attempt in 1..=attempts {
            match self
                .http
                .get(&url)
                .timeout(HEALTH_REQUEST_TIMEOUT)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(name, attempt, "health check passed");
                    return Ok(());
                }
                Ok(resp) => tracing::debug!(name, attempt, status = %resp.status(), "not healthy yet"),
                Err(e) => tracing::debug!(name, attempt, error = %e, "health probe failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(self.settings.health_interval).await;
            }
        }
        Err(SandboxError::HealthCheckTimeout {
            name: name.to_string(),
            attempts,
        })
    }

    /// Stop the environment if it is running. Returns whether a stop was issued.
    pub async fn stop(&self, skill: &SkillId) -> Result<bool> {
        let name = self.environment_name(skill);
        if find_exact(self.runtime.as_ref(), &name, false).await?.is_none() {
            return Ok(false);
        }
        self.runtime.stop_container(&name).await?;
        tracing::info!(skill = %skill, name = %name, "environment stopped");
        Ok(true)
    }

    /// Stop, then remove. Returns whether a container was removed.
    pub async fn remove(&self, skill: &SkillId) -> Result<bool> {
        let name = self.environment_name(skill);
        let removal_failed = |e: SandboxError| SandboxError::RemovalFailed {
            name: name.clone(),
            reason: e.to_string(),
        };
        self.stop(skill).await.map_err(removal_failed)?;
        let existing = find_exact(self.runtime.as_ref(), &name, true)
            .await
            .map_err(|e| removal_failed(e.into()))?;
        if existing.is_none() {
            return Ok(false);
        }
        self.runtime
            .remove_container(&name)
            .await
            .map_err(|e| removal_failed(e.into()))?;
        tracing::info!(skill = %skill, name = %name, "environment removed");
        Ok(true)
    }

    pub async fn logs(&self, skill: &SkillId, tail: usize) -> Result<String> {
        let name = self.environment_name(skill);
        Ok(self.runtime.logs(&name, tail).await?)
    }

    /// Read-only inspection of one environment. `None` when it does not exist.
    pub async fn status(&self, skill: &SkillId) -> Result<Option<EnvironmentRecord>> {
        let name = self.environment_name(skill);
        match find_exact(self.runtime.as_ref(), &name, true).await? {
            Some(summary) => Ok(Some(
                self.record_from_summary(summary, port_for(skill.as_str())).await,
            )),
            None => Ok(None),
        }
    }

    /// Every environment in the current repo scope.
    ///
    /// The skill identity is not recoverable from a name, so only running
    /// environments carry a port; others report 0.
    pub async fn list(&self) -> Result<Vec<EnvironmentRecord>> {
        let prefix = self.naming.prefix();
        let summaries = self.runtime.list_containers(&prefix, true).await?;
        let mut records = Vec::new();
        for summary in summaries.into_iter().filter(|s| s.name.starts_with(&prefix)) {
            records.push(self.record_from_summary(summary, 0).await);
        }
        Ok(records)
    }

    async fn record_from_summary(&self, summary: ContainerSummary, fallback: u16) -> EnvironmentRecord {
        let (status, port) = match summary.state {
            ContainerState::Running => (
                EnvironmentStatus::Running,
                self.bound_port(&summary.name, fallback).await,
            ),
            ContainerState::Stopped => (EnvironmentStatus::Stopped, fallback),
            ContainerState::Other => (EnvironmentStatus::Error, fallback),
        };
        self.record(summary.name, port, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_host_is_loopback_for_localhost() {
        assert_eq!(publish_host("localhost"), "127.0.0.1");
        assert_eq!(publish_host("127.0.0.1"), "127.0.0.1");
        assert_eq!(publish_host("::1"), "::1");
    }
}
