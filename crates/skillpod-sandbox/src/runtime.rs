//! ContainerRuntime trait: the narrow control-plane seam used by orchestration.
//!
//! The default backend is [`DockerCli`](crate::docker::DockerCli), which shells out to a
//! docker-compatible binary. Orchestration tests use [`FakeRuntime`](crate::fakes::FakeRuntime).

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::RuntimeError;

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Coarse container state as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    /// Created or exited; can be started again.
    Stopped,
    /// Paused, restarting, dead, removing, ...
    Other,
}

impl ContainerState {
    /// Map a docker `State` column value.
    pub fn from_runtime(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "exited" | "created" => Self::Stopped,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub name: String,
    pub state: ContainerState,
    pub image: String,
}

/// Bind mount where the host path appears at the identical path inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host_path: PathBuf,
}

/// Everything needed to create and start one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub name: String,
    pub image: String,
    /// Host address the port is published on. Never all interfaces.
    pub bind_host: String,
    pub host_port: u16,
    pub container_port: u16,
    pub mount: Option<Mount>,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

/// Directory sent to the builder, plus the Dockerfile when it is not `<dir>/Dockerfile`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub dir: PathBuf,
    pub dockerfile: Option<PathBuf>,
}

impl BuildContext {
    pub fn dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            dockerfile: None,
        }
    }

    pub fn with_dockerfile(mut self, dockerfile: impl Into<PathBuf>) -> Self {
        self.dockerfile = Some(dockerfile.into());
        self
    }
}

impl std::fmt::Display for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.dockerfile {
            Some(file) => write!(f, "{} (-f {})", self.dir.display(), file.display()),
            None => write!(f, "{}", self.dir.display()),
        }
    }
}

/// Control-plane operations needed by the lifecycle manager and image resolver.
///
/// Implementations must report a name collision on create as
/// [`RuntimeError::NameConflict`] and an unreachable binary or daemon as
/// [`RuntimeError::Unavailable`].
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Backend name for logging and diagnostics.
    fn name(&self) -> &str;

    /// Server version; doubles as the availability check.
    async fn version(&self) -> RuntimeResult<String>;

    async fn image_exists(&self, image: &str) -> RuntimeResult<bool>;

    async fn pull_image(&self, image: &str) -> RuntimeResult<()>;

    async fn build_image(&self, image: &str, context: &BuildContext) -> RuntimeResult<()>;

    /// Containers whose name contains `name_filter`. Only running ones unless `all`.
    async fn list_containers(
        &self,
        name_filter: &str,
        all: bool,
    ) -> RuntimeResult<Vec<ContainerSummary>>;

    /// Create and start a container.
    async fn run_container(&self, spec: &RunSpec) -> RuntimeResult<()>;

    async fn start_container(&self, name: &str) -> RuntimeResult<()>;

    async fn stop_container(&self, name: &str) -> RuntimeResult<()>;

    async fn remove_container(&self, name: &str) -> RuntimeResult<()>;

    /// Host port bound to `container_port/tcp`, if published.
    async fn host_port(&self, name: &str, container_port: u16) -> RuntimeResult<Option<u16>>;

    /// Last `tail` lines of combined output.
    async fn logs(&self, name: &str, tail: usize) -> RuntimeResult<String>;
}

/// Find the container whose name is exactly `name`.
///
/// Runtime name filters match substrings, so the exact comparison happens here.
pub async fn find_exact(
    runtime: &dyn ContainerRuntime,
    name: &str,
    all: bool,
) -> RuntimeResult<Option<ContainerSummary>> {
    let found = runtime.list_containers(name, all).await?;
    Ok(found.into_iter().find(|c| c.name == name))
}
