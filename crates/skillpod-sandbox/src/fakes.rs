//! In-memory [`ContainerRuntime`] for orchestration tests.
//!
//! Records every call and keeps a small container table so tests can assert on
//! exactly which control-plane operations a code path issued.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::RuntimeError;
use crate::runtime::{
    BuildContext, ContainerRuntime, ContainerState, ContainerSummary, RunSpec, RuntimeResult,
};

/// One recorded control-plane call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Version,
    ImageExists(String),
    Pull(String),
    Build {
        image: String,
        context: PathBuf,
        dockerfile: Option<PathBuf>,
    },
    List { filter: String, all: bool },
    Run(RunSpec),
    Start(String),
    Stop(String),
    Remove(String),
    HostPort(String),
    Logs { name: String, tail: usize },
}

impl RuntimeCall {
    /// Calls that do image work.
    pub fn is_image_call(&self) -> bool {
        matches!(self, Self::ImageExists(_) | Self::Pull(_) | Self::Build { .. })
    }

    /// Calls that change container state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Run(_) | Self::Start(_) | Self::Stop(_) | Self::Remove(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeContainer {
    pub image: String,
    pub state: ContainerState,
    pub host_port: Option<u16>,
}

impl FakeContainer {
    pub fn running(host_port: u16) -> Self {
        Self {
            image: "fake:latest".to_string(),
            state: ContainerState::Running,
            host_port: Some(host_port),
        }
    }

    pub fn stopped(host_port: u16) -> Self {
        Self {
            state: ContainerState::Stopped,
            ..Self::running(host_port)
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    unavailable: bool,
    images: HashSet<String>,
    containers: BTreeMap<String, FakeContainer>,
    calls: Vec<RuntimeCall>,
    pull_fails: bool,
    build_fails: bool,
    stop_fails: bool,
    remove_fails: bool,
    publish_port: Option<u16>,
    conflict_on_run: Option<FakeContainer>,
    conflicts_always: bool,
}

#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with [`RuntimeError::Unavailable`].
    pub fn unavailable() -> Self {
        let fake = Self::new();
        fake.lock().unavailable = true;
        fake
    }

    pub fn with_image(self, image: &str) -> Self {
        self.lock().images.insert(image.to_string());
        self
    }

    pub fn with_container(self, name: &str, container: FakeContainer) -> Self {
        self.lock().containers.insert(name.to_string(), container);
        self
    }

    pub fn failing_pull(self) -> Self {
        self.lock().pull_fails = true;
        self
    }

    pub fn failing_build(self) -> Self {
        self.lock().build_fails = true;
        self
    }

    pub fn failing_stop(self) -> Self {
        self.lock().stop_fails = true;
        self
    }

    pub fn failing_remove(self) -> Self {
        self.lock().remove_fails = true;
        self
    }

    /// Created and started containers report this host port regardless of the
    /// requested binding.
    pub fn publishing_on(self, port: u16) -> Self {
        self.lock().publish_port = Some(port);
        self
    }

    /// The next create fails with a name conflict after `winner` appears under
    /// that name, as if another process created it first.
    pub fn losing_race_to(self, winner: FakeContainer) -> Self {
        self.lock().conflict_on_run = Some(winner);
        self
    }

    /// Every create fails with a name conflict and nothing appears.
    pub fn always_conflicting(self) -> Self {
        self.lock().conflicts_always = true;
        self
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.lock().containers.get(name).cloned()
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.lock().images.contains(image)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `call`, failing if the runtime is marked unavailable.
    fn record(&self, call: RuntimeCall) -> RuntimeResult<std::sync::MutexGuard<'_, FakeState>> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.unavailable {
            return Err(RuntimeError::Unavailable {
                binary: "fake".to_string(),
                reason: "runtime marked unavailable".to_string(),
            });
        }
        Ok(state)
    }
}

fn no_such_container(operation: &str, name: &str) -> RuntimeError {
    RuntimeError::command_failed(operation, format!("No such container: {}", name))
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    async fn version(&self) -> RuntimeResult<String> {
        let _state = self.record(RuntimeCall::Version)?;
        Ok("fake-1.0".to_string())
    }

    async fn image_exists(&self, image: &str) -> RuntimeResult<bool> {
        let state = self.record(RuntimeCall::ImageExists(image.to_string()))?;
        Ok(state.images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> RuntimeResult<()> {
        let mut state = self.record(RuntimeCall::Pull(image.to_string()))?;
        if state.pull_fails {
            return Err(RuntimeError::command_failed(
                "pull",
                format!("manifest for {} not found", image),
            ));
        }
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn build_image(&self, image: &str, context: &BuildContext) -> RuntimeResult<()> {
        let mut state = self.record(RuntimeCall::Build {
            image: image.to_string(),
            context: context.dir.clone(),
            dockerfile: context.dockerfile.clone(),
        })?;
        if state.build_fails {
            return Err(RuntimeError::command_failed(
                "build",
                format!("unable to prepare context: {}", context.dir.display()),
            ));
        }
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn list_containers(
        &self,
        name_filter: &str,
        all: bool,
    ) -> RuntimeResult<Vec<ContainerSummary>> {
        let state = self.record(RuntimeCall::List {
            filter: name_filter.to_string(),
            all,
        })?;
        Ok(state
            .containers
            .iter()
            .filter(|(name, c)| name.contains(name_filter) && (all || c.state == ContainerState::Running))
            .map(|(name, c)| ContainerSummary {
                name: name.clone(),
                state: c.state,
                image: c.image.clone(),
            })
            .collect())
    }

    async fn run_container(&self, spec: &RunSpec) -> RuntimeResult<()> {
        let mut state = self.record(RuntimeCall::Run(spec.clone()))?;
        if state.conflicts_always || state.containers.contains_key(&spec.name) {
            return Err(RuntimeError::NameConflict {
                name: spec.name.clone(),
            });
        }
        if let Some(winner) = state.conflict_on_run.take() {
            state.containers.insert(spec.name.clone(), winner);
            return Err(RuntimeError::NameConflict {
                name: spec.name.clone(),
            });
        }
        let host_port = state.publish_port.unwrap_or(spec.host_port);
        state.containers.insert(
            spec.name.clone(),
            FakeContainer {
                image: spec.image.clone(),
                state: ContainerState::Running,
                host_port: Some(host_port),
            },
        );
        Ok(())
    }

    async fn start_container(&self, name: &str) -> RuntimeResult<()> {
        let mut state = self.record(RuntimeCall::Start(name.to_string()))?;
        let publish = state.publish_port;
        let container = state
            .containers
            .get_mut(name)
            .ok_or_else(|| no_such_container("start", name))?;
        container.state = ContainerState::Running;
        if let Some(port) = publish {
            container.host_port = Some(port);
        }
        Ok(())
    }

    async fn stop_container(&self, name: &str) -> RuntimeResult<()> {
        let mut state = self.record(RuntimeCall::Stop(name.to_string()))?;
        if state.stop_fails {
            return Err(RuntimeError::command_failed("stop", "stop refused"));
        }
        let container = state
            .containers
            .get_mut(name)
            .ok_or_else(|| no_such_container("stop", name))?;
        container.state = ContainerState::Stopped;
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> RuntimeResult<()> {
        let mut state = self.record(RuntimeCall::Remove(name.to_string()))?;
        if state.remove_fails {
            return Err(RuntimeError::command_failed("rm", "removal refused"));
        }
        state
            .containers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| no_such_container("rm", name))
    }

    async fn host_port(&self, name: &str, _container_port: u16) -> RuntimeResult<Option<u16>> {
        let state = self.record(RuntimeCall::HostPort(name.to_string()))?;
        let container = state
            .containers
            .get(name)
            .ok_or_else(|| no_such_container("port", name))?;
        Ok(match container.state {
            ContainerState::Running => container.host_port,
            _ => None,
        })
    }

    async fn logs(&self, name: &str, tail: usize) -> RuntimeResult<String> {
        let state = self.record(RuntimeCall::Logs {
            name: name.to_string(),
            tail,
        })?;
        if !state.containers.contains_key(name) {
            return Err(no_such_container("logs", name));
        }
        Ok(format!("last {} lines of {}\n", tail, name))
    }
}
