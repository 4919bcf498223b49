//! Wiring: config → docker backend → resolver → manager → client, plus the session.

use std::sync::Arc;

use skillpod_core::config::SandboxConfig;
use skillpod_sandbox::docker::DockerCli;
use skillpod_sandbox::image::ImageResolver;
use skillpod_sandbox::runtime::ContainerRuntime;
use skillpod_sandbox::{CleanupReport, EnvironmentManager, ExecutionClient, Session};

use crate::cli::GlobalArgs;

pub struct AppContext {
    pub config: SandboxConfig,
    pub manager: Arc<EnvironmentManager>,
    pub client: ExecutionClient,
    pub session: Arc<Session>,
}

/// Environment config with CLI flags applied on top.
pub fn load_config(global: &GlobalArgs) -> SandboxConfig {
    let mut config = SandboxConfig::from_env();
    if let Some(workspace) = &global.workspace {
        config.workspace = workspace.clone();
    }
    if let Some(runtime) = &global.runtime {
        config.runtime = runtime.clone();
    }
    if let Some(image) = &global.image {
        config.image = Some(image.clone());
    }
    if let Some(name) = &global.container_name {
        config.container_name = Some(name.clone());
    }
    if let Some(mount) = &global.mount_path {
        config.mount_path = Some(mount.clone());
    }
    if global.no_prewarm {
        config.prewarm = false;
    }
    config
}

impl AppContext {
    pub fn new(config: SandboxConfig) -> Self {
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::from_config(&config));
        let resolver = Arc::new(ImageResolver::from_config(runtime.clone(), &config));
        let manager = Arc::new(EnvironmentManager::from_config(runtime, resolver, &config));
        let session = Arc::new(Session::new());
        let client = ExecutionClient::new(manager.clone(), session.clone(), config.timeout_ms);
        tracing::debug!(
            scope = manager.naming().scope(),
            image = manager.resolver().reference(),
            "context ready"
        );
        Self {
            config,
            manager,
            client,
            session,
        }
    }

    /// Start background image resolution when enabled.
    pub fn start_prewarm(&self) {
        if self.config.prewarm {
            let _ = self.manager.resolver().prewarm();
        }
    }

    /// Stop and remove every environment this process used.
    pub async fn drain_session(&self) -> CleanupReport {
        self.session.drain(&self.manager).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_cli_flags_override_env_config() {
        let global = GlobalArgs {
            workspace: Some(PathBuf::from("/work/app")),
            runtime: Some("podman".into()),
            image: Some("acme/tools:1".into()),
            container_name: Some("shared".into()),
            mount_path: Some(PathBuf::from("/data")),
            no_prewarm: true,
        };
        let config = load_config(&global);
        assert_eq!(config.workspace, PathBuf::from("/work/app"));
        assert_eq!(config.runtime, "podman");
        assert_eq!(config.image.as_deref(), Some("acme/tools:1"));
        assert_eq!(config.container_name.as_deref(), Some("shared"));
        assert_eq!(config.mount_path, Some(PathBuf::from("/data")));
        assert!(!config.prewarm);
    }
}
