//! Configuration structs grouped by concern, loaded from the environment.

use super::env_keys::{observability as obv_keys, paths, sandbox, server};
use super::loader::{env_bool, env_optional, env_or, env_parse, load_dotenv};
use std::path::PathBuf;

/// Canonical working path inside environments.
pub const DEFAULT_WORKDIR: &str = "/workspace";
/// Default execution timeout (30 s).
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Health polling: 30 attempts at 1 s intervals.
pub const DEFAULT_HEALTH_ATTEMPTS: u32 = 30;
pub const DEFAULT_HEALTH_INTERVAL_MS: u64 = 1_000;
/// Port the execution server binds inside the environment.
pub const DEFAULT_CONTAINER_PORT: u16 = 3000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_RUNTIME: &str = "docker";
pub const DEFAULT_SKILLS_DIR: &str = "skills";
/// PATH handed to commands spawned by the execution server.
pub const DEFAULT_SERVER_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
pub const DEFAULT_SERVER_BIND: &str = "0.0.0.0";
pub const DEFAULT_TMP_DIR: &str = "/tmp";
/// Per-stream cap on captured command output (1 MiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Host-side orchestration settings.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Container CLI binary.
    pub runtime: String,
    /// Operator-supplied image reference; `None` selects the built-in default.
    pub image: Option<String>,
    /// Build context override. Relative paths resolve against `workspace`
    /// for operator images.
    pub build_context: Option<PathBuf>,
    /// Invoking workspace; source of the repo scope.
    pub workspace: PathBuf,
    /// Replaces the skill component of environment names.
    pub container_name: Option<String>,
    /// Host path mounted at the identical path inside environments.
    pub mount_path: Option<PathBuf>,
    pub workdir: String,
    pub timeout_ms: u64,
    pub health_attempts: u32,
    pub health_interval_ms: u64,
    pub container_port: u16,
    pub host: String,
    pub prewarm: bool,
    pub skills_dir: PathBuf,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: DEFAULT_RUNTIME.to_string(),
            image: None,
            build_context: None,
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            container_name: None,
            mount_path: None,
            workdir: DEFAULT_WORKDIR.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            health_attempts: DEFAULT_HEALTH_ATTEMPTS,
            health_interval_ms: DEFAULT_HEALTH_INTERVAL_MS,
            container_port: DEFAULT_CONTAINER_PORT,
            host: DEFAULT_HOST.to_string(),
            prewarm: true,
            skills_dir: PathBuf::from(DEFAULT_SKILLS_DIR),
        }
    }
}

impl SandboxConfig {
    /// Load from the environment (also reads `.env`).
    pub fn from_env() -> Self {
        load_dotenv();
        let defaults = Self::default();
        let workspace = env_optional(paths::SKILLPOD_WORKSPACE, &[])
            .map(PathBuf::from)
            .unwrap_or(defaults.workspace);
        Self {
            runtime: env_or(sandbox::SKILLPOD_RUNTIME, sandbox::RUNTIME_ALIASES, || {
                DEFAULT_RUNTIME.to_string()
            }),
            image: env_optional(sandbox::SKILLPOD_IMAGE, &[]),
            build_context: env_optional(sandbox::SKILLPOD_BUILD_CONTEXT, &[]).map(PathBuf::from),
            workspace,
            container_name: env_optional(sandbox::SKILLPOD_CONTAINER_NAME, &[]),
            mount_path: env_optional(sandbox::SKILLPOD_MOUNT_PATH, &[]).map(PathBuf::from),
            workdir: env_or(sandbox::SKILLPOD_WORKDIR, &[], || DEFAULT_WORKDIR.to_string()),
            timeout_ms: env_parse(sandbox::SKILLPOD_TIMEOUT_MS, &[], DEFAULT_TIMEOUT_MS)
                .max(1),
            health_attempts: env_parse(
                sandbox::SKILLPOD_HEALTH_ATTEMPTS,
                &[],
                DEFAULT_HEALTH_ATTEMPTS,
            )
            .max(1),
            health_interval_ms: env_parse(
                sandbox::SKILLPOD_HEALTH_INTERVAL_MS,
                &[],
                DEFAULT_HEALTH_INTERVAL_MS,
            ),
            container_port: env_parse(
                sandbox::SKILLPOD_CONTAINER_PORT,
                &[],
                DEFAULT_CONTAINER_PORT,
            ),
            host: env_or(sandbox::SKILLPOD_HOST, &[], || DEFAULT_HOST.to_string()),
            prewarm: env_bool(sandbox::SKILLPOD_PREWARM, &[], true),
            skills_dir: PathBuf::from(env_or(
                paths::SKILLPOD_SKILLS_DIR,
                paths::SKILLS_DIR_ALIASES,
                || DEFAULT_SKILLS_DIR.to_string(),
            )),
        }
    }

    /// Skills directory resolved against the workspace.
    pub fn skills_root(&self) -> PathBuf {
        if self.skills_dir.is_absolute() {
            self.skills_dir.clone()
        } else {
            self.workspace.join(&self.skills_dir)
        }
    }
}

/// Execution server settings (inside the environment).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub workdir: PathBuf,
    pub default_timeout_ms: u64,
    pub path: String,
    pub tmp_dir: PathBuf,
    /// Bytes of stdout and of stderr kept for a buffered result.
    pub max_output_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_SERVER_BIND.to_string(),
            port: DEFAULT_CONTAINER_PORT,
            workdir: PathBuf::from(DEFAULT_WORKDIR),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            path: DEFAULT_SERVER_PATH.to_string(),
            tmp_dir: PathBuf::from(DEFAULT_TMP_DIR),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            bind: env_or(server::SKILLPOD_SERVER_BIND, &[], || {
                DEFAULT_SERVER_BIND.to_string()
            }),
            port: env_parse(
                server::SKILLPOD_SERVER_PORT,
                server::SERVER_PORT_ALIASES,
                DEFAULT_CONTAINER_PORT,
            ),
            workdir: PathBuf::from(env_or(sandbox::SKILLPOD_WORKDIR, &[], || {
                DEFAULT_WORKDIR.to_string()
            })),
            default_timeout_ms: env_parse(sandbox::SKILLPOD_TIMEOUT_MS, &[], DEFAULT_TIMEOUT_MS)
                .max(1),
            path: env_or(server::SKILLPOD_SERVER_PATH, &[], || {
                DEFAULT_SERVER_PATH.to_string()
            }),
            tmp_dir: PathBuf::from(env_or(server::SKILLPOD_TMP_DIR, &[], || {
                DEFAULT_TMP_DIR.to_string()
            })),
            max_output_bytes: env_parse(
                server::SKILLPOD_MAX_OUTPUT_BYTES,
                &[],
                DEFAULT_MAX_OUTPUT_BYTES,
            )
            .max(1),
        }
    }

    /// `bind:port` socket address string.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Observability settings: quiet, log level, JSON output.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            load_dotenv();
            Self {
                quiet: env_bool(obv_keys::SKILLPOD_QUIET, &[], false),
                log_level: env_or(
                    obv_keys::SKILLPOD_LOG_LEVEL,
                    obv_keys::LOG_LEVEL_ALIASES,
                    || "skillpod=info".to_string(),
                ),
                log_json: env_bool(obv_keys::SKILLPOD_LOG_JSON, &[], false),
            }
        })
    }
}
