//! Environment variable keys and their aliases.
//!
//! Primary keys use the `SKILLPOD_*` prefix. Aliases are read when the primary key is unset.

/// Orchestration (host side): runtime binary, images, naming, health polling.
pub mod sandbox {
    /// Container CLI binary (`docker`, `podman`, ...).
    pub const SKILLPOD_RUNTIME: &str = "SKILLPOD_RUNTIME";
    pub const RUNTIME_ALIASES: &[&str] = &["CONTAINER_RUNTIME"];

    /// Operator-supplied image reference. Unset means the built-in default image.
    pub const SKILLPOD_IMAGE: &str = "SKILLPOD_IMAGE";

    /// Build context used when the image cannot be pulled. For the built-in image,
    /// a skillpod source checkout.
    pub const SKILLPOD_BUILD_CONTEXT: &str = "SKILLPOD_BUILD_CONTEXT";

    /// Overrides the skill component of environment names.
    pub const SKILLPOD_CONTAINER_NAME: &str = "SKILLPOD_CONTAINER_NAME";

    /// Host path mounted into every environment at the identical path.
    pub const SKILLPOD_MOUNT_PATH: &str = "SKILLPOD_MOUNT_PATH";

    /// Canonical working path inside environments.
    pub const SKILLPOD_WORKDIR: &str = "SKILLPOD_WORKDIR";

    /// Default execution timeout in milliseconds.
    pub const SKILLPOD_TIMEOUT_MS: &str = "SKILLPOD_TIMEOUT_MS";

    pub const SKILLPOD_HEALTH_ATTEMPTS: &str = "SKILLPOD_HEALTH_ATTEMPTS";
    pub const SKILLPOD_HEALTH_INTERVAL_MS: &str = "SKILLPOD_HEALTH_INTERVAL_MS";

    /// Port the execution server listens on inside the environment.
    pub const SKILLPOD_CONTAINER_PORT: &str = "SKILLPOD_CONTAINER_PORT";

    /// Host address used to reach published ports.
    pub const SKILLPOD_HOST: &str = "SKILLPOD_HOST";

    /// Background image resolution at process start.
    pub const SKILLPOD_PREWARM: &str = "SKILLPOD_PREWARM";
}

/// Workspace and skills source.
pub mod paths {
    pub const SKILLPOD_WORKSPACE: &str = "SKILLPOD_WORKSPACE";

    pub const SKILLPOD_SKILLS_DIR: &str = "SKILLPOD_SKILLS_DIR";
    pub const SKILLS_DIR_ALIASES: &[&str] = &["SKILLS_DIR"];
}

/// Execution server (inside the environment).
pub mod server {
    pub const SKILLPOD_SERVER_BIND: &str = "SKILLPOD_SERVER_BIND";
    pub const SKILLPOD_SERVER_PORT: &str = "SKILLPOD_SERVER_PORT";
    pub const SERVER_PORT_ALIASES: &[&str] = &["PORT"];

    /// PATH handed to spawned commands.
    pub const SKILLPOD_SERVER_PATH: &str = "SKILLPOD_SERVER_PATH";

    /// Directory emptied by `POST /cleanup`.
    pub const SKILLPOD_TMP_DIR: &str = "SKILLPOD_TMP_DIR";

    /// Per-stream cap on output kept for buffered results.
    pub const SKILLPOD_MAX_OUTPUT_BYTES: &str = "SKILLPOD_MAX_OUTPUT_BYTES";
}

/// Observability and logging.
pub mod observability {
    pub const SKILLPOD_QUIET: &str = "SKILLPOD_QUIET";

    pub const SKILLPOD_LOG_LEVEL: &str = "SKILLPOD_LOG_LEVEL";
    pub const LOG_LEVEL_ALIASES: &[&str] = &["LOG_LEVEL"];

    pub const SKILLPOD_LOG_JSON: &str = "SKILLPOD_LOG_JSON";
}
