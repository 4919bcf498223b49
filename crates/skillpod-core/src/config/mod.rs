//! skillpod configuration layer.
//!
//! All environment variable reads live here; other crates consume the structured configs.
//!
//! - `loader`: env_or, env_optional, env_bool, env_parse, `.env` loading
//! - `schema`: SandboxConfig, ServerConfig, ObservabilityConfig
//! - `env_keys`: key constants and aliases

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{
    env_bool, env_optional, env_or, env_parse, load_dotenv, load_dotenv_from_dir,
    remove_env_var, set_env_var,
};
pub use schema::{
    ObservabilityConfig, SandboxConfig, ServerConfig, DEFAULT_CONTAINER_PORT,
    DEFAULT_HEALTH_ATTEMPTS, DEFAULT_HEALTH_INTERVAL_MS, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT_MS,
    DEFAULT_WORKDIR,
};
