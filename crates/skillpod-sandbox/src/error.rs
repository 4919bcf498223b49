//! Error types for orchestration.
//!
//! Failures that prevent a usable environment are errors. Anything that happens after
//! the environment is usable (non-zero exits, timeouts, transport failures) is reported
//! as [`ExecutionResult`](skillpod_core::protocol::ExecutionResult) data instead.

use thiserror::Error;

/// Failures reported by a [`ContainerRuntime`](crate::runtime::ContainerRuntime) backend.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Container runtime '{binary}' is unavailable: {reason}")]
    Unavailable { binary: String, reason: String },

    #[error("Container name '{name}' is already in use")]
    NameConflict { name: String },

    #[error("Runtime {operation} failed: {message}")]
    CommandFailed { operation: String, message: String },
}

impl RuntimeError {
    pub fn command_failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Errors returned by the lifecycle manager, image resolver and execution client.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Invalid skill identity: {0}")]
    InvalidSkillId(String),

    #[error("Container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("Failed to resolve image '{image}': {reason}")]
    ImageResolutionFailed { image: String, reason: String },

    #[error("Environment '{name}' did not become healthy after {attempts} attempts")]
    HealthCheckTimeout { name: String, attempts: u32 },

    #[error("Environment '{name}' could not be created: name conflict persisted after re-check")]
    CreationConflict { name: String },

    #[error("Failed to remove environment '{name}': {reason}")]
    RemovalFailed { name: String, reason: String },

    #[error(transparent)]
    Runtime(RuntimeError),
}

impl From<RuntimeError> for SandboxError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Unavailable { binary, reason } => {
                Self::RuntimeUnavailable(format!("{}: {}", binary, reason))
            }
            other => Self::Runtime(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
