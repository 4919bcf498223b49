pub mod client;
pub mod docker;
pub mod error;
pub mod fakes;
pub mod image;
pub mod lifecycle;
pub mod naming;
pub mod port;
pub mod runtime;
pub mod session;

pub use client::{ExecutionClient, ExecutionRequest};
pub use error::{RuntimeError, SandboxError};
pub use lifecycle::{EnvironmentManager, EnvironmentRecord, EnvironmentStatus, ManagerSettings};
pub use naming::SkillId;
pub use session::{CleanupReport, Session};
