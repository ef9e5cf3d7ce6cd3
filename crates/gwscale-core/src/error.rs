//! Errors surfaced by the cloud collaborators.

use thiserror::Error;

/// Result type alias for collaborator calls.
pub type CloudResult<T> = Result<T, CloudError>;

/// A failed round trip to one of the platform APIs.
#[derive(Debug, Error)]
pub enum CloudError {
    /// Any failure of a collaborator call. `call` names the operation
    /// (`backend_health`, `set_capacity`, ...).
    #[error("{call} failed: {message}")]
    Upstream { call: &'static str, message: String },

    /// The primary address of a single pool member could not be resolved.
    #[error("cannot resolve address of instance {instance_id}: {message}")]
    Resolution { instance_id: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),
}

impl CloudError {
    pub fn upstream(call: &'static str, message: impl Into<String>) -> Self {
        CloudError::Upstream {
            call,
            message: message.into(),
        }
    }
}
