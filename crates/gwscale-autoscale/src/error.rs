use thiserror::Error;

use gwscale_core::{CloudError, ConfigError};
use gwscale_state::StateError;

/// Errors that abort a tick.
#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("state store: {0}")]
    State(#[from] StateError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),
}

pub type TickResult<T> = Result<T, TickError>;
