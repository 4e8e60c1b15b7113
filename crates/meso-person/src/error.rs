use thiserror::Error;

use meso_core::PersonId;
use meso_network::NetworkError;

#[derive(Debug, Error)]
pub enum PersonError {
    #[error("{person}: trip has an empty path")]
    EmptyPath { person: PersonId },

    #[error("{person}: invalid movement state: {reason}")]
    InvalidState { person: PersonId, reason: String },

    #[error("path lookup failed: {0}")]
    Path(#[from] NetworkError),

    #[error("trip chain parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PersonResult<T> = Result<T, PersonError>;
