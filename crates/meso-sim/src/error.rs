use meso_conflux::ConfluxError;
use meso_core::{CoreError, PersonId, SegmentId};
use meso_person::PersonError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("simulation configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("partition assigns {got} confluxes but the network has {expected}")]
    PartitionMismatch { expected: usize, got: usize },

    #[error("{0} is loaded more than once")]
    DuplicatePerson(PersonId),

    #[error("{person} has no conflux to start in")]
    NoStartingConflux { person: PersonId },

    #[error("incident on {segment}: {reason}")]
    InvalidIncident { segment: SegmentId, reason: String },

    #[error("{person} is held {count} times across confluxes")]
    OccupancyViolation { person: PersonId, count: usize },

    #[error(transparent)]
    Person(#[from] PersonError),

    /// A conflux found its bookkeeping corrupted.  The run stops here.
    #[error(transparent)]
    Conflux(#[from] ConfluxError),
}

pub type SimResult<T> = Result<T, SimError>;
