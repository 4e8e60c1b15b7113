use thiserror::Error;

use meso_core::{ConfluxId, LaneSlot, LinkId, PersonId, SegmentId, Tick};
use meso_person::PersonError;

/// Occupancy and scheduling invariant violations.
///
/// Every variant means lane bookkeeping can no longer be trusted; the run
/// stops and the error names the conflux, tick, and persons involved.
#[derive(Debug, Error)]
pub enum ConfluxError {
    #[error("{conflux} {tick}: {person} dequeued from {segment} {lane} but the front was {found:?}")]
    DequeueMismatch {
        conflux: ConfluxId,
        tick:    Tick,
        segment: SegmentId,
        lane:    LaneSlot,
        person:  PersonId,
        found:   Option<PersonId>,
    },

    #[error("{conflux} {tick}: {person} not found in {segment} {lane}")]
    PersonNotInLane {
        conflux: ConfluxId,
        tick:    Tick,
        segment: SegmentId,
        lane:    LaneSlot,
        person:  PersonId,
    },

    #[error("{conflux} {tick}: {person} moved from the virtual queue of {from} to that of {to}")]
    VirtualQueueToVirtualQueue {
        conflux: ConfluxId,
        tick:    Tick,
        person:  PersonId,
        from:    SegmentId,
        to:      SegmentId,
    },

    #[error("{conflux} {tick}: {person} is on {segment}, which this conflux does not own")]
    ForeignSegment {
        conflux: ConfluxId,
        tick:    Tick,
        person:  PersonId,
        segment: SegmentId,
    },

    #[error("{conflux}: {segment} has no lane {lane}")]
    UnknownLane { conflux: ConfluxId, segment: SegmentId, lane: LaneSlot },

    #[error("{conflux}: {link} does not end at this conflux")]
    UnknownLink { conflux: ConfluxId, link: LinkId },

    #[error("{conflux}: {segment} is not owned by this conflux")]
    UnknownSegment { conflux: ConfluxId, segment: SegmentId },

    #[error("{conflux} {tick}: queue count of {segment} {lane} would drop below zero ({person})")]
    NegativeQueueCount {
        conflux: ConfluxId,
        tick:    Tick,
        segment: SegmentId,
        lane:    LaneSlot,
        person:  PersonId,
    },

    #[error("{conflux} {tick}: {segment} {lane} has more queuing than total persons ({person})")]
    NegativeMovingCount {
        conflux: ConfluxId,
        tick:    Tick,
        segment: SegmentId,
        lane:    LaneSlot,
        person:  PersonId,
    },

    #[error("{conflux} {tick}: {segment} {lane} is out of order at {person}")]
    OutOfOrderLane {
        conflux: ConfluxId,
        tick:    Tick,
        segment: SegmentId,
        lane:    LaneSlot,
        person:  PersonId,
    },

    #[error("{conflux} {tick}: {person} has invalid time to intersection {value}")]
    InvalidTimeToIntersection {
        conflux: ConfluxId,
        tick:    Tick,
        person:  PersonId,
        value:   f64,
    },

    #[error("{conflux} {tick}: output counter of {segment} {lane} is already zero")]
    OutputCounterExhausted {
        conflux: ConfluxId,
        tick:    Tick,
        segment: SegmentId,
        lane:    LaneSlot,
    },

    #[error("{conflux} {tick}: {next} reports last update {next_last_updated}, after the current tick")]
    LastUpdatedMismanaged {
        conflux:           ConfluxId,
        tick:              Tick,
        next:              ConfluxId,
        next_last_updated: Tick,
    },

    #[error("{conflux} {tick}: {person} is not registered with this worker")]
    UnknownPerson { conflux: ConfluxId, tick: Tick, person: PersonId },

    #[error("{conflux} {tick}: movement of {person} failed: {source}")]
    Movement {
        conflux: ConfluxId,
        tick:    Tick,
        person:  PersonId,
        #[source]
        source:  PersonError,
    },
}

pub type ConfluxResult<T> = Result<T, ConfluxError>;
