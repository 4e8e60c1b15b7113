//! Plain data row types written by output backends.

pub use meso_conflux::{LinkStatsRow, LinkTravelTimeRow, SegmentStatsRow};

/// Counts for one simulation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickSummaryRow {
    pub tick:           u64,
    pub unix_time_secs: i64,
    pub started:        u64,
    pub completed:      u64,
    pub active:         u64,
    /// Persons waiting in a virtual queue at the end of the tick.
    pub queued:         u64,
}
