//! Rows emitted by the supply phase.

use meso_core::{LinkId, SegmentId, Tick};

/// Supply state of one segment at the end of a tick.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SegmentStatsRow {
    pub tick:      Tick,
    pub segment:   SegmentId,
    pub speed_mps: f64,
    /// Persons that left the segment during the tick.
    pub flow:      u32,
    /// Vehicles per metre of lane.
    pub density:   f64,
    pub moving:    u32,
    pub queueing:  u32,
}

/// Mean traversal time of a link over the persons that left it this tick.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LinkTravelTimeRow {
    pub tick:      Tick,
    pub link:      LinkId,
    pub mean_secs: f64,
    pub count:     u32,
}

/// Occupancy of one link at the end of a tick.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LinkStatsRow {
    pub tick:    Tick,
    pub link:    LinkId,
    /// Vehicle length on physical lanes over total lane length, in [0, 1].
    pub density: f64,
}

/// Everything one conflux reports on an output tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SupplyReport {
    pub segments:   Vec<SegmentStatsRow>,
    pub links:      Vec<LinkTravelTimeRow>,
    pub link_stats: Vec<LinkStatsRow>,
}

impl SupplyReport {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.links.is_empty() && self.link_stats.is_empty()
    }

    pub fn extend(&mut self, other: SupplyReport) {
        self.segments.extend(other.segments);
        self.links.extend(other.links);
        self.link_stats.extend(other.link_stats);
    }
}
