//! The supply view a conflux lends to roles during one person update.

use rustc_hash::FxHashMap;

use meso_core::{LaneSlot, PersonId, SegmentId, SupplyParams};
use meso_person::SupplyView;

use crate::{FrameView, SegmentStats};

/// Live answers for the conflux's own segments, snapshot answers for
/// everyone else's.
///
/// Foreign segments report no metering: a vehicle only ever enters them,
/// so only speed, best lane, and space matter.  Space accounts for the
/// transfers this conflux already sent there in the current phase.
pub struct LocalSupply<'a> {
    segments:          &'a mut FxHashMap<SegmentId, SegmentStats>,
    view:              &'a FrameView,
    pending_transfers: &'a FxHashMap<SegmentId, u32>,
    params:            &'a SupplyParams,
}

impl<'a> LocalSupply<'a> {
    pub fn new(
        segments:          &'a mut FxHashMap<SegmentId, SegmentStats>,
        view:              &'a FrameView,
        pending_transfers: &'a FxHashMap<SegmentId, u32>,
        params:            &'a SupplyParams,
    ) -> Self {
        Self { segments, view, pending_transfers, params }
    }
}

impl SupplyView for LocalSupply<'_> {
    fn segment_speed(&self, seg: SegmentId) -> f64 {
        match self.segments.get(&seg) {
            Some(stats) => stats.speed(),
            None => self.view.segment(seg).map_or(self.params.min_speed_mps, |s| s.speed_mps),
        }
    }

    fn is_local(&self, seg: SegmentId) -> bool {
        self.segments.contains_key(&seg)
    }

    fn best_lane(&self, seg: SegmentId) -> LaneSlot {
        match self.segments.get(&seg) {
            Some(stats) => stats.best_lane(),
            None => self.view.segment(seg).map_or(LaneSlot::Lane(0), |s| s.best_lane),
        }
    }

    fn can_accept(&self, seg: SegmentId, vehicle_length: f64) -> bool {
        if let Some(stats) = self.segments.get(&seg) {
            return stats.can_accommodate(vehicle_length);
        }
        let Some(snap) = self.view.segment(seg) else { return false };
        let occupied = snap.occupancy + self.pending_transfers.get(&seg).copied().unwrap_or(0);
        occupied == 0 || occupied < snap.capacity_vehicles
    }

    fn output_counter(&self, seg: SegmentId, lane: LaneSlot) -> u32 {
        self.segments.get(&seg).map_or(0, |s| s.output_counter(lane))
    }

    fn output_flow_rate(&self, seg: SegmentId, lane: LaneSlot) -> f64 {
        self.segments.get(&seg).map_or(0.0, |s| s.output_flow_rate(lane))
    }

    fn queue_length(&self, seg: SegmentId, lane: LaneSlot) -> f64 {
        self.segments
            .get(&seg)
            .and_then(|s| s.lane(lane))
            .map_or(0.0, |l| l.queue_length_m())
    }

    fn position_of_last_updated_agent(&self, seg: SegmentId, lane: LaneSlot) -> Option<f64> {
        self.segments.get(&seg).and_then(|s| s.lane(lane)).and_then(|l| l.last_updated_position)
    }

    fn next_accept_secs(&self, seg: SegmentId, lane: LaneSlot) -> f64 {
        self.segments
            .get(&seg)
            .and_then(|s| s.lane(lane))
            .and_then(|l| l.params.as_ref())
            .map_or(f64::NEG_INFINITY, |p| p.next_accept_secs())
    }

    fn record_accept(&mut self, seg: SegmentId, lane: LaneSlot, secs: f64) {
        let params = self
            .segments
            .get_mut(&seg)
            .and_then(|s| s.lane_mut(lane))
            .and_then(|l| l.params.as_mut());
        if let Some(p) = params {
            p.last_accept_secs = secs;
        }
    }

    fn is_lane_front(&self, seg: SegmentId, lane: LaneSlot, person: PersonId) -> bool {
        self.segments
            .get(&seg)
            .and_then(|s| s.lane(lane))
            .is_some_and(|l| l.front() == Some(person))
    }
}
