//! The `Role` trait and the supply interface roles move against.

use std::fmt;

use meso_core::{LaneSlot, PersonId, RoleKind, SegmentId, Tick};
use meso_network::RoadNetwork;

use crate::{PersonResult, PersonState};

// ── SupplyView ────────────────────────────────────────────────────────────────

/// Read access to segment supply, plus the one write a role is allowed to
/// make (stamping a lane's last accept time when it enters it).
///
/// Implemented by the conflux for the duration of one person update.  For
/// segments the conflux owns the answers are live; for segments of other
/// confluxes they come from the per-tick snapshot.
pub trait SupplyView {
    /// Current speed on `seg` (m/s, always positive).
    fn segment_speed(&self, seg: SegmentId) -> f64;

    /// `true` if `seg` belongs to the conflux doing the update.
    fn is_local(&self, seg: SegmentId) -> bool;

    /// Lane with the fewest persons, ties broken by fewest queuing.
    fn best_lane(&self, seg: SegmentId) -> LaneSlot;

    /// `true` if one more vehicle of `vehicle_length` fits on `seg`.
    fn can_accept(&self, seg: SegmentId, vehicle_length: f64) -> bool;

    fn output_counter(&self, seg: SegmentId, lane: LaneSlot) -> u32;

    /// Discharge rate of the lane, vehicles per second.
    fn output_flow_rate(&self, seg: SegmentId, lane: LaneSlot) -> f64;

    /// Total length of queuing vehicles in the lane (m).
    fn queue_length(&self, seg: SegmentId, lane: LaneSlot) -> f64;

    /// Rear of the last person updated in this lane during the current tick.
    fn position_of_last_updated_agent(&self, seg: SegmentId, lane: LaneSlot) -> Option<f64>;

    /// Earliest simulated second at which the lane accepts another vehicle.
    fn next_accept_secs(&self, seg: SegmentId, lane: LaneSlot) -> f64;

    fn record_accept(&mut self, seg: SegmentId, lane: LaneSlot, secs: f64);

    /// `true` if `person` is at the head of the lane.
    fn is_lane_front(&self, seg: SegmentId, lane: LaneSlot, person: PersonId) -> bool;
}

// ── MovementContext ───────────────────────────────────────────────────────────

pub struct MovementContext<'a> {
    pub person:    PersonId,
    pub now:       Tick,
    /// Simulated seconds at the start of `now`.
    pub now_secs:  f64,
    pub tick_secs: f64,
    pub network:   &'a RoadNetwork,
    pub supply:    &'a mut dyn SupplyView,
}

impl MovementContext<'_> {
    /// Seconds of the tick already used by a person with `remaining` left.
    #[inline]
    pub fn elapsed(&self, remaining: f64) -> f64 {
        (self.tick_secs - remaining).max(0.0)
    }
}

// ── MovementRecord ────────────────────────────────────────────────────────────

/// What a role reports after a tick; used for trajectory traces and
/// determinism checks.
#[derive(Clone, Debug, PartialEq)]
pub struct MovementRecord {
    pub kind:            RoleKind,
    pub segment:         Option<SegmentId>,
    pub lane:            Option<LaneSlot>,
    pub distance_to_end: f64,
    pub is_queuing:      bool,
}

impl fmt::Display for MovementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.segment, self.lane) {
            (Some(seg), Some(lane)) => write!(
                f,
                "{:?} {seg} {lane} d={:.2}{}",
                self.kind,
                self.distance_to_end,
                if self.is_queuing { " queuing" } else { "" }
            ),
            (Some(seg), None) => write!(f, "{:?} {seg} virtual-queue", self.kind),
            _ => write!(f, "{:?}", self.kind),
        }
    }
}

// ── Role ──────────────────────────────────────────────────────────────────────

/// Movement facet of a person's current role.
///
/// `Send` because persons migrate between worker threads with their
/// messages.
pub trait Role: Send + fmt::Debug {
    fn kind(&self) -> RoleKind;

    /// Place the person at the start of this role (first segment in lane
    /// infinity for a driver, off-network for an activity).
    fn movement_init(
        &mut self,
        person:  PersonId,
        state:   &mut PersonState,
        network: &RoadNetwork,
    ) -> PersonResult<()>;

    /// Advance the person using up to `state.remaining_time` seconds.
    ///
    /// Returns when the budget is spent, when the role needs the conflux
    /// (`requested_next_segment` set), or when the current item is done
    /// (`to_be_removed` set).
    fn movement_tick(&mut self, state: &mut PersonState, ctx: &mut MovementContext<'_>) -> PersonResult<()>;

    fn movement_output(&self, state: &PersonState) -> MovementRecord {
        MovementRecord {
            kind:            self.kind(),
            segment:         state.segment,
            lane:            state.lane,
            distance_to_end: state.distance_to_end,
            is_queuing:      state.is_queuing,
        }
    }
}
