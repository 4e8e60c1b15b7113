//! Activity performer: a person off the network until a fixed end time.

use meso_core::{NodeId, PersonId, RoleKind};
use meso_network::RoadNetwork;

use crate::{MovementContext, Permission, PersonResult, PersonState, Role};

#[derive(Clone, Debug)]
pub struct ActivityPerformer {
    location: NodeId,
    /// Simulated second at which the activity ends.
    end_secs: f64,
}

impl ActivityPerformer {
    pub fn new(location: NodeId, end_secs: f64) -> Self {
        Self { location, end_secs }
    }

    pub fn location(&self) -> NodeId {
        self.location
    }

    pub fn end_secs(&self) -> f64 {
        self.end_secs
    }
}

impl Role for ActivityPerformer {
    fn kind(&self) -> RoleKind {
        RoleKind::ActivityPerformer
    }

    fn movement_init(
        &mut self,
        _person:  PersonId,
        state:    &mut PersonState,
        _network: &RoadNetwork,
    ) -> PersonResult<()> {
        state.segment = None;
        state.lane = None;
        state.distance_to_end = 0.0;
        state.is_queuing = false;
        state.requested_next_segment = None;
        state.permission = Permission::None;
        state.to_be_removed = false;
        Ok(())
    }

    fn movement_tick(&mut self, state: &mut PersonState, ctx: &mut MovementContext<'_>) -> PersonResult<()> {
        if ctx.now_secs >= self.end_secs {
            state.to_be_removed = true;
        } else {
            state.remaining_time = 0.0;
        }
        Ok(())
    }
}
