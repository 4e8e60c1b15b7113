//! The `Person` entity.

use meso_core::{PersonId, RoleKind};
use meso_network::RoadNetwork;

use crate::{
    ActivityPerformer, Driver, MovementRecord, PersonError, PersonPosition, PersonResult,
    PersonState, Role, TripChain, TripChainItem,
};

/// Outcome of moving a person to the next trip-chain item.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ChainStep {
    /// The chain is exhausted; the person leaves the simulation.
    Done,
    Activity,
    Trip,
}

#[derive(Debug)]
pub struct Person {
    pub id:    PersonId,
    pub state: PersonState,
    pub role:  Box<dyn Role>,
    chain:     TripChain,
}

impl Person {
    /// Build a person and initialise the role of the chain's first item.
    ///
    /// Every trip in the chain must carry a non-empty path.
    pub fn new(
        id:             PersonId,
        mut chain:      TripChain,
        network:        &RoadNetwork,
        vehicle_length: f64,
    ) -> PersonResult<Person> {
        let empty_trip = chain
            .items()
            .iter()
            .any(|item| matches!(item, TripChainItem::Trip(t) if t.path.is_empty()));
        if empty_trip {
            return Err(PersonError::EmptyPath { person: id });
        }
        let Some(first) = chain.advance() else {
            return Err(PersonError::InvalidState { person: id, reason: "empty trip chain".into() });
        };
        let mut role: Box<dyn Role> = match first {
            TripChainItem::Trip(t) => Box::new(Driver::new(t.path.clone())),
            TripChainItem::Activity(a) => Box::new(ActivityPerformer::new(a.location, a.end_secs)),
        };
        let mut state = PersonState::new(vehicle_length);
        role.movement_init(id, &mut state, network)?;
        Ok(Person { id, state, role, chain })
    }

    pub fn chain(&self) -> &TripChain {
        &self.chain
    }

    /// Planned start of the first item, simulated seconds.
    pub fn start_secs(&self) -> f64 {
        self.chain.items().first().map_or(0.0, TripChainItem::start_secs)
    }

    #[inline]
    pub fn role_kind(&self) -> RoleKind {
        self.role.kind()
    }

    pub fn position(&self) -> PersonPosition {
        PersonPosition {
            role:            self.role.kind(),
            segment:         self.state.segment,
            lane:            self.state.lane,
            is_queuing:      self.state.is_queuing,
            distance_to_end: self.state.distance_to_end,
            vehicle_length:  self.state.vehicle_length,
        }
    }

    pub fn movement_output(&self) -> MovementRecord {
        self.role.movement_output(&self.state)
    }

    /// Finish the current item and start the next one.
    ///
    /// A follow-on activity starts one tick after `now_secs` and keeps its
    /// planned duration; a follow-on trip starts immediately in lane
    /// infinity of its first segment.
    pub fn switch_trip_chain_item(
        &mut self,
        now_secs:  f64,
        tick_secs: f64,
        network:   &RoadNetwork,
    ) -> PersonResult<ChainStep> {
        let (role, step): (Box<dyn Role>, ChainStep) = match self.chain.advance() {
            None => return Ok(ChainStep::Done),
            Some(TripChainItem::Activity(a)) => {
                let start = now_secs + tick_secs;
                let end = start + a.duration_secs();
                (Box::new(ActivityPerformer::new(a.location, end)), ChainStep::Activity)
            }
            Some(TripChainItem::Trip(t)) => (Box::new(Driver::new(t.path.clone())), ChainStep::Trip),
        };
        self.role = role;
        self.state.to_be_removed = false;
        self.role.movement_init(self.id, &mut self.state, network)?;
        tracing::trace!(person = %self.id, ?step, "trip chain advanced");
        Ok(step)
    }
}
