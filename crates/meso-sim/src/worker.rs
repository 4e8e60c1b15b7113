//! One partition of confluxes and the persons they hold.

use meso_conflux::{Conflux, ConfluxMessage, ConfluxResult, Envelope, FrameView, SupplyReport, TickContext};
use meso_core::{PersonId, SupplyParams, Tick, WorkerId};
use meso_person::{Person, PersonRegistry};

/// A worker owns a disjoint set of confluxes and the registry of every
/// person those confluxes hold.  Within a phase a worker touches nothing
/// outside itself, so workers of one phase may run on different threads.
#[derive(Debug)]
pub struct Worker {
    pub id:    WorkerId,
    confluxes: Vec<Conflux>,
    registry:  PersonRegistry,
}

impl Worker {
    pub fn new(id: WorkerId, mut confluxes: Vec<Conflux>) -> Self {
        for c in &mut confluxes {
            c.set_parent_worker(id);
        }
        Self { id, confluxes, registry: PersonRegistry::new() }
    }

    pub fn confluxes(&self) -> &[Conflux] {
        &self.confluxes
    }

    pub fn conflux(&self, slot: usize) -> Option<&Conflux> {
        self.confluxes.get(slot)
    }

    pub fn conflux_mut(&mut self, slot: usize) -> Option<&mut Conflux> {
        self.confluxes.get_mut(slot)
    }

    pub fn registry(&self) -> &PersonRegistry {
        &self.registry
    }

    /// Hand a person entering the simulation to the conflux in `slot`.
    pub fn add_starting_person(&mut self, slot: usize, person: Person) -> ConfluxResult<()> {
        match self.confluxes.get_mut(slot) {
            Some(c) => c.add_starting_person(person, &mut self.registry),
            None => Ok(()),
        }
    }

    pub fn deliver(&mut self, slot: usize, message: ConfluxMessage) -> ConfluxResult<()> {
        match self.confluxes.get_mut(slot) {
            Some(c) => c.deliver(message, &mut self.registry),
            None => Ok(()),
        }
    }

    pub fn write_snapshots(&self, view: &mut FrameView, params: &SupplyParams) {
        for c in &self.confluxes {
            c.write_snapshot(view, params);
        }
    }

    // ── Phases ────────────────────────────────────────────────────────────

    pub fn movement(&mut self, ctx: &TickContext<'_>) -> ConfluxResult<()> {
        for c in &mut self.confluxes {
            c.update(ctx, &mut self.registry)?;
        }
        Ok(())
    }

    pub fn process_virtual_queues(&mut self, ctx: &TickContext<'_>) -> ConfluxResult<()> {
        for c in &mut self.confluxes {
            c.process_virtual_queues(ctx, &mut self.registry)?;
        }
        Ok(())
    }

    pub fn update_supply(&mut self, now: Tick, tick_secs: f64, params: &SupplyParams, report: bool) -> SupplyReport {
        let mut out = SupplyReport::default();
        for c in &mut self.confluxes {
            out.extend(c.update_supply(now, tick_secs, params, report));
        }
        out
    }

    /// Collect the messages and removals of every conflux.
    pub fn take_outboxes(&mut self) -> (Vec<Envelope>, Vec<PersonId>) {
        let mut envelopes = Vec::new();
        let mut removed = Vec::new();
        for c in &mut self.confluxes {
            let (e, r) = c.take_outbox();
            envelopes.extend(e);
            removed.extend(r);
        }
        (envelopes, removed)
    }

    pub fn verify_lane_ordering(&self, tick: Tick) -> ConfluxResult<()> {
        for c in &self.confluxes {
            c.verify_lane_ordering(&self.registry, tick)?;
        }
        Ok(())
    }
}
