//! The `Sim` struct and its tick loop.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, error, info, trace};

use meso_conflux::{Conflux, ConfluxDirectory, ConfluxError, ConfluxResult, FrameView, SupplyReport, TickContext};
use meso_core::{ConfluxId, PersonId, SimClock, SimConfig, Tick, WorkerId};
use meso_network::RoadNetwork;
use meso_person::{Person, PersonPosition};

use crate::incident::{IncidentEvent, IncidentSchedule};
use crate::{SimError, SimObserver, SimResult, TickSummary, Worker};

// ── Sim ───────────────────────────────────────────────────────────────────────

/// The main simulation runner.
///
/// `Sim` holds every conflux, split across workers, and drives the phased
/// tick loop:
///
/// 0. **Start**: apply incidents that begin or end now and hand persons
///    whose start time has come to their starting conflux.
/// 1. **Movement** (optionally parallel with the `parallel` feature): every
///    conflux advances its persons against a frame snapshot of its
///    neighbours.
/// 2. **Deliver**: hand-offs produced by the movement phase, applied in
///    `(to, from, seq)` order.
/// 3. **Virtual queues** (parallel): every conflux admits the persons
///    waiting to enter it.
/// 4. **Deliver** again.
/// 5. **Supply** (parallel): speeds, lane metering, and virtual-queue
///    bounds for the next tick; statistics on output ticks.
///
/// The barrier between phases is the end of each parallel call.  Nothing a
/// worker does depends on which other worker holds a conflux, so results
/// are identical for any worker count.
///
/// Create via [`SimBuilder`][crate::SimBuilder].
pub struct Sim {
    /// Global configuration (total ticks, seed, tick duration, …).
    pub config: SimConfig,

    /// Tracks the current tick and maps ticks to sim seconds.
    pub clock: SimClock,

    /// Road network, shared read-only by every phase.
    pub network: RoadNetwork,

    /// Which conflux owns which node, link, and segment.
    pub directory: ConfluxDirectory,

    pub(crate) workers:   Vec<Worker>,
    /// Conflux → (worker, slot inside that worker).
    pub(crate) placement: Vec<(WorkerId, usize)>,
    /// Persons not yet started, ascending start time.
    pub(crate) pending:   VecDeque<Person>,
    pub(crate) incidents: IncidentSchedule,
    pub(crate) completed: usize,
}

impl Sim {
    // ── Public API ────────────────────────────────────────────────────────

    /// Run the simulation from the current tick to `config.end_tick()`.
    ///
    /// Calls observer hooks at every tick boundary.  Use
    /// [`NoopObserver`][crate::NoopObserver] if you don't need callbacks.
    pub fn run<O: SimObserver>(&mut self, observer: &mut O) -> SimResult<()> {
        info!(
            ticks = self.config.total_ticks,
            workers = self.workers.len(),
            confluxes = self.directory.len(),
            pending = self.pending.len(),
            "simulation started"
        );
        loop {
            let now = self.clock.current_tick;
            if now >= self.config.end_tick() {
                break;
            }
            self.step(now, observer)?;
        }
        observer.on_sim_end(self.clock.current_tick);
        info!(
            clock = %self.clock,
            completed = self.completed,
            active = self.active_count(),
            "simulation finished"
        );
        Ok(())
    }

    /// Run exactly `n` ticks from the current position (ignores `end_tick`).
    ///
    /// Useful for tests and incremental stepping.
    pub fn run_ticks<O: SimObserver>(&mut self, n: u64, observer: &mut O) -> SimResult<()> {
        for _ in 0..n {
            let now = self.clock.current_tick;
            self.step(now, observer)?;
        }
        Ok(())
    }

    fn step<O: SimObserver>(&mut self, now: Tick, observer: &mut O) -> SimResult<()> {
        observer.on_tick_start(now);
        let (summary, report) = self.process_tick(now)?;
        if let Some(report) = report {
            observer.on_supply(now, &report);
        }
        observer.on_tick_end(now, &summary);
        self.clock.advance();
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────────

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn conflux(&self, id: ConfluxId) -> Option<&Conflux> {
        let &(worker, slot) = self.placement.get(id.index())?;
        self.workers.get(worker.index())?.conflux(slot)
    }

    /// Every conflux in `ConfluxId` order.
    pub fn confluxes(&self) -> impl Iterator<Item = &Conflux> + '_ {
        self.directory.ids().filter_map(|id| self.conflux(id))
    }

    pub fn person(&self, id: PersonId) -> Option<&Person> {
        self.workers.iter().find_map(|w| w.registry().get(id))
    }

    /// Persons currently held by some conflux.
    pub fn active_count(&self) -> usize {
        self.workers.iter().map(|w| w.registry().len()).sum()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Persons whose trip chain has finished.
    pub fn completed_count(&self) -> usize {
        self.completed
    }

    /// Position of every active person, ascending `PersonId`.
    pub fn positions(&self) -> BTreeMap<PersonId, PersonPosition> {
        self.workers
            .iter()
            .flat_map(|w| w.registry().iter())
            .map(|p| (p.id, p.position()))
            .collect()
    }

    /// Check that every registered person sits in exactly one lane, virtual
    /// queue, or activity list, and that nothing else is held anywhere.
    pub fn verify_occupancy(&self) -> SimResult<()> {
        let mut seen: BTreeMap<PersonId, usize> = BTreeMap::new();
        for c in self.confluxes() {
            for id in c.all_persons() {
                *seen.entry(id).or_default() += 1;
            }
        }
        for w in &self.workers {
            for id in w.registry().ids() {
                if !seen.contains_key(&id) {
                    return Err(SimError::OccupancyViolation { person: id, count: 0 });
                }
            }
        }
        for (person, count) in seen {
            if count != 1 || self.person(person).is_none() {
                return Err(SimError::OccupancyViolation { person, count });
            }
        }
        Ok(())
    }

    /// Check that every physical lane is ordered by distance to the stop line.
    pub fn verify_lane_ordering(&self) -> SimResult<()> {
        let now = self.clock.current_tick;
        for w in &self.workers {
            w.verify_lane_ordering(now)?;
        }
        Ok(())
    }

    // ── Core tick processing ──────────────────────────────────────────────

    fn process_tick(&mut self, now: Tick) -> SimResult<(TickSummary, Option<SupplyReport>)> {
        let tick_secs = self.config.tick_duration_secs;
        let now_secs = self.clock.secs_at(now);

        // ── Phase 0: incidents and new persons ────────────────────────────
        self.apply_incidents(now)?;
        let started = self.start_pending(now_secs)?;

        // ── Phase 1: movement ─────────────────────────────────────────────
        let view = self.frame_view();
        let ctx = TickContext {
            now,
            now_secs,
            tick_secs,
            network: &self.network,
            directory: &self.directory,
            view: &view,
            params: &self.config.supply,
        };
        each_worker(&mut self.workers, |w| w.movement(&ctx)).map_err(|e| fatal(now, "movement", e))?;

        // ── Phase 2: deliver hand-offs ────────────────────────────────────
        let mut completed = self.deliver(now)?;

        // ── Phase 3: virtual queues ───────────────────────────────────────
        //
        // Every conflux now reports `last_updated == now`, so admissions
        // from a virtual queue are decided against live local supply.
        let view = self.frame_view();
        let ctx = TickContext {
            now,
            now_secs,
            tick_secs,
            network: &self.network,
            directory: &self.directory,
            view: &view,
            params: &self.config.supply,
        };
        each_worker(&mut self.workers, |w| w.process_virtual_queues(&ctx))
            .map_err(|e| fatal(now, "virtual queues", e))?;

        // ── Phase 4: deliver hand-offs ────────────────────────────────────
        completed += self.deliver(now)?;

        // ── Phase 5: supply ───────────────────────────────────────────────
        let report_tick = self.config.is_output_tick(now);
        let params = &self.config.supply;
        let reports = each_worker(&mut self.workers, |w| Ok(w.update_supply(now, tick_secs, params, report_tick)))
            .map_err(|e| fatal(now, "supply", e))?;
        let report = report_tick.then(|| merge_reports(reports));

        self.completed += completed;
        let summary = TickSummary {
            started,
            completed,
            active: self.active_count(),
            queued: self
                .confluxes()
                .map(|c| c.upstream_links().filter_map(|l| c.virtual_queue(l)).map(|q| q.len()).sum::<usize>())
                .sum(),
        };
        debug!(
            tick = %now,
            started,
            completed,
            active = summary.active,
            queued = summary.queued,
            "tick processed"
        );
        Ok((summary, report))
    }

    /// Snapshot of every conflux for the coming phase.
    fn frame_view(&self) -> FrameView {
        let mut view = FrameView::new(&self.network, self.directory.len());
        for w in &self.workers {
            w.write_snapshots(&mut view, &self.config.supply);
        }
        view
    }

    /// Route every outgoing message to its conflux.  Returns the number of
    /// persons that finished their trip chain.
    fn deliver(&mut self, now: Tick) -> SimResult<usize> {
        let mut envelopes = Vec::new();
        let mut removed: Vec<PersonId> = Vec::new();
        for w in &mut self.workers {
            let (e, r) = w.take_outboxes();
            envelopes.extend(e);
            removed.extend(r);
        }
        envelopes.sort_unstable();
        for env in envelopes {
            let Some(&(worker, slot)) = self.placement.get(env.to.index()) else {
                continue;
            };
            let target = &mut self.workers[worker.index()];
            target.deliver(slot, env.message).map_err(|e| fatal(now, "delivery", e))?;
        }
        for id in &removed {
            trace!(tick = %now, person = %id, "person removed");
        }
        Ok(removed.len())
    }

    fn start_pending(&mut self, now_secs: f64) -> SimResult<usize> {
        let mut started = 0;
        while self.pending.front().is_some_and(|p| p.start_secs() <= now_secs) {
            let Some(person) = self.pending.pop_front() else { break };
            let id = person.id;
            let Some(conflux) = self.directory.starting_conflux(&person, &self.network) else {
                return Err(SimError::NoStartingConflux { person: id });
            };
            let Some(&(worker, slot)) = self.placement.get(conflux.index()) else {
                return Err(SimError::NoStartingConflux { person: id });
            };
            self.workers[worker.index()].add_starting_person(slot, person)?;
            trace!(person = %id, %conflux, "person started");
            started += 1;
        }
        Ok(started)
    }

    fn apply_incidents(&mut self, now: Tick) -> SimResult<()> {
        let tick_secs = self.config.tick_duration_secs;
        for event in self.incidents.take(now) {
            let segment = match event {
                IncidentEvent::Start { segment, .. } | IncidentEvent::End { segment } => segment,
            };
            let owner = self.directory.conflux_of_segment(segment);
            let Some(&(worker, slot)) = self.placement.get(owner.index()) else { continue };
            let Some(conflux) = self.workers[worker.index()].conflux_mut(slot) else { continue };
            match event {
                IncidentEvent::Start { flow_rate, .. } => conflux.insert_incident(segment, flow_rate, tick_secs)?,
                IncidentEvent::End { .. } => conflux.remove_incident(segment, tick_secs)?,
            }
            info!(tick = %now, %segment, ?event, "incident applied");
        }
        Ok(())
    }
}

// ── Phase helpers ─────────────────────────────────────────────────────────────

/// Run `f` on every worker, in parallel with the `parallel` feature.
/// Results come back in worker order either way.
fn each_worker<T, F>(workers: &mut [Worker], f: F) -> ConfluxResult<Vec<T>>
where
    T: Send,
    F: Fn(&mut Worker) -> ConfluxResult<T> + Send + Sync,
{
    #[cfg(not(feature = "parallel"))]
    {
        workers.iter_mut().map(f).collect()
    }

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        workers.par_iter_mut().map(f).collect()
    }
}

fn fatal(now: Tick, phase: &str, e: ConfluxError) -> SimError {
    error!(tick = %now, phase, error = %e, "conflux invariant violated, stopping run");
    SimError::Conflux(e)
}

/// Rows of all workers, ascending segment and link.
fn merge_reports(reports: Vec<SupplyReport>) -> SupplyReport {
    let mut out = SupplyReport::default();
    for r in reports {
        out.extend(r);
    }
    out.segments.sort_by_key(|r| r.segment);
    out.links.sort_by_key(|r| r.link);
    out.link_stats.sort_by_key(|r| r.link);
    out
}
