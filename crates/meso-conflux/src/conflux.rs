//! The conflux: one intersection's upstream segments, virtual queues, and
//! activity performers, advanced together once per tick.
//!
//! # Tick anatomy
//!
//! ```text
//! update()                       movement phase
//!   reset lane markers and blocked persons' time budgets
//!   snapshot lane fronts, pick one candidate per incoming link
//!   loop: closest-to-intersection candidate → update_agent → refill
//!   activity performers
//! process_virtual_queues()       after every conflux finished update()
//! update_supply()                speeds, lane metering, vq bounds
//! ```
//!
//! `update_agent` takes the person out of the worker registry, lets its
//! role move it, and then does all lane bookkeeping by comparing the
//! person's position before and after.  A person ends up in exactly one
//! place: back in the registry and in one local container, inside an
//! outgoing message, or removed.

use std::collections::{BTreeMap, VecDeque};

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use meso_core::{
    ConfluxId, ConfluxRng, LaneSlot, LinkId, NodeId, PersonId, RoleKind, SegmentId, SupplyParams, Tick, WorkerId,
};
use meso_network::RoadNetwork;
use meso_person::{
    ChainStep, LinkExit, MovementContext, Permission, Person, PersonError, PersonPosition, PersonRegistry,
};

use crate::segment::choose_closest;
use crate::{
    ConfluxDirectory, ConfluxError, ConfluxMessage, ConfluxResult, Envelope, FrameView, LinkSnapshot,
    LinkStatsRow, LinkTravelTimes, LocalSupply, Outbox, SegmentSnapshot, SegmentStats, SupplyReport,
};

/// Everything shared by all confluxes during one phase of one tick.
#[derive(Clone, Copy)]
pub struct TickContext<'a> {
    pub now:       Tick,
    /// Simulated seconds at the start of `now`.
    pub now_secs:  f64,
    pub tick_secs: f64,
    pub network:   &'a RoadNetwork,
    pub directory: &'a ConfluxDirectory,
    pub view:      &'a FrameView,
    pub params:    &'a SupplyParams,
}

/// Result of a conflux update.  Confluxes live for the whole run, so the
/// only status is `Continue`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum UpdateStatus {
    Continue,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum FrameOutcome {
    Continue,
    Done,
}

/// Virtual-queue admission: room left under the bound, or a person refused
/// for long enough that the bound no longer applies to it.
fn admits(bound: u32, admitted: u32, ticks_stuck: u32, stuck_threshold: u32) -> bool {
    bound > admitted || ticks_stuck >= stuck_threshold
}

/// Frontier slot of one incoming link.
#[derive(Copy, Clone, Debug)]
struct Candidate {
    /// Index into the link's segment list.
    seg_idx: usize,
    person:  Option<PersonId>,
}

#[derive(Debug)]
pub struct Conflux {
    id:     ConfluxId,
    node:   NodeId,
    /// Worker whose partition holds this conflux.
    parent: WorkerId,

    /// Segments of every incoming link, upstream first.
    upstream:            BTreeMap<LinkId, Vec<SegmentId>>,
    segments:            FxHashMap<SegmentId, SegmentStats>,
    virtual_queues:      BTreeMap<LinkId, VecDeque<PersonId>>,
    vq_bounds:           BTreeMap<LinkId, u32>,
    /// Admissions per virtual queue since the bounds were last reset.
    vq_admitted:         BTreeMap<LinkId, u32>,
    stuck_threshold:     u32,
    activity_performers: Vec<PersonId>,

    candidates:        BTreeMap<LinkId, Candidate>,
    link_travel_times: LinkTravelTimes,
    last_updated:      Option<Tick>,
    rng:               ConfluxRng,
    outbox:            Outbox,
}

impl Conflux {
    /// Build the conflux at `node` and initialise lane metering and
    /// virtual-queue bounds for the first tick.
    pub fn new(
        id:        ConfluxId,
        node:      NodeId,
        network:   &RoadNetwork,
        params:    &SupplyParams,
        tick_secs: f64,
        seed:      u64,
    ) -> Self {
        let mut upstream = BTreeMap::new();
        let mut segments = FxHashMap::default();
        let mut virtual_queues = BTreeMap::new();
        for &link in network.in_links(node) {
            let segs = network.link(link).segments.clone();
            for &s in &segs {
                let mut stats = SegmentStats::new(id, network.segment(s));
                stats.update_lane_params(tick_secs, params);
                segments.insert(s, stats);
            }
            upstream.insert(link, segs);
            virtual_queues.insert(link, VecDeque::new());
        }
        let mut conflux = Self {
            id,
            node,
            parent: WorkerId(0),
            upstream,
            segments,
            virtual_queues,
            vq_bounds: BTreeMap::new(),
            vq_admitted: BTreeMap::new(),
            stuck_threshold: params.evade_vq_bounds_threshold_ticks,
            activity_performers: Vec::new(),
            candidates: BTreeMap::new(),
            link_travel_times: LinkTravelTimes::new(),
            last_updated: None,
            rng: ConfluxRng::new(seed, id),
            outbox: Outbox::new(id),
        };
        conflux.reset_output_bounds(params);
        conflux
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn id(&self) -> ConfluxId {
        self.id
    }

    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    #[inline]
    pub fn parent_worker(&self) -> WorkerId {
        self.parent
    }

    /// Record which worker owns this conflux.  Set when the worker is built.
    #[inline]
    pub fn set_parent_worker(&mut self, worker: WorkerId) {
        self.parent = worker;
    }

    /// The last tick this conflux finished its movement phase for.
    #[inline]
    pub fn last_updated(&self) -> Option<Tick> {
        self.last_updated
    }

    pub fn upstream_links(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.upstream.keys().copied()
    }

    /// Owned segments, grouped by link in ascending link order, upstream
    /// first within each link.
    pub fn segment_ids(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.upstream.values().flatten().copied()
    }

    #[inline]
    pub fn owns_segment(&self, seg: SegmentId) -> bool {
        self.segments.contains_key(&seg)
    }

    pub fn find_seg_stats(&self, seg: SegmentId) -> Option<&SegmentStats> {
        self.segments.get(&seg)
    }

    pub fn segment_speed(&self, seg: SegmentId) -> Option<f64> {
        self.segments.get(&seg).map(SegmentStats::speed)
    }

    pub fn output_flow_rate(&self, seg: SegmentId, lane: LaneSlot) -> Option<f64> {
        self.segments.get(&seg).map(|s| s.output_flow_rate(lane))
    }

    pub fn num_moving_in_segment(&self, seg: SegmentId) -> Option<u32> {
        self.segments.get(&seg).map(SegmentStats::num_moving)
    }

    pub fn num_queueing_in_segment(&self, seg: SegmentId) -> Option<u32> {
        self.segments.get(&seg).map(SegmentStats::num_queueing)
    }

    pub fn lane_agent_counts(&self, seg: SegmentId) -> Option<Vec<(LaneSlot, usize)>> {
        self.segments.get(&seg).map(SegmentStats::lane_agent_counts)
    }

    pub fn activity_performers(&self) -> &[PersonId] {
        &self.activity_performers
    }

    pub fn virtual_queue(&self, link: LinkId) -> Option<&VecDeque<PersonId>> {
        self.virtual_queues.get(&link)
    }

    pub fn vq_bound(&self, link: LinkId) -> u32 {
        self.vq_bounds.get(&link).copied().unwrap_or(0)
    }

    pub fn link_travel_times(&self) -> &LinkTravelTimes {
        &self.link_travel_times
    }

    /// Every person this conflux contains: segment lanes (lane infinity
    /// included), virtual queues, then activity performers.
    pub fn all_persons(&self) -> Vec<PersonId> {
        let mut out: Vec<PersonId> = self
            .segment_ids()
            .filter_map(|s| self.segments.get(&s))
            .flat_map(SegmentStats::persons)
            .collect();
        out.extend(self.virtual_queues.values().flatten().copied());
        out.extend(self.activity_performers.iter().copied());
        out
    }

    /// Hand over the messages and removals produced since the last call.
    pub fn take_outbox(&mut self) -> (Vec<Envelope>, Vec<PersonId>) {
        self.outbox.drain()
    }

    fn stats_mut(&mut self, seg: SegmentId) -> ConfluxResult<&mut SegmentStats> {
        let conflux = self.id;
        self.segments
            .get_mut(&seg)
            .ok_or(ConfluxError::UnknownSegment { conflux, segment: seg })
    }

    // ── Virtual queues ────────────────────────────────────────────────────

    /// `true` if the virtual queue of `link` may take one more person that
    /// has been refused for `ticks_stuck` ticks in a row.
    pub fn has_space_in_virtual_queue(&self, link: LinkId, ticks_stuck: u32) -> bool {
        let admitted = self.vq_admitted.get(&link).copied().unwrap_or(0);
        admits(self.vq_bound(link), admitted, ticks_stuck, self.stuck_threshold)
    }

    /// Admit `person` into the virtual queue of `link`.  Counts against the
    /// bound until the next supply phase.
    pub fn push_back_onto_virtual_queue(&mut self, link: LinkId, person: PersonId) -> ConfluxResult<()> {
        self.requeue(link, person)?;
        *self.vq_admitted.entry(link).or_insert(0) += 1;
        Ok(())
    }

    /// Put a person back into a virtual queue it already holds a place in.
    fn requeue(&mut self, link: LinkId, person: PersonId) -> ConfluxResult<()> {
        let conflux = self.id;
        self.virtual_queues
            .get_mut(&link)
            .ok_or(ConfluxError::UnknownLink { conflux, link })?
            .push_back(person);
        Ok(())
    }

    /// Admission check for another conflux's virtual queue, against the
    /// frame snapshot plus what this conflux already sent there.  Only the
    /// conflux at a link's upstream node ever sends into its queue, so the
    /// two together are exact.
    fn admits_into_foreign_queue(&self, link: LinkId, ticks_stuck: u32, view: &FrameView) -> bool {
        let snap = view.link(link);
        let admitted = snap.vq_admitted + self.outbox.pending_virtual_queue(link);
        admits(snap.vq_bound, admitted, ticks_stuck, self.stuck_threshold)
    }

    /// Advance everyone waiting in this conflux's virtual queues, longest
    /// remaining time first.  Persons that cannot enter go back into the
    /// queue.
    pub fn process_virtual_queues(
        &mut self,
        ctx:      &TickContext<'_>,
        registry: &mut PersonRegistry,
    ) -> ConfluxResult<()> {
        let links: Vec<LinkId> = self.virtual_queues.keys().copied().collect();
        for link in links {
            let Some(queue) = self.virtual_queues.get_mut(&link) else { continue };
            let queue = std::mem::take(queue);
            if queue.is_empty() {
                continue;
            }
            let mut ordered: Vec<(PersonId, f64)> = queue
                .iter()
                .map(|&id| (id, registry.get(id).map_or(0.0, |p| p.state.remaining_time)))
                .collect();
            ordered.sort_by(|a, b| b.1.total_cmp(&a.1));
            trace!(conflux = %self.id, %link, count = ordered.len(), "draining virtual queue");
            for (id, _) in ordered {
                self.update_agent(id, ctx, registry)?;
            }
        }
        Ok(())
    }

    /// Recompute the admission ceiling of every virtual queue from the free
    /// space on the first segment of its link.  Returns the summed bounds.
    pub fn reset_output_bounds(&mut self, params: &SupplyParams) -> u32 {
        self.vq_admitted.clear();
        let mut total = 0;
        for (&link, segs) in &self.upstream {
            let Some(stats) = segs.first().and_then(|s| self.segments.get(s)) else { continue };
            let spaces = (stats.capacity_length_m() / params.avg_vehicle_length_m).ceil() as i64;
            let vq_len = self.virtual_queues.get(&link).map_or(0, VecDeque::len) as i64;
            let occupied = i64::from(stats.num_moving()) + i64::from(stats.num_queueing());
            let bound = (spaces - occupied - vq_len).max(0) as u32;
            self.vq_bounds.insert(link, bound);
            total += bound;
        }
        total
    }

    // ── Entry points for the simulation ───────────────────────────────────

    /// Place a person entering the simulation: lane infinity of its first
    /// segment, or the activity list.
    pub fn add_starting_person(&mut self, person: Person, registry: &mut PersonRegistry) -> ConfluxResult<()> {
        let id = person.id;
        match (person.state.segment, person.state.lane) {
            (None, _) => self.activity_performers.push(id),
            (Some(seg), Some(lane)) => {
                let (d, q, len) = (person.state.distance_to_end, person.state.is_queuing, person.state.vehicle_length);
                self.stats_mut(seg)?.add_person(lane, id, d, q, len, registry)?;
            }
            (Some(seg), None) => {
                let link = self.segments.get(&seg).map(|s| s.link);
                let conflux = self.id;
                let link = link.ok_or(ConfluxError::UnknownSegment { conflux, segment: seg })?;
                self.requeue(link, id)?;
            }
        }
        registry.insert(person);
        Ok(())
    }

    /// Apply a message sent to this conflux by a neighbour.
    pub fn deliver(&mut self, message: ConfluxMessage, registry: &mut PersonRegistry) -> ConfluxResult<()> {
        match message {
            ConfluxMessage::VirtualQueue { link, person } => {
                self.push_back_onto_virtual_queue(link, person.id)?;
                registry.insert(*person);
            }
            ConfluxMessage::Transfer { segment, lane, person } => {
                let s = &person.state;
                let (d, q, len) = (s.distance_to_end, s.is_queuing, s.vehicle_length);
                self.stats_mut(segment)?.add_person(lane, person.id, d, q, len, registry)?;
                registry.insert(*person);
            }
        }
        Ok(())
    }

    /// Override the discharge rate of every lane of `seg`.
    pub fn insert_incident(&mut self, seg: SegmentId, flow_rate: f64, tick_secs: f64) -> ConfluxResult<()> {
        self.stats_mut(seg)?.insert_incident(flow_rate, tick_secs);
        debug!(conflux = %self.id, segment = %seg, flow_rate, "incident inserted");
        Ok(())
    }

    pub fn remove_incident(&mut self, seg: SegmentId, tick_secs: f64) -> ConfluxResult<()> {
        self.stats_mut(seg)?.remove_incident(tick_secs);
        debug!(conflux = %self.id, segment = %seg, "incident removed");
        Ok(())
    }

    /// Publish what other confluxes may read about this one.
    pub fn write_snapshot(&self, view: &mut FrameView, params: &SupplyParams) {
        view.set_last_updated(self.id, self.last_updated);
        for (&seg, stats) in &self.segments {
            view.set_segment(seg, SegmentSnapshot {
                speed_mps:         stats.speed(),
                occupancy:         stats.num_moving() + stats.num_queueing(),
                capacity_vehicles: stats.capacity_vehicles(params.vehicle_length_m),
                best_lane:         stats.best_lane(),
                length_m:          stats.length_m,
            });
        }
        for &link in self.virtual_queues.keys() {
            let vq_admitted = self.vq_admitted.get(&link).copied().unwrap_or(0);
            view.set_link(link, LinkSnapshot { vq_bound: self.vq_bound(link), vq_admitted });
        }
    }

    pub fn verify_lane_ordering(&self, registry: &PersonRegistry, tick: Tick) -> ConfluxResult<()> {
        for stats in self.segments.values() {
            stats.verify_ordering(registry, tick)?;
        }
        Ok(())
    }

    // ── Movement phase ────────────────────────────────────────────────────

    pub fn update(&mut self, ctx: &TickContext<'_>, registry: &mut PersonRegistry) -> ConfluxResult<UpdateStatus> {
        self.reset_last_updated_positions();
        self.reset_person_rem_times(ctx, registry);
        self.init_candidate_agents(ctx.now, registry);

        let mut moved = 0usize;
        while let Some((link, person)) = self.agent_closest_to_intersection(ctx, registry)? {
            self.update_agent(person, ctx, registry)?;
            self.refill_candidate(link, ctx.now, registry);
            moved += 1;
        }

        // The list changes while persons finish or start activities.
        let performers = self.activity_performers.clone();
        for id in performers {
            if registry.get(id).is_some_and(|p| p.state.is_stale(ctx.now)) {
                self.update_agent(id, ctx, registry)?;
            }
        }

        self.last_updated = Some(ctx.now);
        debug!(
            conflux = %self.id,
            tick = %ctx.now,
            moved,
            activities = self.activity_performers.len(),
            "conflux updated"
        );
        Ok(UpdateStatus::Continue)
    }

    fn reset_last_updated_positions(&mut self) {
        for stats in self.segments.values_mut() {
            stats.reset_last_updated_positions();
        }
    }

    /// Persons still in lane infinity or a virtual queue from an earlier
    /// tick get a full tick of budget.
    fn reset_person_rem_times(&self, ctx: &TickContext<'_>, registry: &mut PersonRegistry) {
        let waiting = self
            .segments
            .values()
            .flat_map(|s| s.lane_infinity().persons().iter())
            .chain(self.virtual_queues.values().flatten());
        for &id in waiting {
            if let Some(p) = registry.get_mut(id) {
                if p.state.is_stale(ctx.now) {
                    p.state.remaining_time = ctx.tick_secs;
                }
            }
        }
    }

    fn init_candidate_agents(&mut self, now: Tick, registry: &PersonRegistry) {
        for stats in self.segments.values_mut() {
            stats.reset_frontal_agents();
        }
        self.candidates.clear();
        let links: Vec<(LinkId, usize)> = self
            .upstream
            .iter()
            .map(|(&link, segs)| (link, segs.len().saturating_sub(1)))
            .collect();
        for (link, last) in links {
            let candidate = self.next_candidate(link, last, now, registry);
            self.candidates.insert(link, candidate);
        }
    }

    /// Walk upstream from `start` until a segment yields a frontal person.
    fn next_candidate(&mut self, link: LinkId, start: usize, now: Tick, registry: &PersonRegistry) -> Candidate {
        let Some(segs) = self.upstream.get(&link) else {
            return Candidate { seg_idx: 0, person: None };
        };
        let mut idx = start.min(segs.len().saturating_sub(1));
        loop {
            if let Some(stats) = segs.get(idx).and_then(|s| self.segments.get_mut(s)) {
                if let Some(person) = stats.agent_closest_to_stop_line(registry, now, &mut self.rng) {
                    return Candidate { seg_idx: idx, person: Some(person) };
                }
            }
            if idx == 0 {
                return Candidate { seg_idx: 0, person: None };
            }
            idx -= 1;
        }
    }

    fn refill_candidate(&mut self, link: LinkId, now: Tick, registry: &PersonRegistry) {
        let Some(start) = self.candidates.get(&link).map(|c| c.seg_idx) else { return };
        let candidate = self.next_candidate(link, start, now, registry);
        self.candidates.insert(link, candidate);
    }

    /// Seconds for a person `distance` metres before the end of segment
    /// `seg_idx` to reach the end of `link` at current segment speeds.
    fn time_to_end_of_link(&self, link: LinkId, seg_idx: usize, distance: f64) -> f64 {
        let Some(segs) = self.upstream.get(&link) else { return f64::NAN };
        let mut secs = 0.0;
        for (i, seg) in segs.iter().enumerate().skip(seg_idx) {
            let Some(stats) = self.segments.get(seg) else { return f64::NAN };
            let d = if i == seg_idx { distance } else { stats.length_m };
            secs += d / stats.speed();
        }
        secs
    }

    /// The frontier candidate with the least time to its link's end.
    fn agent_closest_to_intersection(
        &mut self,
        ctx:      &TickContext<'_>,
        registry: &PersonRegistry,
    ) -> ConfluxResult<Option<(LinkId, PersonId)>> {
        loop {
            let mut times: Vec<((LinkId, PersonId), f64)> = Vec::with_capacity(self.candidates.len());
            let mut vanished: Vec<LinkId> = Vec::new();
            for (&link, cand) in &self.candidates {
                let Some(id) = cand.person else { continue };
                let Some(p) = registry.get(id) else {
                    vanished.push(link);
                    continue;
                };
                let secs = self.time_to_end_of_link(link, cand.seg_idx, p.state.distance_to_end);
                if secs.is_nan() || secs < 0.0 {
                    return Err(ConfluxError::InvalidTimeToIntersection {
                        conflux: self.id,
                        tick:    ctx.now,
                        person:  id,
                        value:   secs,
                    });
                }
                times.push(((link, id), secs));
            }
            if vanished.is_empty() {
                return Ok(choose_closest(&times, &mut self.rng));
            }
            for link in vanished {
                self.refill_candidate(link, ctx.now, registry);
            }
        }
    }

    // ── Person update ─────────────────────────────────────────────────────

    /// Move one person and do the resulting bookkeeping.
    ///
    /// The caller must already have taken the person out of any virtual
    /// queue; lane and activity membership is handled here.
    pub fn update_agent(
        &mut self,
        id:       PersonId,
        ctx:      &TickContext<'_>,
        registry: &mut PersonRegistry,
    ) -> ConfluxResult<()> {
        let Some(mut person) = registry.remove(id) else {
            return Err(ConfluxError::UnknownPerson { conflux: self.id, tick: ctx.now, person: id });
        };
        if person.state.is_stale(ctx.now) {
            person.state.remaining_time = ctx.tick_secs;
        }
        let before = person.position();
        if let Some(seg) = before.segment {
            if !self.owns_segment(seg) {
                return Err(ConfluxError::ForeignSegment { conflux: self.id, tick: ctx.now, person: id, segment: seg });
            }
        }
        match self.call_movement_frame_tick(&mut person, ctx)? {
            FrameOutcome::Done => self.kill_agent(person, &before, ctx),
            FrameOutcome::Continue => self.housekeep(person, &before, ctx, registry),
        }
    }

    fn movement_error(&self, ctx: &TickContext<'_>, person: PersonId, source: PersonError) -> ConfluxError {
        ConfluxError::Movement { conflux: self.id, tick: ctx.now, person, source }
    }

    /// Drive the person's role until its time budget for the tick is spent,
    /// answering link-crossing requests along the way.
    fn call_movement_frame_tick(&mut self, person: &mut Person, ctx: &TickContext<'_>) -> ConfluxResult<FrameOutcome> {
        let pid = person.id;
        person.state.last_updated = Some(ctx.now);
        let start_link = person.state.segment.map(|s| ctx.network.link_of(s));
        let mut refused = false;

        while person.state.remaining_time > 0.0 {
            if !person.state.to_be_removed {
                let mut supply =
                    LocalSupply::new(&mut self.segments, ctx.view, &self.outbox.pending_transfers, ctx.params);
                let mut mctx = MovementContext {
                    person:    pid,
                    now:       ctx.now,
                    now_secs:  ctx.now_secs,
                    tick_secs: ctx.tick_secs,
                    network:   ctx.network,
                    supply:    &mut supply,
                };
                let res = person.role.movement_tick(&mut person.state, &mut mctx);
                res.map_err(|e| self.movement_error(ctx, pid, e))?;
                if person.role_kind() == RoleKind::ActivityPerformer {
                    person.state.remaining_time = 0.0;
                }
            }

            if person.state.to_be_removed {
                let step = person
                    .switch_trip_chain_item(ctx.now_secs, ctx.tick_secs, ctx.network)
                    .map_err(|e| self.movement_error(ctx, pid, e))?;
                match step {
                    ChainStep::Done => return Ok(FrameOutcome::Done),
                    ChainStep::Trip => {
                        // A trip starting on another conflux's segment moves from next tick.
                        if person.state.segment.is_some_and(|s| !self.owns_segment(s)) {
                            person.state.remaining_time = 0.0;
                        }
                    }
                    ChainStep::Activity => {}
                }
            }

            let Some(next) = person.state.requested_next_segment else { continue };
            person.state.permission = Permission::Granted;
            let next_conflux = ctx.directory.conflux_of_segment(next);
            let next_last = if next_conflux == self.id {
                self.last_updated
            } else {
                ctx.view.last_updated(next_conflux)
            };
            let (cur_seg, cur_lane) = (person.state.segment, person.state.lane);

            match next_last {
                Some(t) if t == ctx.now => {
                    // Already advanced this tick: cross directly, metered by
                    // the current lane.
                    if !self.take_output_slot(cur_seg, cur_lane) {
                        person.state.permission = Permission::Denied;
                        refused = true;
                    }
                    person.state.requested_next_segment = None;
                }
                Some(t) if t > ctx.now => {
                    return Err(ConfluxError::LastUpdatedMismanaged {
                        conflux:           self.id,
                        tick:              ctx.now,
                        next:              next_conflux,
                        next_last_updated: t,
                    });
                }
                _ if next_conflux == self.id => {
                    // A link that loops back into this conflux: hold at the
                    // stop line with permission and cross next tick.
                    person.state.remaining_time = 0.0;
                    person.state.requested_next_segment = None;
                    break;
                }
                _ => {
                    let link = ctx.network.link_of(next);
                    let counter = match (cur_seg, cur_lane) {
                        (Some(s), Some(l)) => self.segments.get(&s).map_or(0, |st| st.output_counter(l)),
                        _ => 0,
                    };
                    let ticks_stuck = person.state.ticks_stuck;
                    if self.admits_into_foreign_queue(link, ticks_stuck, ctx.view) && counter > 0 {
                        if ticks_stuck >= self.stuck_threshold {
                            debug!(conflux = %self.id, person = %pid, %link, ticks_stuck, "stuck person admitted to virtual queue");
                        }
                        if !self.take_output_slot(cur_seg, cur_lane) {
                            let (segment, lane) = (cur_seg.unwrap_or_default(), cur_lane.unwrap_or(LaneSlot::Infinity));
                            return Err(ConfluxError::OutputCounterExhausted {
                                conflux: self.id,
                                tick: ctx.now,
                                segment,
                                lane,
                            });
                        }
                        if let Some(seg) = cur_seg {
                            let exit_secs = ctx.now_secs + (ctx.tick_secs - person.state.remaining_time).max(0.0);
                            person.state.link_exits.push(LinkExit {
                                link:       ctx.network.link_of(seg),
                                entry_secs: person.state.link_entry_secs,
                                exit_secs,
                            });
                            person.state.link_entry_secs = exit_secs;
                        }
                        person.state.segment = Some(next);
                        person.state.lane = None;
                        person.state.requested_next_segment = None;
                        break;
                    }
                    person.state.permission = Permission::Denied;
                    person.state.requested_next_segment = None;
                    refused = true;
                }
            }
        }

        if person.state.segment.map(|s| ctx.network.link_of(s)) != start_link {
            person.state.ticks_stuck = 0;
        } else if refused {
            person.state.ticks_stuck += 1;
        }

        trace!(conflux = %self.id, person = %pid, output = %person.movement_output(), "movement");
        Ok(FrameOutcome::Continue)
    }

    /// Decrement the output counter of the person's current lane.  `false`
    /// if the lane has no vehicles left to release this tick.
    fn take_output_slot(&mut self, seg: Option<SegmentId>, lane: Option<LaneSlot>) -> bool {
        let (Some(seg), Some(lane)) = (seg, lane) else { return false };
        self.segments
            .get_mut(&seg)
            .and_then(|s| s.lane_mut(lane))
            .and_then(|l| l.params.as_mut())
            .is_some_and(|p| p.decrement_output_counter())
    }

    fn record_link_exits(&mut self, person: &mut Person) {
        for exit in person.state.link_exits.drain(..) {
            self.link_travel_times.add(&exit);
        }
    }

    /// Rear of a person ending on a physical lane here bounds everyone
    /// updated after it in the same lane.
    fn mark_position(&mut self, after: &PersonPosition) {
        if let (Some(seg), Some(lane @ LaneSlot::Lane(_))) = (after.segment, after.lane) {
            if let Some(stats) = self.segments.get_mut(&seg) {
                stats.set_last_updated_position(lane, after.distance_to_end + after.vehicle_length);
            }
        }
    }

    fn remove_activity_performer(&mut self, id: PersonId) {
        if let Some(i) = self.activity_performers.iter().position(|&p| p == id) {
            self.activity_performers.remove(i);
        }
    }

    /// Reconcile lane, queue, and activity membership with the person's new
    /// position and hand it back to the registry or an outgoing message.
    fn housekeep(
        &mut self,
        mut person: Person,
        before:     &PersonPosition,
        ctx:        &TickContext<'_>,
        registry:   &mut PersonRegistry,
    ) -> ConfluxResult<()> {
        self.record_link_exits(&mut person);
        let after = person.position();
        let id = person.id;
        let now = ctx.now;

        if before.role != after.role {
            match before.role {
                RoleKind::ActivityPerformer => self.remove_activity_performer(id),
                RoleKind::Driver => {
                    if let (Some(seg), Some(lane)) = (before.segment, before.lane) {
                        let stats = self.stats_mut(seg)?;
                        stats.dequeue(id, lane, before.is_queuing, before.vehicle_length, now)?;
                        if !lane.is_infinity() {
                            stats.increment_flow();
                        }
                    }
                }
            }
            return match after.role {
                RoleKind::ActivityPerformer => {
                    self.activity_performers.push(id);
                    registry.insert(person);
                    Ok(())
                }
                RoleKind::Driver => self.place(person, &after, ctx, registry),
            };
        }

        if after.role == RoleKind::ActivityPerformer {
            registry.insert(person);
            return Ok(());
        }

        match before.lane {
            None => {
                if after.lane.is_some() {
                    return self.place(person, &after, ctx, registry);
                }
                let (Some(from), Some(to)) = (before.segment, after.segment) else {
                    return Err(self.movement_error(ctx, id, PersonError::InvalidState {
                        person: id,
                        reason: "driver without a segment".into(),
                    }));
                };
                if from != to {
                    return Err(ConfluxError::VirtualQueueToVirtualQueue { conflux: self.id, tick: now, person: id, from, to });
                }
                // Still waiting to enter: back into the same virtual queue.
                person.state.distance_to_end = ctx.network.segment(to).length_m;
                self.requeue(ctx.network.link_of(to), id)?;
                registry.insert(person);
                Ok(())
            }
            Some(before_lane) => {
                let Some(seg) = before.segment else {
                    return Err(self.movement_error(ctx, id, PersonError::InvalidState {
                        person: id,
                        reason: "lane without a segment".into(),
                    }));
                };
                let segment_changed = after.segment != before.segment;
                if segment_changed || after.lane != Some(before_lane) {
                    let stats = self.stats_mut(seg)?;
                    stats.dequeue(id, before_lane, before.is_queuing, before.vehicle_length, now)?;
                    if segment_changed && !before_lane.is_infinity() {
                        stats.increment_flow();
                    }
                    self.place(person, &after, ctx, registry)
                } else {
                    if before.is_queuing != after.is_queuing {
                        self.stats_mut(seg)?.update_queue_status(
                            id,
                            before_lane,
                            after.is_queuing,
                            after.vehicle_length,
                            now,
                        )?;
                    }
                    self.mark_position(&after);
                    registry.insert(person);
                    Ok(())
                }
            }
        }
    }

    /// Put a driver where its state says it is: a lane or a virtual queue,
    /// here or at the owning conflux.
    fn place(
        &mut self,
        mut person: Person,
        after:      &PersonPosition,
        ctx:        &TickContext<'_>,
        registry:   &mut PersonRegistry,
    ) -> ConfluxResult<()> {
        let id = person.id;
        let Some(seg) = after.segment else {
            return Err(self.movement_error(ctx, id, PersonError::InvalidState {
                person: id,
                reason: "driver without a segment".into(),
            }));
        };
        match after.lane {
            Some(lane) if self.owns_segment(seg) => {
                self.stats_mut(seg)?.add_person(
                    lane,
                    id,
                    after.distance_to_end,
                    after.is_queuing,
                    after.vehicle_length,
                    registry,
                )?;
                self.mark_position(after);
                registry.insert(person);
            }
            Some(lane) => {
                let to = ctx.directory.conflux_of_segment(seg);
                trace!(conflux = %self.id, person = %id, %to, segment = %seg, "transfer");
                self.outbox.send(to, ConfluxMessage::Transfer { segment: seg, lane, person: Box::new(person) });
            }
            None => {
                let link = ctx.network.link_of(seg);
                person.state.distance_to_end = ctx.network.segment(seg).length_m;
                let to = ctx.directory.conflux_of_link(link);
                if to == self.id {
                    self.push_back_onto_virtual_queue(link, id)?;
                    registry.insert(person);
                } else {
                    trace!(conflux = %self.id, person = %id, %to, %link, "virtual queue");
                    self.outbox.send(to, ConfluxMessage::VirtualQueue { link, person: Box::new(person) });
                }
            }
        }
        Ok(())
    }

    /// The person finished its trip chain: release its space and report it.
    fn kill_agent(&mut self, mut person: Person, before: &PersonPosition, ctx: &TickContext<'_>) -> ConfluxResult<()> {
        self.record_link_exits(&mut person);
        let id = person.id;
        match (before.role, before.segment, before.lane) {
            (RoleKind::ActivityPerformer, _, _) => self.remove_activity_performer(id),
            (RoleKind::Driver, Some(seg), Some(lane)) => {
                let stats = self.stats_mut(seg)?;
                stats.remove_person(id, lane, before.is_queuing, before.vehicle_length, ctx.now)?;
                if !lane.is_infinity() {
                    stats.increment_flow();
                }
            }
            // Taken out of a virtual queue by the caller.
            (RoleKind::Driver, _, None) | (RoleKind::Driver, None, _) => {}
        }
        trace!(conflux = %self.id, person = %id, "trip chain finished");
        self.outbox.remove(id);
        Ok(())
    }

    // ── Supply phase ──────────────────────────────────────────────────────

    /// Recompute supply for the next tick.  Rows are collected only when
    /// `report` is set; travel times and flows reset either way.
    pub fn update_supply(&mut self, now: Tick, tick_secs: f64, params: &SupplyParams, report: bool) -> SupplyReport {
        let mut out = SupplyReport::default();
        for (&link, segs) in &self.upstream {
            let (mut occupied_m, mut lane_m) = (0.0, 0.0);
            for seg in segs {
                let Some(stats) = self.segments.get_mut(seg) else { continue };
                stats.update_density(params);
                if report {
                    out.segments.push(stats.report_row(now));
                    occupied_m += stats.occupied_length_m();
                    lane_m += stats.capacity_length_m();
                }
                stats.update_supply(tick_secs, params);
                stats.reset_flow();
            }
            if report {
                let density = if lane_m > 0.0 { occupied_m / lane_m } else { 0.0 };
                out.link_stats.push(LinkStatsRow { tick: now, link, density });
            }
        }
        if report {
            out.links = self.link_travel_times.rows(now);
        }
        self.link_travel_times.clear();
        self.reset_output_bounds(params);
        out
    }
}
