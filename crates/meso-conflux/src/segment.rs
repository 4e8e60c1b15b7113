//! Occupancy and supply state of one road segment.

use meso_core::{ConfluxId, ConfluxRng, LaneSlot, LinkId, PersonId, SegmentId, SupplyParams, Tick};
use meso_network::RoadSegment;
use meso_person::PersonRegistry;

use crate::lane::{LaneFault, LaneParams, LaneStats};
use crate::{ConfluxError, ConfluxResult, SegmentStatsRow};

/// Speed on a segment with free-flow speed `free_flow` at `density` veh/m.
pub fn speed_density(free_flow: f64, density: f64, params: &SupplyParams) -> f64 {
    let speed = if density >= params.jam_density {
        params.min_speed_mps
    } else if density >= params.min_density {
        let x = (density - params.min_density) / params.jam_density;
        free_flow * (1.0 - x.powf(params.beta)).powf(params.alpha)
    } else {
        free_flow
    };
    speed.max(params.min_speed_mps)
}

/// Pick the entry with the smallest key.  Exact ties are resolved by
/// reservoir sampling: the k-th tied entry replaces the current pick with
/// probability 1/k, so every tied entry is equally likely whatever order
/// the slice is in.
pub(crate) fn choose_closest<T: Copy>(entries: &[(T, f64)], rng: &mut ConfluxRng) -> Option<T> {
    let mut best: Option<(T, f64)> = None;
    let mut ties = 0u32;
    for &(item, key) in entries {
        match best {
            None => {
                best = Some((item, key));
                ties = 1;
            }
            Some((_, k)) if key < k => {
                best = Some((item, key));
                ties = 1;
            }
            Some((_, k)) if key == k => {
                ties += 1;
                let replace = if ties == 2 {
                    rng.coin_flip()
                } else {
                    rng.gen_bool(1.0 / f64::from(ties))
                };
                if replace {
                    best = Some((item, key));
                }
            }
            Some(_) => {}
        }
    }
    best.map(|(item, _)| item)
}

/// Lanes, lane infinity, and supply of one segment owned by a conflux.
#[derive(Clone, Debug)]
pub struct SegmentStats {
    pub conflux:       ConfluxId,
    pub segment:       SegmentId,
    pub link:          LinkId,
    pub length_m:      f64,
    pub num_lanes:     u16,
    pub max_speed_mps: f64,

    lanes:    Vec<LaneStats>,
    infinity: LaneStats,

    speed_mps: f64,
    density:   f64,
    /// Persons that left the segment since the last supply update.
    flow:      u32,
}

impl SegmentStats {
    pub fn new(conflux: ConfluxId, seg: &RoadSegment) -> Self {
        let lanes = (0..seg.lanes)
            .map(|_| LaneStats::physical(LaneParams::new(seg.capacity_vps, seg.lanes)))
            .collect();
        Self {
            conflux,
            segment:       seg.id,
            link:          seg.link,
            length_m:      seg.length_m,
            num_lanes:     seg.lanes,
            max_speed_mps: seg.max_speed_mps,
            lanes,
            infinity:      LaneStats::infinity(),
            speed_mps:     seg.max_speed_mps,
            density:       0.0,
            flow:          0,
        }
    }

    // ── Lane access ───────────────────────────────────────────────────────

    pub fn lane(&self, slot: LaneSlot) -> Option<&LaneStats> {
        match slot {
            LaneSlot::Lane(i) => self.lanes.get(i as usize),
            LaneSlot::Infinity => Some(&self.infinity),
        }
    }

    pub fn lane_mut(&mut self, slot: LaneSlot) -> Option<&mut LaneStats> {
        match slot {
            LaneSlot::Lane(i) => self.lanes.get_mut(i as usize),
            LaneSlot::Infinity => Some(&mut self.infinity),
        }
    }

    /// Physical lanes followed by lane infinity.
    pub fn lane_slots(&self) -> impl Iterator<Item = LaneSlot> + '_ {
        (0..self.num_lanes).map(LaneSlot::Lane).chain(std::iter::once(LaneSlot::Infinity))
    }

    fn lane_or_err(&mut self, slot: LaneSlot) -> ConfluxResult<&mut LaneStats> {
        let (conflux, segment) = (self.conflux, self.segment);
        self.lane_mut(slot).ok_or(ConfluxError::UnknownLane { conflux, segment, lane: slot })
    }

    fn fault(&self, fault: LaneFault, lane: LaneSlot, person: PersonId, tick: Tick) -> ConfluxError {
        let (conflux, segment) = (self.conflux, self.segment);
        match fault {
            LaneFault::NotAtFront { found } => {
                ConfluxError::DequeueMismatch { conflux, tick, segment, lane, person, found }
            }
            LaneFault::NotFound => ConfluxError::PersonNotInLane { conflux, tick, segment, lane, person },
            LaneFault::NegativeQueueCount => {
                ConfluxError::NegativeQueueCount { conflux, tick, segment, lane, person }
            }
            LaneFault::NegativeMovingCount => {
                ConfluxError::NegativeMovingCount { conflux, tick, segment, lane, person }
            }
        }
    }

    // ── Membership ────────────────────────────────────────────────────────

    pub fn add_person(
        &mut self,
        slot:           LaneSlot,
        person:         PersonId,
        distance:       f64,
        is_queuing:     bool,
        vehicle_length: f64,
        registry:       &PersonRegistry,
    ) -> ConfluxResult<()> {
        self.lane_or_err(slot)?.add(person, distance, is_queuing, vehicle_length, registry);
        Ok(())
    }

    /// Take `person` off the head of `slot`.  Fails loudly if someone else
    /// is at the head.
    pub fn dequeue(
        &mut self,
        person:         PersonId,
        slot:           LaneSlot,
        was_queuing:    bool,
        vehicle_length: f64,
        tick:           Tick,
    ) -> ConfluxResult<()> {
        let res = self.lane_or_err(slot)?.dequeue(person, was_queuing, vehicle_length);
        res.map_err(|f| self.fault(f, slot, person, tick))
    }

    pub fn remove_person(
        &mut self,
        person:         PersonId,
        slot:           LaneSlot,
        was_queuing:    bool,
        vehicle_length: f64,
        tick:           Tick,
    ) -> ConfluxResult<()> {
        let res = self.lane_or_err(slot)?.remove(person, was_queuing, vehicle_length);
        res.map_err(|f| self.fault(f, slot, person, tick))
    }

    pub fn update_queue_status(
        &mut self,
        person:         PersonId,
        slot:           LaneSlot,
        is_queuing:     bool,
        vehicle_length: f64,
        tick:           Tick,
    ) -> ConfluxResult<()> {
        if slot.is_infinity() {
            return Ok(());
        }
        let res = self.lane_or_err(slot)?.update_queue_status(is_queuing, vehicle_length);
        res.map_err(|f| self.fault(f, slot, person, tick))
    }

    /// Every person on the segment, lane by lane, lane infinity last.
    pub fn persons(&self) -> impl Iterator<Item = PersonId> + '_ {
        self.lanes
            .iter()
            .chain(std::iter::once(&self.infinity))
            .flat_map(|l| l.persons().iter().copied())
    }

    pub fn lane_infinity(&self) -> &LaneStats {
        &self.infinity
    }

    pub fn num_persons(&self) -> usize {
        self.lanes.iter().map(LaneStats::len).sum::<usize>() + self.infinity.len()
    }

    // ── Aggregates ────────────────────────────────────────────────────────

    /// Persons moving on physical lanes.
    pub fn num_moving(&self) -> u32 {
        self.lanes.iter().map(LaneStats::moving_count).sum()
    }

    pub fn num_queueing(&self) -> u32 {
        self.lanes.iter().map(LaneStats::queue_count).sum()
    }

    /// Person count per lane, lane infinity included.
    pub fn lane_agent_counts(&self) -> Vec<(LaneSlot, usize)> {
        self.lane_slots()
            .filter_map(|slot| self.lane(slot).map(|l| (slot, l.len())))
            .collect()
    }

    pub fn occupied_length_m(&self) -> f64 {
        self.lanes.iter().map(LaneStats::occupied_length_m).sum()
    }

    /// Total lane length (m).
    #[inline]
    pub fn capacity_length_m(&self) -> f64 {
        self.length_m * f64::from(self.num_lanes)
    }

    /// Whole vehicles of `vehicle_length` that fit on the physical lanes.
    pub fn capacity_vehicles(&self, vehicle_length: f64) -> u32 {
        (self.capacity_length_m() / vehicle_length).floor().max(0.0) as u32
    }

    /// `true` if one more vehicle of `vehicle_length` fits.  An empty segment
    /// always accepts, however short it is.
    pub fn can_accommodate(&self, vehicle_length: f64) -> bool {
        let occupied = self.num_moving() + self.num_queueing();
        occupied == 0 || self.occupied_length_m() + vehicle_length <= self.capacity_length_m()
    }

    /// Physical lane with the fewest persons, ties to the fewest queuing,
    /// then to the lowest index.
    pub fn best_lane(&self) -> LaneSlot {
        self.lanes
            .iter()
            .enumerate()
            .min_by_key(|(_, l)| (l.len(), l.queue_count()))
            .map_or(LaneSlot::Infinity, |(i, _)| LaneSlot::Lane(i as u16))
    }

    // ── Supply ────────────────────────────────────────────────────────────

    #[inline]
    pub fn speed(&self) -> f64 {
        self.speed_mps
    }

    #[inline]
    pub fn last_density(&self) -> f64 {
        self.density
    }

    pub fn density(&self, params: &SupplyParams) -> f64 {
        let moving = f64::from(self.num_moving());
        let queueing = f64::from(self.num_queueing());
        let moving_length = self.capacity_length_m() - queueing * params.queue_vehicle_length_m;
        if moving_length > 0.0 {
            if self.length_m > 10.0 * params.vehicle_length_m {
                moving / moving_length
            } else {
                queueing / moving_length
            }
        } else {
            1.0 / params.vehicle_length_m
        }
    }

    /// Output flow rate of `slot`, 0 for lane infinity.
    pub fn output_flow_rate(&self, slot: LaneSlot) -> f64 {
        self.lane(slot).and_then(|l| l.params.as_ref()).map_or(0.0, |p| p.output_flow_rate)
    }

    pub fn output_counter(&self, slot: LaneSlot) -> u32 {
        self.lane(slot).and_then(|l| l.params.as_ref()).map_or(0, |p| p.output_counter)
    }

    /// Refresh the density from the current occupancy.
    pub fn update_density(&mut self, params: &SupplyParams) {
        self.density = self.density(params);
    }

    /// Recompute speed from the last density, and lane metering, for the
    /// next tick.
    pub fn update_supply(&mut self, tick_secs: f64, params: &SupplyParams) {
        self.speed_mps = speed_density(self.max_speed_mps, self.density, params);
        self.update_lane_params(tick_secs, params);
    }

    pub fn update_lane_params(&mut self, tick_secs: f64, params: &SupplyParams) {
        let speed = self.speed_mps;
        for lane in &mut self.lanes {
            lane.initial_queue_count = lane.queue_count();
            if let Some(p) = lane.params.as_mut() {
                p.update_output_counter(tick_secs);
                p.update_accept_rate(tick_secs, speed, params);
            }
        }
    }

    pub fn insert_incident(&mut self, flow_rate: f64, tick_secs: f64) {
        for p in self.lanes.iter_mut().filter_map(|l| l.params.as_mut()) {
            p.set_output_flow_rate(flow_rate, tick_secs);
        }
    }

    pub fn remove_incident(&mut self, tick_secs: f64) {
        for p in self.lanes.iter_mut().filter_map(|l| l.params.as_mut()) {
            p.restore_output_flow_rate(tick_secs);
        }
    }

    #[inline]
    pub fn flow(&self) -> u32 {
        self.flow
    }

    #[inline]
    pub fn increment_flow(&mut self) {
        self.flow += 1;
    }

    #[inline]
    pub fn reset_flow(&mut self) {
        self.flow = 0;
    }

    pub fn report_row(&self, tick: Tick) -> SegmentStatsRow {
        SegmentStatsRow {
            tick,
            segment:   self.segment,
            speed_mps: self.speed_mps,
            flow:      self.flow,
            density:   self.density,
            moving:    self.num_moving(),
            queueing:  self.num_queueing(),
        }
    }

    // ── Per-tick markers ──────────────────────────────────────────────────

    pub fn reset_last_updated_positions(&mut self) {
        for lane in &mut self.lanes {
            lane.last_updated_position = None;
        }
    }

    pub fn set_last_updated_position(&mut self, slot: LaneSlot, rear: f64) {
        if let Some(lane) = self.lane_mut(slot) {
            if !lane.is_infinity() {
                lane.last_updated_position = Some(rear);
            }
        }
    }

    // ── Frontier ──────────────────────────────────────────────────────────

    /// Snapshot every lane so the frontier can walk it front to back.
    pub fn reset_frontal_agents(&mut self) {
        for lane in self.lanes.iter_mut().chain(std::iter::once(&mut self.infinity)) {
            lane.reset_frontal();
        }
    }

    /// Among the frontal persons of all lanes, take the one closest to the
    /// stop line and advance its lane's cursor.
    ///
    /// Persons no longer registered, or already advanced in tick `now`, are
    /// skipped.
    pub fn agent_closest_to_stop_line(
        &mut self,
        registry: &PersonRegistry,
        now:      Tick,
        rng:      &mut ConfluxRng,
    ) -> Option<PersonId> {
        let slots: Vec<LaneSlot> = self.lane_slots().collect();
        let mut fronts: Vec<(LaneSlot, f64)> = Vec::with_capacity(slots.len());
        let mut ids: Vec<PersonId> = Vec::with_capacity(slots.len());
        for slot in slots {
            let Some(lane) = self.lane_mut(slot) else { continue };
            while let Some(id) = lane.frontal() {
                match registry.get(id) {
                    Some(p) if p.state.is_stale(now) => {
                        fronts.push((slot, p.state.distance_to_end));
                        ids.push(id);
                        break;
                    }
                    _ => lane.advance_frontal(),
                }
            }
        }
        let chosen = choose_closest(&fronts, rng)?;
        let idx = fronts.iter().position(|&(slot, _)| slot == chosen)?;
        if let Some(lane) = self.lane_mut(chosen) {
            lane.advance_frontal();
        }
        ids.get(idx).copied()
    }

    /// Check that every physical lane is ordered by distance to the stop
    /// line, front first.
    pub fn verify_ordering(&self, registry: &PersonRegistry, tick: Tick) -> ConfluxResult<()> {
        for (i, lane) in self.lanes.iter().enumerate() {
            let mut last = f64::NEG_INFINITY;
            for &id in lane.persons() {
                let Some(p) = registry.get(id) else { continue };
                if p.state.distance_to_end < last {
                    return Err(ConfluxError::OutOfOrderLane {
                        conflux: self.conflux,
                        tick,
                        segment: self.segment,
                        lane: LaneSlot::Lane(i as u16),
                        person: id,
                    });
                }
                last = p.state.distance_to_end;
            }
        }
        Ok(())
    }
}
