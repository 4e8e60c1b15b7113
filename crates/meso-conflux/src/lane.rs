//! Per-lane occupancy and throughput metering.
//!
//! `LaneStats` holds the persons of one lane ordered from the stop line
//! backwards.  Physical lanes additionally carry [`LaneParams`], the output
//! metering that decides how many vehicles may leave the lane per tick and
//! how soon another vehicle may enter it.

use std::collections::VecDeque;

use meso_core::{PersonId, SupplyParams};
use meso_person::PersonRegistry;

// ── LaneParams ────────────────────────────────────────────────────────────────

/// Throughput metering of one physical lane.
#[derive(Clone, Debug, PartialEq)]
pub struct LaneParams {
    /// Current discharge rate, vehicles per second.
    pub output_flow_rate:      f64,
    /// Rate restored when an incident is cleared.
    pub orig_output_flow_rate: f64,
    /// Vehicles still allowed to leave the lane this tick.
    pub output_counter:        u32,
    /// Carry-over of fractional vehicles between ticks.
    pub fraction:              f64,
    /// Minimum headway between two vehicles entering the lane (s).
    pub accept_rate:           f64,
    /// Simulated second of the last vehicle entry.
    pub last_accept_secs:      f64,
}

impl LaneParams {
    pub fn new(capacity_vps: f64, lanes: u16) -> Self {
        let rate = capacity_vps / f64::from(lanes.max(1));
        Self {
            output_flow_rate:      rate,
            orig_output_flow_rate: rate,
            output_counter:        0,
            fraction:              0.0,
            accept_rate:           0.0,
            last_accept_secs:      f64::NEG_INFINITY,
        }
    }

    /// Integer vehicles allowed out this tick; the fractional remainder
    /// accumulates until it makes up a whole vehicle.
    pub fn update_output_counter(&mut self, tick_secs: f64) {
        let exact = self.output_flow_rate * tick_secs;
        let whole = exact.floor();
        self.fraction += exact - whole;
        let mut counter = whole as u32;
        if self.fraction >= 1.0 {
            self.fraction -= 1.0;
            counter += 1;
        }
        self.output_counter = counter;
    }

    pub fn update_accept_rate(&mut self, tick_secs: f64, up_speed_mps: f64, params: &SupplyParams) {
        let capacity = self.output_flow_rate * tick_secs;
        let by_capacity = if capacity > 0.0 { tick_secs / capacity } else { 0.0 };
        let by_wave = if up_speed_mps > 0.0 {
            params.omega * params.vehicle_length_m / up_speed_mps
        } else {
            0.0
        };
        self.accept_rate = by_capacity.max(by_wave);
    }

    /// Take one vehicle off the counter.  Returns `false` if it was already 0.
    #[must_use]
    pub fn decrement_output_counter(&mut self) -> bool {
        if self.output_counter == 0 {
            return false;
        }
        self.output_counter -= 1;
        true
    }

    #[inline]
    pub fn next_accept_secs(&self) -> f64 {
        self.last_accept_secs + self.accept_rate
    }

    /// Override the discharge rate (incident) and re-derive the counter.
    pub fn set_output_flow_rate(&mut self, rate: f64, tick_secs: f64) {
        self.output_flow_rate = rate.max(0.0);
        self.fraction = 0.0;
        self.update_output_counter(tick_secs);
    }

    pub fn restore_output_flow_rate(&mut self, tick_secs: f64) {
        self.set_output_flow_rate(self.orig_output_flow_rate, tick_secs);
    }
}

// ── LaneFault ─────────────────────────────────────────────────────────────────

/// Bookkeeping violation inside one lane.  `SegmentStats` attaches the
/// conflux, segment, and tick before it surfaces as a `ConfluxError`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum LaneFault {
    NotAtFront { found: Option<PersonId> },
    NotFound,
    NegativeQueueCount,
    NegativeMovingCount,
}

// ── LaneStats ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct LaneStats {
    /// Front = closest to the stop line.
    persons:        VecDeque<PersonId>,
    queue_count:    u32,
    /// Summed vehicle length of queuing persons (m).
    queue_length_m: f64,
    /// Summed vehicle length of every person in the lane (m).
    total_length_m: f64,
    /// Queue count at the last supply update.
    pub initial_queue_count: u32,
    /// `None` for lane infinity.
    pub params: Option<LaneParams>,
    /// Rear of the person updated last in this lane during the current tick.
    pub last_updated_position: Option<f64>,

    // Frontier cursor over a copy of `persons` taken when the tick starts.
    frontal:        Vec<PersonId>,
    frontal_cursor: usize,
}

impl LaneStats {
    pub fn physical(params: LaneParams) -> Self {
        Self { params: Some(params), ..Self::default() }
    }

    pub fn infinity() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_infinity(&self) -> bool {
        self.params.is_none()
    }

    pub fn persons(&self) -> &VecDeque<PersonId> {
        &self.persons
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.persons.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.persons.is_empty()
    }

    #[inline]
    pub fn front(&self) -> Option<PersonId> {
        self.persons.front().copied()
    }

    pub fn contains(&self, person: PersonId) -> bool {
        self.persons.contains(&person)
    }

    #[inline]
    pub fn queue_count(&self) -> u32 {
        self.queue_count
    }

    #[inline]
    pub fn moving_count(&self) -> u32 {
        self.persons.len() as u32 - self.queue_count
    }

    #[inline]
    pub fn queue_length_m(&self) -> f64 {
        self.queue_length_m
    }

    #[inline]
    pub fn occupied_length_m(&self) -> f64 {
        self.total_length_m
    }

    /// Insert `person` behind everyone closer to the stop line.
    ///
    /// Lane infinity has no ordering; persons simply join at the back.
    /// Distances of persons already in the lane come from `registry`; a
    /// person not found there is treated as ahead of the newcomer.
    pub fn add(
        &mut self,
        person:         PersonId,
        distance:       f64,
        is_queuing:     bool,
        vehicle_length: f64,
        registry:       &PersonRegistry,
    ) {
        if self.is_infinity() {
            self.persons.push_back(person);
            return;
        }
        let mut at = self.persons.len();
        while at > 0 {
            let behind = registry
                .get(self.persons[at - 1])
                .is_some_and(|p| p.state.distance_to_end > distance);
            if !behind {
                break;
            }
            at -= 1;
        }
        self.persons.insert(at, person);
        self.total_length_m += vehicle_length;
        if is_queuing {
            self.queue_count += 1;
            self.queue_length_m += vehicle_length;
        }
    }

    /// Remove `person` from the head of the lane.
    ///
    /// Physical lanes only ever release their front person; asking for
    /// anyone else means the lane order is corrupt.  Lane infinity releases
    /// persons from anywhere.
    pub(crate) fn dequeue(
        &mut self,
        person:         PersonId,
        was_queuing:    bool,
        vehicle_length: f64,
    ) -> Result<(), LaneFault> {
        if self.is_infinity() {
            return self.remove_anywhere(person);
        }
        match self.persons.front() {
            Some(&p) if p == person => {}
            found => return Err(LaneFault::NotAtFront { found: found.copied() }),
        }
        if was_queuing && self.queue_count == 0 {
            return Err(LaneFault::NegativeQueueCount);
        }
        self.persons.pop_front();
        self.release(was_queuing, vehicle_length);
        Ok(())
    }

    /// Remove `person` wherever it sits in the lane.
    pub(crate) fn remove(
        &mut self,
        person:         PersonId,
        was_queuing:    bool,
        vehicle_length: f64,
    ) -> Result<(), LaneFault> {
        if self.is_infinity() {
            return self.remove_anywhere(person);
        }
        if was_queuing && self.queue_count == 0 {
            return Err(LaneFault::NegativeQueueCount);
        }
        self.remove_anywhere(person)?;
        self.release(was_queuing, vehicle_length);
        Ok(())
    }

    fn remove_anywhere(&mut self, person: PersonId) -> Result<(), LaneFault> {
        let idx = self.persons.iter().position(|&p| p == person).ok_or(LaneFault::NotFound)?;
        self.persons.remove(idx);
        Ok(())
    }

    fn release(&mut self, was_queuing: bool, vehicle_length: f64) {
        self.total_length_m = (self.total_length_m - vehicle_length).max(0.0);
        if was_queuing {
            self.queue_count -= 1;
            self.queue_length_m = (self.queue_length_m - vehicle_length).max(0.0);
        }
    }

    /// Move a person between the moving and queuing parts of the lane.
    pub(crate) fn update_queue_status(&mut self, is_queuing: bool, vehicle_length: f64) -> Result<(), LaneFault> {
        if is_queuing {
            if self.queue_count as usize >= self.persons.len() {
                return Err(LaneFault::NegativeMovingCount);
            }
            self.queue_count += 1;
            self.queue_length_m += vehicle_length;
        } else {
            if self.queue_count == 0 {
                return Err(LaneFault::NegativeQueueCount);
            }
            self.queue_count -= 1;
            self.queue_length_m = (self.queue_length_m - vehicle_length).max(0.0);
        }
        Ok(())
    }

    // ── Frontier cursor ───────────────────────────────────────────────────

    pub(crate) fn reset_frontal(&mut self) {
        self.frontal.clear();
        self.frontal.extend(self.persons.iter().copied());
        self.frontal_cursor = 0;
    }

    #[inline]
    pub(crate) fn frontal(&self) -> Option<PersonId> {
        self.frontal.get(self.frontal_cursor).copied()
    }

    #[inline]
    pub(crate) fn advance_frontal(&mut self) {
        self.frontal_cursor += 1;
    }
}
