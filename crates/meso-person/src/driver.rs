//! Mesoscopic driver movement.
//!
//! A driver follows a fixed segment path.  On each segment it either moves
//! at the segment's current speed, joins the lane's queue, or discharges from
//! the queue at the lane's output flow rate.  Moving onto the next segment of
//! the same link is decided locally; crossing into a new link is a request the
//! conflux answers through [`Permission`].
//!
//! Positions are "distance to end of segment", so a vehicle advances by
//! *decreasing* `distance_to_end`.  A vehicle never ends a tick closer to the
//! stop line than the rear of the vehicle updated just before it in the same
//! lane, which keeps every lane ordered.

use meso_core::{LaneSlot, PersonId, RoleKind, SegmentId};
use meso_network::RoadNetwork;

use crate::{LinkExit, MovementContext, Permission, PersonError, PersonResult, PersonState, Role};

#[derive(Clone, Debug)]
pub struct Driver {
    path: Vec<SegmentId>,
    /// Index into `path` of the segment the vehicle is on.
    pos:  usize,
}

impl Driver {
    pub fn new(path: Vec<SegmentId>) -> Self {
        Self { path, pos: 0 }
    }

    pub fn path(&self) -> &[SegmentId] {
        &self.path
    }

    #[inline]
    pub fn current_segment(&self) -> SegmentId {
        self.path[self.pos]
    }

    #[inline]
    fn next_segment(&self) -> Option<SegmentId> {
        self.path.get(self.pos + 1).copied()
    }

    fn invalid(ctx: &MovementContext<'_>, reason: &str) -> PersonError {
        PersonError::InvalidState { person: ctx.person, reason: reason.to_string() }
    }

    /// Lower bound on `distance_to_end` imposed by the vehicle ahead.
    fn floor(state: &PersonState, seg: SegmentId, lane: LaneSlot, ctx: &MovementContext<'_>) -> f64 {
        ctx.supply
            .position_of_last_updated_agent(seg, lane)
            .map_or(0.0, |p| p.min(state.distance_to_end))
    }

    fn physical_lane(state: &PersonState, ctx: &MovementContext<'_>) -> PersonResult<LaneSlot> {
        match state.lane {
            Some(lane @ LaneSlot::Lane(_)) => Ok(lane),
            _ => Err(Self::invalid(ctx, "driver expected on a physical lane")),
        }
    }

    // ── Entering the network ──────────────────────────────────────────────

    /// Leave lane infinity for a physical lane of the first segment.
    fn set_origin(&mut self, state: &mut PersonState, ctx: &mut MovementContext<'_>) -> PersonResult<()> {
        let seg = self.current_segment();
        let lane = ctx.supply.best_lane(seg);
        let elapsed = ctx
            .elapsed(state.remaining_time)
            .max(ctx.supply.next_accept_secs(seg, lane) - ctx.now_secs);

        if elapsed < ctx.tick_secs && ctx.supply.can_accept(seg, state.vehicle_length) {
            let entry = ctx.now_secs + elapsed;
            state.lane = Some(lane);
            state.distance_to_end = ctx.network.segment(seg).length_m;
            state.remaining_time = ctx.tick_secs - elapsed;
            state.link_entry_secs = entry;
            ctx.supply.record_accept(seg, lane, entry);
        } else {
            state.remaining_time = 0.0;
        }
        Ok(())
    }

    // ── Advancing on a segment ────────────────────────────────────────────

    fn advance_moving(
        &mut self,
        state: &mut PersonState,
        lane:  LaneSlot,
        ctx:   &mut MovementContext<'_>,
    ) -> PersonResult<()> {
        let seg    = self.current_segment();
        let length = ctx.network.segment(seg).length_m;
        let speed  = ctx.supply.segment_speed(seg);
        let queue  = ctx.supply.queue_length(seg, lane);
        let tick   = ctx.tick_secs;
        let t0     = ctx.elapsed(state.remaining_time);
        let x0     = state.distance_to_end;
        let floor  = Self::floor(state, seg, lane, ctx);

        if queue > length {
            self.add_to_queue(state, seg, lane, ctx);
        } else if queue > 0.0 {
            let tf = t0 + (x0 - queue) / speed;
            if tf < tick {
                self.add_to_queue(state, seg, lane, ctx);
            } else {
                state.distance_to_end = (x0 - speed * (tick - t0)).max(floor).min(x0);
            }
        } else {
            let tf = t0 + x0 / speed;
            if tf < tick && floor <= 0.0 {
                if ctx.supply.output_counter(seg, lane) > 0 {
                    state.distance_to_end = 0.0;
                    state.remaining_time = tick - tf;
                    return self.move_to_next_segment(state, ctx);
                }
                self.add_to_queue(state, seg, lane, ctx);
            } else {
                state.distance_to_end = (x0 - speed * (tick - t0)).max(floor).min(x0);
            }
        }
        state.remaining_time = 0.0;
        Ok(())
    }

    fn advance_queuing(
        &mut self,
        state: &mut PersonState,
        lane:  LaneSlot,
        ctx:   &mut MovementContext<'_>,
    ) -> PersonResult<()> {
        let seg  = self.current_segment();
        let rate = ctx.supply.output_flow_rate(seg, lane);
        let t0   = ctx.elapsed(state.remaining_time);
        let tf = if rate > 0.0 {
            t0 + state.distance_to_end / (state.vehicle_length * rate)
        } else {
            f64::INFINITY
        };

        if ctx.supply.output_counter(seg, lane) > 0 && tf < ctx.tick_secs {
            state.remaining_time = ctx.tick_secs - tf;
            return self.move_to_next_segment(state, ctx);
        }
        self.move_in_queue(state, seg, lane, ctx);
        state.remaining_time = 0.0;
        Ok(())
    }

    fn add_to_queue(&self, state: &mut PersonState, seg: SegmentId, lane: LaneSlot, ctx: &MovementContext<'_>) {
        if state.is_queuing {
            self.move_in_queue(state, seg, lane, ctx);
            return;
        }
        let floor = Self::floor(state, seg, lane, ctx);
        let x0 = state.distance_to_end;
        state.distance_to_end = ctx.supply.queue_length(seg, lane).max(floor).min(x0);
        state.is_queuing = true;
    }

    fn move_in_queue(&self, state: &mut PersonState, seg: SegmentId, lane: LaneSlot, ctx: &MovementContext<'_>) {
        let behind = ctx.supply.position_of_last_updated_agent(seg, lane).unwrap_or(0.0);
        state.distance_to_end = behind.min(state.distance_to_end);
    }

    /// Stop at the end of the current segment for the rest of the tick.
    fn hold_at_stop_line(&self, state: &mut PersonState, ctx: &MovementContext<'_>) {
        if let Some(lane @ LaneSlot::Lane(_)) = state.lane {
            let seg = self.current_segment();
            if state.is_queuing {
                self.move_in_queue(state, seg, lane, ctx);
            } else {
                self.add_to_queue(state, seg, lane, ctx);
            }
        }
        state.remaining_time = 0.0;
    }

    // ── Leaving a segment ─────────────────────────────────────────────────

    fn move_to_next_segment(&mut self, state: &mut PersonState, ctx: &mut MovementContext<'_>) -> PersonResult<()> {
        let seg  = self.current_segment();
        let lane = Self::physical_lane(state, ctx)?;
        if !ctx.supply.is_lane_front(seg, lane, ctx.person) {
            self.hold_at_stop_line(state, ctx);
            return Ok(());
        }
        let link = ctx.network.link_of(seg);

        let Some(next) = self.next_segment() else {
            state.link_exits.push(LinkExit {
                link,
                entry_secs: state.link_entry_secs,
                exit_secs:  ctx.now_secs + ctx.elapsed(state.remaining_time),
            });
            state.to_be_removed = true;
            return Ok(());
        };

        if ctx.network.link_of(next) != link {
            state.requested_next_segment = Some(next);
            state.permission = Permission::None;
            return Ok(());
        }

        let next_lane = ctx.supply.best_lane(next);
        let elapsed = ctx
            .elapsed(state.remaining_time)
            .max(ctx.supply.next_accept_secs(next, next_lane) - ctx.now_secs);
        if elapsed < ctx.tick_secs && ctx.supply.can_accept(next, state.vehicle_length) {
            self.pos += 1;
            state.is_queuing = false;
            state.segment = Some(next);
            state.lane = Some(next_lane);
            state.distance_to_end = ctx.network.segment(next).length_m;
            state.remaining_time = ctx.tick_secs - elapsed;
            ctx.supply.record_accept(next, next_lane, ctx.now_secs + elapsed);
        } else {
            self.hold_at_stop_line(state, ctx);
        }
        Ok(())
    }

    /// Cross into the first segment of the next link after the conflux
    /// granted permission.  The vehicle is either still at the end of its
    /// previous link or waiting in the next link's virtual queue.
    fn flow_into_next_link(&mut self, state: &mut PersonState, ctx: &mut MovementContext<'_>) -> PersonResult<()> {
        let Some(next) = self.next_segment() else {
            return Err(Self::invalid(ctx, "crossing granted at the end of the path"));
        };
        let in_virtual_queue = state.lane.is_none();
        if in_virtual_queue && state.segment != Some(next) {
            return Err(Self::invalid(ctx, "virtual-queue segment does not match the path"));
        }

        let next_lane = ctx.supply.best_lane(next);
        let elapsed = ctx
            .elapsed(state.remaining_time)
            .max(ctx.supply.next_accept_secs(next, next_lane) - ctx.now_secs);

        if elapsed < ctx.tick_secs && ctx.supply.can_accept(next, state.vehicle_length) {
            let t = ctx.now_secs + elapsed;
            if !in_virtual_queue {
                state.link_exits.push(LinkExit {
                    link:       ctx.network.link_of(self.current_segment()),
                    entry_secs: state.link_entry_secs,
                    exit_secs:  t,
                });
            }
            self.pos += 1;
            state.is_queuing = false;
            state.segment = Some(next);
            state.lane = Some(next_lane);
            state.distance_to_end = ctx.network.segment(next).length_m;
            state.link_entry_secs = t;
            state.permission = Permission::None;
            ctx.supply.record_accept(next, next_lane, t);
            // Movement on another conflux's segment resumes next tick.
            state.remaining_time = if ctx.supply.is_local(next) { ctx.tick_secs - elapsed } else { 0.0 };
        } else if in_virtual_queue {
            state.remaining_time = 0.0;
        } else {
            state.permission = Permission::None;
            self.hold_at_stop_line(state, ctx);
        }
        Ok(())
    }
}

impl Role for Driver {
    fn kind(&self) -> RoleKind {
        RoleKind::Driver
    }

    fn movement_init(
        &mut self,
        person:  PersonId,
        state:   &mut PersonState,
        network: &RoadNetwork,
    ) -> PersonResult<()> {
        let Some(&first) = self.path.first() else {
            return Err(PersonError::EmptyPath { person });
        };
        self.pos = 0;
        state.segment = Some(first);
        state.lane = Some(LaneSlot::Infinity);
        state.distance_to_end = network.segment(first).length_m;
        state.is_queuing = false;
        state.requested_next_segment = None;
        state.permission = Permission::None;
        state.to_be_removed = false;
        Ok(())
    }

    fn movement_tick(&mut self, state: &mut PersonState, ctx: &mut MovementContext<'_>) -> PersonResult<()> {
        if state.remaining_time <= 0.0 || state.to_be_removed {
            return Ok(());
        }
        match state.permission {
            Permission::Granted => return self.flow_into_next_link(state, ctx),
            Permission::Denied => {
                state.permission = Permission::None;
                self.hold_at_stop_line(state, ctx);
                return Ok(());
            }
            Permission::None => {}
        }
        match state.lane {
            Some(LaneSlot::Infinity) => self.set_origin(state, ctx),
            Some(lane) if state.is_queuing => self.advance_queuing(state, lane, ctx),
            Some(lane) => self.advance_moving(state, lane, ctx),
            None => Err(Self::invalid(ctx, "driver in a virtual queue without crossing permission")),
        }
    }
}
