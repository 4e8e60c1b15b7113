//! Unit tests for meso-conflux.
//!
//! Scenario tests drive real confluxes through the movement, virtual-queue,
//! and supply phases by hand, with every conflux sharing one registry.

#[cfg(test)]
mod helpers {
    use meso_core::{ConfluxId, LaneSlot, NodeId, PersonId, SegmentId, SupplyParams, Tick};
    use meso_network::{RoadNetwork, RoadNetworkBuilder, SegmentSpec};
    use meso_person::{Person, PersonRegistry, Trip, TripChain, TripChainItem};

    use crate::{Conflux, ConfluxDirectory, Envelope, FrameView, SupplyReport, TickContext};

    pub fn spec(length_m: f64, lanes: u16, capacity_vph: f64) -> SegmentSpec {
        SegmentSpec { length_m, lanes, max_speed_mps: 10.0, capacity_vph }
    }

    /// Links given as `(from, to, segments)` over `nodes` nodes.
    pub fn network(nodes: usize, links: Vec<(u32, u32, Vec<SegmentSpec>)>) -> RoadNetwork {
        let mut b = RoadNetworkBuilder::new();
        b.ensure_nodes(nodes);
        for (from, to, segs) in links {
            b.add_link(NodeId(from), NodeId(to), segs);
        }
        b.build().unwrap()
    }

    /// A single-trip driver over `path`, initialised in lane infinity of its
    /// first segment.
    pub fn driver(id: u32, path: Vec<SegmentId>, net: &RoadNetwork) -> Person {
        let first = net.link(net.link_of(path[0]));
        let last = net.link(net.link_of(path[path.len() - 1]));
        let trip = Trip { origin: first.from, destination: last.to, start_secs: 0.0, path };
        Person::new(PersonId(id), TripChain::new(vec![TripChainItem::Trip(trip)]), net, 4.0).unwrap()
    }

    /// The same driver already on physical lane `lane`.
    pub fn on_lane(mut p: Person, lane: u16, distance: f64) -> Person {
        p.state.lane = Some(LaneSlot::Lane(lane));
        p.state.distance_to_end = distance;
        p
    }

    pub struct World {
        pub net:       RoadNetwork,
        pub dir:       ConfluxDirectory,
        pub params:    SupplyParams,
        pub tick_secs: f64,
        pub confluxes: Vec<Conflux>,
        pub registry:  PersonRegistry,
    }

    impl World {
        pub fn new(net: RoadNetwork, tick_secs: f64) -> Self {
            let dir = ConfluxDirectory::new(&net);
            let params = SupplyParams::default();
            let confluxes = dir
                .ids()
                .map(|c| Conflux::new(c, dir.node_of(c), &net, &params, tick_secs, 7))
                .collect();
            Self { net, dir, params, tick_secs, confluxes, registry: PersonRegistry::new() }
        }

        pub fn conflux(&self, id: u32) -> &Conflux {
            &self.confluxes[id as usize]
        }

        pub fn conflux_mut(&mut self, id: u32) -> &mut Conflux {
            &mut self.confluxes[id as usize]
        }

        pub fn add(&mut self, p: Person) {
            let c = self.dir.starting_conflux(&p, &self.net).unwrap();
            self.confluxes[c.index()].add_starting_person(p, &mut self.registry).unwrap();
        }

        pub fn view(&self) -> FrameView {
            let mut view = FrameView::new(&self.net, self.confluxes.len());
            for c in &self.confluxes {
                c.write_snapshot(&mut view, &self.params);
            }
            view
        }

        pub fn movement(&mut self, tick: u64) {
            let view = self.view();
            let ctx = TickContext {
                now:       Tick(tick),
                now_secs:  tick as f64 * self.tick_secs,
                tick_secs: self.tick_secs,
                network:   &self.net,
                directory: &self.dir,
                view:      &view,
                params:    &self.params,
            };
            for c in &mut self.confluxes {
                c.update(&ctx, &mut self.registry).unwrap();
            }
        }

        pub fn virtual_queues(&mut self, tick: u64) {
            let view = self.view();
            let ctx = TickContext {
                now:       Tick(tick),
                now_secs:  tick as f64 * self.tick_secs,
                tick_secs: self.tick_secs,
                network:   &self.net,
                directory: &self.dir,
                view:      &view,
                params:    &self.params,
            };
            for c in &mut self.confluxes {
                c.process_virtual_queues(&ctx, &mut self.registry).unwrap();
            }
        }

        /// Collect every outbox, deliver in `(to, from, seq)` order, and
        /// return the removed persons.
        pub fn deliver(&mut self) -> Vec<PersonId> {
            let mut envelopes: Vec<Envelope> = Vec::new();
            let mut removed = Vec::new();
            for c in &mut self.confluxes {
                let (e, r) = c.take_outbox();
                envelopes.extend(e);
                removed.extend(r);
            }
            envelopes.sort();
            for env in envelopes {
                self.confluxes[env.to.index()].deliver(env.message, &mut self.registry).unwrap();
            }
            removed
        }

        pub fn supply(&mut self, tick: u64) -> SupplyReport {
            let mut report = SupplyReport::default();
            for c in &mut self.confluxes {
                report.extend(c.update_supply(Tick(tick), self.tick_secs, &self.params, true));
            }
            report
        }

        pub fn step(&mut self, tick: u64) -> Vec<PersonId> {
            self.movement(tick);
            let mut removed = self.deliver();
            self.virtual_queues(tick);
            removed.extend(self.deliver());
            self.supply(tick);
            removed
        }
    }

    pub const C0: ConfluxId = ConfluxId(0);
    pub const C1: ConfluxId = ConfluxId(1);
}

// ── LaneParams ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod lane_params {
    use meso_core::SupplyParams;

    use crate::LaneParams;

    #[test]
    fn rate_is_split_across_lanes() {
        let p = LaneParams::new(2.0, 4);
        assert_eq!(p.output_flow_rate, 0.5);
        assert_eq!(p.orig_output_flow_rate, 0.5);
        assert_eq!(p.last_accept_secs, f64::NEG_INFINITY);
    }

    #[test]
    fn fractional_vehicles_carry_over() {
        let mut p = LaneParams::new(0.5, 1);
        p.update_output_counter(3.0);
        assert_eq!(p.output_counter, 1);
        assert_eq!(p.fraction, 0.5);
        p.update_output_counter(3.0);
        assert_eq!(p.output_counter, 2);
        assert_eq!(p.fraction, 0.0);
        p.update_output_counter(3.0);
        assert_eq!(p.output_counter, 1);
    }

    #[test]
    fn accept_rate_takes_the_larger_headway() {
        let params = SupplyParams::default();
        let mut p = LaneParams::new(0.5, 1);
        p.update_accept_rate(5.0, 10.0, &params);
        assert_eq!(p.accept_rate, 2.0);

        let mut closed = LaneParams::new(0.0, 1);
        closed.update_accept_rate(5.0, 10.0, &params);
        assert!((closed.accept_rate - 0.004).abs() < 1e-12);
    }

    #[test]
    fn counter_refuses_to_go_negative() {
        let mut p = LaneParams::new(0.2, 1);
        p.update_output_counter(5.0);
        assert_eq!(p.output_counter, 1);
        assert!(p.decrement_output_counter());
        assert!(!p.decrement_output_counter());
        assert_eq!(p.output_counter, 0);
    }

    #[test]
    fn incident_overrides_and_restores_rate() {
        let mut p = LaneParams::new(1.0, 1);
        p.set_output_flow_rate(0.0, 5.0);
        assert_eq!(p.output_flow_rate, 0.0);
        assert_eq!(p.output_counter, 0);
        p.restore_output_flow_rate(5.0);
        assert_eq!(p.output_flow_rate, 1.0);
        assert_eq!(p.output_counter, 5);
    }
}

// ── LaneStats ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod lane_stats {
    use meso_core::{PersonId, SegmentId};
    use meso_person::PersonRegistry;

    use crate::lane::LaneFault;
    use crate::{LaneParams, LaneStats};
    use super::helpers::*;

    fn registry_with(distances: &[(u32, f64)]) -> PersonRegistry {
        let net = network(2, vec![(0, 1, vec![spec(100.0, 1, 1_800.0)])]);
        let mut reg = PersonRegistry::new();
        for &(id, d) in distances {
            reg.insert(on_lane(driver(id, vec![SegmentId(0)], &net), 0, d));
        }
        reg
    }

    #[test]
    fn physical_lane_keeps_distance_order() {
        let reg = registry_with(&[(1, 10.0), (2, 50.0), (3, 30.0)]);
        let mut lane = LaneStats::physical(LaneParams::new(1.0, 1));
        lane.add(PersonId(1), 10.0, false, 4.0, &reg);
        lane.add(PersonId(2), 50.0, false, 4.0, &reg);
        lane.add(PersonId(3), 30.0, false, 4.0, &reg);
        let order: Vec<PersonId> = lane.persons().iter().copied().collect();
        assert_eq!(order, vec![PersonId(1), PersonId(3), PersonId(2)]);
        assert_eq!(lane.occupied_length_m(), 12.0);
        assert_eq!(lane.moving_count(), 3);
    }

    #[test]
    fn lane_infinity_appends() {
        let reg = registry_with(&[(1, 10.0), (2, 50.0)]);
        let mut lane = LaneStats::infinity();
        lane.add(PersonId(2), 50.0, false, 4.0, &reg);
        lane.add(PersonId(1), 10.0, false, 4.0, &reg);
        assert_eq!(lane.front(), Some(PersonId(2)));
        assert_eq!(lane.occupied_length_m(), 0.0);
        lane.dequeue(PersonId(1), false, 4.0).unwrap();
        assert_eq!(lane.len(), 1);
    }

    #[test]
    fn dequeue_only_releases_the_front() {
        let reg = registry_with(&[(1, 10.0), (2, 50.0)]);
        let mut lane = LaneStats::physical(LaneParams::new(1.0, 1));
        lane.add(PersonId(1), 10.0, false, 4.0, &reg);
        lane.add(PersonId(2), 50.0, false, 4.0, &reg);
        assert_eq!(
            lane.dequeue(PersonId(2), false, 4.0),
            Err(LaneFault::NotAtFront { found: Some(PersonId(1)) })
        );
        assert_eq!(lane.len(), 2);
        lane.dequeue(PersonId(1), false, 4.0).unwrap();
        assert_eq!(lane.front(), Some(PersonId(2)));
    }

    #[test]
    fn queue_counts_follow_status_changes() {
        let reg = registry_with(&[(1, 0.0), (2, 4.0)]);
        let mut lane = LaneStats::physical(LaneParams::new(1.0, 1));
        lane.add(PersonId(1), 0.0, true, 4.0, &reg);
        lane.add(PersonId(2), 4.0, false, 4.0, &reg);
        assert_eq!(lane.queue_count(), 1);
        assert_eq!(lane.queue_length_m(), 4.0);

        lane.update_queue_status(true, 4.0).unwrap();
        assert_eq!(lane.queue_count(), 2);
        assert_eq!(lane.moving_count(), 0);
        assert_eq!(lane.update_queue_status(true, 4.0), Err(LaneFault::NegativeMovingCount));

        lane.dequeue(PersonId(1), true, 4.0).unwrap();
        assert_eq!(lane.queue_count(), 1);
        assert_eq!(lane.queue_length_m(), 4.0);
    }

    #[test]
    fn releasing_a_queuer_from_an_empty_queue_fails() {
        let reg = registry_with(&[(1, 0.0)]);
        let mut lane = LaneStats::physical(LaneParams::new(1.0, 1));
        lane.add(PersonId(1), 0.0, false, 4.0, &reg);
        assert_eq!(lane.dequeue(PersonId(1), true, 4.0), Err(LaneFault::NegativeQueueCount));
        assert_eq!(lane.update_queue_status(false, 4.0), Err(LaneFault::NegativeQueueCount));
    }

    #[test]
    fn removing_an_absent_person_fails() {
        let reg = registry_with(&[(1, 0.0)]);
        let mut lane = LaneStats::physical(LaneParams::new(1.0, 1));
        lane.add(PersonId(1), 0.0, false, 4.0, &reg);
        assert_eq!(lane.remove(PersonId(9), false, 4.0), Err(LaneFault::NotFound));
    }
}

// ── SegmentStats ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod segment_stats {
    use meso_core::{ConfluxRng, LaneSlot, PersonId, SegmentId, SupplyParams, Tick};
    use meso_person::PersonRegistry;

    use crate::segment::speed_density;
    use crate::{ConfluxError, SegmentStats};
    use super::helpers::*;

    fn two_lane_segment() -> (SegmentStats, meso_network::RoadNetwork) {
        let net = network(2, vec![(0, 1, vec![spec(100.0, 2, 3_600.0)])]);
        (SegmentStats::new(C0, net.segment(SegmentId(0))), net)
    }

    #[test]
    fn speed_density_curve() {
        let p = SupplyParams::default();
        assert_eq!(speed_density(20.0, 0.0, &p), 20.0);
        assert_eq!(speed_density(20.0, p.jam_density, &p), p.min_speed_mps);
        assert_eq!(speed_density(4.0, 0.0, &p), p.min_speed_mps);
        let light = speed_density(20.0, 0.01, &p);
        let heavy = speed_density(20.0, 0.1, &p);
        assert!(light < 20.0 && light > heavy && heavy >= p.min_speed_mps);
    }

    #[test]
    fn empty_segment_runs_at_free_flow() {
        let (mut s, _) = two_lane_segment();
        let p = SupplyParams::default();
        s.update_supply(5.0, &p);
        assert_eq!(s.last_density(), 0.0);
        assert_eq!(s.speed(), 10.0);
        assert_eq!(s.output_counter(LaneSlot::Lane(0)), 2);
        assert_eq!(s.output_counter(LaneSlot::Infinity), 0);
    }

    #[test]
    fn best_lane_prefers_fewest_persons() {
        let (mut s, net) = two_lane_segment();
        let mut reg = PersonRegistry::new();
        reg.insert(on_lane(driver(1, vec![SegmentId(0)], &net), 0, 50.0));
        assert_eq!(s.best_lane(), LaneSlot::Lane(0));
        s.add_person(LaneSlot::Lane(0), PersonId(1), 50.0, false, 4.0, &reg).unwrap();
        assert_eq!(s.best_lane(), LaneSlot::Lane(1));
        assert_eq!(s.num_moving(), 1);
        assert_eq!(
            s.lane_agent_counts(),
            vec![(LaneSlot::Lane(0), 1), (LaneSlot::Lane(1), 0), (LaneSlot::Infinity, 0)]
        );
    }

    #[test]
    fn short_segment_fills_up() {
        let net = network(2, vec![(0, 1, vec![spec(10.0, 1, 1_800.0)])]);
        let mut s = SegmentStats::new(C0, net.segment(SegmentId(0)));
        let mut reg = PersonRegistry::new();
        for id in 1..=2 {
            reg.insert(on_lane(driver(id, vec![SegmentId(0)], &net), 0, 4.0 * id as f64));
        }
        assert!(s.can_accommodate(4.0));
        s.add_person(LaneSlot::Lane(0), PersonId(1), 4.0, false, 4.0, &reg).unwrap();
        assert!(s.can_accommodate(4.0));
        s.add_person(LaneSlot::Lane(0), PersonId(2), 8.0, false, 4.0, &reg).unwrap();
        assert!(!s.can_accommodate(4.0));
        assert_eq!(s.capacity_vehicles(4.0), 2);
    }

    #[test]
    fn dequeue_mismatch_names_both_persons() {
        let (mut s, net) = two_lane_segment();
        let mut reg = PersonRegistry::new();
        reg.insert(on_lane(driver(1, vec![SegmentId(0)], &net), 0, 10.0));
        reg.insert(on_lane(driver(2, vec![SegmentId(0)], &net), 0, 30.0));
        s.add_person(LaneSlot::Lane(0), PersonId(1), 10.0, false, 4.0, &reg).unwrap();
        s.add_person(LaneSlot::Lane(0), PersonId(2), 30.0, false, 4.0, &reg).unwrap();

        let err = s.dequeue(PersonId(2), LaneSlot::Lane(0), false, 4.0, Tick(3)).unwrap_err();
        assert!(matches!(
            err,
            ConfluxError::DequeueMismatch { person: PersonId(2), found: Some(PersonId(1)), tick: Tick(3), .. }
        ));
        assert_eq!(s.num_persons(), 2);
    }

    #[test]
    fn unknown_lane_is_rejected() {
        let (mut s, _) = two_lane_segment();
        let reg = PersonRegistry::new();
        let err = s.add_person(LaneSlot::Lane(5), PersonId(1), 1.0, false, 4.0, &reg).unwrap_err();
        assert!(matches!(err, ConfluxError::UnknownLane { lane: LaneSlot::Lane(5), .. }));
    }

    #[test]
    fn frontal_agents_come_out_closest_first() {
        let (mut s, net) = two_lane_segment();
        let mut reg = PersonRegistry::new();
        for (id, lane, d) in [(1, 0, 30.0), (2, 1, 20.0), (3, 0, 60.0)] {
            reg.insert(on_lane(driver(id, vec![SegmentId(0)], &net), lane, d));
            s.add_person(LaneSlot::Lane(lane), PersonId(id), d, false, 4.0, &reg).unwrap();
        }
        let mut rng = ConfluxRng::new(1, C0);
        s.reset_frontal_agents();
        let picks: Vec<PersonId> =
            std::iter::from_fn(|| s.agent_closest_to_stop_line(&reg, Tick(0), &mut rng)).collect();
        assert_eq!(picks, vec![PersonId(2), PersonId(1), PersonId(3)]);
    }

    #[test]
    fn frontier_skips_persons_already_updated() {
        let (mut s, net) = two_lane_segment();
        let mut reg = PersonRegistry::new();
        let mut done = on_lane(driver(1, vec![SegmentId(0)], &net), 0, 10.0);
        done.state.last_updated = Some(Tick(4));
        reg.insert(done);
        reg.insert(on_lane(driver(2, vec![SegmentId(0)], &net), 0, 40.0));
        s.add_person(LaneSlot::Lane(0), PersonId(1), 10.0, false, 4.0, &reg).unwrap();
        s.add_person(LaneSlot::Lane(0), PersonId(2), 40.0, false, 4.0, &reg).unwrap();

        let mut rng = ConfluxRng::new(1, C0);
        s.reset_frontal_agents();
        assert_eq!(s.agent_closest_to_stop_line(&reg, Tick(4), &mut rng), Some(PersonId(2)));
        assert_eq!(s.agent_closest_to_stop_line(&reg, Tick(4), &mut rng), None);
    }

    #[test]
    fn ordering_check_catches_overtaking() {
        let (mut s, net) = two_lane_segment();
        let mut reg = PersonRegistry::new();
        reg.insert(on_lane(driver(1, vec![SegmentId(0)], &net), 0, 10.0));
        reg.insert(on_lane(driver(2, vec![SegmentId(0)], &net), 0, 30.0));
        s.add_person(LaneSlot::Lane(0), PersonId(1), 10.0, false, 4.0, &reg).unwrap();
        s.add_person(LaneSlot::Lane(0), PersonId(2), 30.0, false, 4.0, &reg).unwrap();
        s.verify_ordering(&reg, Tick(0)).unwrap();

        reg.get_mut(PersonId(2)).unwrap().state.distance_to_end = 5.0;
        let err = s.verify_ordering(&reg, Tick(0)).unwrap_err();
        assert!(matches!(err, ConfluxError::OutOfOrderLane { person: PersonId(2), .. }));
    }
}

// ── Tie-break ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tie_break {
    use proptest::prelude::*;

    use meso_core::{ConfluxId, ConfluxRng};

    use crate::segment::choose_closest;

    fn share_of_first(entries: &[(u32, f64)], target: u32, trials: u64) -> u64 {
        (0..trials)
            .filter(|&seed| {
                let mut rng = ConfluxRng::new(seed, ConfluxId(0));
                choose_closest(entries, &mut rng) == Some(target)
            })
            .count() as u64
    }

    #[test]
    fn strict_minimum_wins() {
        let mut rng = ConfluxRng::new(0, ConfluxId(0));
        assert_eq!(choose_closest(&[(0, 2.0), (1, 1.0), (2, 3.0)], &mut rng), Some(1));
        assert_eq!(choose_closest::<u32>(&[], &mut rng), None);
    }

    #[test]
    fn two_way_tie_is_a_fair_coin_in_either_order() {
        let forward = share_of_first(&[(0, 1.0), (1, 1.0)], 0, 2_000);
        let reverse = share_of_first(&[(1, 1.0), (0, 1.0)], 0, 2_000);
        assert!((850..=1_150).contains(&forward), "forward {forward}");
        assert!((850..=1_150).contains(&reverse), "reverse {reverse}");
    }

    #[test]
    fn three_way_tie_is_uniform() {
        let entries = [(0, 4.0), (1, 4.0), (2, 4.0)];
        for target in 0..3 {
            let n = share_of_first(&entries, target, 3_000);
            assert!((850..=1_150).contains(&n), "candidate {target} won {n} times");
        }
    }

    #[test]
    fn same_seed_same_choice() {
        let entries = [(0, 1.0), (1, 1.0), (2, 1.0), (3, 1.0)];
        for seed in 0..50 {
            let a = choose_closest(&entries, &mut ConfluxRng::new(seed, ConfluxId(3)));
            let b = choose_closest(&entries, &mut ConfluxRng::new(seed, ConfluxId(3)));
            assert_eq!(a, b);
        }
    }

    proptest! {
        #[test]
        fn chosen_key_is_the_minimum(keys in prop::collection::vec(0u8..20, 1..12), seed in any::<u64>()) {
            let entries: Vec<(usize, f64)> = keys.iter().enumerate().map(|(i, &k)| (i, f64::from(k))).collect();
            let mut rng = ConfluxRng::new(seed, ConfluxId(0));
            let chosen = choose_closest(&entries, &mut rng).unwrap();
            let min = keys.iter().copied().min().unwrap();
            prop_assert_eq!(keys[chosen], min);
        }
    }
}

// ── Directory and snapshot ────────────────────────────────────────────────────

#[cfg(test)]
mod directory {
    use meso_core::{ConfluxId, LinkId, NodeId, PersonId, SegmentId};
    use meso_person::{Activity, Person, TripChain, TripChainItem};

    use super::helpers::*;

    #[test]
    fn one_conflux_per_intersection() {
        // 0 → 1 → 2, plus 3 → 1.  Nodes 0 and 3 have no incoming links.
        let net = network(
            4,
            vec![
                (0, 1, vec![spec(100.0, 1, 1_800.0)]),
                (1, 2, vec![spec(100.0, 1, 1_800.0)]),
                (3, 1, vec![spec(100.0, 1, 1_800.0)]),
            ],
        );
        let w = World::new(net, 5.0);
        assert_eq!(w.dir.len(), 2);
        assert_eq!(w.dir.node_of(C0), NodeId(1));
        assert_eq!(w.dir.node_of(C1), NodeId(2));
        assert_eq!(w.dir.conflux_at(NodeId(0)), None);
        assert_eq!(w.dir.conflux_of_link(LinkId(2)), C0);
        assert_eq!(w.dir.conflux_of_segment(SegmentId(1)), C1);
        assert_eq!(w.conflux(0).upstream_links().collect::<Vec<_>>(), vec![LinkId(0), LinkId(2)]);
    }

    #[test]
    fn activity_at_a_source_node_parks_downstream() {
        let net = network(3, vec![(0, 1, vec![spec(100.0, 1, 1_800.0)]), (1, 2, vec![spec(100.0, 1, 1_800.0)])]);
        let w = World::new(net, 5.0);
        let chain = TripChain::new(vec![TripChainItem::Activity(Activity {
            location:   NodeId(0),
            start_secs: 0.0,
            end_secs:   60.0,
        })]);
        let p = Person::new(PersonId(1), chain, &w.net, 4.0).unwrap();
        assert_eq!(w.dir.starting_conflux(&p, &w.net), Some(ConfluxId(0)));

        let d = driver(2, vec![SegmentId(1)], &w.net);
        assert_eq!(w.dir.starting_conflux(&d, &w.net), Some(C1));
    }

    #[test]
    fn snapshot_reports_bounds_and_supply() {
        let net = network(3, vec![(0, 1, vec![spec(100.0, 2, 3_600.0)]), (1, 2, vec![spec(8.0, 1, 1_800.0)])]);
        let w = World::new(net, 5.0);
        let view = w.view();
        assert_eq!(view.last_updated(C0), None);
        assert_eq!(view.link(LinkId(0)).vq_bound, 50);
        assert_eq!(view.link(LinkId(1)).vq_bound, 2);
        let s = view.segment(SegmentId(1)).unwrap();
        assert_eq!(s.capacity_vehicles, 2);
        assert_eq!(s.occupancy, 0);
        assert_eq!(s.speed_mps, 10.0);
    }
}

// ── Conflux scenarios ─────────────────────────────────────────────────────────

#[cfg(test)]
mod conflux {
    use meso_core::{LaneSlot, LinkId, NodeId, PersonId, SegmentId, Tick};
    use meso_person::{Activity, Person, Trip, TripChain, TripChainItem};

    use crate::{ConfluxError, ConfluxMessage};
    use super::helpers::*;

    /// 0 → 1 with S0 (100 m) and S1 (50 m): one conflux.
    fn two_segment_link() -> World {
        World::new(network(2, vec![(0, 1, vec![spec(100.0, 1, 1_800.0), spec(50.0, 1, 1_800.0)])]), 1.0)
    }

    /// L0: 0 → 1 (S0) and L1: 1 → 2 (S1), one segment each.
    fn two_confluxes(s0: meso_network::SegmentSpec, s1: meso_network::SegmentSpec) -> World {
        World::new(network(3, vec![(0, 1, vec![s0]), (1, 2, vec![s1])]), 5.0)
    }

    #[test]
    fn new_trip_enters_and_moves_one_tick() {
        let mut w = two_segment_link();
        w.add(driver(1, vec![SegmentId(0), SegmentId(1)], &w.net));
        w.movement(0);

        let p = w.registry.get(PersonId(1)).unwrap();
        assert_eq!(p.state.segment, Some(SegmentId(0)));
        assert_eq!(p.state.lane, Some(LaneSlot::Lane(0)));
        assert_eq!(p.state.distance_to_end, 90.0);
        assert!(!p.state.is_queuing);
        assert_eq!(w.conflux(0).last_updated(), Some(Tick(0)));

        let s0 = w.conflux(0).find_seg_stats(SegmentId(0)).unwrap();
        assert_eq!(s0.lane_infinity().len(), 0);
        assert_eq!(s0.num_moving(), 1);
        assert_eq!(w.conflux(0).num_moving_in_segment(SegmentId(0)), Some(1));
    }

    #[test]
    fn crossing_into_an_unprocessed_conflux_goes_through_its_virtual_queue() {
        let mut w = two_confluxes(spec(100.0, 1, 3_600.0), spec(100.0, 1, 3_600.0));
        w.add(on_lane(driver(1, vec![SegmentId(0), SegmentId(1)], &w.net), 0, 5.0));

        w.movement(0);
        assert!(w.conflux(1).all_persons().is_empty());
        assert_eq!(w.conflux(0).find_seg_stats(SegmentId(0)).unwrap().num_persons(), 0);
        assert!(w.registry.get(PersonId(1)).is_none());

        let (envelopes, removed) = w.conflux_mut(0).take_outbox();
        assert!(removed.is_empty());
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].to, C1);
        assert!(matches!(
            &envelopes[0].message,
            ConfluxMessage::VirtualQueue { link: LinkId(1), person } if person.id == PersonId(1)
        ));
        for env in envelopes {
            w.confluxes[1].deliver(env.message, &mut w.registry).unwrap();
        }
        assert_eq!(w.conflux(1).virtual_queue(LinkId(1)).unwrap().len(), 1);
        assert_eq!(w.conflux(1).find_seg_stats(SegmentId(1)).unwrap().num_persons(), 0);

        w.virtual_queues(0);
        assert!(w.conflux(1).virtual_queue(LinkId(1)).unwrap().is_empty());
        let p = w.registry.get(PersonId(1)).unwrap();
        assert_eq!(p.state.segment, Some(SegmentId(1)));
        assert_eq!(p.state.lane, Some(LaneSlot::Lane(0)));
        assert_eq!(p.state.distance_to_end, 55.0);
        assert_eq!(w.conflux(1).all_persons(), vec![PersonId(1)]);
    }

    #[test]
    fn link_exit_is_reported_with_segment_flow() {
        let mut w = two_confluxes(spec(100.0, 1, 3_600.0), spec(100.0, 1, 3_600.0));
        w.add(on_lane(driver(1, vec![SegmentId(0), SegmentId(1)], &w.net), 0, 5.0));
        w.movement(0);
        w.deliver();
        w.virtual_queues(0);
        w.deliver();
        let report = w.supply(0);

        assert_eq!(report.links.len(), 1);
        assert_eq!(report.links[0].link, LinkId(0));
        assert_eq!(report.links[0].count, 1);
        assert_eq!(report.links[0].mean_secs, 0.5);

        let s0 = report.segments.iter().find(|r| r.segment == SegmentId(0)).unwrap();
        assert_eq!(s0.flow, 1);
        assert_eq!(s0.moving, 0);
        let s1 = report.segments.iter().find(|r| r.segment == SegmentId(1)).unwrap();
        assert_eq!(s1.moving, 1);
        assert_eq!(w.conflux(0).find_seg_stats(SegmentId(0)).unwrap().flow(), 0);
    }

    #[test]
    fn virtual_queue_admissions_stop_at_the_bound() {
        // Three lanes discharge at once into an 8 m link with room for two.
        let mut w = two_confluxes(spec(100.0, 3, 10_800.0), spec(8.0, 1, 1_800.0));
        assert_eq!(w.conflux(1).vq_bound(LinkId(1)), 2);
        for lane in 0..3u16 {
            let p = driver(u32::from(lane) + 1, vec![SegmentId(0), SegmentId(1)], &w.net);
            w.add(on_lane(p, lane, 5.0));
        }
        w.movement(0);

        let (envelopes, _) = w.conflux_mut(0).take_outbox();
        assert_eq!(envelopes.len(), 2);
        assert!(envelopes.iter().all(|e| matches!(e.message, ConfluxMessage::VirtualQueue { link: LinkId(1), .. })));
        assert_eq!(w.conflux(0).num_queueing_in_segment(SegmentId(0)), Some(1));

        for env in envelopes {
            w.confluxes[1].deliver(env.message, &mut w.registry).unwrap();
        }
        assert!(!w.conflux(1).has_space_in_virtual_queue(LinkId(1), 0));
        let threshold = w.params.evade_vq_bounds_threshold_ticks;
        assert!(w.conflux(1).has_space_in_virtual_queue(LinkId(1), threshold));
    }

    #[test]
    fn waiting_person_counts_once_against_the_bound() {
        // S1 has room for two and one person is still waiting from an earlier tick.
        let mut w = two_confluxes(spec(100.0, 3, 10_800.0), spec(8.0, 1, 1_800.0));
        let mut waiting = driver(9, vec![SegmentId(0), SegmentId(1)], &w.net);
        waiting.state.segment = Some(SegmentId(1));
        waiting.state.lane = None;
        w.confluxes[1].add_starting_person(waiting, &mut w.registry).unwrap();
        let params = w.params.clone();
        w.conflux_mut(1).reset_output_bounds(&params);
        assert_eq!(w.conflux(1).vq_bound(LinkId(1)), 1);
        assert!(w.conflux(1).has_space_in_virtual_queue(LinkId(1), 0));

        for lane in 0..3u16 {
            let p = driver(u32::from(lane) + 1, vec![SegmentId(0), SegmentId(1)], &w.net);
            w.add(on_lane(p, lane, 5.0));
        }
        w.movement(0);

        let (envelopes, _) = w.conflux_mut(0).take_outbox();
        assert_eq!(envelopes.len(), 1);
        for env in envelopes {
            w.confluxes[1].deliver(env.message, &mut w.registry).unwrap();
        }
        assert_eq!(w.conflux(1).virtual_queue(LinkId(1)).unwrap().len(), 2);
        assert!(!w.conflux(1).has_space_in_virtual_queue(LinkId(1), 0));
        assert_eq!(w.conflux(0).num_queueing_in_segment(SegmentId(0)), Some(2));
    }

    #[test]
    fn stuck_persons_break_a_gridlocked_ring() {
        // L0: 0 → 1 and L1: 1 → 0, both full, everyone headed for the other link.
        let net = network(2, vec![(0, 1, vec![spec(8.0, 1, 1_800.0)]), (1, 0, vec![spec(8.0, 1, 1_800.0)])]);
        let mut w = World::new(net, 5.0);
        for (id, seg, next, d) in [(1, 0, 1, 0.0), (2, 0, 1, 4.0), (3, 1, 0, 0.0), (4, 1, 0, 4.0)] {
            let p = driver(id, vec![SegmentId(seg), SegmentId(next)], &w.net);
            w.add(on_lane(p, 0, d));
        }
        let params = w.params.clone();
        for c in &mut w.confluxes {
            c.reset_output_bounds(&params);
        }
        assert_eq!(w.conflux(0).vq_bound(LinkId(1)), 0);
        assert_eq!(w.conflux(1).vq_bound(LinkId(0)), 0);

        let threshold = u64::from(params.evade_vq_bounds_threshold_ticks);
        let mut removed = Vec::new();
        for tick in 0..threshold {
            removed.extend(w.step(tick));
        }
        assert!(removed.is_empty());
        assert!(w.registry.get(PersonId(3)).unwrap().state.ticks_stuck >= 1);

        for tick in threshold..threshold * 4 {
            removed.extend(w.step(tick));
        }
        removed.sort();
        assert_eq!(removed, (1..=4).map(PersonId).collect::<Vec<_>>());
    }

    #[test]
    fn reported_row_has_the_speed_driven_during_the_tick() {
        let mut w = World::new(network(2, vec![(0, 1, vec![spec(100.0, 1, 3_600.0)])]), 1.0);
        w.add(on_lane(driver(1, vec![SegmentId(0)], &w.net), 0, 50.0));
        w.add(on_lane(driver(2, vec![SegmentId(0)], &w.net), 0, 80.0));
        let report = w.supply(0);

        let row = &report.segments[0];
        assert_eq!(row.density, 0.02);
        assert_eq!(row.speed_mps, 10.0);
        assert_eq!(w.conflux(0).segment_speed(SegmentId(0)), Some(w.params.min_speed_mps));

        assert_eq!(report.link_stats.len(), 1);
        assert_eq!(report.link_stats[0].link, LinkId(0));
        assert_eq!(report.link_stats[0].density, 0.08);
    }

    #[test]
    fn followers_leave_in_lane_order() {
        let mut w = two_confluxes(spec(100.0, 1, 3_600.0), spec(100.0, 1, 3_600.0));
        w.add(on_lane(driver(1, vec![SegmentId(0), SegmentId(1)], &w.net), 0, 2.0));
        w.add(on_lane(driver(2, vec![SegmentId(0), SegmentId(1)], &w.net), 0, 6.0));
        w.movement(0);

        let (envelopes, _) = w.conflux_mut(0).take_outbox();
        let order: Vec<PersonId> = envelopes.iter().map(|e| e.message.person_id()).collect();
        assert_eq!(order, vec![PersonId(1), PersonId(2)]);
        assert!(envelopes[0].seq < envelopes[1].seq);
    }

    #[test]
    fn finished_trip_is_removed_and_timed() {
        let mut w = World::new(network(2, vec![(0, 1, vec![spec(100.0, 1, 3_600.0)])]), 5.0);
        w.add(on_lane(driver(1, vec![SegmentId(0)], &w.net), 0, 5.0));
        let removed = w.step(0);

        assert_eq!(removed, vec![PersonId(1)]);
        assert!(w.registry.is_empty());
        assert!(w.conflux(0).all_persons().is_empty());
    }

    #[test]
    fn closed_lane_turns_arrivals_into_a_queue() {
        let mut w = two_confluxes(spec(100.0, 1, 3_600.0), spec(100.0, 1, 3_600.0));
        w.conflux_mut(0).insert_incident(SegmentId(0), 0.0, 5.0).unwrap();
        assert_eq!(w.conflux(0).output_flow_rate(SegmentId(0), LaneSlot::Lane(0)), Some(0.0));
        w.add(on_lane(driver(1, vec![SegmentId(0), SegmentId(1)], &w.net), 0, 5.0));
        w.movement(0);

        let p = w.registry.get(PersonId(1)).unwrap();
        assert!(p.state.is_queuing);
        assert_eq!(p.state.distance_to_end, 0.0);
        assert_eq!(w.conflux(0).num_queueing_in_segment(SegmentId(0)), Some(1));

        w.conflux_mut(0).remove_incident(SegmentId(0), 5.0).unwrap();
        assert_eq!(w.conflux(0).output_flow_rate(SegmentId(0), LaneSlot::Lane(0)), Some(1.0));
    }

    #[test]
    fn incident_on_foreign_segment_is_rejected() {
        let mut w = two_confluxes(spec(100.0, 1, 3_600.0), spec(100.0, 1, 3_600.0));
        let err = w.conflux_mut(0).insert_incident(SegmentId(1), 0.0, 5.0).unwrap_err();
        assert!(matches!(err, ConfluxError::UnknownSegment { segment: SegmentId(1), .. }));
    }

    #[test]
    fn finished_activity_hands_the_next_trip_to_its_conflux() {
        let mut w = two_confluxes(spec(100.0, 1, 3_600.0), spec(100.0, 1, 3_600.0));
        let chain = TripChain::new(vec![
            TripChainItem::Activity(Activity { location: NodeId(1), start_secs: 0.0, end_secs: 10.0 }),
            TripChainItem::Trip(Trip {
                origin:      NodeId(1),
                destination: NodeId(2),
                start_secs:  10.0,
                path:        vec![SegmentId(1)],
            }),
        ]);
        w.add(Person::new(PersonId(1), chain, &w.net, 4.0).unwrap());
        assert_eq!(w.conflux(0).activity_performers(), &[PersonId(1)]);

        w.movement(0);
        w.movement(1);
        assert_eq!(w.conflux(0).activity_performers(), &[PersonId(1)]);
        assert!(w.conflux_mut(0).take_outbox().0.is_empty());

        w.movement(2);
        assert!(w.conflux(0).activity_performers().is_empty());
        let (envelopes, _) = w.conflux_mut(0).take_outbox();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].to, C1);
        assert!(matches!(
            envelopes[0].message,
            ConfluxMessage::Transfer { segment: SegmentId(1), lane: LaneSlot::Infinity, .. }
        ));
    }

    #[test]
    fn updating_an_unknown_person_fails() {
        let mut w = two_segment_link();
        let view = w.view();
        let ctx = crate::TickContext {
            now:       Tick(0),
            now_secs:  0.0,
            tick_secs: 1.0,
            network:   &w.net,
            directory: &w.dir,
            view:      &view,
            params:    &w.params,
        };
        let err = w.confluxes[0].update_agent(PersonId(9), &ctx, &mut w.registry).unwrap_err();
        assert!(matches!(err, ConfluxError::UnknownPerson { person: PersonId(9), .. }));
    }

    #[test]
    fn virtual_queue_on_a_foreign_link_is_rejected() {
        let mut w = two_confluxes(spec(100.0, 1, 3_600.0), spec(100.0, 1, 3_600.0));
        let err = w.conflux_mut(0).push_back_onto_virtual_queue(LinkId(1), PersonId(1)).unwrap_err();
        assert!(matches!(err, ConfluxError::UnknownLink { link: LinkId(1), .. }));
    }
}
