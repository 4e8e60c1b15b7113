//! Read-only cross-conflux state.
//!
//! [`ConfluxDirectory`] answers "which conflux owns this?" for nodes, links,
//! and segments; it is built once from the network.  [`FrameView`] is the
//! per-phase snapshot every conflux reads when it needs to know about a
//! neighbour: when it last updated, how much room its virtual queues have,
//! and the supply on its segments.  Snapshots are rebuilt between phases,
//! never mutated during one.

use meso_core::{ConfluxId, LaneSlot, LinkId, NodeId, SegmentId, Tick};
use meso_network::RoadNetwork;
use meso_person::{Person, TripChainItem};

// ── ConfluxDirectory ──────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ConfluxDirectory {
    /// Conflux index → its intersection.
    nodes:      Vec<NodeId>,
    by_node:    Vec<Option<ConfluxId>>,
    /// Downstream conflux of every link.
    by_link:    Vec<ConfluxId>,
    by_segment: Vec<ConfluxId>,
}

impl ConfluxDirectory {
    /// One conflux per intersection (node with incoming links), numbered in
    /// ascending node order.
    pub fn new(network: &RoadNetwork) -> Self {
        let mut nodes = Vec::new();
        let mut by_node = vec![None; network.node_count()];
        for node in network.intersections() {
            by_node[node.index()] = Some(ConfluxId(nodes.len() as u32));
            nodes.push(node);
        }
        let by_link: Vec<ConfluxId> = network
            .links
            .iter()
            .map(|l| by_node[l.to.index()].unwrap_or(ConfluxId::INVALID))
            .collect();
        let by_segment = network.segments.iter().map(|s| by_link[s.link.index()]).collect();
        Self { nodes, by_node, by_link, by_segment }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ConfluxId> + use<> {
        (0..self.nodes.len() as u32).map(ConfluxId)
    }

    #[inline]
    pub fn node_of(&self, conflux: ConfluxId) -> NodeId {
        self.nodes[conflux.index()]
    }

    #[inline]
    pub fn conflux_at(&self, node: NodeId) -> Option<ConfluxId> {
        self.by_node.get(node.index()).copied().flatten()
    }

    #[inline]
    pub fn conflux_of_link(&self, link: LinkId) -> ConfluxId {
        self.by_link[link.index()]
    }

    #[inline]
    pub fn conflux_of_segment(&self, segment: SegmentId) -> ConfluxId {
        self.by_segment[segment.index()]
    }

    /// The conflux that should hold `person` when it enters the simulation.
    ///
    /// Drivers go to the owner of their first segment.  An activity at a node
    /// without incoming links is parked at the conflux its first outgoing
    /// link leads to.
    pub fn starting_conflux(&self, person: &Person, network: &RoadNetwork) -> Option<ConfluxId> {
        if let Some(seg) = person.state.segment {
            return Some(self.conflux_of_segment(seg));
        }
        let location = match person.chain().current()? {
            TripChainItem::Activity(a) => a.location,
            TripChainItem::Trip(t) => t.origin,
        };
        self.conflux_at(location).or_else(|| {
            network
                .out_links(location)
                .first()
                .map(|&l| self.conflux_of_link(l))
        })
    }
}

// ── FrameView ─────────────────────────────────────────────────────────────────

/// Supply of one segment as seen by other confluxes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SegmentSnapshot {
    pub speed_mps:         f64,
    /// Persons on physical lanes.
    pub occupancy:         u32,
    pub capacity_vehicles: u32,
    pub best_lane:         LaneSlot,
    pub length_m:          f64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub vq_bound:    u32,
    /// Persons admitted into the virtual queue since `vq_bound` was set.
    pub vq_admitted: u32,
}

#[derive(Clone, Debug, Default)]
pub struct FrameView {
    last_updated: Vec<Option<Tick>>,
    segments:     Vec<Option<SegmentSnapshot>>,
    links:        Vec<LinkSnapshot>,
}

impl FrameView {
    pub fn new(network: &RoadNetwork, conflux_count: usize) -> Self {
        Self {
            last_updated: vec![None; conflux_count],
            segments:     vec![None; network.segment_count()],
            links:        vec![LinkSnapshot::default(); network.link_count()],
        }
    }

    #[inline]
    pub fn last_updated(&self, conflux: ConfluxId) -> Option<Tick> {
        self.last_updated.get(conflux.index()).copied().flatten()
    }

    #[inline]
    pub fn segment(&self, segment: SegmentId) -> Option<&SegmentSnapshot> {
        self.segments.get(segment.index()).and_then(Option::as_ref)
    }

    #[inline]
    pub fn link(&self, link: LinkId) -> LinkSnapshot {
        self.links.get(link.index()).copied().unwrap_or_default()
    }

    pub fn set_last_updated(&mut self, conflux: ConfluxId, tick: Option<Tick>) {
        if let Some(slot) = self.last_updated.get_mut(conflux.index()) {
            *slot = tick;
        }
    }

    pub fn set_segment(&mut self, segment: SegmentId, snapshot: SegmentSnapshot) {
        if let Some(slot) = self.segments.get_mut(segment.index()) {
            *slot = Some(snapshot);
        }
    }

    pub fn set_link(&mut self, link: LinkId, snapshot: LinkSnapshot) {
        if let Some(slot) = self.links.get_mut(link.index()) {
            *slot = snapshot;
        }
    }
}
