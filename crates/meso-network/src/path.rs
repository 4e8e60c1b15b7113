//! Path lookup trait and default Dijkstra implementation.
//!
//! Path generation is an external collaborator of the simulation core: trip
//! construction asks a [`PathLookup`] for the segments to drive, and the
//! confluxes never search paths themselves.  The default [`DijkstraPaths`]
//! minimises free-flow link travel time.
//!
//! # Cost units
//!
//! Costs are whole **milliseconds** (u64) internally so the heap ordering is
//! total and ties break deterministically on `NodeId`.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use meso_core::{LinkId, NodeId, SegmentId};

use crate::network::RoadNetwork;
use crate::{NetworkError, NetworkResult};

// ── Path ──────────────────────────────────────────────────────────────────────

/// An ordered list of links (and their segments) from origin to destination.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub links: Vec<LinkId>,
    /// Every segment of every link, flattened in driving order.
    pub segments: Vec<SegmentId>,
    /// Free-flow travel time in seconds.
    pub free_flow_secs: f64,
}

impl Path {
    /// `true` if origin and destination are the same node.
    pub fn is_trivial(&self) -> bool {
        self.links.is_empty()
    }

    fn from_links(network: &RoadNetwork, links: Vec<LinkId>) -> Path {
        let segments = links
            .iter()
            .flat_map(|&l| network.link(l).segments.iter().copied())
            .collect();
        let free_flow_secs = links.iter().map(|&l| network.link_free_flow_secs(l)).sum();
        Path { links, segments, free_flow_secs }
    }
}

// ── PathLookup trait ──────────────────────────────────────────────────────────

/// Pluggable path service.
///
/// Implementations must be `Send + Sync` so a single instance can be shared
/// by loaders running on several threads.
pub trait PathLookup: Send + Sync {
    /// Path from `from` to `to`.  `from == to` yields an empty path.
    fn path(&self, network: &RoadNetwork, from: NodeId, to: NodeId) -> NetworkResult<Path>;
}

// ── DijkstraPaths ─────────────────────────────────────────────────────────────

/// Dijkstra over links weighted by free-flow travel time.
pub struct DijkstraPaths;

impl PathLookup for DijkstraPaths {
    fn path(&self, network: &RoadNetwork, from: NodeId, to: NodeId) -> NetworkResult<Path> {
        for n in [from, to] {
            if n.index() >= network.node_count() {
                return Err(NetworkError::NodeNotFound(n));
            }
        }
        if from == to {
            return Ok(Path { links: vec![], segments: vec![], free_flow_secs: 0.0 });
        }

        let n = network.node_count();
        let mut dist      = vec![u64::MAX; n];
        let mut prev_link = vec![LinkId::INVALID; n];
        dist[from.index()] = 0;

        // Secondary key NodeId ensures deterministic tie-breaking.
        let mut heap: BinaryHeap<Reverse<(u64, NodeId)>> = BinaryHeap::new();
        heap.push(Reverse((0, from)));

        while let Some(Reverse((cost, node))) = heap.pop() {
            if node == to {
                return Ok(Path::from_links(network, reconstruct(network, &prev_link, to)));
            }
            if cost > dist[node.index()] {
                continue;
            }
            for &link in network.out_links(node) {
                let next = network.link(link).to;
                let step = (network.link_free_flow_secs(link) * 1_000.0).round() as u64;
                let new_cost = cost.saturating_add(step);
                if new_cost < dist[next.index()] {
                    dist[next.index()] = new_cost;
                    prev_link[next.index()] = link;
                    heap.push(Reverse((new_cost, next)));
                }
            }
        }

        Err(NetworkError::NoPath { from, to })
    }
}

fn reconstruct(network: &RoadNetwork, prev_link: &[LinkId], to: NodeId) -> Vec<LinkId> {
    let mut links = Vec::new();
    let mut cur = to;
    loop {
        let l = prev_link[cur.index()];
        if l == LinkId::INVALID {
            break;
        }
        links.push(l);
        cur = network.link(l).from;
    }
    links.reverse();
    links
}
