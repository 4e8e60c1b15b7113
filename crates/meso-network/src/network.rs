//! Road network representation and builder.
//!
//! # Data layout
//!
//! Links and segments live in two arenas indexed by `LinkId` / `SegmentId`.
//! A link's segments are allocated contiguously in upstream-to-downstream
//! order, so "the next segment on this link" is `SegmentId(id + 1)` guarded
//! by the link's segment count.
//!
//! Adjacency uses **Compressed Sparse Row (CSR)** index arrays.  Given a
//! `NodeId n`, its outgoing links are:
//!
//! ```text
//! out_links[ node_out_start[n] .. node_out_start[n+1] ]
//! ```
//!
//! and its incoming links (the links whose segments a conflux at `n` owns)
//! are the same slice of `in_links` / `node_in_start`.  Link IDs keep their
//! insertion order; only the index arrays are sorted.

use meso_core::{LinkId, NodeId, SegmentId};

use crate::{NetworkError, NetworkResult};

// ── Arena entries ─────────────────────────────────────────────────────────────

/// One directed road section.  Immutable for the whole run.
#[derive(Clone, Debug, PartialEq)]
pub struct RoadSegment {
    pub id:             SegmentId,
    /// Parent link.
    pub link:           LinkId,
    /// Position inside the parent link, 0 = most upstream.
    pub index_in_link:  u16,
    pub length_m:       f64,
    /// Number of vehicle lanes (≥ 1).
    pub lanes:          u16,
    /// Free-flow speed in m/s.
    pub max_speed_mps:  f64,
    /// Total discharge capacity over all lanes, vehicles per second.
    pub capacity_vps:   f64,
}

impl RoadSegment {
    /// Free-flow traversal time in seconds.
    #[inline]
    pub fn free_flow_secs(&self) -> f64 {
        self.length_m / self.max_speed_mps
    }
}

/// Ordered run of segments between two intersections.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    pub id:       LinkId,
    pub from:     NodeId,
    pub to:       NodeId,
    /// Segments in upstream-to-downstream order (never empty).
    pub segments: Vec<SegmentId>,
    pub length_m: f64,
}

// ── RoadNetwork ───────────────────────────────────────────────────────────────

/// Directed road graph.  Do not construct directly; use
/// [`RoadNetworkBuilder`].
#[derive(Clone, Debug)]
pub struct RoadNetwork {
    node_count: usize,

    pub links:    Vec<Link>,
    pub segments: Vec<RoadSegment>,

    // ── CSR adjacency ─────────────────────────────────────────────────────
    node_out_start: Vec<u32>,
    out_links:      Vec<LinkId>,
    node_in_start:  Vec<u32>,
    in_links:       Vec<LinkId>,
}

impl RoadNetwork {
    /// Construct an empty network with no nodes or links.
    pub fn empty() -> Self {
        RoadNetwork {
            node_count:     0,
            links:          Vec::new(),
            segments:       Vec::new(),
            node_out_start: vec![0],
            out_links:      Vec::new(),
            node_in_start:  vec![0],
            in_links:       Vec::new(),
        }
    }

    // ── Dimensions ────────────────────────────────────────────────────────

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    // ── Lookups ───────────────────────────────────────────────────────────

    #[inline]
    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.index()]
    }

    #[inline]
    pub fn segment(&self, id: SegmentId) -> &RoadSegment {
        &self.segments[id.index()]
    }

    #[inline]
    pub fn get_segment(&self, id: SegmentId) -> Option<&RoadSegment> {
        self.segments.get(id.index())
    }

    /// The link a segment belongs to.
    #[inline]
    pub fn link_of(&self, seg: SegmentId) -> LinkId {
        self.segments[seg.index()].link
    }

    /// The intersection downstream of `seg`'s link.  A conflux at this node
    /// owns the segment.
    #[inline]
    pub fn downstream_node(&self, seg: SegmentId) -> NodeId {
        self.links[self.link_of(seg).index()].to
    }

    /// Next segment on the same link, or `None` if `seg` is the link's last.
    pub fn next_segment_in_link(&self, seg: SegmentId) -> Option<SegmentId> {
        let s = &self.segments[seg.index()];
        let link = &self.links[s.link.index()];
        link.segments.get(s.index_in_link as usize + 1).copied()
    }

    #[inline]
    pub fn is_last_in_link(&self, seg: SegmentId) -> bool {
        self.next_segment_in_link(seg).is_none()
    }

    // ── Graph traversal ───────────────────────────────────────────────────

    /// Links leaving `node`.
    #[inline]
    pub fn out_links(&self, node: NodeId) -> &[LinkId] {
        let start = self.node_out_start[node.index()] as usize;
        let end   = self.node_out_start[node.index() + 1] as usize;
        &self.out_links[start..end]
    }

    /// Links arriving at `node`.
    #[inline]
    pub fn in_links(&self, node: NodeId) -> &[LinkId] {
        let start = self.node_in_start[node.index()] as usize;
        let end   = self.node_in_start[node.index() + 1] as usize;
        &self.in_links[start..end]
    }

    /// Nodes with at least one incoming link, ascending.  Each gets a conflux.
    pub fn intersections(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.node_count)
            .map(|n| NodeId(n as u32))
            .filter(|&n| !self.in_links(n).is_empty())
    }

    /// Free-flow time to traverse a whole link, in seconds.
    pub fn link_free_flow_secs(&self, link: LinkId) -> f64 {
        self.links[link.index()]
            .segments
            .iter()
            .map(|&s| self.segments[s.index()].free_flow_secs())
            .sum()
    }
}

// ── RoadNetworkBuilder ────────────────────────────────────────────────────────

/// Geometry of one segment, as supplied by a loader.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentSpec {
    pub length_m:      f64,
    pub lanes:         u16,
    pub max_speed_mps: f64,
    /// Capacity over all lanes in vehicles per hour.
    pub capacity_vph:  f64,
}

/// Construct a [`RoadNetwork`] incrementally, then call [`build`](Self::build).
///
/// # Example
///
/// ```
/// use meso_network::{RoadNetworkBuilder, SegmentSpec};
///
/// let mut b = RoadNetworkBuilder::new();
/// let a = b.add_node();
/// let c = b.add_node();
/// let seg = SegmentSpec { length_m: 200.0, lanes: 2, max_speed_mps: 15.0, capacity_vph: 3_600.0 };
/// b.add_link(a, c, vec![seg.clone(), seg]);
/// let net = b.build().unwrap();
/// assert_eq!(net.link_count(), 1);
/// assert_eq!(net.segment_count(), 2);
/// ```
pub struct RoadNetworkBuilder {
    node_count: usize,
    links:      Vec<(NodeId, NodeId, Vec<SegmentSpec>)>,
}

impl RoadNetworkBuilder {
    pub fn new() -> Self {
        Self { node_count: 0, links: Vec::new() }
    }

    /// Add an intersection and return its `NodeId` (sequential from 0).
    pub fn add_node(&mut self) -> NodeId {
        let id = NodeId(self.node_count as u32);
        self.node_count += 1;
        id
    }

    /// Make sure nodes `0..n` exist.
    pub fn ensure_nodes(&mut self, n: usize) {
        self.node_count = self.node_count.max(n);
    }

    /// Add a directed link made of `segments` (upstream first).
    ///
    /// A link without segments has no lane space to simulate; it is logged
    /// and skipped, and `None` is returned.
    pub fn add_link(&mut self, from: NodeId, to: NodeId, segments: Vec<SegmentSpec>) -> Option<LinkId> {
        if segments.is_empty() {
            tracing::warn!(%from, %to, "link has no segments; skipping");
            return None;
        }
        let id = LinkId(self.links.len() as u32);
        self.links.push((from, to, segments));
        Some(id)
    }

    pub fn node_count(&self) -> usize { self.node_count }
    pub fn link_count(&self) -> usize { self.links.len() }

    /// Consume the builder and produce a [`RoadNetwork`].
    ///
    /// Fails if a link references an unknown node or a segment has a
    /// non-positive length, lane count, or speed.
    pub fn build(self) -> NetworkResult<RoadNetwork> {
        let node_count = self.node_count;
        let mut links    = Vec::with_capacity(self.links.len());
        let mut segments = Vec::new();

        for (i, (from, to, specs)) in self.links.into_iter().enumerate() {
            let link_id = LinkId(i as u32);
            for n in [from, to] {
                if n.index() >= node_count {
                    return Err(NetworkError::NodeNotFound(n));
                }
            }

            let mut seg_ids = Vec::with_capacity(specs.len());
            let mut length_m = 0.0;
            for (k, spec) in specs.into_iter().enumerate() {
                validate_spec(link_id, &spec)?;
                let id = SegmentId(segments.len() as u32);
                length_m += spec.length_m;
                segments.push(RoadSegment {
                    id,
                    link:          link_id,
                    index_in_link: k as u16,
                    length_m:      spec.length_m,
                    lanes:         spec.lanes,
                    max_speed_mps: spec.max_speed_mps,
                    capacity_vps:  spec.capacity_vph / 3_600.0,
                });
                seg_ids.push(id);
            }
            links.push(Link { id: link_id, from, to, segments: seg_ids, length_m });
        }

        let (node_out_start, out_links) = csr(node_count, &links, |l| l.from);
        let (node_in_start, in_links)   = csr(node_count, &links, |l| l.to);

        Ok(RoadNetwork {
            node_count,
            links,
            segments,
            node_out_start,
            out_links,
            node_in_start,
            in_links,
        })
    }
}

impl Default for RoadNetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_spec(link: LinkId, spec: &SegmentSpec) -> NetworkResult<()> {
    let reason = if !(spec.length_m > 0.0) {
        format!("length {} m", spec.length_m)
    } else if spec.lanes == 0 {
        "zero lanes".to_string()
    } else if !(spec.max_speed_mps > 0.0) {
        format!("max speed {} m/s", spec.max_speed_mps)
    } else if !(spec.capacity_vph >= 0.0) {
        format!("capacity {} veh/h", spec.capacity_vph)
    } else {
        return Ok(());
    };
    Err(NetworkError::InvalidSegment { link, reason })
}

/// Build a CSR row pointer plus link index array keyed by `key(link)`.
/// Links stay in ascending `LinkId` order within each row.
fn csr(node_count: usize, links: &[Link], key: impl Fn(&Link) -> NodeId) -> (Vec<u32>, Vec<LinkId>) {
    let mut start = vec![0u32; node_count + 1];
    for l in links {
        start[key(l).index() + 1] += 1;
    }
    for i in 1..=node_count {
        start[i] += start[i - 1];
    }

    let mut fill = start.clone();
    let mut idx = vec![LinkId::INVALID; links.len()];
    for l in links {
        let slot = &mut fill[key(l).index()];
        idx[*slot as usize] = l.id;
        *slot += 1;
    }
    (start, idx)
}
