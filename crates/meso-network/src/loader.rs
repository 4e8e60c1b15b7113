//! CSV network loader.
//!
//! # CSV format
//!
//! One row per segment.  Rows of the same link are ordered by `seq`
//! (upstream first); the file itself may be in any order.
//!
//! ```csv
//! link_id,from,to,seq,length_m,lanes,max_speed_mps,capacity_vph
//! 0,0,1,0,100.0,1,10.0,1800
//! 0,0,1,1,50.0,1,10.0,1800
//! 1,1,2,0,200.0,2,13.9,3600
//! ```
//!
//! Node IDs are dense integers; the node count is one past the largest ID
//! referenced.  Links receive `LinkId`s in ascending `link_id` order, so the
//! file's IDs and the arena's match when the file's IDs are dense.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use meso_core::NodeId;

use crate::network::{RoadNetwork, RoadNetworkBuilder, SegmentSpec};
use crate::{NetworkError, NetworkResult};

// ── CSV record ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SegmentRecord {
    link_id:       u32,
    from:          u32,
    to:            u32,
    seq:           u16,
    length_m:      f64,
    lanes:         u16,
    max_speed_mps: f64,
    capacity_vph:  f64,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Load a [`RoadNetwork`] from a segment CSV file.
pub fn load_network_csv(path: &Path) -> NetworkResult<RoadNetwork> {
    let file = std::fs::File::open(path)?;
    load_network_reader(file)
}

/// Like [`load_network_csv`] but accepts any `Read` source.
pub fn load_network_reader<R: Read>(reader: R) -> NetworkResult<RoadNetwork> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut by_link: BTreeMap<u32, Vec<SegmentRecord>> = BTreeMap::new();
    let mut max_node = None::<u32>;

    for result in csv_reader.deserialize::<SegmentRecord>() {
        let row = result.map_err(|e| NetworkError::Parse(e.to_string()))?;
        max_node = Some(max_node.map_or(row.from.max(row.to), |m| m.max(row.from).max(row.to)));
        by_link.entry(row.link_id).or_default().push(row);
    }

    let mut builder = RoadNetworkBuilder::new();
    builder.ensure_nodes(max_node.map_or(0, |m| m as usize + 1));

    for (link_id, mut rows) in by_link {
        rows.sort_by_key(|r| r.seq);
        let (from, to) = (rows[0].from, rows[0].to);
        if rows.iter().any(|r| r.from != from || r.to != to) {
            return Err(NetworkError::Parse(format!(
                "link {link_id}: segments disagree on endpoints"
            )));
        }
        let specs = rows
            .into_iter()
            .map(|r| SegmentSpec {
                length_m:      r.length_m,
                lanes:         r.lanes,
                max_speed_mps: r.max_speed_mps,
                capacity_vph:  r.capacity_vph,
            })
            .collect();
        builder.add_link(NodeId(from), NodeId(to), specs);
    }

    let network = builder.build()?;
    tracing::info!(
        nodes = network.node_count(),
        links = network.link_count(),
        segments = network.segment_count(),
        "road network loaded"
    );
    Ok(network)
}
