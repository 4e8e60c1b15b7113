//! CSV trip-chain loader.
//!
//! # CSV format
//!
//! One row per trip-chain item.  Rows of the same person are ordered by
//! `seq`.  `kind` is `trip` or `activity`; an activity happens at `origin`
//! and ignores `destination`.
//!
//! ```csv
//! person_id,seq,kind,origin,destination,start_secs,end_secs
//! 0,0,trip,0,3,0,0
//! 0,1,activity,3,3,600,4200
//! 0,2,trip,3,0,4200,0
//! ```
//!
//! Trips are routed with the supplied [`PathLookup`].  A trip whose origin
//! equals its destination has nothing to drive and is rejected.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use meso_core::{NodeId, PersonId};
use meso_network::{PathLookup, RoadNetwork};

use crate::{Activity, PersonError, PersonResult, Trip, TripChain, TripChainItem};

#[derive(Deserialize)]
struct ItemRecord {
    person_id:   u32,
    seq:         u16,
    kind:        String,
    origin:      u32,
    destination: u32,
    start_secs:  f64,
    end_secs:    f64,
}

pub fn load_trip_chains_csv(
    path:    &Path,
    network: &RoadNetwork,
    paths:   &dyn PathLookup,
) -> PersonResult<Vec<(PersonId, TripChain)>> {
    let file = std::fs::File::open(path)?;
    load_trip_chains_reader(file, network, paths)
}

/// Like [`load_trip_chains_csv`] but accepts any `Read` source.
///
/// Chains are returned in ascending `PersonId` order.
pub fn load_trip_chains_reader<R: Read>(
    reader:  R,
    network: &RoadNetwork,
    paths:   &dyn PathLookup,
) -> PersonResult<Vec<(PersonId, TripChain)>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut by_person: BTreeMap<u32, Vec<ItemRecord>> = BTreeMap::new();

    for result in csv_reader.deserialize::<ItemRecord>() {
        let row = result.map_err(|e| PersonError::Parse(e.to_string()))?;
        by_person.entry(row.person_id).or_default().push(row);
    }

    let mut chains = Vec::with_capacity(by_person.len());
    for (pid, mut rows) in by_person {
        let person = PersonId(pid);
        rows.sort_by_key(|r| r.seq);
        let items = rows
            .into_iter()
            .map(|r| to_item(person, r, network, paths))
            .collect::<PersonResult<Vec<_>>>()?;
        chains.push((person, TripChain::new(items)));
    }
    tracing::info!(persons = chains.len(), "trip chains loaded");
    Ok(chains)
}

fn to_item(
    person:  PersonId,
    r:       ItemRecord,
    network: &RoadNetwork,
    paths:   &dyn PathLookup,
) -> PersonResult<TripChainItem> {
    match r.kind.trim() {
        "trip" => {
            let (origin, destination) = (NodeId(r.origin), NodeId(r.destination));
            let path = paths.path(network, origin, destination)?;
            if path.is_trivial() {
                return Err(PersonError::EmptyPath { person });
            }
            Ok(TripChainItem::Trip(Trip {
                origin,
                destination,
                start_secs: r.start_secs,
                path: path.segments,
            }))
        }
        "activity" => Ok(TripChainItem::Activity(Activity {
            location:   NodeId(r.origin),
            start_secs: r.start_secs,
            end_secs:   r.end_secs,
        })),
        other => Err(PersonError::Parse(format!(
            "{person}: unknown item kind {other:?}: expected \"trip\" or \"activity\""
        ))),
    }
}
