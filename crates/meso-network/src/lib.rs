//! `meso-network`: static road network, loading, and path lookup.
//!
//! The network is immutable once built.  Confluxes copy the per-segment
//! geometry they need at construction time and resolve everything else
//! through `&RoadNetwork`, which is shared read-only across workers.
//!
//! # Crate layout
//!
//! | Module      | Contents                                                    |
//! |-------------|-------------------------------------------------------------|
//! | [`network`] | `RoadNetwork`, `Link`, `RoadSegment`, `RoadNetworkBuilder`  |
//! | [`path`]    | `PathLookup` trait, `Path`, `DijkstraPaths`                 |
//! | [`loader`]  | `load_network_csv`, `load_network_reader`                   |
//! | [`error`]   | `NetworkError`, `NetworkResult<T>`                          |

pub mod error;
pub mod loader;
pub mod network;
pub mod path;


pub use error::{NetworkError, NetworkResult};
pub use loader::{load_network_csv, load_network_reader};
pub use network::{Link, RoadNetwork, RoadNetworkBuilder, RoadSegment, SegmentSpec};
pub use path::{DijkstraPaths, Path, PathLookup};
