//! `meso-core`: foundational types for the `rust_meso` traffic simulator.
//!
//! This crate is a dependency of every other `meso-*` crate.  It has no
//! `meso-*` dependencies and minimal external ones (only `rand` and
//! `thiserror`, plus optional `serde`).
//!
//! # What lives here
//!
//! | Module          | Contents                                                   |
//! |-----------------|------------------------------------------------------------|
//! | [`ids`]         | `PersonId`, `NodeId`, `LinkId`, `SegmentId`, `ConfluxId`, `WorkerId` |
//! | [`lane`]        | `LaneSlot` (physical lane or lane infinity)                |
//! | [`time`]        | `Tick`, `SimClock`                                         |
//! | [`config`]      | `SimConfig`, `SupplyParams`                                |
//! | [`rng`]         | `ConfluxRng`, one seeded stream per conflux                |
//! | [`role`]        | `RoleKind` enum                                            |
//! | [`error`]       | `CoreError`, `CoreResult`                                  |
//!
//! # Feature flags
//!
//! | Flag    | Effect                                                     |
//! |---------|------------------------------------------------------------|
//! | `serde` | Adds `Serialize`/`Deserialize` to all public types.        |

pub mod config;
pub mod error;
pub mod ids;
pub mod lane;
pub mod rng;
pub mod role;
pub mod time;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use config::{SimConfig, SupplyParams};
pub use error::{CoreError, CoreResult};
pub use ids::{ConfluxId, LinkId, NodeId, PersonId, SegmentId, WorkerId};
pub use lane::LaneSlot;
pub use rng::ConfluxRng;
pub use role::RoleKind;
pub use time::{SimClock, Tick};
