//! `meso-conflux`: the per-intersection scheduling unit.
//!
//! A [`Conflux`] owns every segment upstream of one intersection (grouped by
//! incoming link), the virtual queues of those links, and the persons
//! currently performing activities there.  Each tick it advances its persons
//! in order of time-to-intersection, hands persons crossing into other
//! confluxes off as [`ConfluxMessage`]s, and afterwards recomputes the supply
//! parameters (speeds, output counters, virtual-queue bounds) for the next
//! tick.
//!
//! Confluxes never read or write each other directly.  Everything a conflux
//! needs to know about its neighbours comes from the per-tick [`FrameView`]
//! snapshot, and everything it does to them goes through its [`Outbox`].
//!
//! # Crate layout
//!
//! | Module      | Contents                                                     |
//! |-------------|--------------------------------------------------------------|
//! | [`lane`]    | `LaneStats`, `LaneParams`                                    |
//! | [`segment`] | `SegmentStats` (lanes, lane infinity, density, speed, frontier) |
//! | [`conflux`] | `Conflux`, `TickContext`, `UpdateStatus`                     |
//! | [`view`]    | `FrameView` snapshot, `ConfluxDirectory`                     |
//! | [`message`] | `ConfluxMessage`, `Envelope`, `Outbox`                       |
//! | [`supply`]  | `LocalSupply` (the `SupplyView` a conflux lends to roles)    |
//! | [`travel`]  | `LinkTravelTimes`                                            |
//! | [`report`]  | `SegmentStatsRow`, `LinkTravelTimeRow`, `LinkStatsRow`, `SupplyReport` |
//! | [`error`]   | `ConfluxError`, `ConfluxResult<T>`                           |

pub mod conflux;
pub mod error;
pub mod lane;
pub mod message;
pub mod report;
pub mod segment;
pub mod supply;
pub mod travel;
pub mod view;

#[cfg(test)]
mod tests;

pub use conflux::{Conflux, TickContext, UpdateStatus};
pub use error::{ConfluxError, ConfluxResult};
pub use lane::{LaneParams, LaneStats};
pub use message::{ConfluxMessage, Envelope, Outbox};
pub use report::{LinkStatsRow, LinkTravelTimeRow, SegmentStatsRow, SupplyReport};
pub use segment::SegmentStats;
pub use supply::LocalSupply;
pub use travel::LinkTravelTimes;
pub use view::{ConfluxDirectory, FrameView, LinkSnapshot, SegmentSnapshot};
