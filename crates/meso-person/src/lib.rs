//! `meso-person`: travelers and the roles that move them.
//!
//! A [`Person`] is a bundle of transient position state ([`PersonState`]),
//! the current [`Role`], and a [`TripChain`] of trips and activities.  The
//! conflux that currently contains a person drives it through
//! [`Role::movement_tick`] and inspects the state before and after to do its
//! lane bookkeeping; roles never touch lane containers themselves.  Everything
//! a role needs to know about supply (speeds, queues, output counters) comes
//! through the [`SupplyView`] trait.
//!
//! # Crate layout
//!
//! | Module       | Contents                                                  |
//! |--------------|-----------------------------------------------------------|
//! | [`state`]    | `PersonState`, `Permission`, `PersonPosition`, `LinkExit` |
//! | [`trip`]     | `TripChain`, `TripChainItem`, `Trip`, `Activity`          |
//! | [`role`]     | `Role` trait, `MovementContext`, `SupplyView`, `MovementRecord` |
//! | [`driver`]   | `Driver`                                                  |
//! | [`activity`] | `ActivityPerformer`                                       |
//! | [`person`]   | `Person`, `ChainStep`                                     |
//! | [`registry`] | `PersonRegistry` (worker-owned `PersonId → Person` map)   |
//! | [`loader`]   | `load_trip_chains_csv`, `load_trip_chains_reader`         |
//! | [`error`]    | `PersonError`, `PersonResult<T>`                          |

pub mod activity;
pub mod driver;
pub mod error;
pub mod loader;
pub mod person;
pub mod registry;
pub mod role;
pub mod state;
pub mod trip;


pub use activity::ActivityPerformer;
pub use driver::Driver;
pub use error::{PersonError, PersonResult};
pub use loader::{load_trip_chains_csv, load_trip_chains_reader};
pub use person::{ChainStep, Person};
pub use registry::PersonRegistry;
pub use role::{MovementContext, MovementRecord, Role, SupplyView};
pub use state::{LinkExit, Permission, PersonPosition, PersonState};
pub use trip::{Activity, Trip, TripChain, TripChainItem};
