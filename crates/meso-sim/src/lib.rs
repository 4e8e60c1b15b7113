//! `meso-sim`: phased tick driver for the rust_meso traffic simulator.
//!
//! # Tick loop
//!
//! ```text
//! for tick in 0..config.total_ticks:
//!   ⓪ Start:    apply incidents starting or ending now; hand persons whose
//!               start time has come to their starting conflux.
//!   ① Movement: every conflux runs update() against a frame snapshot
//!               (parallel with the `parallel` feature).
//!   ② Deliver:  virtual-queue entries and transfers, in (to, from, seq)
//!               order; finished persons are counted.
//!   ③ VQ:       every conflux admits the persons in its virtual queues
//!               (parallel).
//!   ④ Deliver:  as ②.
//!   ⑤ Supply:   speeds, lane metering, virtual-queue bounds; statistics
//!               on output ticks (parallel).
//! ```
//!
//! Confluxes are partitioned across [`Worker`]s.  Each worker owns the
//! registry of the persons its confluxes hold, and confluxes only exchange
//! persons through typed messages delivered between phases, so the outcome
//! is the same for every partition and thread count.
//!
//! # Cargo features
//!
//! | Feature    | Effect                                                 |
//! |------------|--------------------------------------------------------|
//! | `parallel` | Runs each phase's workers on Rayon's thread pool.      |
//!
//! # Quick-start
//!
//! ```rust,ignore
//! use meso_sim::{NoopObserver, SimBuilder};
//!
//! let mut sim = SimBuilder::new(config, network)
//!     .trip_chains(chains)
//!     .build()?;
//! sim.run(&mut NoopObserver)?;
//! ```

pub mod builder;
pub mod error;
pub mod incident;
pub mod observer;
pub mod sim;
pub mod worker;


pub use builder::{SimBuilder, block_partition};
pub use error::{SimError, SimResult};
pub use incident::ScheduledIncident;
pub use observer::{NoopObserver, SimObserver, TickSummary};
pub use sim::Sim;
pub use worker::Worker;
