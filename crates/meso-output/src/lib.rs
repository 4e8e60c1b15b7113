//! `meso-output`: simulation output writers for the rust_meso simulator.
//!
//! The CSV backend creates four files:
//!
//! | File                    | One row per                                   |
//! |-------------------------|-----------------------------------------------|
//! | `segment_stats.csv`     | segment and output tick                       |
//! | `link_travel_times.csv` | link left by at least one person on an output tick |
//! | `link_stats.csv`        | link and output tick                          |
//! | `tick_summaries.csv`    | tick                                          |
//!
//! Backends implement [`OutputWriter`] and are driven by
//! [`SimOutputObserver`], which implements `meso_sim::SimObserver`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use meso_output::{CsvWriter, SimOutputObserver};
//!
//! let writer = CsvWriter::new(Path::new("./output"))?;
//! let mut obs = SimOutputObserver::new(writer, &config);
//! sim.run(&mut obs)?;
//! if let Some(e) = obs.take_error() {
//!     eprintln!("output error: {e}");
//! }
//! ```

pub mod csv;
pub mod error;
pub mod observer;
pub mod row;
pub mod writer;


pub use csv::CsvWriter;
pub use error::{OutputError, OutputResult};
pub use observer::SimOutputObserver;
pub use row::{LinkStatsRow, LinkTravelTimeRow, SegmentStatsRow, TickSummaryRow};
pub use writer::OutputWriter;
