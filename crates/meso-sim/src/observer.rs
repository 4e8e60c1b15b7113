//! Simulation observer trait for progress reporting and data collection.

use meso_conflux::SupplyReport;
use meso_core::Tick;

/// Counts gathered while processing one tick.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Persons that entered the simulation this tick.
    pub started:   usize,
    /// Persons whose trip chain finished this tick.
    pub completed: usize,
    /// Persons held by some conflux after the tick.
    pub active:    usize,
    /// Of those, persons waiting in a virtual queue.
    pub queued:    usize,
}

/// Callbacks invoked by [`Sim::run`][crate::Sim::run] at key points in the
/// tick loop.
///
/// All methods have default no-op implementations so implementors only need to
/// override what they care about.
///
/// # Example: progress printer
///
/// ```rust,ignore
/// struct ProgressPrinter { interval: u64 }
///
/// impl SimObserver for ProgressPrinter {
///     fn on_tick_end(&mut self, tick: Tick, summary: &TickSummary) {
///         if tick.0 % self.interval == 0 {
///             println!("tick {tick}: {} persons active", summary.active);
///         }
///     }
/// }
/// ```
pub trait SimObserver {
    /// Called at the very start of each tick, before any processing.
    fn on_tick_start(&mut self, _tick: Tick) {}

    /// Called at the end of each tick.
    fn on_tick_end(&mut self, _tick: Tick, _summary: &TickSummary) {}

    /// Called on output ticks (every `config.output_interval_ticks` ticks)
    /// with the rows of every conflux, ascending segment and link.
    fn on_supply(&mut self, _tick: Tick, _report: &SupplyReport) {}

    /// Called once after the final tick completes.
    fn on_sim_end(&mut self, _final_tick: Tick) {}
}

/// A [`SimObserver`] that does nothing.  Use when you need to call `run` but
/// don't want progress callbacks.
pub struct NoopObserver;

impl SimObserver for NoopObserver {}
