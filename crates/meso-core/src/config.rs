//! Run configuration.
//!
//! Both structs are plain data passed explicitly into the network builder,
//! the confluxes, and the simulation runner.  Applications typically load
//! them from YAML with the `serde` feature enabled.

use crate::{CoreError, CoreResult, SimClock, Tick};

// ── SupplyParams ──────────────────────────────────────────────────────────────

/// Parameters of the segment supply model (speed-density curve and lane
/// throughput metering).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SupplyParams {
    /// Lower bound for any segment speed (m/s).
    pub min_speed_mps: f64,
    /// Density (veh/m) at or above which the segment runs at `min_speed_mps`.
    pub jam_density: f64,
    /// Speed-density exponent applied to the outer term.
    pub alpha: f64,
    /// Speed-density exponent applied to the normalised density.
    pub beta: f64,
    /// Density (veh/m) below which the segment runs at free-flow speed.
    pub min_density: f64,
    /// Weight of the backward-wave term in the lane accept rate.
    pub omega: f64,
    /// Length of one passenger-car unit (m).
    pub vehicle_length_m: f64,
    /// Space a queuing vehicle occupies when computing moving length (m).
    pub queue_vehicle_length_m: f64,
    /// Average vehicle length used by virtual-queue bounds (m).
    pub avg_vehicle_length_m: f64,
    /// Ticks a person may be refused entry to a full virtual queue before it
    /// is admitted regardless of the bound.  Breaks gridlock on cycles of
    /// full links.
    pub evade_vq_bounds_threshold_ticks: u32,
}

impl Default for SupplyParams {
    fn default() -> Self {
        Self {
            min_speed_mps:          5.0,
            jam_density:            0.25,
            alpha:                  3.75,
            beta:                   0.5645,
            min_density:            0.0048,
            omega:                  0.01,
            vehicle_length_m:       4.0,
            queue_vehicle_length_m: 4.0,
            avg_vehicle_length_m:   4.0,
            evade_vq_bounds_threshold_ticks: 24,
        }
    }
}

impl SupplyParams {
    pub fn validate(&self) -> CoreResult<()> {
        let positive = [
            ("min_speed_mps", self.min_speed_mps),
            ("jam_density", self.jam_density),
            ("vehicle_length_m", self.vehicle_length_m),
            ("queue_vehicle_length_m", self.queue_vehicle_length_m),
            ("avg_vehicle_length_m", self.avg_vehicle_length_m),
        ];
        for (name, v) in positive {
            if !(v.is_finite() && v > 0.0) {
                return Err(CoreError::Config(format!("{name} must be positive, got {v}")));
            }
        }
        if self.min_density >= self.jam_density {
            return Err(CoreError::Config(format!(
                "min_density ({}) must be below jam_density ({})",
                self.min_density, self.jam_density
            )));
        }
        Ok(())
    }
}

// ── SimConfig ─────────────────────────────────────────────────────────────────

/// Top-level simulation configuration.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimConfig {
    /// Unix timestamp for tick 0.
    pub start_unix_secs: i64,

    /// Simulated seconds per tick.  Every person gets this much movement
    /// budget per tick.
    pub tick_duration_secs: f64,

    /// Total ticks to simulate.
    pub total_ticks: u64,

    /// Master RNG seed.  The same seed always produces identical results,
    /// independent of the worker count.
    pub seed: u64,

    /// Worker count.  `None` uses one worker per logical core.
    pub num_threads: Option<usize>,

    /// Emit supply statistics every N ticks.  0 disables reporting.
    pub output_interval_ticks: u64,

    pub supply: SupplyParams,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start_unix_secs:       0,
            tick_duration_secs:    5.0,
            total_ticks:           720,
            seed:                  42,
            num_threads:           None,
            output_interval_ticks: 60,
            supply:                SupplyParams::default(),
        }
    }
}

impl SimConfig {
    /// The tick at which the simulation ends (exclusive upper bound).
    #[inline]
    pub fn end_tick(&self) -> Tick {
        Tick(self.total_ticks)
    }

    /// Construct a `SimClock` pre-configured for this run.
    pub fn make_clock(&self) -> SimClock {
        SimClock::new(self.start_unix_secs, self.tick_duration_secs)
    }

    /// `true` if supply statistics are reported at `tick`.
    #[inline]
    pub fn is_output_tick(&self, tick: Tick) -> bool {
        self.output_interval_ticks > 0 && tick.0 % self.output_interval_ticks == 0
    }

    pub fn validate(&self) -> CoreResult<()> {
        if !(self.tick_duration_secs.is_finite() && self.tick_duration_secs > 0.0) {
            return Err(CoreError::Config(format!(
                "tick_duration_secs must be positive, got {}",
                self.tick_duration_secs
            )));
        }
        if self.num_threads == Some(0) {
            return Err(CoreError::Config("num_threads must be at least 1".into()));
        }
        self.supply.validate()
    }
}
