//! corridor: smallest runnable scenario for the rust_meso simulator.
//!
//! Commuters drive a two-lane arterial fed by a side street.  Halfway
//! through the morning a lane closure just upstream of the second
//! intersection throttles discharge to a trickle, and the queue spills back
//! through the virtual queues of the upstream intersection.
//!
//! ```text
//! corridor [config.yaml]
//! ```
//!
//! The optional YAML file overrides any `SimConfig` field; everything it
//! leaves out keeps the defaults below.  Output lands in `output/corridor/`.

mod network;

use std::io::Cursor;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use meso_core::{SegmentId, SimConfig, Tick};
use meso_network::{DijkstraPaths, load_network_reader};
use meso_output::{CsvWriter, SimOutputObserver};
use meso_person::load_trip_chains_reader;
use meso_sim::{ScheduledIncident, SimBuilder};

use network::{CLOSED_SEGMENT, NETWORK_CSV, trips_csv};

// ── Constants ─────────────────────────────────────────────────────────────────

const COMMUTERS:             u32 = 240;
const HEADWAY_SECS:          f64 = 6.0;
const SEED:                  u64 = 42;
const TICK_DURATION_SECS:    f64 = 5.0;
const TOTAL_TICKS:           u64 = 720; // one hour
const OUTPUT_INTERVAL_TICKS: u64 = 12;  // once a minute

/// Closure window and the residual discharge rate per lane (veh/s).
const CLOSURE_START: Tick = Tick(120);
const CLOSURE_END:   Tick = Tick(300);
const CLOSURE_RATE:  f64  = 0.05;

fn load_config(path: Option<&Path>) -> Result<SimConfig> {
    let defaults = SimConfig {
        start_unix_secs:       1_700_000_000,
        tick_duration_secs:    TICK_DURATION_SECS,
        total_ticks:           TOTAL_TICKS,
        seed:                  SEED,
        num_threads:           None,
        output_interval_ticks: OUTPUT_INTERVAL_TICKS,
        ..SimConfig::default()
    };
    let Some(path) = path else {
        return Ok(defaults);
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(defaults);
    }
    let config: SimConfig = serde_yml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config_path = std::env::args().nth(1);
    let config = load_config(config_path.as_deref().map(Path::new))?;
    config.validate()?;

    println!("=== corridor: rust_meso mesoscopic traffic ===");
    println!(
        "Commuters: {COMMUTERS}  |  Ticks: {} × {} s  |  Seed: {}",
        config.total_ticks, config.tick_duration_secs, config.seed
    );
    println!();

    // 1. Network and trip chains.
    let network = load_network_reader(Cursor::new(NETWORK_CSV))?;
    println!(
        "Road network: {} nodes, {} links, {} segments",
        network.node_count(),
        network.link_count(),
        network.segment_count()
    );
    let chains = load_trip_chains_reader(Cursor::new(trips_csv(COMMUTERS, HEADWAY_SECS)), &network, &DijkstraPaths)?;
    println!("Loaded {} trip chains", chains.len());

    // 2. Build the sim with the lane closure scheduled.
    let mut sim = SimBuilder::new(config.clone(), network)
        .trip_chains(chains)
        .incident(ScheduledIncident {
            segment:   SegmentId(CLOSED_SEGMENT),
            start:     CLOSURE_START,
            end:       CLOSURE_END,
            flow_rate: CLOSURE_RATE,
        })
        .build()?;
    println!(
        "Confluxes: {} across {} workers  |  closure on segment {CLOSED_SEGMENT} ticks {CLOSURE_START}..{CLOSURE_END}",
        sim.directory.len(),
        sim.workers().len()
    );
    println!();

    // 3. Output.
    let out_dir = Path::new("output/corridor");
    std::fs::create_dir_all(out_dir)?;
    let mut obs = SimOutputObserver::new(CsvWriter::new(out_dir)?, &config);

    // 4. Run.
    let t0 = Instant::now();
    sim.run(&mut obs)?;
    let elapsed = t0.elapsed();
    if let Some(e) = obs.take_error() {
        eprintln!("output error: {e}");
    }
    info!(elapsed_secs = elapsed.as_secs_f64(), "run complete");

    // 5. Summary.
    println!("Simulation complete in {:.3} s", elapsed.as_secs_f64());
    println!(
        "  completed: {}  |  still driving: {}  |  not yet started: {}",
        sim.completed_count(),
        sim.active_count(),
        sim.pending_count()
    );
    println!("  output written to {}", out_dir.display());
    println!();

    println!("{:<8} {:<6} {:>10} {:>8} {:>9}", "Segment", "Link", "Speed m/s", "Moving", "Queueing");
    println!("{}", "-".repeat(45));
    for conflux in sim.confluxes() {
        for link in conflux.upstream_links() {
            for &seg in &sim.network.link(link).segments {
                println!(
                    "{:<8} {:<6} {:>10.2} {:>8} {:>9}",
                    seg.0,
                    link.0,
                    conflux.segment_speed(seg).unwrap_or(0.0),
                    conflux.num_moving_in_segment(seg).unwrap_or(0),
                    conflux.num_queueing_in_segment(seg).unwrap_or(0),
                );
            }
        }
    }

    Ok(())
}
