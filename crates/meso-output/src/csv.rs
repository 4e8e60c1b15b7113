//! CSV output backend.
//!
//! Creates four files in the configured output directory:
//! - `segment_stats.csv`
//! - `link_travel_times.csv`
//! - `link_stats.csv`
//! - `tick_summaries.csv`

use std::fs::File;
use std::path::Path;

use csv::Writer;

use crate::writer::OutputWriter;
use crate::{LinkStatsRow, LinkTravelTimeRow, OutputResult, SegmentStatsRow, TickSummaryRow};

pub const SEGMENT_STATS_HEADER: [&str; 7] =
    ["tick", "segment_id", "speed_mps", "flow", "density", "moving", "queueing"];
pub const LINK_TRAVEL_TIMES_HEADER: [&str; 4] = ["tick", "link_id", "mean_secs", "count"];
pub const LINK_STATS_HEADER: [&str; 3] = ["tick", "link_id", "density"];
pub const TICK_SUMMARIES_HEADER: [&str; 6] =
    ["tick", "unix_time_secs", "started", "completed", "active", "queued"];

/// Writes simulation output to four CSV files.
pub struct CsvWriter {
    segments:   Writer<File>,
    links:      Writer<File>,
    link_stats: Writer<File>,
    summaries:  Writer<File>,
    finished:  bool,
}

impl CsvWriter {
    /// Open (or create) the CSV files in `dir` and write the header rows.
    pub fn new(dir: &Path) -> OutputResult<Self> {
        let mut segments = Writer::from_path(dir.join("segment_stats.csv"))?;
        segments.write_record(SEGMENT_STATS_HEADER)?;

        let mut links = Writer::from_path(dir.join("link_travel_times.csv"))?;
        links.write_record(LINK_TRAVEL_TIMES_HEADER)?;

        let mut link_stats = Writer::from_path(dir.join("link_stats.csv"))?;
        link_stats.write_record(LINK_STATS_HEADER)?;

        let mut summaries = Writer::from_path(dir.join("tick_summaries.csv"))?;
        summaries.write_record(TICK_SUMMARIES_HEADER)?;

        Ok(Self { segments, links, link_stats, summaries, finished: false })
    }
}

impl OutputWriter for CsvWriter {
    fn write_segment_stats(&mut self, rows: &[SegmentStatsRow]) -> OutputResult<()> {
        for row in rows {
            self.segments.write_record(&[
                row.tick.0.to_string(),
                row.segment.0.to_string(),
                row.speed_mps.to_string(),
                row.flow.to_string(),
                row.density.to_string(),
                row.moving.to_string(),
                row.queueing.to_string(),
            ])?;
        }
        Ok(())
    }

    fn write_link_travel_times(&mut self, rows: &[LinkTravelTimeRow]) -> OutputResult<()> {
        for row in rows {
            self.links.write_record(&[
                row.tick.0.to_string(),
                row.link.0.to_string(),
                row.mean_secs.to_string(),
                row.count.to_string(),
            ])?;
        }
        Ok(())
    }

    fn write_link_stats(&mut self, rows: &[LinkStatsRow]) -> OutputResult<()> {
        for row in rows {
            self.link_stats.write_record(&[row.tick.0.to_string(), row.link.0.to_string(), row.density.to_string()])?;
        }
        Ok(())
    }

    fn write_tick_summary(&mut self, row: &TickSummaryRow) -> OutputResult<()> {
        self.summaries.write_record(&[
            row.tick.to_string(),
            row.unix_time_secs.to_string(),
            row.started.to_string(),
            row.completed.to_string(),
            row.active.to_string(),
            row.queued.to_string(),
        ])?;
        Ok(())
    }

    fn finish(&mut self) -> OutputResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.segments.flush()?;
        self.links.flush()?;
        self.link_stats.flush()?;
        self.summaries.flush()?;
        Ok(())
    }
}
