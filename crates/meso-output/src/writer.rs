//! The `OutputWriter` trait implemented by backend writers.

use crate::{LinkStatsRow, LinkTravelTimeRow, OutputResult, SegmentStatsRow, TickSummaryRow};

/// A sink for the rows a run produces.
///
/// Errors are stored by [`SimOutputObserver`][crate::SimOutputObserver]
/// and retrieved with its `take_error`.
pub trait OutputWriter {
    /// Write the segment rows of one output tick.
    fn write_segment_stats(&mut self, rows: &[SegmentStatsRow]) -> OutputResult<()>;

    /// Write the link travel-time rows of one output tick.
    fn write_link_travel_times(&mut self, rows: &[LinkTravelTimeRow]) -> OutputResult<()>;

    /// Write the link density rows of one output tick.
    fn write_link_stats(&mut self, rows: &[LinkStatsRow]) -> OutputResult<()>;

    /// Write one tick summary row.
    fn write_tick_summary(&mut self, row: &TickSummaryRow) -> OutputResult<()>;

    /// Flush and close all underlying file handles.
    ///
    /// Idempotent.
    fn finish(&mut self) -> OutputResult<()>;
}
