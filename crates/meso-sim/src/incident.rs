//! Time-scheduled capacity reductions.

use std::collections::BTreeMap;

use meso_core::{SegmentId, Tick};

/// Discharge rate of every lane of `segment` is overridden to `flow_rate`
/// (vehicles per second per lane) from `start` until `end` (exclusive).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScheduledIncident {
    pub segment:   SegmentId,
    pub start:     Tick,
    pub end:       Tick,
    pub flow_rate: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum IncidentEvent {
    Start { segment: SegmentId, flow_rate: f64 },
    End { segment: SegmentId },
}

/// Incident starts and ends keyed by the tick they take effect.
#[derive(Clone, Debug, Default)]
pub(crate) struct IncidentSchedule {
    events: BTreeMap<Tick, Vec<IncidentEvent>>,
}

impl IncidentSchedule {
    pub fn new(incidents: &[ScheduledIncident]) -> Self {
        let mut events: BTreeMap<Tick, Vec<IncidentEvent>> = BTreeMap::new();
        for inc in incidents {
            events
                .entry(inc.start)
                .or_default()
                .push(IncidentEvent::Start { segment: inc.segment, flow_rate: inc.flow_rate });
            events.entry(inc.end).or_default().push(IncidentEvent::End { segment: inc.segment });
        }
        // Ends first, so back-to-back incidents on one segment hand over cleanly.
        for list in events.values_mut() {
            list.sort_by_key(|e| matches!(e, IncidentEvent::Start { .. }));
        }
        Self { events }
    }

    /// Remove and return the events that take effect at `tick`.
    pub fn take(&mut self, tick: Tick) -> Vec<IncidentEvent> {
        self.events.remove(&tick).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }
}
