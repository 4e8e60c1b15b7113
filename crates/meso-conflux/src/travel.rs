//! Link travel-time accumulation.

use std::collections::BTreeMap;

use meso_core::{LinkId, Tick};
use meso_person::LinkExit;

use crate::LinkTravelTimeRow;

/// `(sum of travel seconds, person count)` per link, for the current tick.
#[derive(Clone, Debug, Default)]
pub struct LinkTravelTimes {
    by_link: BTreeMap<LinkId, (f64, u32)>,
}

impl LinkTravelTimes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, exit: &LinkExit) {
        let entry = self.by_link.entry(exit.link).or_insert((0.0, 0));
        entry.0 += exit.travel_secs();
        entry.1 += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.by_link.is_empty()
    }

    /// Mean travel time per link, ascending by link ID.
    pub fn rows(&self, tick: Tick) -> Vec<LinkTravelTimeRow> {
        self.by_link
            .iter()
            .map(|(&link, &(sum, count))| LinkTravelTimeRow {
                tick,
                link,
                mean_secs: sum / f64::from(count),
                count,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.by_link.clear();
    }
}
