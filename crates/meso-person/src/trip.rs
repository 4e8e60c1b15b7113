//! Trip chains.
//!
//! A person's day is an ordered list of trips and activities.  The chain
//! keeps a cursor on the item currently being executed; the conflux moves it
//! forward whenever the current role reports `to_be_removed`.

use meso_core::{NodeId, SegmentId};

/// A drive along a fixed segment path.
#[derive(Clone, Debug, PartialEq)]
pub struct Trip {
    pub origin:      NodeId,
    pub destination: NodeId,
    /// Planned departure, simulated seconds.  Only the first item of a chain
    /// uses it; later trips start when the preceding activity ends.
    pub start_secs:  f64,
    /// Segments to drive, in order.  Never empty.
    pub path:        Vec<SegmentId>,
}

/// A stay at a location.
#[derive(Clone, Debug, PartialEq)]
pub struct Activity {
    pub location:   NodeId,
    pub start_secs: f64,
    pub end_secs:   f64,
}

impl Activity {
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        (self.end_secs - self.start_secs).max(0.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TripChainItem {
    Trip(Trip),
    Activity(Activity),
}

impl TripChainItem {
    /// Planned start of this item in simulated seconds.
    pub fn start_secs(&self) -> f64 {
        match self {
            TripChainItem::Trip(t) => t.start_secs,
            TripChainItem::Activity(a) => a.start_secs,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TripChain {
    items: Vec<TripChainItem>,
    /// Index of the next item to start; the current item is `next - 1`.
    next: usize,
}

impl TripChain {
    pub fn new(items: Vec<TripChainItem>) -> Self {
        Self { items, next: 0 }
    }

    pub fn items(&self) -> &[TripChainItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The item being executed, if the chain has started.
    pub fn current(&self) -> Option<&TripChainItem> {
        self.next.checked_sub(1).and_then(|i| self.items.get(i))
    }

    /// Peek at the item after the current one.
    pub fn peek_next(&self) -> Option<&TripChainItem> {
        self.items.get(self.next)
    }

    /// Move the cursor forward and return the new current item, or `None`
    /// when the chain is exhausted.
    pub fn advance(&mut self) -> Option<&TripChainItem> {
        if self.next >= self.items.len() {
            return None;
        }
        self.next += 1;
        self.items.get(self.next - 1)
    }
}
