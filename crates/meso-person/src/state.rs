//! Transient per-person movement state.
//!
//! These are the fields the conflux reads and writes around every movement
//! step.  Roles mutate them inside [`Role::movement_tick`][crate::Role]; the
//! conflux mutates them when it grants or denies a link crossing and when it
//! resets time budgets.

use meso_core::{LaneSlot, LinkId, RoleKind, SegmentId, Tick};

/// Answer to a request to cross into a new link.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum Permission {
    #[default]
    None,
    Granted,
    Denied,
}

/// One traversal of a link, reported when the person leaves it.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct LinkExit {
    pub link:       LinkId,
    pub entry_secs: f64,
    pub exit_secs:  f64,
}

impl LinkExit {
    #[inline]
    pub fn travel_secs(&self) -> f64 {
        (self.exit_secs - self.entry_secs).max(0.0)
    }
}

#[derive(Clone, Debug)]
pub struct PersonState {
    /// Segment the person is on, or queued for.  `None` while performing an
    /// activity.
    pub segment: Option<SegmentId>,

    /// `None` means "in a virtual queue or performing an activity".
    pub lane: Option<LaneSlot>,

    /// Metres to the downstream end of `segment`.
    pub distance_to_end: f64,

    /// Seconds of movement budget left in the current tick.
    pub remaining_time: f64,

    pub is_queuing: bool,

    /// Last tick in which a conflux advanced this person.
    pub last_updated: Option<Tick>,

    /// First segment of the next link, set by a driver that reached the end
    /// of its link and needs the conflux's permission to cross.
    pub requested_next_segment: Option<SegmentId>,

    pub permission: Permission,

    /// The current trip-chain item is finished.
    pub to_be_removed: bool,

    pub vehicle_length: f64,

    /// Simulated seconds at which the person entered its current link.
    pub link_entry_secs: f64,

    /// Links left since the conflux last collected them.
    pub link_exits: Vec<LinkExit>,

    /// Consecutive ticks in which a request to cross into the next link was
    /// refused.  Reset by a successful crossing.
    pub ticks_stuck: u32,
}

impl PersonState {
    pub fn new(vehicle_length: f64) -> Self {
        Self {
            segment:                None,
            lane:                   None,
            distance_to_end:        0.0,
            remaining_time:         0.0,
            is_queuing:             false,
            last_updated:           None,
            requested_next_segment: None,
            permission:             Permission::None,
            to_be_removed:          false,
            vehicle_length,
            link_entry_secs:        0.0,
            link_exits:             Vec::new(),
            ticks_stuck:            0,
        }
    }

    /// `true` if the person has not been advanced in tick `now` yet.
    #[inline]
    pub fn is_stale(&self, now: Tick) -> bool {
        self.last_updated.is_none_or(|t| t < now)
    }
}

/// Before/after snapshot used by the conflux to classify a movement step.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct PersonPosition {
    pub role:            RoleKind,
    pub segment:         Option<SegmentId>,
    pub lane:            Option<LaneSlot>,
    pub is_queuing:      bool,
    pub distance_to_end: f64,
    pub vehicle_length:  f64,
}
