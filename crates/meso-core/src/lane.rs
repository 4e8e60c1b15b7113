//! Lane addressing inside a segment.

use std::fmt;

/// Where inside a segment a person sits.
///
/// `Infinity` is the synthetic bucket for persons not yet assigned a physical
/// lane: new trip starts and persons leaving an activity.  It has no length,
/// no capacity, and no ordering.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LaneSlot {
    /// Physical lane, 0-based from the segment's leftmost lane.
    Lane(u16),
    /// Lane infinity.
    Infinity,
}

impl LaneSlot {
    #[inline]
    pub fn is_infinity(self) -> bool {
        matches!(self, LaneSlot::Infinity)
    }

    /// The physical lane index, or `None` for lane infinity.
    #[inline]
    pub fn physical(self) -> Option<u16> {
        match self {
            LaneSlot::Lane(i) => Some(i),
            LaneSlot::Infinity => None,
        }
    }
}

impl fmt::Display for LaneSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaneSlot::Lane(i) => write!(f, "L{i}"),
            LaneSlot::Infinity => f.write_str("L∞"),
        }
    }
}
