//! Role discriminant.
//!
//! The conflux never dispatches on concrete role types; it only compares the
//! kind before and after a movement step to classify the transition.

/// What a person is currently doing.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RoleKind {
    /// Driving a vehicle along segments.
    Driver,
    /// Performing a non-spatial activity (work, shopping, …).
    ActivityPerformer,
}
