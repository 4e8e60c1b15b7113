//! Typed hand-offs between confluxes.
//!
//! A conflux never writes into another conflux's containers.  Persons that
//! must end up somewhere else leave by value inside a [`ConfluxMessage`];
//! the simulation delivers all messages between phases in `(to, from, seq)`
//! order, so the result does not depend on which worker finished first.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;

use meso_core::{ConfluxId, LaneSlot, LinkId, PersonId, SegmentId};
use meso_person::Person;

#[derive(Debug)]
pub enum ConfluxMessage {
    /// Join the virtual queue of `link` at the receiving conflux.
    VirtualQueue { link: LinkId, person: Box<Person> },
    /// Occupy `lane` of `segment`, owned by the receiving conflux.
    Transfer { segment: SegmentId, lane: LaneSlot, person: Box<Person> },
}

impl ConfluxMessage {
    pub fn person_id(&self) -> PersonId {
        match self {
            ConfluxMessage::VirtualQueue { person, .. } | ConfluxMessage::Transfer { person, .. } => person.id,
        }
    }
}

#[derive(Debug)]
pub struct Envelope {
    pub to:      ConfluxId,
    pub from:    ConfluxId,
    /// Per-sender sequence number.
    pub seq:     u64,
    pub message: ConfluxMessage,
}

impl Envelope {
    #[inline]
    pub fn delivery_key(&self) -> (ConfluxId, ConfluxId, u64) {
        (self.to, self.from, self.seq)
    }
}

impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.delivery_key() == other.delivery_key()
    }
}

impl Eq for Envelope {}

impl PartialOrd for Envelope {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Envelope {
    fn cmp(&self, other: &Self) -> Ordering {
        self.delivery_key().cmp(&other.delivery_key())
    }
}

/// Messages and removals produced by one conflux during a phase.
///
/// Pending counts track admissions this conflux has already promised to
/// other confluxes in the current phase, on top of what the frame snapshot
/// shows.
#[derive(Debug)]
pub struct Outbox {
    from:      ConfluxId,
    seq:       u64,
    envelopes: Vec<Envelope>,
    removed:   Vec<PersonId>,
    pub(crate) pending_vq:        FxHashMap<LinkId, u32>,
    pub(crate) pending_transfers: FxHashMap<SegmentId, u32>,
}

impl Outbox {
    pub fn new(from: ConfluxId) -> Self {
        Self {
            from,
            seq:               0,
            envelopes:         Vec::new(),
            removed:           Vec::new(),
            pending_vq:        FxHashMap::default(),
            pending_transfers: FxHashMap::default(),
        }
    }

    pub fn send(&mut self, to: ConfluxId, message: ConfluxMessage) {
        match &message {
            ConfluxMessage::VirtualQueue { link, .. } => *self.pending_vq.entry(*link).or_default() += 1,
            ConfluxMessage::Transfer { segment, lane, .. } => {
                if !lane.is_infinity() {
                    *self.pending_transfers.entry(*segment).or_default() += 1;
                }
            }
        }
        self.envelopes.push(Envelope { to, from: self.from, seq: self.seq, message });
        self.seq += 1;
    }

    /// Record a person whose trip chain is finished.
    pub fn remove(&mut self, person: PersonId) {
        self.removed.push(person);
    }

    pub fn pending_virtual_queue(&self, link: LinkId) -> u32 {
        self.pending_vq.get(&link).copied().unwrap_or(0)
    }

    pub fn pending_transfers(&self, segment: SegmentId) -> u32 {
        self.pending_transfers.get(&segment).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty() && self.removed.is_empty()
    }

    /// Hand over everything produced since the last drain and reset the
    /// pending counts.  Sequence numbers keep counting.
    pub fn drain(&mut self) -> (Vec<Envelope>, Vec<PersonId>) {
        self.pending_vq.clear();
        self.pending_transfers.clear();
        (std::mem::take(&mut self.envelopes), std::mem::take(&mut self.removed))
    }
}
