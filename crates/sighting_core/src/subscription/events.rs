/// Diff events emitted by a proximity subscription
use crate::types::{Point, SightingId, Tag};
use serde::{Deserialize, Serialize};

/// Membership change of one sighting relative to a subscription's viewport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProximityEvent {
    /// The sighting is now inside the viewport
    Entered {
        id: SightingId,
        tag: Tag,
        location: Point,
    },
    /// The sighting is no longer inside the viewport
    Left { id: SightingId },
}

impl ProximityEvent {
    /// Id of the sighting the event is about.
    pub fn id(&self) -> SightingId {
        match self {
            ProximityEvent::Entered { id, .. } | ProximityEvent::Left { id } => *id,
        }
    }

    pub fn is_entered(&self) -> bool {
        matches!(self, ProximityEvent::Entered { .. })
    }
}

/// Lifecycle of a subscription: `Inactive -> Active -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionState {
    /// Created but not yet attached to the store
    Inactive,
    /// Receiving store changes
    Active,
    /// Detached; terminal
    Closed,
}

/// Per-subscription delivery statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionStats {
    pub entered_emitted: u64,
    pub left_emitted: u64,
    /// Pending events folded away by outbox coalescing
    pub coalesced: u64,
    /// Coalescing passes run over the outbox
    pub coalesce_passes: u64,
    pub viewport_changes: u64,
    /// Events waiting to be consumed
    pub pending: usize,
}
