//! Change events published by the store and the listener seam they go through.

use crate::types::{Point, Sighting, SightingId, Tag};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A mutation applied to the store.
///
/// Events carry the tag and locations involved so listeners can react without
/// reading the store back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A new sighting was reported
    Created { sighting: Sighting },
    /// An existing sighting was relocated
    Moved {
        id: SightingId,
        tag: Tag,
        from: Point,
        to: Point,
    },
    /// A sighting was deleted
    Removed {
        id: SightingId,
        tag: Tag,
        location: Point,
    },
}

impl StoreEvent {
    /// Id of the sighting the event is about.
    pub fn id(&self) -> SightingId {
        match self {
            StoreEvent::Created { sighting } => sighting.id,
            StoreEvent::Moved { id, .. } | StoreEvent::Removed { id, .. } => *id,
        }
    }
}

/// Handle identifying a registered [`ChangeListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives every [`StoreEvent`] in the order mutations were applied.
///
/// `on_change` runs inside the store's write critical section, so
/// implementations must only do quick in-memory work (enqueue, count, log)
/// and must never call back into the same store.
#[async_trait]
pub trait ChangeListener: Send + Sync {
    async fn on_change(&self, event: &StoreEvent);
}
