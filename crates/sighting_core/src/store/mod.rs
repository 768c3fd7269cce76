//! # Sighting Store
//!
//! The authoritative owner of every [`Sighting`]. The store wraps a
//! [`SpatialIndex`] with create/update/remove semantics and publishes a
//! [`StoreEvent`] for each successful mutation.
//!
//! ## Concurrency
//!
//! Records, index and id counter live behind one `tokio::sync::RwLock`.
//! Mutations take the write lock and publish to listeners before releasing
//! it, so every listener observes the same total order of events. Reads share
//! the read lock.
//!
//! Listeners are held as `Weak` references: the store never keeps a
//! subscription alive, and listeners whose owners were dropped are pruned on
//! the next publish.

mod events;

pub use events::{ChangeListener, ListenerId, StoreEvent};

use crate::config::{SightingConfig, SubscriptionConfig};
use crate::error::{Result, SightingError};
use crate::spatial::{SpatialIndex, SpatialIndexStats, SpatialQuery};
use crate::types::{Point, Sighting, SightingId, Tag};
use crate::utils::current_timestamp;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, error, info};

/// A sighting returned by a one-shot proximity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbySighting {
    pub sighting: Sighting,
    /// Great-circle distance from the query center in meters
    pub distance_meters: f64,
}

/// Store statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Live sightings
    pub sightings: usize,
    /// Registered listeners (including ones not yet pruned)
    pub listeners: usize,
    pub total_created: u64,
    pub total_moved: u64,
    pub total_removed: u64,
    pub events_published: u64,
    pub index: SpatialIndexStats,
}

/// State guarded by the store lock.
#[derive(Debug)]
pub(crate) struct StoreState {
    index: SpatialIndex,
    sightings: HashMap<SightingId, Sighting>,
    next_id: u64,
    total_created: u64,
    total_moved: u64,
    total_removed: u64,
    events_published: u64,
}

impl StoreState {
    fn new(index: SpatialIndex) -> Self {
        Self {
            index,
            sightings: HashMap::new(),
            next_id: 1,
            total_created: 0,
            total_moved: 0,
            total_removed: 0,
            events_published: 0,
        }
    }

    pub(crate) fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub(crate) fn sighting(&self, id: SightingId) -> Option<&Sighting> {
        self.sightings.get(&id)
    }
}

/// Authoritative, shareable set of sightings.
pub struct SightingStore {
    state: RwLock<StoreState>,
    listeners: DashMap<ListenerId, Weak<dyn ChangeListener>>,
    subscription_config: SubscriptionConfig,
}

impl std::fmt::Debug for SightingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SightingStore")
            .field("state", &"[state]")
            .field("listeners", &self.listeners.len())
            .field("subscription_config", &self.subscription_config)
            .finish()
    }
}

impl Default for SightingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SightingStore {
    /// Creates an empty store with the default configuration.
    pub fn new() -> Self {
        let config = SightingConfig::default();
        Self {
            state: RwLock::new(StoreState::new(SpatialIndex::new(&config.index))),
            listeners: DashMap::new(),
            subscription_config: config.subscription,
        }
    }

    /// Creates an empty store from a configuration, validating it first.
    pub fn with_config(config: &SightingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: RwLock::new(StoreState::new(SpatialIndex::new(&config.index))),
            listeners: DashMap::new(),
            subscription_config: config.subscription.clone(),
        })
    }

    /// Subscription settings new subscriptions on this store inherit.
    pub fn subscription_config(&self) -> &SubscriptionConfig {
        &self.subscription_config
    }

    /// Records a new sighting and publishes [`StoreEvent::Created`].
    pub async fn report_sighting(&self, tag: Tag, location: Point) -> Result<SightingId> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let id = SightingId(state.next_id);
        state.next_id += 1;

        if let Err(e) = state.index.insert(id, location) {
            error!("🔴 Refusing to report {}: {}", id, e);
            return Err(e);
        }

        let now = current_timestamp();
        let sighting = Sighting {
            id,
            tag,
            location,
            created_at: now,
            updated_at: now,
        };
        state.sightings.insert(id, sighting.clone());
        state.total_created += 1;
        debug!("📍 {} (tag {}) reported at {}", id, tag, location);

        self.publish(state, StoreEvent::Created { sighting }).await;
        Ok(id)
    }

    /// Moves a sighting and publishes [`StoreEvent::Moved`].
    pub async fn update_location(&self, id: SightingId, location: Point) -> Result<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let record = state.sightings.get_mut(&id).ok_or(SightingError::NotFound(id))?;
        state.index.update(id, location)?;

        let from = record.location;
        record.location = location;
        record.updated_at = current_timestamp();
        let tag = record.tag;
        state.total_moved += 1;
        debug!("🚶 {} moved {} -> {}", id, from, location);

        self.publish(
            state,
            StoreEvent::Moved {
                id,
                tag,
                from,
                to: location,
            },
        )
        .await;
        Ok(())
    }

    /// Deletes a sighting and publishes [`StoreEvent::Removed`].
    ///
    /// The id is never handed out again.
    pub async fn remove(&self, id: SightingId) -> Result<Sighting> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        if !state.sightings.contains_key(&id) {
            return Err(SightingError::NotFound(id));
        }
        state.index.remove(id)?;
        let sighting = state.sightings.remove(&id).ok_or(SightingError::NotFound(id))?;
        state.total_removed += 1;
        debug!("🗑️ {} removed", id);

        self.publish(
            state,
            StoreEvent::Removed {
                id,
                tag: sighting.tag,
                location: sighting.location,
            },
        )
        .await;
        Ok(sighting)
    }

    /// Looks up a sighting.
    pub async fn get(&self, id: SightingId) -> Result<Sighting> {
        let state = self.state.read().await;
        state.sightings.get(&id).cloned().ok_or(SightingError::NotFound(id))
    }

    /// One-shot proximity search resolving index hits to full records,
    /// nearest first.
    pub async fn query_nearby(&self, query: &SpatialQuery) -> Vec<NearbySighting> {
        let state = self.state.read().await;

        let hits = match &query.filters.tags {
            // The tag filter has to run before truncation.
            Some(_) => {
                let mut unlimited = query.clone();
                unlimited.filters.max_results = None;
                state.index.query_with(&unlimited)
            }
            None => state.index.query_with(query),
        };

        let mut results: Vec<NearbySighting> = hits
            .into_iter()
            .filter_map(|hit| {
                let sighting = state.sightings.get(&hit.id)?;
                if let Some(tags) = &query.filters.tags {
                    if !tags.contains(&sighting.tag) {
                        return None;
                    }
                }
                Some(NearbySighting {
                    sighting: sighting.clone(),
                    distance_meters: hit.distance_meters,
                })
            })
            .collect();

        if let Some(max_results) = query.filters.max_results {
            results.truncate(max_results);
        }
        results
    }

    /// Number of live sightings
    pub async fn len(&self) -> usize {
        self.state.read().await.sightings.len()
    }

    /// Whether the store holds no sightings
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.sightings.is_empty()
    }

    /// Copy of every live sighting, ordered by id.
    pub async fn snapshot(&self) -> Vec<Sighting> {
        let state = self.state.read().await;
        let mut all: Vec<Sighting> = state.sightings.values().cloned().collect();
        all.sort_by_key(|s| s.id);
        all
    }

    /// Registers a listener for every future [`StoreEvent`].
    ///
    /// Only a weak reference is kept; the caller owns `listener` and the
    /// registration lapses once the last `Arc` is dropped.
    pub fn add_listener(&self, listener: &Arc<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.insert(id, Arc::downgrade(listener));
        id
    }

    /// Unregisters a listener; returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Gets the current store statistics
    pub async fn stats(&self) -> StoreStats {
        let state = self.state.read().await;
        StoreStats {
            sightings: state.sightings.len(),
            listeners: self.listeners.len(),
            total_created: state.total_created,
            total_moved: state.total_moved,
            total_removed: state.total_removed,
            events_published: state.events_published,
            index: state.index.stats(),
        }
    }

    /// Read access for subscriptions that must act on a consistent snapshot.
    pub(crate) async fn read_state(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().await
    }

    /// Registers a weak listener; used by subscriptions while they hold the
    /// read lock, so registration is atomic with their initial query.
    pub(crate) fn register_weak(&self, listener: Weak<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId::new();
        self.listeners.insert(id, listener);
        id
    }

    /// Delivers `event` to every live listener. Called with the write lock held.
    async fn publish(&self, state: &mut StoreState, event: StoreEvent) {
        state.events_published += 1;

        // No DashMap guard may be held across an await.
        let targets: Vec<(ListenerId, Weak<dyn ChangeListener>)> = self
            .listeners
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut dead = Vec::new();
        for (listener_id, weak) in targets {
            match weak.upgrade() {
                Some(listener) => listener.on_change(&event).await,
                None => dead.push(listener_id),
            }
        }

        if !dead.is_empty() {
            for listener_id in &dead {
                self.listeners.remove(listener_id);
            }
            info!("🧹 Pruned {} dropped listener(s)", dead.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Listener capturing every event it sees
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<StoreEvent>>,
    }

    #[async_trait::async_trait]
    impl ChangeListener for Recorder {
        async fn on_change(&self, event: &StoreEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn p(lat: f64, lon: f64) -> Point {
        Point::new(lat, lon).unwrap()
    }

    #[tokio::test]
    async fn report_assigns_fresh_ids_and_records_metadata() {
        let store = SightingStore::new();
        let a = store.report_sighting(25, p(60.0, 25.0)).await.unwrap();
        let b = store.report_sighting(25, p(60.0, 25.0)).await.unwrap();
        assert_ne!(a, b, "ids are per record, not per tag");

        let sighting = store.get(a).await.unwrap();
        assert_eq!(sighting.tag, 25);
        assert_eq!(sighting.location, p(60.0, 25.0));
        assert_eq!(sighting.created_at, sighting.updated_at);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_removal() {
        let store = SightingStore::new();
        let first = store.report_sighting(1, p(0.0, 0.0)).await.unwrap();
        store.remove(first).await.unwrap();
        let second = store.report_sighting(1, p(0.0, 0.0)).await.unwrap();
        assert!(second > first);
        assert_eq!(store.get(first).await, Err(SightingError::NotFound(first)));
    }

    #[tokio::test]
    async fn failed_calls_leave_state_unchanged() {
        let store = SightingStore::new();
        let id = store.report_sighting(4, p(1.0, 1.0)).await.unwrap();
        let missing = SightingId(999);

        assert_eq!(
            store.update_location(missing, p(2.0, 2.0)).await,
            Err(SightingError::NotFound(missing))
        );
        assert_eq!(store.remove(missing).await, Err(SightingError::NotFound(missing)));

        let stats = store.stats().await;
        assert_eq!(stats.sightings, 1);
        assert_eq!(stats.events_published, 1);
        assert_eq!(store.get(id).await.unwrap().location, p(1.0, 1.0));
    }

    #[tokio::test]
    async fn listeners_see_events_in_mutation_order() {
        let store = SightingStore::new();
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn ChangeListener> = recorder.clone();
        store.add_listener(&listener);

        let a = store.report_sighting(1, p(0.0, 0.0)).await.unwrap();
        let b = store.report_sighting(2, p(0.5, 0.5)).await.unwrap();
        store.update_location(a, p(1.0, 1.0)).await.unwrap();
        store.remove(b).await.unwrap();

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events.len(), 4);
        assert!(matches!(&events[0], StoreEvent::Created { sighting } if sighting.id == a));
        assert!(matches!(&events[1], StoreEvent::Created { sighting } if sighting.id == b));
        assert_eq!(
            events[2],
            StoreEvent::Moved {
                id: a,
                tag: 1,
                from: p(0.0, 0.0),
                to: p(1.0, 1.0)
            }
        );
        assert_eq!(
            events[3],
            StoreEvent::Removed {
                id: b,
                tag: 2,
                location: p(0.5, 0.5)
            }
        );
    }

    #[tokio::test]
    async fn dropped_listeners_are_pruned_on_publish() {
        let store = SightingStore::new();
        let listener: Arc<dyn ChangeListener> = Arc::new(Recorder::default());
        store.add_listener(&listener);
        assert_eq!(store.listener_count(), 1);

        drop(listener);
        store.report_sighting(1, p(0.0, 0.0)).await.unwrap();
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn removed_listener_stops_receiving() {
        let store = SightingStore::new();
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn ChangeListener> = recorder.clone();
        let id = store.add_listener(&listener);

        store.report_sighting(1, p(0.0, 0.0)).await.unwrap();
        assert!(store.remove_listener(id));
        assert!(!store.remove_listener(id));
        store.report_sighting(1, p(0.0, 0.0)).await.unwrap();

        assert_eq!(recorder.events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn query_nearby_filters_tags_before_limiting() {
        let store = SightingStore::new();
        store.report_sighting(1, p(0.0, 0.001)).await.unwrap();
        store.report_sighting(1, p(0.0, 0.002)).await.unwrap();
        let far_pikachu = store.report_sighting(25, p(0.0, 0.003)).await.unwrap();

        let query = SpatialQuery::new(p(0.0, 0.0), 5_000.0)
            .with_tags([25])
            .with_max_results(1);
        let results = store.query_nearby(&query).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].sighting.id, far_pikachu);

        let nearest_two = store
            .query_nearby(&SpatialQuery::new(p(0.0, 0.0), 5_000.0).with_max_results(2))
            .await;
        assert_eq!(nearest_two.len(), 2);
        assert!(nearest_two[0].distance_meters <= nearest_two[1].distance_meters);
    }

    #[tokio::test]
    async fn with_config_rejects_invalid_settings() {
        let mut config = SightingConfig::default();
        config.index.cell_size_degrees = -1.0;
        assert!(matches!(
            SightingStore::with_config(&config),
            Err(SightingError::Config(_))
        ));
    }

    #[tokio::test]
    async fn snapshot_is_ordered_by_id() {
        let store = SightingStore::new();
        for tag in [3, 1, 2] {
            store.report_sighting(tag, p(0.0, 0.0)).await.unwrap();
        }
        let ids: Vec<_> = store.snapshot().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![SightingId(1), SightingId(2), SightingId(3)]);
    }
}
