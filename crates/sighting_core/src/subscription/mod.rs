//! # Proximity Subscriptions
//!
//! A [`ProximitySubscription`] tracks which sightings are inside one moving
//! [`Viewport`] and reports membership changes as an ordered feed of
//! [`ProximityEvent`]s, so a renderer can add and remove pins incrementally.
//!
//! ## Lifecycle
//!
//! `Inactive -> Active -> Closed`. Opening performs the initial query and
//! emits an `Entered` for every match; closing detaches from the store and is
//! idempotent.
//!
//! ## Delivery
//!
//! Store mutations reach the subscription through [`ChangeListener`] while
//! the store's write lock is held, which keeps the feed in mutation order.
//! The listener only does a distance check and pushes into a bounded
//! [`Outbox`]; consumers pull at their own pace via [`next_event`] or
//! [`events`].
//!
//! Lock order is always store state, then subscription state.
//!
//! [`next_event`]: ProximitySubscription::next_event
//! [`events`]: ProximitySubscription::events

mod events;
mod outbox;

pub use events::{ProximityEvent, SubscriptionState, SubscriptionStats};

use crate::error::{Result, SightingError};
use crate::store::{ChangeListener, ListenerId, SightingStore, StoreEvent};
use crate::types::{SightingId, SubscriptionId, Viewport};
use async_trait::async_trait;
use futures::Stream;
use outbox::Outbox;
use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

/// Mutable part of a subscription, guarded by one mutex.
#[derive(Debug)]
struct SubscriptionInner {
    state: SubscriptionState,
    viewport: Viewport,
    members: BTreeSet<SightingId>,
    outbox: Outbox,
    listener_id: Option<ListenerId>,
    stats: SubscriptionStats,
}

impl SubscriptionInner {
    fn emit(&mut self, id: SubscriptionId, event: ProximityEvent) {
        if event.is_entered() {
            self.stats.entered_emitted += 1;
        } else {
            self.stats.left_emitted += 1;
        }
        let folded = self.outbox.push(event);
        if folded > 0 {
            self.stats.coalesced += folded as u64;
            debug!(
                "📦 Subscription {} outbox full, coalesced {} pending event(s)",
                id, folded
            );
        }
    }

    /// Applies one store change; returns whether an event was emitted.
    fn apply(&mut self, id: SubscriptionId, change: &StoreEvent) -> bool {
        match change {
            StoreEvent::Created { sighting } => {
                if self.viewport.contains(&sighting.location) && self.members.insert(sighting.id) {
                    self.emit(
                        id,
                        ProximityEvent::Entered {
                            id: sighting.id,
                            tag: sighting.tag,
                            location: sighting.location,
                        },
                    );
                    return true;
                }
                false
            }
            StoreEvent::Moved {
                id: sighting_id,
                tag,
                to,
                ..
            } => {
                let inside = self.viewport.contains(to);
                let was_inside = self.members.contains(sighting_id);
                match (was_inside, inside) {
                    (false, true) => {
                        self.members.insert(*sighting_id);
                        self.emit(
                            id,
                            ProximityEvent::Entered {
                                id: *sighting_id,
                                tag: *tag,
                                location: *to,
                            },
                        );
                        true
                    }
                    (true, false) => {
                        self.members.remove(sighting_id);
                        self.emit(id, ProximityEvent::Left { id: *sighting_id });
                        true
                    }
                    _ => false,
                }
            }
            StoreEvent::Removed { id: sighting_id, .. } => {
                if self.members.remove(sighting_id) {
                    self.emit(id, ProximityEvent::Left { id: *sighting_id });
                    return true;
                }
                false
            }
        }
    }
}

/// State shared between the handle and the store's listener registry.
#[derive(Debug)]
struct SubscriptionShared {
    id: SubscriptionId,
    inner: Mutex<SubscriptionInner>,
    notify: Notify,
}

#[async_trait]
impl ChangeListener for SubscriptionShared {
    async fn on_change(&self, event: &StoreEvent) {
        let mut inner = self.inner.lock().await;
        if inner.state != SubscriptionState::Active {
            return;
        }
        if inner.apply(self.id, event) {
            drop(inner);
            self.notify.notify_one();
        }
    }
}

/// Live "nearby sightings" feed for one moving viewport.
///
/// Dropping the handle without calling [`close`](Self::close) detaches it as
/// well; the store only holds a weak reference.
#[derive(Debug)]
pub struct ProximitySubscription {
    shared: Arc<SubscriptionShared>,
    store: Arc<SightingStore>,
}

impl ProximitySubscription {
    /// Opens a subscription and queues an `Entered` event for every sighting
    /// already inside `viewport`, in ascending id order.
    ///
    /// The initial query and the registration with the store happen under
    /// one read snapshot, so concurrent mutations are seen exactly once:
    /// either in the initial population or as a later change.
    pub async fn open(store: Arc<SightingStore>, viewport: Viewport) -> Self {
        let id = SubscriptionId::new();
        let shared = Arc::new(SubscriptionShared {
            id,
            inner: Mutex::new(SubscriptionInner {
                state: SubscriptionState::Inactive,
                viewport,
                members: BTreeSet::new(),
                outbox: Outbox::new(store.subscription_config().queue_capacity),
                listener_id: None,
                stats: SubscriptionStats::default(),
            }),
            notify: Notify::new(),
        });

        let initial = {
            let snapshot = store.read_state().await;
            let mut inner = shared.inner.lock().await;

            let matches = snapshot
                .index()
                .query(&viewport.center(), viewport.radius_meters());
            for sighting_id in &matches {
                if let Some(sighting) = snapshot.sighting(*sighting_id) {
                    inner.emit(
                        id,
                        ProximityEvent::Entered {
                            id: sighting.id,
                            tag: sighting.tag,
                            location: sighting.location,
                        },
                    );
                }
            }
            inner.members = matches;

            let weak: Weak<dyn ChangeListener> = Arc::downgrade(&shared) as Weak<dyn ChangeListener>;
            inner.listener_id = Some(store.register_weak(weak));
            inner.state = SubscriptionState::Active;
            inner.members.len()
        };

        if initial > 0 {
            shared.notify.notify_one();
        }
        info!(
            "🔭 Subscription {} opened at {} r={}m with {} sighting(s) in range",
            id,
            viewport.center(),
            viewport.radius_meters(),
            initial
        );

        Self { shared, store }
    }

    /// Identifier used in logs and stats
    pub fn id(&self) -> SubscriptionId {
        self.shared.id
    }

    /// Moves the viewport, emitting `Left` for sightings that dropped out
    /// and then `Entered` for sightings that came into range, each group in
    /// ascending id order. Unchanged members produce no event, even if they
    /// moved.
    ///
    /// # Errors
    ///
    /// [`SightingError::SubscriptionClosed`] once the subscription is closed.
    pub async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        let snapshot = self.store.read_state().await;
        let mut inner = self.shared.inner.lock().await;
        if inner.state == SubscriptionState::Closed {
            return Err(SightingError::SubscriptionClosed(self.shared.id));
        }

        let now = snapshot
            .index()
            .query(&viewport.center(), viewport.radius_meters());
        let left: Vec<SightingId> = inner.members.difference(&now).copied().collect();
        let entered: Vec<SightingId> = now.difference(&inner.members).copied().collect();

        for sighting_id in &left {
            inner.emit(self.shared.id, ProximityEvent::Left { id: *sighting_id });
        }
        for sighting_id in &entered {
            if let Some(sighting) = snapshot.sighting(*sighting_id) {
                inner.emit(
                    self.shared.id,
                    ProximityEvent::Entered {
                        id: sighting.id,
                        tag: sighting.tag,
                        location: sighting.location,
                    },
                );
            }
        }

        inner.members = now;
        inner.viewport = viewport;
        inner.stats.viewport_changes += 1;
        drop(inner);
        drop(snapshot);

        if !left.is_empty() || !entered.is_empty() {
            self.shared.notify.notify_one();
        }
        debug!(
            "🧭 Subscription {} viewport -> {} r={}m (+{} / -{})",
            self.shared.id,
            viewport.center(),
            viewport.radius_meters(),
            entered.len(),
            left.len()
        );
        Ok(())
    }

    /// Closes the subscription. Pending events are discarded and no event is
    /// queued after this returns. Closing twice is a no-op.
    pub async fn close(&self) {
        let listener_id = {
            let mut inner = self.shared.inner.lock().await;
            if inner.state == SubscriptionState::Closed {
                return;
            }
            inner.state = SubscriptionState::Closed;
            inner.outbox.clear();
            inner.members.clear();
            inner.listener_id.take()
        };

        if let Some(listener_id) = listener_id {
            self.store.remove_listener(listener_id);
        }
        // Wake current waiters and leave a permit for one that is about to wait.
        self.shared.notify.notify_waiters();
        self.shared.notify.notify_one();
        info!("🔌 Subscription {} closed", self.shared.id);
    }

    /// Waits for the next event. Returns `None` once the subscription is closed.
    pub async fn next_event(&self) -> Option<ProximityEvent> {
        loop {
            {
                let mut inner = self.shared.inner.lock().await;
                if let Some(event) = inner.outbox.pop() {
                    return Some(event);
                }
                if inner.state == SubscriptionState::Closed {
                    return None;
                }
            }
            self.shared.notify.notified().await;
        }
    }

    /// Takes the next pending event without waiting.
    pub async fn try_next_event(&self) -> Option<ProximityEvent> {
        self.shared.inner.lock().await.outbox.pop()
    }

    /// Takes every pending event without waiting.
    pub async fn drain_events(&self) -> Vec<ProximityEvent> {
        self.shared.inner.lock().await.outbox.drain()
    }

    /// The event feed as a stream; ends when the subscription is closed.
    pub fn events(&self) -> impl Stream<Item = ProximityEvent> + '_ {
        futures::stream::unfold(self, |subscription| async move {
            subscription
                .next_event()
                .await
                .map(|event| (event, subscription))
        })
    }

    /// Current viewport
    pub async fn viewport(&self) -> Viewport {
        self.shared.inner.lock().await.viewport
    }

    /// Sightings currently inside the viewport, as far as this feed has reported
    pub async fn members(&self) -> BTreeSet<SightingId> {
        self.shared.inner.lock().await.members.clone()
    }

    /// Lifecycle state
    pub async fn state(&self) -> SubscriptionState {
        self.shared.inner.lock().await.state
    }

    /// Whether [`close`](Self::close) has completed
    pub async fn is_closed(&self) -> bool {
        self.state().await == SubscriptionState::Closed
    }

    /// Delivery statistics
    pub async fn stats(&self) -> SubscriptionStats {
        let inner = self.shared.inner.lock().await;
        SubscriptionStats {
            pending: inner.outbox.len(),
            coalesce_passes: inner.outbox.passes(),
            ..inner.stats.clone()
        }
    }
}

impl Drop for ProximitySubscription {
    fn drop(&mut self) {
        // Best effort: if the lock is busy the store prunes the dead weak
        // reference on its next publish instead.
        if let Ok(mut inner) = self.shared.inner.try_lock() {
            inner.state = SubscriptionState::Closed;
            if let Some(listener_id) = inner.listener_id.take() {
                self.store.remove_listener(listener_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SightingConfig;
    use crate::types::Point;

    fn p(lat: f64, lon: f64) -> Point {
        Point::new(lat, lon).unwrap()
    }

    fn vp(lat: f64, lon: f64, radius: f64) -> Viewport {
        Viewport::from_coords(lat, lon, radius).unwrap()
    }

    #[tokio::test]
    async fn open_populates_initial_members_in_id_order() {
        let store = Arc::new(SightingStore::new());
        let a = store.report_sighting(1, p(0.0, 0.001)).await.unwrap();
        let _far = store.report_sighting(2, p(5.0, 5.0)).await.unwrap();
        let c = store.report_sighting(3, p(0.0, -0.001)).await.unwrap();

        let sub = ProximitySubscription::open(store.clone(), vp(0.0, 0.0, 1_000.0)).await;
        assert_eq!(sub.state().await, SubscriptionState::Active);

        let ids: Vec<_> = sub.drain_events().await.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![a, c]);
        assert_eq!(sub.members().await, BTreeSet::from([a, c]));
    }

    #[tokio::test]
    async fn moved_inside_viewport_produces_no_event() {
        let store = Arc::new(SightingStore::new());
        let id = store.report_sighting(1, p(0.0, 0.0)).await.unwrap();
        let sub = ProximitySubscription::open(store.clone(), vp(0.0, 0.0, 5_000.0)).await;
        sub.drain_events().await;

        store.update_location(id, p(0.01, 0.01)).await.unwrap();
        assert!(sub.drain_events().await.is_empty());
        assert_eq!(sub.members().await, BTreeSet::from([id]));
    }

    #[tokio::test]
    async fn moved_into_viewport_enters_with_new_location() {
        let store = Arc::new(SightingStore::new());
        let id = store.report_sighting(9, p(10.0, 10.0)).await.unwrap();
        let sub = ProximitySubscription::open(store.clone(), vp(0.0, 0.0, 5_000.0)).await;
        assert!(sub.drain_events().await.is_empty());

        store.update_location(id, p(0.0, 0.0)).await.unwrap();
        assert_eq!(
            sub.drain_events().await,
            vec![ProximityEvent::Entered {
                id,
                tag: 9,
                location: p(0.0, 0.0)
            }]
        );
    }

    #[tokio::test]
    async fn removal_of_member_emits_left() {
        let store = Arc::new(SightingStore::new());
        let inside = store.report_sighting(1, p(0.0, 0.0)).await.unwrap();
        let outside = store.report_sighting(1, p(3.0, 3.0)).await.unwrap();
        let sub = ProximitySubscription::open(store.clone(), vp(0.0, 0.0, 1_000.0)).await;
        sub.drain_events().await;

        store.remove(outside).await.unwrap();
        store.remove(inside).await.unwrap();
        assert_eq!(
            sub.drain_events().await,
            vec![ProximityEvent::Left { id: inside }]
        );
    }

    #[tokio::test]
    async fn set_viewport_emits_left_before_entered() {
        let store = Arc::new(SightingStore::new());
        let west = store.report_sighting(1, p(0.0, -1.0)).await.unwrap();
        let east = store.report_sighting(2, p(0.0, 1.0)).await.unwrap();
        let sub = ProximitySubscription::open(store.clone(), vp(0.0, -1.0, 2_000.0)).await;
        assert_eq!(sub.drain_events().await.len(), 1);

        sub.set_viewport(vp(0.0, 1.0, 2_000.0)).await.unwrap();
        assert_eq!(
            sub.drain_events().await,
            vec![
                ProximityEvent::Left { id: west },
                ProximityEvent::Entered {
                    id: east,
                    tag: 2,
                    location: p(0.0, 1.0)
                },
            ]
        );
        assert_eq!(sub.viewport().await, vp(0.0, 1.0, 2_000.0));
        assert_eq!(sub.stats().await.viewport_changes, 1);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_rejects_viewport_changes() {
        let store = Arc::new(SightingStore::new());
        let sub = ProximitySubscription::open(store.clone(), vp(0.0, 0.0, 1_000.0)).await;
        assert_eq!(store.listener_count(), 1);

        sub.close().await;
        sub.close().await;
        assert!(sub.is_closed().await);
        assert_eq!(store.listener_count(), 0);
        assert_eq!(
            sub.set_viewport(vp(1.0, 1.0, 1_000.0)).await,
            Err(SightingError::SubscriptionClosed(sub.id()))
        );
        assert_eq!(sub.next_event().await, None);
    }

    #[tokio::test]
    async fn close_wakes_a_waiting_consumer() {
        let store = Arc::new(SightingStore::new());
        let sub = Arc::new(ProximitySubscription::open(store, vp(0.0, 0.0, 1_000.0)).await);

        let waiter = {
            let sub = sub.clone();
            tokio::spawn(async move { sub.next_event().await })
        };
        tokio::task::yield_now().await;
        sub.close().await;

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("consumer should be woken by close")
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn dropping_the_handle_unregisters_it() {
        let store = Arc::new(SightingStore::new());
        let sub = ProximitySubscription::open(store.clone(), vp(0.0, 0.0, 1_000.0)).await;
        assert_eq!(store.listener_count(), 1);
        drop(sub);
        assert_eq!(store.listener_count(), 0);
        // publishing afterwards must not trip over the dead registration
        store.report_sighting(1, p(0.0, 0.0)).await.unwrap();
    }

    #[tokio::test]
    async fn slow_consumer_gets_coalesced_feed() {
        let mut config = SightingConfig::default();
        config.subscription.queue_capacity = 4;
        let store = Arc::new(SightingStore::with_config(&config).unwrap());
        let sub = ProximitySubscription::open(store.clone(), vp(0.0, 0.0, 1_000.0)).await;

        let id = store.report_sighting(1, p(0.0, 0.0)).await.unwrap();
        // bounce the sighting in and out of range without consuming
        for i in 0..10 {
            let target = if i % 2 == 0 { p(1.0, 1.0) } else { p(0.0, 0.0) };
            store.update_location(id, target).await.unwrap();
        }
        let keeper = store.report_sighting(2, p(0.0, 0.0)).await.unwrap();

        let events = sub.drain_events().await;
        assert!(events.len() <= 5, "got {events:?}");
        let stats = sub.stats().await;
        assert!(stats.coalesced > 0);

        // replaying the feed yields the true final membership
        let mut replayed = BTreeSet::new();
        for event in &events {
            match event {
                ProximityEvent::Entered { id, .. } => assert!(replayed.insert(*id)),
                ProximityEvent::Left { id } => assert!(replayed.remove(id)),
            }
        }
        assert_eq!(replayed, BTreeSet::from([id, keeper]));
        assert_eq!(replayed, sub.members().await);
    }

    #[tokio::test]
    async fn opening_over_a_large_population_rescans_rarely() {
        let mut config = SightingConfig::default();
        config.subscription.queue_capacity = 64;
        let store = Arc::new(SightingStore::with_config(&config).unwrap());
        for i in 0..5_000u32 {
            let lat = (i % 100) as f64 * 0.001;
            let lon = (i / 100) as f64 * 0.001;
            store.report_sighting(1, p(lat, lon)).await.unwrap();
        }

        let sub = ProximitySubscription::open(store.clone(), vp(0.0, 0.0, 20_000.0)).await;
        let stats = sub.stats().await;
        assert_eq!(stats.pending, 5_000);
        assert_eq!(stats.coalesced, 0);
        // one pass per doubling from 64 up to 4096
        assert_eq!(stats.coalesce_passes, 7);

        store.report_sighting(2, p(0.0, 0.0)).await.unwrap();
        let stats = sub.stats().await;
        assert_eq!(stats.pending, 5_001);
        assert_eq!(stats.coalesce_passes, 7);
    }

    #[tokio::test]
    async fn events_stream_yields_in_order() {
        use futures::StreamExt;

        let store = Arc::new(SightingStore::new());
        let sub = ProximitySubscription::open(store.clone(), vp(0.0, 0.0, 1_000.0)).await;
        let a = store.report_sighting(1, p(0.0, 0.0)).await.unwrap();
        let b = store.report_sighting(2, p(0.0, 0.001)).await.unwrap();

        let ids: Vec<_> = sub.events().take(2).map(|e| e.id()).collect().await;
        assert_eq!(ids, vec![a, b]);
    }
}
