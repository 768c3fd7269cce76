//! # Sighting Service
//!
//! Entry point used by the UI layer. The service validates raw coordinates,
//! forwards mutations to the shared [`SightingStore`] and hands out
//! [`ProximitySubscription`] handles.

use crate::config::SightingConfig;
use crate::error::Result;
use crate::spatial::SpatialQuery;
use crate::store::{NearbySighting, SightingStore, StoreStats};
use crate::subscription::ProximitySubscription;
use crate::types::{Point, Sighting, SightingId, Tag, Viewport};
use std::sync::Arc;
use tracing::info;

/// Public façade over the store and its subscriptions.
///
/// Cloning is cheap; clones share the same store.
#[derive(Debug, Clone)]
pub struct SightingService {
    store: Arc<SightingStore>,
}

impl Default for SightingService {
    fn default() -> Self {
        Self::new()
    }
}

impl SightingService {
    /// Creates a service over an empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_store(Arc::new(SightingStore::new()))
    }

    /// Creates a service over an empty store built from `config`.
    ///
    /// # Errors
    ///
    /// [`SightingError::Config`](crate::SightingError::Config) if the
    /// configuration does not validate.
    pub fn from_config(config: &SightingConfig) -> Result<Self> {
        let store = SightingStore::with_config(config)?;
        info!(
            "🗺️ Sighting service ready (cell {}°, queue capacity {})",
            config.index.cell_size_degrees, config.subscription.queue_capacity
        );
        Ok(Self::with_store(Arc::new(store)))
    }

    /// Wraps an existing store.
    pub fn with_store(store: Arc<SightingStore>) -> Self {
        Self { store }
    }

    /// Reports a new sighting and returns its id.
    pub async fn report_sighting(&self, tag: Tag, lat: f64, lon: f64) -> Result<SightingId> {
        let location = Point::new(lat, lon)?;
        self.store.report_sighting(tag, location).await
    }

    /// Relocates an existing sighting.
    pub async fn update_sighting(&self, id: SightingId, lat: f64, lon: f64) -> Result<()> {
        let location = Point::new(lat, lon)?;
        self.store.update_location(id, location).await
    }

    /// Removes a sighting, returning its last state.
    pub async fn remove_sighting(&self, id: SightingId) -> Result<Sighting> {
        self.store.remove(id).await
    }

    pub async fn get_sighting(&self, id: SightingId) -> Result<Sighting> {
        self.store.get(id).await
    }

    /// Opens a live feed of sightings within `radius_meters` of `(lat, lon)`.
    pub async fn subscribe(
        &self,
        lat: f64,
        lon: f64,
        radius_meters: f64,
    ) -> Result<ProximitySubscription> {
        let viewport = Viewport::from_coords(lat, lon, radius_meters)?;
        Ok(ProximitySubscription::open(self.store.clone(), viewport).await)
    }

    /// Moves a subscription's viewport.
    pub async fn set_viewport(
        &self,
        handle: &ProximitySubscription,
        lat: f64,
        lon: f64,
        radius_meters: f64,
    ) -> Result<()> {
        let viewport = Viewport::from_coords(lat, lon, radius_meters)?;
        handle.set_viewport(viewport).await
    }

    /// Closes a subscription. Closing an already closed handle succeeds.
    pub async fn close(&self, handle: &ProximitySubscription) -> Result<()> {
        handle.close().await;
        Ok(())
    }

    /// One-shot search, nearest first, optionally capped at `max_results`.
    pub async fn sightings_near(
        &self,
        lat: f64,
        lon: f64,
        radius_meters: f64,
        max_results: Option<usize>,
    ) -> Result<Vec<NearbySighting>> {
        let viewport = Viewport::from_coords(lat, lon, radius_meters)?;
        let mut query = SpatialQuery::new(viewport.center(), viewport.radius_meters());
        if let Some(max_results) = max_results {
            query = query.with_max_results(max_results);
        }
        Ok(self.store.query_nearby(&query).await)
    }

    /// Shared store behind this service
    pub fn store(&self) -> &Arc<SightingStore> {
        &self.store
    }

    pub async fn stats(&self) -> StoreStats {
        self.store.stats().await
    }
}
