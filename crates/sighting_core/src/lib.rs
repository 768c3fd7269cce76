//! # Sighting Core
//!
//! The geospatial proximity engine behind PokeFinder: community members report
//! Pokémon sightings at map coordinates and every open map view receives a
//! live, incremental feed of sightings entering and leaving its search radius.
//!
//! ## Core Features
//!
//! - **Grid Spatial Index**: Lat/lon cell buckets with exact great-circle
//!   filtering, correct across the antimeridian and near the poles
//! - **Authoritative Store**: Create/move/remove semantics with totally ordered
//!   change events and never-reused ids
//! - **Proximity Subscriptions**: `Entered`/`Left` diff feeds per viewport with
//!   a bounded, coalescing outbox so slow consumers never stall reporters
//! - **Async/Await Support**: Built on Tokio; every handle is `Send + Sync`
//!
//! ## Architecture Overview
//!
//! - [`SpatialIndex`]: id → point index answering "who is within r meters"
//! - [`SightingStore`]: owns sightings and the index, publishes [`StoreEvent`]s
//! - [`ProximitySubscription`]: turns store events into a viewport diff feed
//! - [`SightingService`]: the façade the UI talks to
//!
//! ## Quick Start Example
//!
//! ```rust,no_run
//! use sighting_core::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let service = create_sighting_service();
//!
//!     // Open a 1 km map view around (0, 0)
//!     let view = service.subscribe(0.0, 0.0, 1_000.0).await?;
//!
//!     // Someone spots a Bulbasaur right in the middle of it
//!     let id = service.report_sighting(1, 0.0, 0.0).await?;
//!
//!     while let Some(event) = view.try_next_event().await {
//!         match event {
//!             ProximityEvent::Entered { id, tag, location } => {
//!                 println!("{} (#{}) appeared at {}", id, tag, location);
//!             }
//!             ProximityEvent::Left { id } => println!("{} left the map", id),
//!         }
//!     }
//!
//!     // Moving it far away produces a single Left
//!     service.update_sighting(id, 1.0, 1.0).await?;
//!     service.close(&view).await?;
//!     Ok(())
//! }
//! ```

// Core modules
pub mod config;
pub mod error;
pub mod geo;
pub mod service;
pub mod spatial;
pub mod store;
pub mod subscription;
pub mod types;
pub mod utils;

// Scenario tests
#[cfg(test)]
mod tests;

// Re-export commonly used items for convenience
pub use config::{IndexConfig, SightingConfig, SubscriptionConfig};
pub use error::{Result, SightingError};
pub use service::SightingService;
pub use spatial::{QueryFilters, QueryResult, SpatialIndex, SpatialIndexStats, SpatialQuery};
pub use store::{
    ChangeListener, ListenerId, NearbySighting, SightingStore, StoreEvent, StoreStats,
};
pub use subscription::{
    ProximityEvent, ProximitySubscription, SubscriptionState, SubscriptionStats,
};
pub use types::{Point, Sighting, SightingId, SubscriptionId, Tag, Viewport};
pub use utils::{create_sighting_service, create_sighting_service_with, current_timestamp};
