//! Error types for the sighting core.

use crate::types::{SightingId, SubscriptionId};

/// Errors returned by the index, the store, subscriptions and the service.
///
/// Every failing call leaves the state it touched unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SightingError {
    /// Latitude or longitude outside its valid range, or not finite
    #[error("Invalid coordinate: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },
    /// Search radius that is zero, negative or not finite
    #[error("Invalid radius: {0} meters")]
    InvalidRadius(f64),
    /// An id was inserted twice; ids come from a counter so this is an internal invariant violation
    #[error("Duplicate id: {0}")]
    DuplicateId(SightingId),
    /// The referenced sighting does not exist
    #[error("Sighting not found: {0}")]
    NotFound(SightingId),
    /// Operation on a subscription that has already been closed
    #[error("Subscription closed: {0}")]
    SubscriptionClosed(SubscriptionId),
    /// Configuration failed validation
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SightingError>;
