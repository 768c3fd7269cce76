//! # Utility Functions
//!
//! Small helpers shared across the crate.

use crate::config::SightingConfig;
use crate::service::SightingService;
use std::sync::Arc;

/// Returns the current Unix timestamp in seconds.
///
/// A clock set before the Unix epoch yields `0` rather than panicking.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Creates a shareable sighting service with the default configuration.
pub fn create_sighting_service() -> Arc<SightingService> {
    Arc::new(SightingService::new())
}

/// Creates a shareable sighting service from a validated configuration.
pub fn create_sighting_service_with(config: &SightingConfig) -> crate::Result<Arc<SightingService>> {
    SightingService::from_config(config).map(Arc::new)
}
