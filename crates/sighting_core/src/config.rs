//! Sighting core configuration
//!
//! Tuning knobs for the spatial grid and the subscription outboxes. Every
//! section has a `Default` so callers only spell out what they change.

use crate::error::{Result, SightingError};
use serde::{Deserialize, Serialize};

/// Complete configuration of a sighting store and its subscriptions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SightingConfig {
    /// Spatial grid configuration
    #[serde(default)]
    pub index: IndexConfig,
    /// Subscription delivery configuration
    #[serde(default)]
    pub subscription: SubscriptionConfig,
}

/// Spatial grid configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Edge length of a grid cell in degrees. Should be in the order of the
    /// typical query radius: 0.01 degrees is ~1.1 km of latitude.
    pub cell_size_degrees: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            cell_size_degrees: 0.01,
        }
    }
}

/// Subscription delivery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Pending events a subscription buffers before it starts coalescing
    pub queue_capacity: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

impl SightingConfig {
    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        let cell = self.index.cell_size_degrees;
        if !cell.is_finite() || cell <= 0.0 {
            return Err(SightingError::Config(format!(
                "index.cell_size_degrees must be positive, got {cell}"
            )));
        }
        if cell > 90.0 {
            return Err(SightingError::Config(format!(
                "index.cell_size_degrees must not exceed 90, got {cell}"
            )));
        }
        // Grid coordinates are stored as i32
        if 360.0 / cell > i32::MAX as f64 {
            return Err(SightingError::Config(format!(
                "index.cell_size_degrees {cell} is too small"
            )));
        }

        if self.subscription.queue_capacity == 0 {
            return Err(SightingError::Config(
                "subscription.queue_capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SightingConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_cell_sizes() {
        let mut config = SightingConfig::default();
        for bad in [0.0, -1.0, f64::NAN, 120.0, 1e-12] {
            config.index.cell_size_degrees = bad;
            assert!(
                matches!(config.validate(), Err(SightingError::Config(_))),
                "cell size {bad} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_zero_queue_capacity() {
        let mut config = SightingConfig::default();
        config.subscription.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: SightingConfig = serde_json::from_str(r#"{"index":{"cell_size_degrees":0.5}}"#).unwrap();
        assert_eq!(config.index.cell_size_degrees, 0.5);
        assert_eq!(config.subscription, SubscriptionConfig::default());
    }
}
