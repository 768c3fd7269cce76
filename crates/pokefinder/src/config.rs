//! Configuration management for the PokeFinder demo driver.
//!
//! Loads and validates the TOML configuration and converts it into the
//! library's [`SightingConfig`].

use serde::{Deserialize, Serialize};
use sighting_core::{IndexConfig, SightingConfig, SubscriptionConfig};
use std::path::Path;
use tracing::info;

fn default_cell_size_degrees() -> f64 {
    0.01 // roughly 1.1 km at the equator
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_center_lat() -> f64 {
    37.7749
}

fn default_center_lon() -> f64 {
    -122.4194
}

fn default_radius_meters() -> f64 {
    10_000.0 // 10 km search radius
}

fn default_tick_interval_ms() -> u64 {
    500
}

fn default_max_tag() -> u32 {
    151
}

fn default_pan_step_meters() -> f64 {
    1_500.0
}

fn default_relocate_every() -> u64 {
    3
}

fn default_stats_interval_secs() -> u64 {
    30
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging configuration settings
    pub logging: LoggingSettings,
    /// Spatial index tuning
    #[serde(default)]
    pub index: IndexSettings,
    /// Per-subscription delivery tuning
    #[serde(default)]
    pub subscription: SubscriptionSettings,
    /// Simulated map session
    #[serde(default)]
    pub demo: DemoSettings,
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

/// Spatial index configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Grid cell edge length in degrees
    #[serde(default = "default_cell_size_degrees")]
    pub cell_size_degrees: f64,
}

/// Subscription configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSettings {
    /// Pending events per subscription before coalescing kicks in
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Simulated map session settings.
///
/// Every tick reports a random Pokémon at the map center, pans the map and,
/// every `relocate_every` ticks, moves an older sighting somewhere nearby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoSettings {
    /// Initial map center latitude
    #[serde(default = "default_center_lat")]
    pub center_lat: f64,
    /// Initial map center longitude
    #[serde(default = "default_center_lon")]
    pub center_lon: f64,
    /// Search radius of the map view in meters
    #[serde(default = "default_radius_meters")]
    pub radius_meters: f64,
    /// Delay between ticks
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Number of ticks to run; 0 runs until a shutdown signal
    #[serde(default)]
    pub ticks: u64,
    /// Tags are drawn from `1..=max_tag`
    #[serde(default = "default_max_tag")]
    pub max_tag: u32,
    /// Largest distance the map pans per tick
    #[serde(default = "default_pan_step_meters")]
    pub pan_step_meters: f64,
    /// Relocate an older sighting every N ticks; 0 disables relocation
    #[serde(default = "default_relocate_every")]
    pub relocate_every: u64,
    /// RNG seed; random when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Seconds between store statistics reports
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            cell_size_degrees: default_cell_size_degrees(),
        }
    }
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            center_lat: default_center_lat(),
            center_lon: default_center_lon(),
            radius_meters: default_radius_meters(),
            tick_interval_ms: default_tick_interval_ms(),
            ticks: 0,
            max_tag: default_max_tag(),
            pan_step_meters: default_pan_step_meters(),
            relocate_every: default_relocate_every(),
            seed: None,
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
            index: IndexSettings::default(),
            subscription: SubscriptionSettings::default(),
            demo: DemoSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to `path`
    /// and returns it.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Library configuration for the sighting service.
    pub fn to_sighting_config(&self) -> SightingConfig {
        SightingConfig {
            index: IndexConfig {
                cell_size_degrees: self.index.cell_size_degrees,
            },
            subscription: SubscriptionConfig {
                queue_capacity: self.subscription.queue_capacity,
            },
        }
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        self.to_sighting_config()
            .validate()
            .map_err(|e| e.to_string())?;

        let demo = &self.demo;
        if !(-90.0..=90.0).contains(&demo.center_lat) || !(-180.0..=180.0).contains(&demo.center_lon) {
            return Err(format!(
                "demo center ({}, {}) is not a valid coordinate",
                demo.center_lat, demo.center_lon
            ));
        }
        if !(demo.radius_meters.is_finite() && demo.radius_meters > 0.0) {
            return Err("demo.radius_meters must be a positive number".to_string());
        }
        if demo.max_tag == 0 {
            return Err("demo.max_tag must be greater than 0".to_string());
        }
        if !(demo.pan_step_meters.is_finite() && demo.pan_step_meters >= 0.0) {
            return Err("demo.pan_step_meters must not be negative".to_string());
        }
        if demo.stats_interval_secs == 0 {
            return Err("demo.stats_interval_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}
