//! # PokeFinder - Demo Driver
//!
//! Runs a simulated PokeFinder map session against the sighting proximity
//! index: a user spots random Pokémon where they stand, wanders around, and
//! the map view logs sightings entering and leaving its search radius.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration until Ctrl+C
//! pokefinder
//!
//! # Reproducible 50-tick session with debug output
//! pokefinder --ticks 50 --seed 151 --log-level debug
//!
//! # JSON logging
//! pokefinder --json-logs
//! ```
//!
//! ## Configuration
//!
//! Settings are loaded from a TOML file (default: `pokefinder.toml`). If the
//! file doesn't exist, a default configuration is written there.
//!
//! ## Signal Handling
//!
//! The session stops gracefully on SIGINT (Ctrl+C) or SIGTERM; a second
//! signal exits immediately.

use tracing::error;

mod app;
mod cli;
mod config;
mod demo;
mod logging;
mod signals;

/// Entry point called from `main`.
///
/// Parses the CLI, sets up logging from the configuration file and runs the
/// application. Exits the process with status 1 on startup or runtime errors.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let mut logging = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default()
        .logging;
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }

    if let Err(e) = logging::setup_logging(&logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

// Re-export main types for library usage
pub use app::{Application, StopReason};
pub use cli::CliArgs;
pub use config::{AppConfig, DemoSettings, IndexSettings, LoggingSettings, SubscriptionSettings};
pub use demo::{MapWalker, TickSummary};
