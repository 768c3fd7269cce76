//! Main application logic and lifecycle management.
//!
//! The `Application` opens one map view, runs the simulated session against
//! it, logs the live feed and shuts down on a tick budget or a signal.

use crate::cli::CliArgs;
use crate::config::AppConfig;
use crate::demo::MapWalker;
use crate::logging::display_banner;
use crate::signals::{wait_for_shutdown_signal, wait_for_shutdown_signal_silent};
use futures::StreamExt;
use sighting_core::{ProximityEvent, ProximitySubscription, SightingService};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Why the session loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TickBudgetSpent,
    Signal,
}

/// Main application struct.
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Sighting service the session runs against
    service: SightingService,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Build the sighting service
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let config = AppConfig::load_from_file(&args.config_path).await?;
        let app = Self::from_config(config, &args)?;
        info!("✅ Configuration loaded and validated successfully");
        Ok(app)
    }

    /// Builds the application from an already loaded configuration.
    pub fn from_config(
        mut config: AppConfig,
        args: &CliArgs,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(log_level) = &args.log_level {
            config.logging.level = log_level.clone();
        }
        if args.json_logs {
            config.logging.json_format = true;
        }
        if let Some(ticks) = args.ticks {
            config.demo.ticks = ticks;
        }
        if let Some(seed) = args.seed {
            config.demo.seed = Some(seed);
        }

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }

        let service = SightingService::from_config(&config.to_sighting_config())?;
        Ok(Self { config, service })
    }

    /// Merged configuration in effect
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Runs the session until the tick budget is spent or a signal arrives.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        display_banner();
        self.log_configuration_summary();

        let demo = &self.config.demo;
        let view = Arc::new(
            self.service
                .subscribe(demo.center_lat, demo.center_lon, demo.radius_meters)
                .await?,
        );

        let consumer_handle = spawn_feed_logger(view.clone());

        let monitoring_handle = {
            let service = self.service.clone();
            let period = Duration::from_secs(demo.stats_interval_secs);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let stats = service.stats().await;
                    info!(
                        "📊 Store health - {} sightings | {} listeners | {} events published | {} cells occupied",
                        stats.sightings,
                        stats.listeners,
                        stats.events_published,
                        stats.index.occupied_cells
                    );
                }
            })
        };

        info!("✅ PokeFinder session is now running");
        info!("🛑 Press Ctrl+C to stop");

        let reason = tokio::select! {
            result = self.run_session(&view) => result?,
            result = wait_for_shutdown_signal() => {
                if let Err(e) = result {
                    error!("❌ Signal handling failed: {e}");
                }
                StopReason::Signal
            }
        };

        // A second signal during shutdown exits immediately.
        tokio::spawn(async move {
            if let Err(e) = wait_for_shutdown_signal_silent().await {
                error!("Failed to set up forced shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown signal received again, exiting now");
            std::process::exit(1);
        });

        info!("🛑 Session stopped ({:?}), shutting down...", reason);
        monitoring_handle.abort();

        let view_stats = view.stats().await;
        self.service.close(&view).await?;
        if let Err(e) = consumer_handle.await {
            warn!("⚠️ Feed logger ended abnormally: {e}");
        }

        let stats = self.service.stats().await;
        info!("📊 Final statistics:");
        info!(
            "  - Sightings: {} live, {} created, {} moved, {} removed",
            stats.sightings, stats.total_created, stats.total_moved, stats.total_removed
        );
        info!(
            "  - Map view: {} entered, {} left, {} coalesced, {} viewport changes",
            view_stats.entered_emitted,
            view_stats.left_emitted,
            view_stats.coalesced,
            view_stats.viewport_changes
        );
        info!(
            "  - Index: {} queries, last visited {} cells for {} candidates",
            stats.index.total_queries,
            stats.index.last_query_cells_visited,
            stats.index.last_query_candidates
        );
        info!("✅ PokeFinder shutdown complete");
        Ok(())
    }

    /// Tick loop; returns once the configured number of ticks has run.
    async fn run_session(
        &self,
        view: &ProximitySubscription,
    ) -> Result<StopReason, Box<dyn std::error::Error>> {
        let demo = &self.config.demo;
        let mut walker = MapWalker::new(demo.clone());
        let mut interval = tokio::time::interval(Duration::from_millis(demo.tick_interval_ms.max(1)));

        let mut ticks = 0u64;
        while demo.ticks == 0 || ticks < demo.ticks {
            interval.tick().await;
            let summary = walker.tick(&self.service, view).await?;
            ticks += 1;

            info!(
                "📍 Spotted #{} as {} at ({:.5}, {:.5})",
                summary.tag, summary.reported, summary.center.0, summary.center.1
            );
            if let Some(id) = summary.relocated {
                info!("🚶 {} wandered off", id);
            }
        }

        Ok(StopReason::TickBudgetSpent)
    }

    fn log_configuration_summary(&self) {
        let demo = &self.config.demo;
        info!("📋 Configuration summary:");
        info!(
            "  - Map center: ({}, {}) radius {} m",
            demo.center_lat, demo.center_lon, demo.radius_meters
        );
        info!(
            "  - Index cell: {}° | Queue capacity: {}",
            self.config.index.cell_size_degrees, self.config.subscription.queue_capacity
        );
        match demo.ticks {
            0 => info!("  - Ticks: until Ctrl+C every {} ms", demo.tick_interval_ms),
            n => info!("  - Ticks: {} every {} ms", n, demo.tick_interval_ms),
        }
    }
}

/// Logs every event of `view` until it is closed.
fn spawn_feed_logger(view: Arc<ProximitySubscription>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = Box::pin(view.events());
        while let Some(event) = events.next().await {
            match event {
                ProximityEvent::Entered { id, tag, location } => {
                    info!("🟢 #{} ({}) entered the map at {}", tag, id, location);
                }
                ProximityEvent::Left { id } => {
                    info!("⚪ {} left the map", id);
                }
            }
        }
    })
}
