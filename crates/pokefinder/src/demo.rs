//! Simulated map session.
//!
//! Stands in for a phone user: every tick they spot a random Pokémon where
//! they are standing, then wander off a little and the map follows them.

use crate::config::DemoSettings;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sighting_core::geo::EARTH_RADIUS_METERS;
use sighting_core::{ProximitySubscription, SightingId, SightingService, Tag};
use tracing::debug;

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    pub tick: u64,
    pub reported: SightingId,
    pub tag: Tag,
    /// Map center after panning
    pub center: (f64, f64),
    pub relocated: Option<SightingId>,
}

/// Drives the service the way the app's "spot a Pokémon" button and map
/// panning would.
#[derive(Debug)]
pub struct MapWalker {
    settings: DemoSettings,
    rng: StdRng,
    lat: f64,
    lon: f64,
    tick: u64,
    reported: Vec<SightingId>,
}

impl MapWalker {
    pub fn new(settings: DemoSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            lat: settings.center_lat,
            lon: settings.center_lon,
            settings,
            rng,
            tick: 0,
            reported: Vec::new(),
        }
    }

    /// Current map center
    pub fn center(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }

    /// Sightings reported so far, oldest first
    pub fn reported(&self) -> &[SightingId] {
        &self.reported
    }

    /// Runs one tick against `service`, re-targeting `view` after panning.
    pub async fn tick(
        &mut self,
        service: &SightingService,
        view: &ProximitySubscription,
    ) -> sighting_core::Result<TickSummary> {
        self.tick += 1;

        let tag = self.rng.gen_range(1..=self.settings.max_tag);
        let reported = service.report_sighting(tag, self.lat, self.lon).await?;
        self.reported.push(reported);

        let relocated = self.maybe_relocate(service).await?;

        let bearing = self.rng.gen_range(0.0..360.0);
        let distance = self.rng.gen_range(0.0..=self.settings.pan_step_meters);
        let (lat, lon) = offset(self.lat, self.lon, bearing, distance);
        self.lat = lat;
        self.lon = lon;
        service
            .set_viewport(view, lat, lon, self.settings.radius_meters)
            .await?;

        debug!(
            "🎲 Tick {}: tag {} as {}, map now at ({:.5}, {:.5})",
            self.tick, tag, reported, lat, lon
        );

        Ok(TickSummary {
            tick: self.tick,
            reported,
            tag,
            center: (lat, lon),
            relocated,
        })
    }

    /// Moves one of the older sightings to a random spot around the map center.
    async fn maybe_relocate(
        &mut self,
        service: &SightingService,
    ) -> sighting_core::Result<Option<SightingId>> {
        let every = self.settings.relocate_every;
        // the sighting just reported is not a candidate
        if every == 0 || self.tick % every != 0 || self.reported.len() < 2 {
            return Ok(None);
        }

        let id = self.reported[self.rng.gen_range(0..self.reported.len() - 1)];
        let bearing = self.rng.gen_range(0.0..360.0);
        let distance = self.rng.gen_range(0.0..=self.settings.radius_meters * 1.5);
        let (lat, lon) = offset(self.lat, self.lon, bearing, distance);
        service.update_sighting(id, lat, lon).await?;
        Ok(Some(id))
    }
}

/// Point `distance_meters` away from `(lat, lon)` along `bearing_degrees`.
///
/// Latitude is clamped short of the poles and longitude wrapped into
/// `[-180, 180)`.
fn offset(lat: f64, lon: f64, bearing_degrees: f64, distance_meters: f64) -> (f64, f64) {
    let angular = distance_meters / EARTH_RADIUS_METERS;
    let bearing = bearing_degrees.to_radians();

    let new_lat = (lat + (angular * bearing.cos()).to_degrees()).clamp(-85.0, 85.0);
    let new_lon = lon + (angular * bearing.sin() / lat.to_radians().cos()).to_degrees();
    (new_lat, (new_lon + 180.0).rem_euclid(360.0) - 180.0)
}
