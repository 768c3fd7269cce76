//! # Core Type Definitions
//!
//! This module contains the fundamental value types shared by the index, the
//! store and the subscription feed.
//!
//! ## Key Types
//!
//! - [`Point`] - Validated latitude/longitude pair in degrees
//! - [`SightingId`] - Store-assigned identifier of a single sighting record
//! - [`SubscriptionId`] - Identifier of a live proximity subscription
//! - [`Sighting`] - A tagged point with creation metadata
//! - [`Viewport`] - Search circle (center + radius in meters) of a subscription
//!
//! ## Design Principles
//!
//! - **Type Safety**: Wrapper types keep sighting ids and subscription ids apart
//! - **Validity**: A [`Point`] or [`Viewport`] that exists is always in range
//! - **Serialization**: All types support JSON serialization for the UI boundary

use crate::error::SightingError;
use crate::geo;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque creature tag carried by a sighting. The core attaches no meaning to it.
pub type Tag = u32;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier of a sighting record.
///
/// Ids are handed out by [`SightingStore`](crate::store::SightingStore) from a
/// monotonically increasing counter, so they are never reused within the
/// lifetime of a store, even after the record is removed.
///
/// # Examples
///
/// ```rust
/// use sighting_core::SightingId;
///
/// let id = SightingId(7);
/// assert_eq!(id.to_string(), "sighting#7");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SightingId(pub u64);

impl std::fmt::Display for SightingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sighting#{}", self.0)
    }
}

/// Unique identifier for a proximity subscription.
///
/// This is a wrapper around UUID so subscriptions opened by unrelated
/// callers against the same store can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    /// Creates a new random subscription ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// A position on the Earth's surface in decimal degrees.
///
/// Latitude is in `-90.0..=90.0`, longitude in `-180.0..=180.0`. The fields are
/// private so a `Point` can only be obtained through [`Point::new`], which
/// rejects anything out of range (including NaN). Deserialization goes through
/// the same check.
///
/// # Examples
///
/// ```rust
/// use sighting_core::Point;
///
/// let helsinki = Point::new(60.1699, 24.9384)?;
/// assert!(Point::new(91.0, 0.0).is_err());
/// # Ok::<(), sighting_core::SightingError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPoint")]
pub struct Point {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct RawPoint {
    lat: f64,
    lon: f64,
}

impl TryFrom<RawPoint> for Point {
    type Error = SightingError;

    fn try_from(raw: RawPoint) -> Result<Self, Self::Error> {
        Point::new(raw.lat, raw.lon)
    }
}

impl Point {
    /// Creates a validated point.
    ///
    /// # Errors
    ///
    /// Returns [`SightingError::InvalidCoordinate`] if either component is
    /// outside its range or not finite.
    pub fn new(lat: f64, lon: f64) -> Result<Self, SightingError> {
        let lat_ok = lat.is_finite() && (-90.0..=90.0).contains(&lat);
        let lon_ok = lon.is_finite() && (-180.0..=180.0).contains(&lon);
        if lat_ok && lon_ok {
            Ok(Self { lat, lon })
        } else {
            Err(SightingError::InvalidCoordinate { lat, lon })
        }
    }

    /// Latitude in degrees.
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude in degrees.
    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &Point) -> f64 {
        geo::haversine_meters(self, other)
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// The search circle a subscription is interested in.
///
/// The radius is always positive and finite; see [`Viewport::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawViewport")]
pub struct Viewport {
    center: Point,
    radius_meters: f64,
}

#[derive(Deserialize)]
struct RawViewport {
    center: Point,
    radius_meters: f64,
}

impl TryFrom<RawViewport> for Viewport {
    type Error = SightingError;

    fn try_from(raw: RawViewport) -> Result<Self, Self::Error> {
        Viewport::new(raw.center, raw.radius_meters)
    }
}

impl Viewport {
    /// Creates a viewport around `center`.
    ///
    /// # Errors
    ///
    /// Returns [`SightingError::InvalidRadius`] for a radius that is zero,
    /// negative or not finite.
    pub fn new(center: Point, radius_meters: f64) -> Result<Self, SightingError> {
        if radius_meters.is_finite() && radius_meters > 0.0 {
            Ok(Self { center, radius_meters })
        } else {
            Err(SightingError::InvalidRadius(radius_meters))
        }
    }

    /// Convenience constructor validating raw coordinates and radius together.
    pub fn from_coords(lat: f64, lon: f64, radius_meters: f64) -> Result<Self, SightingError> {
        Self::new(Point::new(lat, lon)?, radius_meters)
    }

    /// Center of the search circle.
    pub fn center(&self) -> Point {
        self.center
    }

    /// Radius of the search circle in meters.
    pub fn radius_meters(&self) -> f64 {
        self.radius_meters
    }

    /// Whether `point` lies inside the circle (boundary inclusive).
    pub fn contains(&self, point: &Point) -> bool {
        self.center.distance_to(point) <= self.radius_meters
    }
}

// ============================================================================
// Records
// ============================================================================

/// A single reported sighting, as owned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sighting {
    /// Store-assigned identifier
    pub id: SightingId,
    /// Opaque creature tag
    pub tag: Tag,
    /// Current location
    pub location: Point,
    /// Unix timestamp (seconds) of the original report
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last relocation, equal to `created_at` until moved
    pub updated_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_rejects_out_of_range_values() {
        assert!(Point::new(90.0, 180.0).is_ok());
        assert!(Point::new(-90.0, -180.0).is_ok());
        assert!(matches!(
            Point::new(90.0001, 0.0),
            Err(SightingError::InvalidCoordinate { .. })
        ));
        assert!(Point::new(0.0, -180.5).is_err());
        assert!(Point::new(f64::NAN, 0.0).is_err());
        assert!(Point::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn point_deserialization_is_validated() {
        let ok: Point = serde_json::from_str(r#"{"lat":12.5,"lon":-45.0}"#).unwrap();
        assert_eq!(ok.lat(), 12.5);
        assert_eq!(ok.lon(), -45.0);

        let bad = serde_json::from_str::<Point>(r#"{"lat":120.0,"lon":0.0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn viewport_requires_positive_radius() {
        let center = Point::new(0.0, 0.0).unwrap();
        assert!(Viewport::new(center, 1.0).is_ok());
        assert!(matches!(
            Viewport::new(center, 0.0),
            Err(SightingError::InvalidRadius(_))
        ));
        assert!(Viewport::new(center, -5.0).is_err());
        assert!(Viewport::new(center, f64::NAN).is_err());
    }

    #[test]
    fn viewport_contains_is_boundary_inclusive() {
        let viewport = Viewport::from_coords(0.0, 0.0, 1_000.0).unwrap();
        assert!(viewport.contains(&Point::new(0.0, 0.0).unwrap()));
        // ~1.1 km north
        assert!(!viewport.contains(&Point::new(0.01, 0.0).unwrap()));
        let edge = Point::new(0.005, 0.0).unwrap();
        let exact = Viewport::new(viewport.center(), viewport.center().distance_to(&edge)).unwrap();
        assert!(exact.contains(&edge));
    }

    #[test]
    fn sighting_id_orders_by_counter() {
        assert!(SightingId(1) < SightingId(2));
        assert_eq!(format!("{}", SightingId(42)), "sighting#42");
    }
}
