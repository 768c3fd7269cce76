/// Spatial query types and utilities
use crate::types::{Point, SightingId, Tag};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Spatial query parameters
#[derive(Debug, Clone)]
pub struct SpatialQuery {
    /// Center of the search circle
    pub center: Point,
    /// Search radius in meters
    pub radius_meters: f64,
    /// Optional filters for the query
    pub filters: QueryFilters,
}

impl SpatialQuery {
    /// Creates an unfiltered radius query.
    pub fn new(center: Point, radius_meters: f64) -> Self {
        Self {
            center,
            radius_meters,
            filters: QueryFilters::default(),
        }
    }

    /// Keeps only the `max_results` nearest hits.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.filters.max_results = Some(max_results);
        self
    }

    /// Keeps only sightings carrying one of `tags`.
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.filters.tags = Some(tags.into_iter().collect());
        self
    }
}

/// Filters that can be applied to spatial queries
#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    /// Include only sightings with these tags (applied by the store, the index is tag-agnostic)
    pub tags: Option<HashSet<Tag>>,
    /// Exclude specific sightings
    pub exclude_ids: Option<HashSet<SightingId>>,
    /// Maximum number of results to return, nearest first
    pub max_results: Option<usize>,
    /// Minimum distance from query center in meters
    pub min_distance: Option<f64>,
}

/// Result of a spatial query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Matching sighting
    pub id: SightingId,
    /// Indexed location
    pub location: Point,
    /// Great-circle distance from the query center in meters
    pub distance_meters: f64,
}
