//! Spatial indexing for sightings
//!
//! This module provides the point index behind the store: a latitude/longitude
//! grid answering great-circle radius queries, plus the query/filter/result
//! types shared with the store.

mod grid;
mod query;

// Re-export public types
pub use grid::{SpatialIndex, SpatialIndexStats};
pub use query::{QueryFilters, QueryResult, SpatialQuery};
