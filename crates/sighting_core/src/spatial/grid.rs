//! Latitude/longitude grid index for sighting locations
//!
//! The globe is tiled into `rows x cols` cells of (roughly) `cell_size_degrees`
//! on each side. Every entry lives in exactly one cell bucket. A radius query
//! computes the bounding box of the search cap, visits the cells it covers
//! (wrapping longitude across the antimeridian and widening to all longitudes
//! when a pole is inside the cap) and filters the candidates by exact
//! haversine distance.

use super::query::{QueryResult, SpatialQuery};
use crate::config::IndexConfig;
use crate::error::{Result, SightingError};
use crate::geo;
use crate::types::{Point, SightingId};
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::error;

/// Grid coordinate of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CellKey {
    row: i32,
    col: i32,
}

/// Entry stored for every indexed id.
#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    point: Point,
    cell: CellKey,
}

/// Statistics for analyzing grid performance
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpatialIndexStats {
    pub entries: usize,
    pub occupied_cells: usize,
    pub total_insertions: u64,
    pub total_updates: u64,
    pub total_removals: u64,
    pub total_queries: u64,
    /// Cell buckets looked at by the most recent query
    pub last_query_cells_visited: usize,
    /// Entries distance-checked by the most recent query
    pub last_query_candidates: usize,
    pub last_query_result_count: usize,
}

/// Query counters are atomics so `query` works through a shared reference
/// (readers hold only a read lock on the store).
#[derive(Debug, Default)]
struct QueryCounters {
    total_queries: AtomicU64,
    last_cells_visited: AtomicUsize,
    last_candidates: AtomicUsize,
    last_result_count: AtomicUsize,
}

/// Columns touched by a query.
#[derive(Debug, Clone, Copy)]
enum ColumnSpan {
    All,
    /// `width` consecutive columns starting at `start`, wrapping modulo `cols`
    Window { start: i64, width: i64 },
}

/// Grid-bucketed point index answering "all ids within R meters of C"
#[derive(Debug)]
pub struct SpatialIndex {
    rows: i32,
    cols: i32,
    lat_step: f64,
    lon_step: f64,
    entries: HashMap<SightingId, IndexEntry>,
    cells: HashMap<CellKey, SmallVec<[SightingId; 4]>>,
    total_insertions: u64,
    total_updates: u64,
    total_removals: u64,
    counters: QueryCounters,
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new(&IndexConfig::default())
    }
}

impl SpatialIndex {
    /// Creates an empty index.
    ///
    /// The configured cell size is rounded so the cells tile the globe
    /// exactly; a value that does not pass `SightingConfig::validate` is
    /// clamped to a single cell per hemisphere.
    pub fn new(config: &IndexConfig) -> Self {
        let cell = if config.cell_size_degrees.is_finite() && config.cell_size_degrees > 0.0 {
            config.cell_size_degrees.min(90.0)
        } else {
            90.0
        };
        let rows = (180.0 / cell).ceil().max(1.0) as i32;
        let cols = (360.0 / cell).ceil().max(1.0) as i32;

        Self {
            rows,
            cols,
            lat_step: 180.0 / rows as f64,
            lon_step: 360.0 / cols as f64,
            entries: HashMap::new(),
            cells: HashMap::new(),
            total_insertions: 0,
            total_updates: 0,
            total_removals: 0,
            counters: QueryCounters::default(),
        }
    }

    /// Inserts a new id.
    ///
    /// # Errors
    ///
    /// [`SightingError::DuplicateId`] if the id is already indexed.
    pub fn insert(&mut self, id: SightingId, point: Point) -> Result<()> {
        if self.entries.contains_key(&id) {
            error!("🔴 Spatial index already holds {}", id);
            return Err(SightingError::DuplicateId(id));
        }

        let cell = self.cell_of(&point);
        self.entries.insert(id, IndexEntry { point, cell });
        self.cells.entry(cell).or_default().push(id);
        self.total_insertions += 1;
        Ok(())
    }

    /// Moves an existing id to `point`.
    ///
    /// # Errors
    ///
    /// [`SightingError::NotFound`] if the id is not indexed.
    pub fn update(&mut self, id: SightingId, point: Point) -> Result<()> {
        let new_cell = self.cell_of(&point);
        let old_cell = match self.entries.get_mut(&id) {
            Some(entry) => {
                let old = entry.cell;
                entry.point = point;
                entry.cell = new_cell;
                old
            }
            None => return Err(SightingError::NotFound(id)),
        };

        if old_cell != new_cell {
            self.detach(id, old_cell);
            self.cells.entry(new_cell).or_default().push(id);
        }
        self.total_updates += 1;
        Ok(())
    }

    /// Removes an id.
    ///
    /// # Errors
    ///
    /// [`SightingError::NotFound`] if the id is not indexed.
    pub fn remove(&mut self, id: SightingId) -> Result<Point> {
        let entry = self.entries.remove(&id).ok_or(SightingError::NotFound(id))?;
        self.detach(id, entry.cell);
        self.total_removals += 1;
        Ok(entry.point)
    }

    /// Returns every id whose great-circle distance to `center` is at most
    /// `radius_meters`. A radius that is not positive and finite matches nothing.
    pub fn query(&self, center: &Point, radius_meters: f64) -> BTreeSet<SightingId> {
        let mut ids = BTreeSet::new();
        self.scan(center, radius_meters, |id, _, _| {
            ids.insert(id);
        });
        ids
    }

    /// Executes a filtered query; results are sorted nearest first.
    ///
    /// `filters.tags` is ignored here since the index does not know tags.
    pub fn query_with(&self, query: &SpatialQuery) -> Vec<QueryResult> {
        let filters = &query.filters;
        let mut results = Vec::new();

        self.scan(&query.center, query.radius_meters, |id, point, distance| {
            if let Some(exclude) = &filters.exclude_ids {
                if exclude.contains(&id) {
                    return;
                }
            }
            if let Some(min_distance) = filters.min_distance {
                if distance < min_distance {
                    return;
                }
            }
            results.push(QueryResult {
                id,
                location: *point,
                distance_meters: distance,
            });
        });

        results.sort_by(|a, b| {
            a.distance_meters
                .total_cmp(&b.distance_meters)
                .then(a.id.cmp(&b.id))
        });
        if let Some(max_results) = filters.max_results {
            results.truncate(max_results);
        }
        results
    }

    /// Current location of an id, if indexed.
    pub fn location(&self, id: SightingId) -> Option<Point> {
        self.entries.get(&id).map(|entry| entry.point)
    }

    /// Checks whether a given id is indexed
    pub fn contains(&self, id: SightingId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of indexed ids
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry; counters are kept.
    pub fn clear(&mut self) {
        self.total_removals += self.entries.len() as u64;
        self.entries.clear();
        self.cells.clear();
    }

    /// Gets performance statistics
    pub fn stats(&self) -> SpatialIndexStats {
        SpatialIndexStats {
            entries: self.entries.len(),
            occupied_cells: self.cells.len(),
            total_insertions: self.total_insertions,
            total_updates: self.total_updates,
            total_removals: self.total_removals,
            total_queries: self.counters.total_queries.load(Ordering::Relaxed),
            last_query_cells_visited: self.counters.last_cells_visited.load(Ordering::Relaxed),
            last_query_candidates: self.counters.last_candidates.load(Ordering::Relaxed),
            last_query_result_count: self.counters.last_result_count.load(Ordering::Relaxed),
        }
    }

    /// Brute-force reference query over every entry, used to cross-check the grid.
    pub fn query_linear(&self, center: &Point, radius_meters: f64) -> BTreeSet<SightingId> {
        if !(radius_meters.is_finite() && radius_meters > 0.0) {
            return BTreeSet::new();
        }
        self.entries
            .iter()
            .filter(|(_, entry)| geo::haversine_meters(center, &entry.point) <= radius_meters)
            .map(|(id, _)| *id)
            .collect()
    }

    fn scan<F>(&self, center: &Point, radius_meters: f64, mut visit: F)
    where
        F: FnMut(SightingId, &Point, f64),
    {
        self.counters.total_queries.fetch_add(1, Ordering::Relaxed);

        if !(radius_meters.is_finite() && radius_meters > 0.0) || self.entries.is_empty() {
            self.record_query(0, 0, 0);
            return;
        }

        let bounds = geo::cap_bounds(center, radius_meters);
        // One cell of padding on each side absorbs rounding at cell edges.
        let first_row = (self.row_of(bounds.min_lat) - 1).max(0);
        let last_row = (self.row_of(bounds.max_lat) + 1).min(self.rows - 1);
        let columns = match bounds.lon_half_width {
            None => ColumnSpan::All,
            Some(half_width) => {
                let start = self.raw_col(center.lon() - half_width) - 1;
                let end = self.raw_col(center.lon() + half_width) + 1;
                let width = end - start + 1;
                if width >= self.cols as i64 {
                    ColumnSpan::All
                } else {
                    ColumnSpan::Window { start, width }
                }
            }
        };

        let row_count = (last_row - first_row + 1) as usize;
        let col_count = match columns {
            ColumnSpan::All => self.cols as usize,
            ColumnSpan::Window { width, .. } => width as usize,
        };
        let window_cells = row_count.saturating_mul(col_count);

        let mut cells_visited = 0;
        let mut candidates = 0;
        let mut matches = 0;
        let mut check_bucket = |bucket: &SmallVec<[SightingId; 4]>| {
            for id in bucket {
                let Some(entry) = self.entries.get(id) else {
                    continue;
                };
                candidates += 1;
                let distance = geo::haversine_meters(center, &entry.point);
                if distance <= radius_meters {
                    matches += 1;
                    visit(*id, &entry.point, distance);
                }
            }
        };

        if window_cells > self.cells.len() {
            // Fewer occupied cells than the window covers: walk the occupied ones.
            for (key, bucket) in &self.cells {
                if key.row < first_row || key.row > last_row {
                    continue;
                }
                if let ColumnSpan::Window { start, width } = columns {
                    if (key.col as i64 - start).rem_euclid(self.cols as i64) >= width {
                        continue;
                    }
                }
                cells_visited += 1;
                check_bucket(bucket);
            }
        } else {
            for row in first_row..=last_row {
                for offset in 0..col_count as i64 {
                    let col = match columns {
                        ColumnSpan::All => offset,
                        ColumnSpan::Window { start, .. } => (start + offset).rem_euclid(self.cols as i64),
                    } as i32;
                    cells_visited += 1;
                    if let Some(bucket) = self.cells.get(&CellKey { row, col }) {
                        check_bucket(bucket);
                    }
                }
            }
        }

        self.record_query(cells_visited, candidates, matches);
    }

    fn record_query(&self, cells_visited: usize, candidates: usize, results: usize) {
        self.counters.last_cells_visited.store(cells_visited, Ordering::Relaxed);
        self.counters.last_candidates.store(candidates, Ordering::Relaxed);
        self.counters.last_result_count.store(results, Ordering::Relaxed);
    }

    fn detach(&mut self, id: SightingId, cell: CellKey) {
        if let Some(bucket) = self.cells.get_mut(&cell) {
            if let Some(pos) = bucket.iter().position(|candidate| *candidate == id) {
                bucket.swap_remove(pos);
            }
            if bucket.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }

    fn cell_of(&self, point: &Point) -> CellKey {
        CellKey {
            row: self.row_of(point.lat()),
            col: self.raw_col(point.lon()).rem_euclid(self.cols as i64) as i32,
        }
    }

    fn row_of(&self, lat: f64) -> i32 {
        let row = ((lat + 90.0) / self.lat_step).floor() as i64;
        row.clamp(0, self.rows as i64 - 1) as i32
    }

    /// Unwrapped column index; callers reduce it modulo `cols`.
    fn raw_col(&self, lon: f64) -> i64 {
        ((lon + 180.0) / self.lon_step).floor() as i64
    }
}
