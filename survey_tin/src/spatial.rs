//! Uniform grid bucketing for point and triangle lookups in the XY plane.

use crate::geometry::{BoundingBox, Point};
use std::collections::HashMap;

/// Grid of square cells mapping cell keys to item ids.
///
/// Items are either points (one cell each) or boxes (every overlapped cell).
/// Ids within a cell stay in insertion order.
#[derive(Debug, Clone)]
pub struct CellIndex {
    cell_size: f64,
    cells: HashMap<(i64, i64), Vec<usize>>,
    min_key: (i64, i64),
    max_key: (i64, i64),
}

impl CellIndex {
    /// Creates an empty index. Non-positive or non-finite sizes fall back to 1.
    pub fn new(cell_size: f64) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            1.0
        };
        Self {
            cell_size,
            cells: HashMap::new(),
            min_key: (i64::MAX, i64::MAX),
            max_key: (i64::MIN, i64::MIN),
        }
    }

    /// Creates an index sized so that `items` spread over `extent` land
    /// roughly one per cell.
    pub fn for_extent(extent: &BoundingBox, items: usize) -> Self {
        let span = extent.width().max(extent.height());
        let area = (extent.width() * extent.height()).max(span * span * 1e-6);
        let size = if items == 0 || area <= 0.0 {
            span
        } else {
            (area / items as f64).sqrt()
        };
        Self::new(size)
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    fn key(&self, p: Point) -> (i64, i64) {
        (
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
        )
    }

    fn grow(&mut self, key: (i64, i64)) {
        self.min_key.0 = self.min_key.0.min(key.0);
        self.min_key.1 = self.min_key.1.min(key.1);
        self.max_key.0 = self.max_key.0.max(key.0);
        self.max_key.1 = self.max_key.1.max(key.1);
    }

    /// Registers point `id` at `p`.
    pub fn insert(&mut self, id: usize, p: Point) {
        let key = self.key(p);
        self.grow(key);
        self.cells.entry(key).or_default().push(id);
    }

    /// Registers item `id` in every cell overlapped by `bbox`.
    pub fn insert_box(&mut self, id: usize, bbox: &BoundingBox) {
        let lo = self.key(Point::new(bbox.min_x, bbox.min_y));
        let hi = self.key(Point::new(bbox.max_x, bbox.max_y));
        self.grow(lo);
        self.grow(hi);
        for kx in lo.0..=hi.0 {
            for ky in lo.1..=hi.1 {
                self.cells.entry((kx, ky)).or_default().push(id);
            }
        }
    }

    /// Ids registered in the cell containing `p`.
    pub fn cell(&self, p: Point) -> &[usize] {
        self.cells
            .get(&self.key(p))
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    /// Chebyshev ring distance from `center` to the nearest occupied key
    /// and to the farthest one.
    fn ring_bounds(&self, center: (i64, i64)) -> Option<(i64, i64)> {
        if self.cells.is_empty() {
            return None;
        }
        let gap = |c: i64, lo: i64, hi: i64| {
            lo.saturating_sub(c).max(c.saturating_sub(hi)).max(0)
        };
        let reach = |c: i64, lo: i64, hi: i64| {
            c.saturating_sub(lo)
                .saturating_abs()
                .max(hi.saturating_sub(c).saturating_abs())
        };
        let start = gap(center.0, self.min_key.0, self.max_key.0)
            .max(gap(center.1, self.min_key.1, self.max_key.1));
        let end = reach(center.0, self.min_key.0, self.max_key.0)
            .max(reach(center.1, self.min_key.1, self.max_key.1));
        Some((start, end))
    }

    /// Keys on the square ring `r` around `center`, clipped to the occupied
    /// key range.
    fn ring_keys(&self, center: (i64, i64), r: i64) -> Vec<(i64, i64)> {
        let (lo, hi) = (self.min_key, self.max_key);
        if r == 0 {
            return vec![center];
        }
        let mut keys = Vec::new();
        let (left, right) = (center.0.saturating_sub(r), center.0.saturating_add(r));
        let (bottom, top) = (center.1.saturating_sub(r), center.1.saturating_add(r));
        for ky in [bottom, top] {
            if ky < lo.1 || ky > hi.1 {
                continue;
            }
            for kx in left.max(lo.0)..=right.min(hi.0) {
                keys.push((kx, ky));
            }
        }
        for kx in [left, right] {
            if kx < lo.0 || kx > hi.0 {
                continue;
            }
            for ky in bottom.saturating_add(1).max(lo.1)..=top.saturating_sub(1).min(hi.1) {
                keys.push((kx, ky));
            }
        }
        keys
    }

    /// Nearest registered point to `p`, as `(id, distance)`.
    ///
    /// `positions[id]` must hold the location each id was inserted with.
    /// Equidistant candidates resolve to the lowest id. `exclude` skips one
    /// id, which lets a point search for its nearest other point.
    pub fn nearest(
        &self,
        positions: &[Point],
        p: Point,
        exclude: Option<usize>,
    ) -> Option<(usize, f64)> {
        let center = self.key(p);
        let (mut r, limit) = self.ring_bounds(center)?;
        let mut best: Option<(usize, f64)> = None;
        loop {
            let ids = self
                .ring_keys(center, r)
                .into_iter()
                .filter_map(|k| self.cells.get(&k))
                .flatten();
            for &id in ids {
                if Some(id) == exclude {
                    continue;
                }
                let q = positions[id];
                let d2 = (q.x - p.x).powi(2) + (q.y - p.y).powi(2);
                best = match best {
                    Some((bid, bd2)) if bd2 < d2 || (bd2 == d2 && bid < id) => Some((bid, bd2)),
                    _ => Some((id, d2)),
                };
            }
            if let Some((_, bd2)) = best {
                // Every cell in ring r + 1 is at least r cells away from `p`.
                let reach = r as f64 * self.cell_size;
                if bd2 < reach * reach {
                    break;
                }
            }
            if r == limit {
                break;
            }
            r += 1;
        }
        best.map(|(id, d2)| (id, d2.sqrt()))
    }

    /// Ids of registered points within `radius` of `p` (inclusive), sorted.
    pub fn within(&self, positions: &[Point], p: Point, radius: f64) -> Vec<usize> {
        let lo = self.key(Point::new(p.x - radius, p.y - radius));
        let hi = self.key(Point::new(p.x + radius, p.y + radius));
        let lo = (lo.0.max(self.min_key.0), lo.1.max(self.min_key.1));
        let hi = (hi.0.min(self.max_key.0), hi.1.min(self.max_key.1));
        let r2 = radius * radius;
        let mut found = Vec::new();
        for kx in lo.0..=hi.0 {
            for ky in lo.1..=hi.1 {
                if let Some(ids) = self.cells.get(&(kx, ky)) {
                    for &id in ids {
                        let q = positions[id];
                        if (q.x - p.x).powi(2) + (q.y - p.y).powi(2) <= r2 {
                            found.push(id);
                        }
                    }
                }
            }
        }
        found.sort_unstable();
        found.dedup();
        found
    }
}

/// Builds a point index over `positions` with ids equal to slice indices.
pub fn index_points(positions: &[Point]) -> CellIndex {
    let mut index = match BoundingBox::from_points(positions) {
        Some(bbox) => CellIndex::for_extent(&bbox, positions.len()),
        None => CellIndex::new(1.0),
    };
    for (i, &p) in positions.iter().enumerate() {
        index.insert(i, p);
    }
    index
}
