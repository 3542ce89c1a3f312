//! Densification of under-sampled surface regions.
//!
//! Triangles whose longest edge exceeds a spacing threshold are sampled on a
//! regular grid, the samples are given elevations by a scattered-data
//! interpolator built over the original points, and the result is appended
//! to the cloud as generated points.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::dtm::Tin;
use crate::error::SurfaceResult;
use crate::geometry::{
    longest_edge, point_in_triangle, BoundingBox, ConvexHull, Point, Point3, BARYCENTRIC_EPS,
};
use crate::interpolation::Interpolator;
use crate::point_cloud::{provenance, PointCloud, PointType};
use crate::settings::DensificationSettings;

/// Triangle of the TIN flagged as under-sampled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseRegion {
    pub bbox: BoundingBox,
    pub vertices: [Point3; 3],
}

impl SparseRegion {
    fn from_triangle(vertices: [Point3; 3]) -> Self {
        let xs = vertices.map(|v| v.x);
        let ys = vertices.map(|v| v.y);
        let bbox = BoundingBox {
            min_x: xs[0].min(xs[1]).min(xs[2]),
            min_y: ys[0].min(ys[1]).min(ys[2]),
            max_x: xs[0].max(xs[1]).max(xs[2]),
            max_y: ys[0].max(ys[1]).max(ys[2]),
        };
        Self { bbox, vertices }
    }

    /// Inclusive point-in-triangle test against the originating triangle.
    pub fn contains(&self, p: Point) -> bool {
        let [a, b, c] = self.vertices;
        point_in_triangle(p, a.xy(), b.xy(), c.xy())
    }

    /// X extent along the horizontal line at `y` of the triangle grown by
    /// the slack [`SparseRegion::contains`] allows.
    fn span_at(&self, y: f64) -> Option<(f64, f64)> {
        let [a, b, c] = self.vertices.map(|v| v.xy());
        let e = BARYCENTRIC_EPS;
        let grow = |p: Point, q: Point, r: Point| {
            Point::new(
                p.x * (1.0 + 2.0 * e) - e * (q.x + r.x),
                p.y * (1.0 + 2.0 * e) - e * (q.y + r.y),
            )
        };
        let v = [grow(a, b, c), grow(b, c, a), grow(c, a, b)];
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for i in 0..3 {
            let (a, b) = (v[i], v[(i + 1) % 3]);
            if (a.y - y) * (b.y - y) > 0.0 {
                continue;
            }
            if a.y == b.y {
                lo = lo.min(a.x.min(b.x));
                hi = hi.max(a.x.max(b.x));
            } else {
                let x = a.x + (y - a.y) / (b.y - a.y) * (b.x - a.x);
                lo = lo.min(x);
                hi = hi.max(x);
            }
        }
        (lo <= hi).then_some((lo, hi))
    }
}

/// Triangles of `tin` whose longest planimetric edge exceeds `threshold`, in
/// triangle order.
pub fn find_sparse_regions(tin: &Tin, threshold: f64) -> Vec<SparseRegion> {
    (0..tin.triangle_count())
        .map(|i| tin.triangle(i))
        .filter(|[a, b, c]| longest_edge(a.xy(), b.xy(), c.xy()) > threshold)
        .map(SparseRegion::from_triangle)
        .collect()
}

/// Cooperative stop signal for long densification runs.
///
/// Polled at the start of every grid row and every [`POLL_INTERVAL`] grid
/// cells; both a deadline and a shared flag may be set.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    deadline: Option<Instant>,
    flag: Option<Arc<AtomicBool>>,
}

impl Cancellation {
    /// Never cancels.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Cancels once `flag` is set to `true` by another thread.
    pub fn with_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.flag = Some(flag);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        if let Some(flag) = &self.flag {
            if flag.load(Ordering::Relaxed) {
                return true;
            }
        }
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }
}

/// Grid cells examined between two cancellation polls.
pub const POLL_INTERVAL: usize = 1024;

/// Hard ceiling on grid cells examined during one densification run.
pub const MAX_GRID_VISITS: usize = 1 << 26;

enum Stop {
    Limit,
    Exhausted,
    Cancelled,
}

/// Uniform grid sampler restricted to a region's triangle and, when
/// available, to the convex hull of the survey.
#[derive(Debug, Clone, Copy)]
pub struct GridSampler<'a> {
    spacing: f64,
    hull: Option<&'a ConvexHull>,
    max_visits: usize,
}

impl<'a> GridSampler<'a> {
    /// `hull == None` accepts every candidate inside the triangle.
    pub fn new(spacing: f64, hull: Option<&'a ConvexHull>) -> Self {
        Self {
            spacing,
            hull,
            max_visits: MAX_GRID_VISITS,
        }
    }

    /// Grid points of `region` that pass the triangle and hull filters, rows
    /// of increasing y with x increasing inside each row.
    pub fn sample(&self, region: &SparseRegion) -> Vec<Point> {
        let mut out = Vec::new();
        let mut visits = 0;
        let _ = self.fill(region, &mut out, usize::MAX, &mut visits, &Cancellation::none());
        out
    }

    /// Number of grid lines `min + i * spacing` strictly below `max`, or zero
    /// when the interval is narrower than one step.
    fn steps(&self, min: f64, max: f64) -> usize {
        if !(self.spacing > 0.0) || !(max - min >= self.spacing) {
            return 0;
        }
        let at = |i: usize| min + i as f64 * self.spacing;
        let mut n = ((max - min) / self.spacing).ceil() as usize;
        while n > 0 && at(n - 1) >= max {
            n -= 1;
        }
        while at(n) < max {
            n += 1;
        }
        n
    }

    fn fill(
        &self,
        region: &SparseRegion,
        out: &mut Vec<Point>,
        limit: usize,
        visits: &mut usize,
        cancel: &Cancellation,
    ) -> ControlFlow<Stop> {
        let (min_x, min_y) = (region.bbox.min_x, region.bbox.min_y);
        let nx = self.steps(min_x, region.bbox.max_x);
        let ny = self.steps(min_y, region.bbox.max_y);
        if nx == 0 {
            return ControlFlow::Continue(());
        }
        for j in 0..ny {
            if cancel.is_cancelled() {
                return ControlFlow::Break(Stop::Cancelled);
            }
            let y = min_y + j as f64 * self.spacing;
            let Some((lo, hi)) = region.span_at(y) else {
                continue;
            };
            // One column of slack each side for rounding.
            let first = (((lo - min_x) / self.spacing).floor() as usize).saturating_sub(1);
            let last = (((hi - min_x) / self.spacing).ceil() as usize)
                .saturating_add(2)
                .min(nx);
            for i in first..last {
                *visits += 1;
                if *visits > self.max_visits {
                    return ControlFlow::Break(Stop::Exhausted);
                }
                if *visits % POLL_INTERVAL == 0 && cancel.is_cancelled() {
                    return ControlFlow::Break(Stop::Cancelled);
                }
                let p = Point::new(min_x + i as f64 * self.spacing, y);
                if !region.contains(p) {
                    continue;
                }
                if let Some(hull) = self.hull {
                    if !hull.contains(p) {
                        continue;
                    }
                }
                out.push(p);
                if out.len() >= limit {
                    return ControlFlow::Break(Stop::Limit);
                }
            }
        }
        ControlFlow::Continue(())
    }
}

/// Outcome record of a densification run.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DensificationStats {
    pub original_points: usize,
    pub generated_points: usize,
    pub sparse_regions_found: usize,
    /// Candidates handed to the interpolator, after the point cap.
    pub candidate_points: usize,
    /// Candidates dropped because the interpolator was undefined there.
    pub discarded_points: usize,
    pub limited_by_max: bool,
    /// The survey hull could not be built and was not used as a filter.
    pub hull_fallback: bool,
    pub skipped: bool,
    pub reason: Option<String>,
}

/// Densifies `cloud` in the sparse regions of `tin`.
///
/// See [`densify_with`].
pub fn densify(
    cloud: &PointCloud,
    tin: &Tin,
    settings: &DensificationSettings,
) -> SurfaceResult<(PointCloud, DensificationStats)> {
    densify_with(cloud, tin, settings, &Cancellation::none())
}

/// Densifies `cloud` in the sparse regions of `tin`, honoring `cancel`.
///
/// Returns an error only for invalid settings. Disabled densification, too
/// few points, missing sparse regions, a failed interpolator or
/// cancellation all return the input cloud (or the cloud plus whatever could
/// be generated) with the outcome described in the statistics.
pub fn densify_with(
    cloud: &PointCloud,
    tin: &Tin,
    settings: &DensificationSettings,
    cancel: &Cancellation,
) -> SurfaceResult<(PointCloud, DensificationStats)> {
    let mut stats = DensificationStats {
        original_points: cloud.count(),
        ..DensificationStats::default()
    };
    if !settings.enabled {
        stats.skipped = true;
        return Ok((cloud.clone(), stats));
    }
    settings.validate()?;
    if cloud.count() < 3 {
        stats.skipped = true;
        stats.reason = Some("Insufficient points (need at least 3)".to_string());
        return Ok((cloud.clone(), stats));
    }

    let regions = find_sparse_regions(tin, settings.min_spacing_threshold);
    stats.sparse_regions_found = regions.len();
    log::debug!(
        "{} sparse regions above {}",
        regions.len(),
        settings.min_spacing_threshold
    );
    if regions.is_empty() {
        return Ok((cloud.clone(), stats));
    }

    let hull = ConvexHull::from_points(&cloud.xy());
    if hull.is_none() {
        log::warn!("convex hull of survey points is degenerate, hull filter disabled");
        stats.hull_fallback = true;
    }
    let sampler = GridSampler::new(settings.grid_spacing, hull.as_ref());
    let max_points = usize::try_from(settings.max_points).unwrap_or(usize::MAX);
    let limit = max_points.saturating_add(1);

    let mut candidates = Vec::new();
    let mut visits = 0;
    for region in &regions {
        match sampler.fill(region, &mut candidates, limit, &mut visits, cancel) {
            ControlFlow::Continue(()) => {}
            ControlFlow::Break(Stop::Limit) => break,
            ControlFlow::Break(Stop::Exhausted) => {
                log::warn!(
                    "grid generation stopped after {} cells with {} candidates",
                    MAX_GRID_VISITS,
                    candidates.len()
                );
                stats.limited_by_max = true;
                break;
            }
            ControlFlow::Break(Stop::Cancelled) => {
                log::warn!("densification cancelled after {} candidates", candidates.len());
                stats.skipped = true;
                stats.reason = Some("cancelled".to_string());
                return Ok((cloud.clone(), stats));
            }
        }
    }
    if candidates.len() > max_points {
        candidates.truncate(max_points);
        stats.limited_by_max = true;
    }
    stats.candidate_points = candidates.len();
    if candidates.is_empty() {
        return Ok((cloud.clone(), stats));
    }

    let method = settings.interpolation_method;
    let generated: Vec<(Point3, _)> = match Interpolator::from_cloud(method, cloud) {
        Some(interp) => candidates
            .iter()
            .filter_map(|p| {
                let z = interp.evaluate(p.x, p.y).filter(|z| z.is_finite())?;
                let mut meta = provenance(PointType::Generated);
                meta.insert("method".to_string(), Value::from(method.as_str()));
                meta.insert("grid_spacing".to_string(), Value::from(settings.grid_spacing));
                Some((Point3::new(p.x, p.y, z), meta))
            })
            .collect(),
        None => Vec::new(),
    };
    stats.generated_points = generated.len();
    stats.discarded_points = candidates.len() - generated.len();
    log::info!(
        "densified {} regions: {} candidates, {} generated, {} discarded{}",
        regions.len(),
        stats.candidate_points,
        stats.generated_points,
        stats.discarded_points,
        if stats.limited_by_max { " (capped)" } else { "" }
    );
    let mut attributes = cloud.attributes().clone();
    if !generated.is_empty() {
        attributes.insert("densified".to_string(), Value::Bool(true));
    }
    Ok((cloud.extended(generated).with_attributes(attributes), stats))
}
