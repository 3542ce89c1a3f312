use crate::geometry::{
    longest_edge, points_coincident, segments_cross, triangle_quality, Point, Point3, Polyline,
    COINCIDENT_TOLERANCE,
};
use crate::error::SurfaceResult;
use crate::point_cloud::PointCloud;
use crate::settings::TinSettings;
use serde::{Deserialize, Serialize};

/// How breaklines are honored when building a TIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreaklineMode {
    /// Delaunay triangles crossing a breakline are discarded. Can leave
    /// holes next to the constraint.
    #[default]
    Reject,
    /// Breakline segments are inserted as forced edges of a constrained
    /// Delaunay triangulation.
    Constrained,
}

/// Triangulated Irregular Network constructed from 3D points.
///
/// Triangles index into `vertices`. A TIN never changes after it has been
/// built; all filtering happens in [`TinBuilder::build`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tin {
    vertices: Vec<Point3>,
    triangles: Vec<[usize; 3]>,
    quality: f64,
    breaklines: Vec<Polyline>,
}

impl Tin {
    /// TIN without triangles over `vertices`.
    pub fn empty(vertices: Vec<Point3>) -> Self {
        Self {
            vertices,
            triangles: Vec::new(),
            quality: 0.0,
            breaklines: Vec::new(),
        }
    }

    /// Builds an unconstrained TIN from the provided vertices using Delaunay
    /// triangulation on the XY plane.
    pub fn from_points(points: Vec<Point3>) -> Self {
        TinBuilder::new().build(&points, &[])
    }

    /// Vertices of the TIN.
    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    /// Indices into `vertices` forming triangles.
    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    /// Mean shape quality of all triangles, 0 when there are none.
    pub fn quality(&self) -> f64 {
        self.quality
    }

    /// Breaklines the TIN was built with.
    pub fn breaklines(&self) -> &[Polyline] {
        &self.breaklines
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Corner coordinates of triangle `index`.
    pub fn triangle(&self, index: usize) -> [Point3; 3] {
        let t = self.triangles[index];
        [self.vertices[t[0]], self.vertices[t[1]], self.vertices[t[2]]]
    }

    /// Unique undirected edges as sorted `(low, high)` index pairs.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        let mut edges: Vec<(usize, usize)> = self
            .triangles
            .iter()
            .flat_map(|t| [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])])
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect();
        edges.sort_unstable();
        edges.dedup();
        edges
    }

    /// Shape quality of every triangle, in triangle order.
    pub fn triangle_qualities(&self) -> Vec<f64> {
        (0..self.triangles.len())
            .map(|i| {
                let [a, b, c] = self.triangle(i);
                triangle_quality(a.xy(), b.xy(), c.xy())
            })
            .collect()
    }
}

fn mean_quality(vertices: &[Point3], triangles: &[[usize; 3]]) -> f64 {
    if triangles.is_empty() {
        return 0.0;
    }
    let sum: f64 = triangles
        .iter()
        .map(|t| {
            triangle_quality(
                vertices[t[0]].xy(),
                vertices[t[1]].xy(),
                vertices[t[2]].xy(),
            )
        })
        .sum();
    sum / triangles.len() as f64
}

fn delaunay(vertices: &[Point3]) -> Vec<[usize; 3]> {
    let coords: Vec<delaunator::Point> = vertices
        .iter()
        .map(|p| delaunator::Point { x: p.x, y: p.y })
        .collect();
    let triangulation = delaunator::triangulate(&coords);
    triangulation
        .triangles
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect()
}

fn crosses_breaklines(corners: [Point; 3], segments: &[(Point, Point)]) -> bool {
    let edges = [
        (corners[0], corners[1]),
        (corners[1], corners[2]),
        (corners[2], corners[0]),
    ];
    edges.iter().any(|&(a, b)| {
        segments.iter().any(|&(s, e)| {
            // Cheap reject before the orientation tests.
            if a.x.max(b.x) < s.x.min(e.x)
                || a.x.min(b.x) > s.x.max(e.x)
                || a.y.max(b.y) < s.y.min(e.y)
                || a.y.min(b.y) > s.y.max(e.y)
            {
                return false;
            }
            segments_cross(a, b, s, e)
        })
    })
}

fn point_on_segment(a: Point, b: Point, p: Point, tol: f64) -> bool {
    let abx = b.x - a.x;
    let aby = b.y - a.y;
    let apx = p.x - a.x;
    let apy = p.y - a.y;
    let len2 = abx * abx + aby * aby;
    if len2 <= f64::EPSILON {
        return false;
    }
    let cross = abx * apy - aby * apx;
    if cross.abs() > tol * len2.sqrt() {
        return false;
    }
    let dot = (apx * abx + apy * aby) / len2;
    dot > 0.0 && dot < 1.0
}

/// Splits constraint edges at every vertex lying on them so that no vertex
/// sits in the interior of a forced edge.
fn refine_edges_for_points(points: &[Point3], edges: &[(usize, usize)]) -> Vec<(usize, usize)> {
    let mut refined = Vec::new();
    for &(a, b) in edges {
        let pa = points[a].xy();
        let pb = points[b].xy();
        let mut mids: Vec<(usize, f64)> = Vec::new();
        for (i, p) in points.iter().enumerate() {
            if i == a || i == b {
                continue;
            }
            if point_on_segment(pa, pb, p.xy(), COINCIDENT_TOLERANCE) {
                let t = (p.x - pa.x).hypot(p.y - pa.y);
                mids.push((i, t));
            }
        }
        mids.sort_by(|x, y| x.1.total_cmp(&y.1));
        let mut last = a;
        for (idx, _) in mids {
            refined.push((last, idx));
            last = idx;
        }
        refined.push((last, b));
    }
    for e in refined.iter_mut() {
        *e = (e.0.min(e.1), e.0.max(e.1));
    }
    refined.retain(|e| e.0 != e.1);
    refined.sort_unstable();
    refined.dedup();
    refined
}

/// Constructs TINs from survey points, honoring breaklines and an optional
/// maximum edge length.
#[derive(Debug, Clone, Default)]
pub struct TinBuilder {
    max_edge_length: Option<f64>,
    mode: BreaklineMode,
}

impl TinBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Triangles with a planimetric edge longer than `limit` are dropped.
    pub fn with_max_edge_length(mut self, limit: Option<f64>) -> Self {
        self.max_edge_length = limit;
        self
    }

    pub fn with_breakline_mode(mut self, mode: BreaklineMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builds a TIN over the points of `cloud`.
    pub fn build_cloud(&self, cloud: &PointCloud, breaklines: &[Polyline]) -> Tin {
        self.build(cloud.points(), breaklines)
    }

    /// Builds a TIN using Delaunay triangulation on the XY plane.
    ///
    /// Fewer than three points, non-finite coordinates or fully collinear
    /// input produce a TIN without triangles instead of an error.
    pub fn build(&self, points: &[Point3], breaklines: &[Polyline]) -> Tin {
        if points.len() < 3 {
            log::debug!("{} points, skipping triangulation", points.len());
            return Tin::empty(points.to_vec());
        }
        if points.iter().any(|p| !p.is_finite()) {
            log::warn!("non-finite coordinates in input, returning empty TIN");
            return Tin::empty(points.to_vec());
        }

        let (vertices, mut triangles) = match self.mode {
            BreaklineMode::Constrained if !breaklines.is_empty() => {
                match constrained(points, breaklines) {
                    Some(res) => res,
                    None => (points.to_vec(), self.rejected(points, breaklines)),
                }
            }
            _ => (points.to_vec(), self.rejected(points, breaklines)),
        };

        if let Some(limit) = self.max_edge_length {
            let before = triangles.len();
            triangles.retain(|t| {
                longest_edge(
                    vertices[t[0]].xy(),
                    vertices[t[1]].xy(),
                    vertices[t[2]].xy(),
                ) <= limit
            });
            log::debug!(
                "edge length filter {limit} removed {} triangles",
                before - triangles.len()
            );
        }

        let quality = mean_quality(&vertices, &triangles);
        log::info!(
            "TIN built: {} vertices, {} triangles, {} breaklines, quality {:.3}",
            vertices.len(),
            triangles.len(),
            breaklines.len(),
            quality
        );
        Tin {
            vertices,
            triangles,
            quality,
            breaklines: breaklines.to_vec(),
        }
    }

    /// Delaunay triangles with every breakline-crossing triangle removed.
    fn rejected(&self, points: &[Point3], breaklines: &[Polyline]) -> Vec<[usize; 3]> {
        let mut triangles = delaunay(points);
        if triangles.is_empty() {
            log::warn!("degenerate point set, triangulation produced no triangles");
            return triangles;
        }
        let segments: Vec<(Point, Point)> = breaklines.iter().flat_map(|b| b.segments()).collect();
        if !segments.is_empty() {
            let before = triangles.len();
            triangles.retain(|t| {
                let corners = [points[t[0]].xy(), points[t[1]].xy(), points[t[2]].xy()];
                !crosses_breaklines(corners, &segments)
            });
            log::debug!(
                "{} breakline segments removed {} triangles",
                segments.len(),
                before - triangles.len()
            );
        }
        triangles
    }
}

/// Constrained Delaunay triangulation with breakline segments as forced
/// edges. Breakline vertices without a matching survey point are appended to
/// the vertex list. Returns `None` if the triangulator rejects the input.
fn constrained(points: &[Point3], breaklines: &[Polyline]) -> Option<(Vec<Point3>, Vec<[usize; 3]>)> {
    let mut vertices = points.to_vec();
    let mut edges: Vec<(usize, usize)> = Vec::new();
    for line in breaklines {
        let mut ids = Vec::with_capacity(line.vertices.len());
        for v in &line.vertices {
            let found = vertices
                .iter()
                .position(|p| points_coincident(p.xy(), v.xy(), COINCIDENT_TOLERANCE));
            let id = match found {
                Some(id) => id,
                None => {
                    vertices.push(*v);
                    vertices.len() - 1
                }
            };
            ids.push(id);
        }
        for w in ids.windows(2) {
            edges.push((w[0], w[1]));
        }
        if line.closed && ids.len() > 2 {
            edges.push((ids[ids.len() - 1], ids[0]));
        }
    }
    let edges = refine_edges_for_points(&vertices, &edges);
    let coords: Vec<(f64, f64)> = vertices.iter().map(|p| (p.x, p.y)).collect();
    match cdt::triangulate_with_edges(&coords, &edges) {
        Ok(tris) => {
            let triangles = tris.into_iter().map(|t| [t.0, t.1, t.2]).collect();
            Some((vertices, triangles))
        }
        Err(e) => {
            log::warn!("constrained triangulation failed ({e:?}), falling back to triangle rejection");
            None
        }
    }
}

/// Outcome record of [`build_surface`].
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TinStats {
    pub skipped: bool,
    pub triangle_count: usize,
    pub breakline_count: usize,
    pub quality: f64,
    pub points_used: usize,
    pub error: Option<String>,
}

/// Builds the surface for `cloud` according to `settings`, reporting what
/// happened alongside the TIN.
///
/// Only invalid settings are errors; unusable input data is reported through
/// [`TinStats`].
pub fn build_surface(
    cloud: &PointCloud,
    breaklines: &[Polyline],
    settings: &TinSettings,
) -> SurfaceResult<(Tin, TinStats)> {
    let mut stats = TinStats::default();
    if !settings.enabled {
        stats.skipped = true;
        return Ok((Tin::empty(Vec::new()), stats));
    }
    settings.validate()?;
    if cloud.count() < 3 {
        stats.skipped = true;
        stats.error = Some("Insufficient points (need at least 3)".to_string());
        return Ok((Tin::empty(cloud.points().to_vec()), stats));
    }

    let used: &[Polyline] = if settings.use_breaklines {
        breaklines
    } else {
        &[]
    };
    let tin = TinBuilder::new()
        .with_max_edge_length(settings.max_edge_length)
        .with_breakline_mode(settings.breakline_mode)
        .build_cloud(cloud, used);

    stats.points_used = cloud.count();
    stats.breakline_count = used.len();
    stats.triangle_count = tin.triangle_count();
    stats.quality = tin.quality();
    if tin.is_empty() {
        stats.error = Some("Triangulation produced no triangles".to_string());
    }
    Ok((tin, stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Point3> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 1.0),
            Point3::new(0.0, 10.0, 1.0),
            Point3::new(10.0, 10.0, 2.0),
        ]
    }

    #[test]
    fn tin_from_square() {
        let tin = Tin::from_points(square());
        assert_eq!(tin.triangle_count(), 2);
        assert_eq!(tin.edges().len(), 5);
        assert!(tin.quality() > 0.0 && tin.quality() <= 1.0);
    }

    #[test]
    fn fewer_than_three_points_is_empty() {
        let tin = Tin::from_points(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)]);
        assert!(tin.is_empty());
        assert_eq!(tin.quality(), 0.0);
        assert_eq!(tin.vertices().len(), 2);
    }

    #[test]
    fn collinear_points_are_empty() {
        let pts = (0..5).map(|i| Point3::new(i as f64, 2.0 * i as f64, 0.0)).collect();
        let tin = Tin::from_points(pts);
        assert!(tin.is_empty());
        assert_eq!(tin.quality(), 0.0);
    }

    #[test]
    fn non_finite_points_are_empty() {
        let mut pts = square();
        pts.push(Point3::new(f64::NAN, 1.0, 1.0));
        let tin = Tin::from_points(pts);
        assert!(tin.is_empty());
    }

    #[test]
    fn single_equilateral_triangle_quality() {
        let s = 4.0;
        let pts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(s, 0.0, 0.0),
            Point3::new(s / 2.0, s * 3f64.sqrt() / 2.0, 0.0),
        ];
        let tin = Tin::from_points(pts);
        assert_eq!(tin.triangle_count(), 1);
        assert!((tin.quality() - 1.0).abs() < 1e-9);
        assert!((tin.triangle_qualities()[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn max_edge_length_filters_all() {
        let tin = TinBuilder::new()
            .with_max_edge_length(Some(5.0))
            .build(&square(), &[]);
        assert!(tin.is_empty());
        assert_eq!(tin.quality(), 0.0);
    }

    #[test]
    fn diagonal_breakline_rejects_crossing_triangles() {
        let pts = square();
        let plain = Tin::from_points(pts.clone());
        // Cross both possible diagonals with a segment through the centre
        // that touches no vertex.
        let bl = Polyline::new(
            vec![Point3::new(2.0, 5.0, 0.0), Point3::new(8.0, 5.5, 0.0)],
            "bpl",
        );
        let tin = TinBuilder::new().build(&pts, &[bl]);
        assert_eq!(plain.triangle_count(), 2);
        assert!(tin.is_empty());
        assert_eq!(tin.breaklines().len(), 1);
    }

    #[test]
    fn refine_splits_at_collinear_vertex() {
        let pts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        let edges = refine_edges_for_points(&pts, &[(0, 1)]);
        assert_eq!(edges, vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn constrained_mode_keeps_breakline_edge() {
        let pts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(10.0, 10.0, 0.0),
            Point3::new(0.0, 10.0, 0.0),
            Point3::new(5.0, 4.0, 0.0),
        ];
        let bl = Polyline::new(
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 0.0)],
            "bpl",
        );
        let tin = TinBuilder::new()
            .with_breakline_mode(BreaklineMode::Constrained)
            .build(&pts, &[bl]);
        assert!(tin
            .triangles()
            .iter()
            .any(|t| t.contains(&0) && t.contains(&2)));
        assert_eq!(tin.vertices().len(), 5);
    }

    #[test]
    fn surface_service_reports_stats() {
        let cloud = PointCloud::from_points(square());
        let (tin, stats) = build_surface(&cloud, &[], &TinSettings::default()).unwrap();
        assert!(!stats.skipped);
        assert_eq!(stats.triangle_count, tin.triangle_count());
        assert_eq!(stats.points_used, 4);
        assert!((stats.quality - tin.quality()).abs() < 1e-12);

        let disabled = TinSettings {
            enabled: false,
            ..TinSettings::default()
        };
        let (tin, stats) = build_surface(&cloud, &[], &disabled).unwrap();
        assert!(stats.skipped);
        assert!(tin.is_empty());

        let small = PointCloud::from_points(square()[..2].to_vec());
        let (_, stats) = build_surface(&small, &[], &TinSettings::default()).unwrap();
        assert!(stats.skipped);
        assert_eq!(stats.error.as_deref(), Some("Insufficient points (need at least 3)"));

        let invalid = TinSettings {
            max_edge_length: Some(-2.0),
            ..TinSettings::default()
        };
        assert!(build_surface(&cloud, &[], &invalid).is_err());
    }
}
