//! Basic geometry primitives for surface modeling.

mod hull;

pub use hull::ConvexHull;

/// Tolerance used when two breakline and triangle endpoints are compared.
pub const COINCIDENT_TOLERANCE: f64 = 1e-6;

/// Slack allowed on barycentric weights so points on a triangle boundary
/// are not lost to rounding.
pub(crate) const BARYCENTRIC_EPS: f64 = 1e-9;

/// Representation of a 2D point.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Representation of a 3D point.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Projection onto the XY plane.
    pub fn xy(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Breakline: an ordered run of 3D vertices carrying a survey code.
///
/// A closed polyline has an implicit edge from the last vertex back to the
/// first one.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Polyline {
    pub vertices: Vec<Point3>,
    pub code: String,
    pub closed: bool,
}

impl Polyline {
    /// Creates an open polyline.
    pub fn new(vertices: Vec<Point3>, code: impl Into<String>) -> Self {
        Self {
            vertices,
            code: code.into(),
            closed: false,
        }
    }

    /// Creates a closed polyline.
    pub fn closed(vertices: Vec<Point3>, code: impl Into<String>) -> Self {
        Self {
            vertices,
            code: code.into(),
            closed: true,
        }
    }

    /// Returns the XY segments of the polyline, including the closing
    /// segment for closed polylines with more than two vertices.
    pub fn segments(&self) -> Vec<(Point, Point)> {
        let mut segs: Vec<(Point, Point)> = self
            .vertices
            .windows(2)
            .map(|pair| (pair[0].xy(), pair[1].xy()))
            .collect();
        if self.closed && self.vertices.len() > 2 {
            let first = self.vertices[0].xy();
            let last = self.vertices[self.vertices.len() - 1].xy();
            segs.push((last, first));
        }
        segs
    }
}

/// Calculates the Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
}

/// Calculates the area of a simple polygon using the shoelace formula.
pub fn polygon_area(vertices: &[Point]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..vertices.len() {
        let j = (i + 1) % vertices.len();
        sum += vertices[i].x * vertices[j].y - vertices[j].x * vertices[i].y;
    }
    sum.abs() * 0.5
}

/// Planimetric edge lengths `|ab|`, `|bc|`, `|ca|`.
pub fn edge_lengths(a: Point, b: Point, c: Point) -> [f64; 3] {
    [distance(a, b), distance(b, c), distance(c, a)]
}

/// Longest planimetric edge of a triangle.
pub fn longest_edge(a: Point, b: Point, c: Point) -> f64 {
    let [ab, bc, ca] = edge_lengths(a, b, c);
    ab.max(bc).max(ca)
}

/// Shape quality `4·√3·area / Σ edge²` of a triangle.
///
/// Equals 1 for an equilateral triangle and tends to 0 as the triangle
/// collapses. A triangle with zero perimeter scores 0.
pub fn triangle_quality(a: Point, b: Point, c: Point) -> f64 {
    let area = polygon_area(&[a, b, c]);
    let sum_sq: f64 = edge_lengths(a, b, c).iter().map(|e| e * e).sum();
    if sum_sq > 0.0 {
        4.0 * 3f64.sqrt() * area / sum_sq
    } else {
        0.0
    }
}

fn ccw(a: Point, b: Point, c: Point) -> bool {
    (c.y - a.y) * (b.x - a.x) > (b.y - a.y) * (c.x - a.x)
}

/// Orientation test for two segments `p1p2` and `p3p4`.
///
/// Returns `true` when each segment separates the endpoints of the other.
/// Collinear overlaps are not reported.
pub fn segments_intersect(p1: Point, p2: Point, p3: Point, p4: Point) -> bool {
    ccw(p1, p3, p4) != ccw(p2, p3, p4) && ccw(p1, p2, p3) != ccw(p1, p2, p4)
}

/// Returns `true` if `a` and `b` are within `tol` of each other.
pub fn points_coincident(a: Point, b: Point, tol: f64) -> bool {
    distance(a, b) < tol
}

/// Returns `true` if segment `p1p2` crosses segment `p3p4` anywhere other
/// than at a shared endpoint.
pub fn segments_cross(p1: Point, p2: Point, p3: Point, p4: Point) -> bool {
    if !segments_intersect(p1, p2, p3, p4) {
        return false;
    }
    let tol = COINCIDENT_TOLERANCE;
    !(points_coincident(p1, p3, tol)
        || points_coincident(p1, p4, tol)
        || points_coincident(p2, p3, tol)
        || points_coincident(p2, p4, tol))
}

/// Barycentric weights of `p` with respect to triangle `abc`.
///
/// Returns `None` for a degenerate triangle.
pub fn barycentric(p: Point, a: Point, b: Point, c: Point) -> Option<(f64, f64, f64)> {
    let det = (b.y - c.y) * (a.x - c.x) + (c.x - b.x) * (a.y - c.y);
    // `det` is twice the signed area, so compare against squared edge lengths.
    let scale = (a.x - c.x).powi(2)
        + (a.y - c.y).powi(2)
        + (b.x - c.x).powi(2)
        + (b.y - c.y).powi(2);
    if !(det.abs() > f64::EPSILON * scale) {
        return None;
    }
    let u = ((b.y - c.y) * (p.x - c.x) + (c.x - b.x) * (p.y - c.y)) / det;
    let v = ((c.y - a.y) * (p.x - c.x) + (a.x - c.x) * (p.y - c.y)) / det;
    let w = 1.0 - u - v;
    Some((u, v, w))
}

/// Returns `true` if all weights are non-negative within rounding slack.
pub fn weights_inside(weights: (f64, f64, f64)) -> bool {
    let (u, v, w) = weights;
    u >= -BARYCENTRIC_EPS && v >= -BARYCENTRIC_EPS && w >= -BARYCENTRIC_EPS
}

/// Inclusive point-in-triangle test. Degenerate triangles contain nothing.
pub fn point_in_triangle(p: Point, a: Point, b: Point, c: Point) -> bool {
    barycentric(p, a, b, c).map_or(false, weights_inside)
}

/// Axis-aligned bounding box in the XY plane.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Smallest box containing all `points`, or `None` for an empty slice.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = Self {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in &points[1..] {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Inclusive containment test with slack `tol`.
    pub fn contains(&self, p: Point, tol: f64) -> bool {
        p.x >= self.min_x - tol
            && p.x <= self.max_x + tol
            && p.y >= self.min_y - tol
            && p.y <= self.max_y + tol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polygon_area_square() {
        let square = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ];
        assert!((polygon_area(&square) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn quality_equilateral_is_one() {
        let s = 7.5;
        let a = Point::new(0.0, 0.0);
        let b = Point::new(s, 0.0);
        let c = Point::new(s / 2.0, s * 3f64.sqrt() / 2.0);
        assert!((triangle_quality(a, b, c) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn quality_degenerate_is_zero() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(1.0, 0.0);
        let c = Point::new(2.0, 0.0);
        assert!(triangle_quality(a, b, c).abs() < 1e-12);
        assert_eq!(triangle_quality(a, a, a), 0.0);
    }

    #[test]
    fn segment_crossing() {
        let p1 = Point::new(0.0, 0.0);
        let p2 = Point::new(10.0, 10.0);
        let p3 = Point::new(0.0, 10.0);
        let p4 = Point::new(10.0, 0.0);
        assert!(segments_intersect(p1, p2, p3, p4));
        assert!(segments_cross(p1, p2, p3, p4));

        let q1 = Point::new(0.0, 0.0);
        let q2 = Point::new(1.0, 0.0);
        let q3 = Point::new(0.0, 1.0);
        let q4 = Point::new(1.0, 1.0);
        assert!(!segments_intersect(q1, q2, q3, q4));
    }

    #[test]
    fn shared_endpoint_is_not_a_crossing() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(5.0, 5.0);
        let c = Point::new(5.0, 0.0);
        // Endpoints meet at `a` only.
        assert!(!segments_cross(a, b, a, c));
        assert!(points_coincident(a, Point::new(1e-7, 0.0), COINCIDENT_TOLERANCE));
    }

    #[test]
    fn point_in_triangle_boundary_inclusive() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        let c = Point::new(0.0, 10.0);
        assert!(point_in_triangle(Point::new(1.0, 1.0), a, b, c));
        assert!(point_in_triangle(Point::new(5.0, 0.0), a, b, c));
        assert!(point_in_triangle(Point::new(5.0, 5.0), a, b, c));
        assert!(point_in_triangle(a, a, b, c));
        assert!(!point_in_triangle(Point::new(6.0, 6.0), a, b, c));
        assert!(!point_in_triangle(Point::new(-0.1, 1.0), a, b, c));
    }

    #[test]
    fn degenerate_triangle_contains_nothing() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(1.0, 1.0);
        let c = Point::new(2.0, 2.0);
        assert!(!point_in_triangle(Point::new(1.0, 1.0), a, b, c));
        assert!(barycentric(Point::new(0.5, 0.5), a, b, c).is_none());
    }

    #[test]
    fn small_triangle_far_from_origin_is_not_degenerate() {
        let a = Point::new(1e6, 0.0);
        let b = Point::new(1e6 + 1e-5, 0.0);
        let c = Point::new(1e6, 1e-5);
        let (u, v, w) = barycentric(Point::new(1e6 + 2e-6, 2e-6), a, b, c).unwrap();
        assert!((u + v + w - 1.0).abs() < 1e-12);
        assert!(point_in_triangle(Point::new(1e6 + 2e-6, 2e-6), a, b, c));

        // Same sliver shape at survey scale stays degenerate.
        let (a, b, c) = (Point::new(0.0, 0.0), Point::new(1e6, 0.0), Point::new(2e6, 1e-10));
        assert!(barycentric(Point::new(5e5, 0.0), a, b, c).is_none());
    }

    #[test]
    fn closed_polyline_segments() {
        let verts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        let open = Polyline::new(verts.clone(), "bord");
        assert_eq!(open.segments().len(), 2);
        let closed = Polyline::closed(verts, "bord");
        assert_eq!(closed.segments().len(), 3);
    }

    #[test]
    fn bounding_box_of_points() {
        let pts = [Point::new(1.0, 5.0), Point::new(-2.0, 3.0), Point::new(4.0, -1.0)];
        let bbox = BoundingBox::from_points(&pts).unwrap();
        assert_eq!(bbox.min_x, -2.0);
        assert_eq!(bbox.max_y, 5.0);
        assert!((bbox.width() - 6.0).abs() < 1e-12);
        assert!(BoundingBox::from_points(&[]).is_none());
    }
}
