//! Scattered-data elevation interpolation.
//!
//! Three strategies are offered behind the single [`Interpolator::evaluate`]
//! capability: piecewise-linear and Clough–Tocher cubic over a Delaunay
//! triangulation of the input, and nearest neighbour.

use std::fmt;
use std::str::FromStr;

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};

use crate::error::SurfaceError;
use crate::geometry::{barycentric, weights_inside, BoundingBox, Point, Point3};
use crate::point_cloud::PointCloud;
use crate::spatial::{index_points, CellIndex};

/// Elevation estimation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    #[default]
    Linear,
    Cubic,
    Nearest,
}

impl InterpolationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Cubic => "cubic",
            Self::Nearest => "nearest",
        }
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterpolationMethod {
    type Err = SurfaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "cubic" => Ok(Self::Cubic),
            "nearest" => Ok(Self::Nearest),
            _ => Err(SurfaceError::UnknownInterpolationMethod(s.to_string())),
        }
    }
}

/// Delaunay triangulation of the data sites with a bucket grid over the
/// triangle bounding boxes for point location.
#[derive(Debug, Clone)]
struct TriangleMesh {
    sites: Vec<Point>,
    values: Vec<f64>,
    triangles: Vec<[usize; 3]>,
    index: CellIndex,
}

impl TriangleMesh {
    fn new(points: &[Point3]) -> Option<Self> {
        let finite: Vec<&Point3> = points.iter().filter(|p| p.is_finite()).collect();
        if finite.len() < 3 {
            return None;
        }
        let sites: Vec<Point> = finite.iter().map(|p| p.xy()).collect();
        let values: Vec<f64> = finite.iter().map(|p| p.z).collect();

        let coords: Vec<delaunator::Point> = sites
            .iter()
            .map(|p| delaunator::Point { x: p.x, y: p.y })
            .collect();
        let triangles: Vec<[usize; 3]> = delaunator::triangulate(&coords)
            .triangles
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        if triangles.is_empty() {
            return None;
        }

        let extent = BoundingBox::from_points(&sites)?;
        let mut index = CellIndex::for_extent(&extent, triangles.len());
        for (id, t) in triangles.iter().enumerate() {
            if let Some(bbox) = BoundingBox::from_points(&[sites[t[0]], sites[t[1]], sites[t[2]]]) {
                index.insert_box(id, &bbox);
            }
        }
        Some(Self {
            sites,
            values,
            triangles,
            index,
        })
    }

    /// Containing triangle of `p` and the barycentric weights of its corners.
    /// The lowest-numbered triangle wins on shared edges.
    fn locate(&self, p: Point) -> Option<(usize, [f64; 3])> {
        if !p.is_finite() {
            return None;
        }
        self.index.cell(p).iter().find_map(|&id| {
            let t = self.triangles[id];
            let w = barycentric(p, self.sites[t[0]], self.sites[t[1]], self.sites[t[2]])?;
            weights_inside(w).then_some((id, [w.0, w.1, w.2]))
        })
    }

    fn site(&self, i: usize) -> Vector2<f64> {
        Vector2::new(self.sites[i].x, self.sites[i].y)
    }
}

/// Piecewise-linear interpolation over the triangulation.
#[derive(Debug, Clone)]
pub struct LinearInterpolator {
    mesh: TriangleMesh,
}

impl LinearInterpolator {
    pub fn new(points: &[Point3]) -> Option<Self> {
        TriangleMesh::new(points).map(|mesh| Self { mesh })
    }

    pub fn evaluate(&self, x: f64, y: f64) -> Option<f64> {
        let (t, w) = self.mesh.locate(Point::new(x, y))?;
        let tri = self.mesh.triangles[t];
        Some(
            w[0] * self.mesh.values[tri[0]]
                + w[1] * self.mesh.values[tri[1]]
                + w[2] * self.mesh.values[tri[2]],
        )
    }
}

/// Gradient of the plane through three sites, with the triangle area.
fn plane_gradient(p: [Vector2<f64>; 3], f: [f64; 3]) -> Option<(Vector2<f64>, f64)> {
    let d1 = p[1] - p[0];
    let d2 = p[2] - p[0];
    let det = d1.x * d2.y - d2.x * d1.y;
    if det.abs() <= f64::EPSILON * (d1.norm_squared() + d2.norm_squared()) {
        return None;
    }
    let df1 = f[1] - f[0];
    let df2 = f[2] - f[0];
    let g = Vector2::new((df1 * d2.y - df2 * d1.y) / det, (d1.x * df2 - d2.x * df1) / det);
    Some((g, det.abs() / 2.0))
}

/// C¹ piecewise-cubic interpolation on the Clough–Tocher split of each
/// triangle, with vertex gradients estimated from the surrounding data.
#[derive(Debug, Clone)]
pub struct CloughTocher {
    mesh: TriangleMesh,
    gradients: Vec<Vector2<f64>>,
}

impl CloughTocher {
    pub fn new(points: &[Point3]) -> Option<Self> {
        let mesh = TriangleMesh::new(points)?;
        let gradients = estimate_gradients(&mesh);
        Some(Self { mesh, gradients })
    }

    pub fn evaluate(&self, x: f64, y: f64) -> Option<f64> {
        let (t, w) = self.mesh.locate(Point::new(x, y))?;
        Some(self.evaluate_in(t, w))
    }

    fn evaluate_in(&self, t: usize, l: [f64; 3]) -> f64 {
        let tri = self.mesh.triangles[t];
        let p = tri.map(|v| self.mesh.site(v));
        let f = tri.map(|v| self.mesh.values[v]);
        let g = tri.map(|v| self.gradients[v]);
        let centroid = (p[0] + p[1] + p[2]) / 3.0;

        // Bezier ordinates on the outer edges and on the spokes to the
        // centroid, taken from the vertex tangent planes.
        let edge = |n: usize, m: usize| f[n] + g[n].dot(&(p[m] - p[n])) / 3.0;
        let spoke: [f64; 3] = std::array::from_fn(|n| f[n] + g[n].dot(&(centroid - p[n])) / 3.0);

        // Inner ordinate next to edge (n, m), chosen so the cross-edge
        // derivative varies linearly along the edge.
        let inner = |n: usize, m: usize| {
            let enm = edge(n, m);
            let emn = edge(m, n);
            let d0 = spoke[n] - (f[n] + enm) / 2.0;
            let d2 = spoke[m] - (emn + f[m]) / 2.0;
            let e0 = enm - f[n];
            let e1 = emn - enm;
            let e2 = f[m] - emn;
            let dir = p[m] - p[n];
            let midpoint = (p[n] + p[m]) / 2.0;
            let lambda = (centroid - midpoint).dot(&dir) / dir.norm_squared();
            (enm + emn) / 2.0 + (d0 + d2) / 2.0 + lambda * (e1 - (e0 + e2) / 2.0)
        };
        let mids: [f64; 3] = std::array::from_fn(|n| inner(n, (n + 1) % 3));
        let near_centroid: [f64; 3] =
            std::array::from_fn(|n| (mids[n] + mids[(n + 2) % 3] + spoke[n]) / 3.0);
        let center = (near_centroid[0] + near_centroid[1] + near_centroid[2]) / 3.0;

        // Sub-triangle (i, j, centroid) lies opposite the smallest weight.
        let mut k = 0;
        for n in 1..3 {
            if l[n] < l[k] {
                k = n;
            }
        }
        let i = (k + 1) % 3;
        let j = (k + 2) % 3;
        let a = l[i] - l[k];
        let b = l[j] - l[k];
        let c = 3.0 * l[k];

        f[i] * a.powi(3)
            + f[j] * b.powi(3)
            + center * c.powi(3)
            + 3.0 * edge(i, j) * a * a * b
            + 3.0 * edge(j, i) * a * b * b
            + 3.0 * spoke[i] * a * a * c
            + 3.0 * near_centroid[i] * a * c * c
            + 3.0 * spoke[j] * b * b * c
            + 3.0 * near_centroid[j] * b * c * c
            + 6.0 * mids[i] * a * b * c
    }
}

/// Weighted least-squares gradient at every site from its one-ring
/// neighbours. Sites whose neighbours do not span the plane fall back to the
/// area-weighted mean of the incident triangle gradients.
fn estimate_gradients(mesh: &TriangleMesh) -> Vec<Vector2<f64>> {
    let n = mesh.sites.len();
    let mut neighbours: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut incident: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (id, t) in mesh.triangles.iter().enumerate() {
        for k in 0..3 {
            let v = t[k];
            neighbours[v].push(t[(k + 1) % 3]);
            neighbours[v].push(t[(k + 2) % 3]);
            incident[v].push(id);
        }
    }

    (0..n)
        .map(|v| {
            let nb = &mut neighbours[v];
            nb.sort_unstable();
            nb.dedup();
            least_squares_gradient(mesh, v, nb.as_slice())
                .or_else(|| face_gradient(mesh, &incident[v]))
                .unwrap_or_else(Vector2::zeros)
        })
        .collect()
}

fn least_squares_gradient(mesh: &TriangleMesh, v: usize, neighbours: &[usize]) -> Option<Vector2<f64>> {
    let origin = mesh.site(v);
    let mut normal = Matrix2::<f64>::zeros();
    let mut rhs = Vector2::<f64>::zeros();
    for &u in neighbours {
        let d = mesh.site(u) - origin;
        let d2 = d.norm_squared();
        if d2 <= f64::EPSILON {
            continue;
        }
        let w = 1.0 / d2;
        normal += d * d.transpose() * w;
        rhs += d * ((mesh.values[u] - mesh.values[v]) * w);
    }
    let scale = normal.trace();
    if scale <= 0.0 || normal.determinant().abs() <= 1e-12 * scale * scale {
        return None;
    }
    normal.lu().solve(&rhs)
}

fn face_gradient(mesh: &TriangleMesh, triangles: &[usize]) -> Option<Vector2<f64>> {
    let mut sum = Vector2::zeros();
    let mut total = 0.0;
    for &id in triangles {
        let t = mesh.triangles[id];
        let p = t.map(|v| mesh.site(v));
        let f = t.map(|v| mesh.values[v]);
        if let Some((g, area)) = plane_gradient(p, f) {
            sum += g * area;
            total += area;
        }
    }
    (total > 0.0).then(|| sum / total)
}

/// Elevation of the nearest data site, by XY distance. Equidistant sites
/// resolve to the one that comes first in the input.
#[derive(Debug, Clone)]
pub struct NearestNeighbor {
    sites: Vec<Point>,
    values: Vec<f64>,
    index: CellIndex,
}

impl NearestNeighbor {
    pub fn new(points: &[Point3]) -> Option<Self> {
        let finite: Vec<&Point3> = points.iter().filter(|p| p.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        let sites: Vec<Point> = finite.iter().map(|p| p.xy()).collect();
        let values = finite.iter().map(|p| p.z).collect();
        let index = index_points(&sites);
        Some(Self {
            sites,
            values,
            index,
        })
    }

    pub fn evaluate(&self, x: f64, y: f64) -> Option<f64> {
        let p = Point::new(x, y);
        if !p.is_finite() {
            return None;
        }
        self.index
            .nearest(&self.sites, p, None)
            .map(|(id, _)| self.values[id])
    }
}

/// Elevation interpolator built once over a point set and evaluated at
/// arbitrary XY locations.
#[derive(Debug, Clone)]
pub enum Interpolator {
    Linear(LinearInterpolator),
    Cubic(CloughTocher),
    Nearest(NearestNeighbor),
}

impl Interpolator {
    /// Builds an interpolator of the requested kind.
    ///
    /// Returns `None` when the data cannot support it: fewer than three
    /// non-collinear sites for the triangulation based methods, or no finite
    /// site at all for nearest neighbour.
    pub fn new(method: InterpolationMethod, points: &[Point3]) -> Option<Self> {
        let interp = match method {
            InterpolationMethod::Linear => LinearInterpolator::new(points).map(Self::Linear),
            InterpolationMethod::Cubic => CloughTocher::new(points).map(Self::Cubic),
            InterpolationMethod::Nearest => NearestNeighbor::new(points).map(Self::Nearest),
        };
        if interp.is_none() {
            log::warn!(
                "cannot build {method} interpolator over {} points",
                points.len()
            );
        }
        interp
    }

    pub fn from_cloud(method: InterpolationMethod, cloud: &PointCloud) -> Option<Self> {
        Self::new(method, cloud.points())
    }

    pub fn method(&self) -> InterpolationMethod {
        match self {
            Self::Linear(_) => InterpolationMethod::Linear,
            Self::Cubic(_) => InterpolationMethod::Cubic,
            Self::Nearest(_) => InterpolationMethod::Nearest,
        }
    }

    /// Elevation at `(x, y)`, or `None` where the method is undefined.
    pub fn evaluate(&self, x: f64, y: f64) -> Option<f64> {
        match self {
            Self::Linear(i) => i.evaluate(x, y),
            Self::Cubic(i) => i.evaluate(x, y),
            Self::Nearest(i) => i.evaluate(x, y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(x: f64, y: f64) -> f64 {
        12.0 + 0.25 * x - 0.75 * y
    }

    fn scattered() -> Vec<Point3> {
        let xy = [
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
            (3.0, 4.0),
            (7.5, 2.0),
            (6.0, 8.0),
            (2.0, 7.0),
            (8.5, 6.5),
            (5.0, 5.5),
        ];
        xy.iter().map(|&(x, y)| Point3::new(x, y, plane(x, y))).collect()
    }

    #[test]
    fn method_parsing() {
        assert_eq!("Cubic".parse::<InterpolationMethod>().unwrap(), InterpolationMethod::Cubic);
        assert_eq!(" nearest ".parse::<InterpolationMethod>().unwrap(), InterpolationMethod::Nearest);
        assert!("spline".parse::<InterpolationMethod>().is_err());
        assert_eq!(InterpolationMethod::Linear.to_string(), "linear");
        assert_eq!(InterpolationMethod::default(), InterpolationMethod::Linear);
    }

    #[test]
    fn linear_reproduces_plane() {
        let interp = Interpolator::new(InterpolationMethod::Linear, &scattered()).unwrap();
        for &(x, y) in &[(1.0, 1.0), (5.0, 5.0), (9.9, 0.1), (4.2, 7.7), (10.0, 5.0)] {
            let z = interp.evaluate(x, y).unwrap();
            assert!((z - plane(x, y)).abs() < 1e-9);
        }
    }

    #[test]
    fn cubic_reproduces_plane() {
        let interp = Interpolator::new(InterpolationMethod::Cubic, &scattered()).unwrap();
        assert_eq!(interp.method(), InterpolationMethod::Cubic);
        for &(x, y) in &[(1.0, 1.0), (5.0, 5.0), (9.9, 0.1), (4.2, 7.7), (6.1, 3.3)] {
            let z = interp.evaluate(x, y).unwrap();
            assert!((z - plane(x, y)).abs() < 1e-6);
        }
    }

    #[test]
    fn cubic_interpolates_vertices() {
        let pts: Vec<Point3> = scattered()
            .into_iter()
            .map(|p| Point3::new(p.x, p.y, (p.x * 0.3).sin() + 0.05 * p.y * p.y))
            .collect();
        let interp = CloughTocher::new(&pts).unwrap();
        for p in &pts {
            let z = interp.evaluate(p.x, p.y).unwrap();
            assert!((z - p.z).abs() < 1e-6);
        }
    }

    #[test]
    fn undefined_outside_hull() {
        for method in [InterpolationMethod::Linear, InterpolationMethod::Cubic] {
            let interp = Interpolator::new(method, &scattered()).unwrap();
            assert!(interp.evaluate(-1.0, 5.0).is_none());
            assert!(interp.evaluate(5.0, 10.5).is_none());
            assert!(interp.evaluate(f64::NAN, 1.0).is_none());
        }
    }

    #[test]
    fn nearest_always_defined() {
        let interp = Interpolator::new(InterpolationMethod::Nearest, &scattered()).unwrap();
        assert_eq!(interp.evaluate(-50.0, -50.0), Some(plane(0.0, 0.0)));
        assert_eq!(interp.evaluate(3.1, 4.1), Some(plane(3.0, 4.0)));
    }

    #[test]
    fn nearest_far_from_data() {
        let corners = vec![
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(10.0, 0.0, 2.0),
            Point3::new(0.0, 10.0, 3.0),
            Point3::new(10.0, 10.0, 4.0),
        ];
        let interp = Interpolator::new(InterpolationMethod::Nearest, &corners).unwrap();
        assert_eq!(interp.evaluate(1e6, 1e6), Some(4.0));
        assert_eq!(interp.evaluate(-1e9, 5.0), Some(1.0));
    }

    #[test]
    fn nearest_tie_uses_first_point() {
        let pts = vec![
            Point3::new(10.0, 0.0, 2.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(0.0, 10.0, 3.0),
        ];
        let interp = Interpolator::new(InterpolationMethod::Nearest, &pts).unwrap();
        assert_eq!(interp.evaluate(5.0, 0.0), Some(2.0));
        assert_eq!(interp.evaluate(0.0, 5.0), Some(1.0));
    }

    #[test]
    fn collinear_points_cannot_triangulate() {
        let pts: Vec<Point3> = (0..4).map(|i| Point3::new(i as f64, i as f64, 1.0)).collect();
        assert!(Interpolator::new(InterpolationMethod::Linear, &pts).is_none());
        assert!(Interpolator::new(InterpolationMethod::Cubic, &pts).is_none());
        assert!(Interpolator::new(InterpolationMethod::Nearest, &pts).is_some());
        assert!(Interpolator::new(InterpolationMethod::Nearest, &[]).is_none());
    }
}
