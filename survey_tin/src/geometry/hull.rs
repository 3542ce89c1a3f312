use super::{point_in_triangle, polygon_area, BoundingBox, Point};

/// Convex hull of a planar point set, stored as the hull polygon plus a
/// triangulation of it for membership queries.
#[derive(Debug, Clone)]
pub struct ConvexHull {
    vertices: Vec<Point>,
    triangles: Vec<[usize; 3]>,
    bbox: BoundingBox,
}

fn to_delaunator(points: &[Point]) -> Vec<delaunator::Point> {
    points
        .iter()
        .map(|p| delaunator::Point { x: p.x, y: p.y })
        .collect()
}

impl ConvexHull {
    /// Computes the hull of `points`.
    ///
    /// Returns `None` when the hull has fewer than three distinct vertices or
    /// encloses no area (collinear or coincident input, non-finite values).
    pub fn from_points(points: &[Point]) -> Option<Self> {
        if points.len() < 3 || points.iter().any(|p| !p.is_finite()) {
            return None;
        }
        let triangulation = delaunator::triangulate(&to_delaunator(points));
        if triangulation.triangles.is_empty() || triangulation.hull.len() < 3 {
            return None;
        }
        let vertices: Vec<Point> = triangulation.hull.iter().map(|&i| points[i]).collect();

        let hull_tri = delaunator::triangulate(&to_delaunator(&vertices));
        let triangles: Vec<[usize; 3]> = hull_tri
            .triangles
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        if triangles.is_empty() || polygon_area(&vertices) <= f64::EPSILON {
            return None;
        }
        let bbox = BoundingBox::from_points(&vertices)?;
        Some(Self {
            vertices,
            triangles,
            bbox,
        })
    }

    /// Hull polygon vertices in boundary order.
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Area enclosed by the hull.
    pub fn area(&self) -> f64 {
        polygon_area(&self.vertices)
    }

    /// Returns `true` if `p` lies inside the hull or on its boundary.
    pub fn contains(&self, p: Point) -> bool {
        if !self.bbox.contains(p, 1e-9) {
            return false;
        }
        self.triangles.iter().any(|t| {
            point_in_triangle(
                p,
                self.vertices[t[0]],
                self.vertices[t[1]],
                self.vertices[t[2]],
            )
        })
    }
}
