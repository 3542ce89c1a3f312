//! Survey point clouds with per-point metadata and provenance tags.

use crate::error::{SurfaceError, SurfaceResult};
use crate::geometry::{Point, Point3};
use crate::spatial::index_points;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Free-form metadata attached to a point or a cloud.
pub type Metadata = BTreeMap<String, Value>;

/// Metadata key holding the provenance tag.
pub const TYPE_KEY: &str = "type";

/// Provenance of a survey point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointType {
    /// Measured in the field.
    Original,
    /// Synthesized by densification.
    Generated,
    /// Measured but modified afterwards.
    Edited,
}

impl PointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointType::Original => "original",
            PointType::Generated => "generated",
            PointType::Edited => "edited",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "original" => Some(PointType::Original),
            "generated" => Some(PointType::Generated),
            "edited" => Some(PointType::Edited),
            _ => None,
        }
    }
}

impl fmt::Display for PointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata map holding only a provenance tag.
pub fn provenance(point_type: PointType) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert(TYPE_KEY.to_string(), Value::from(point_type.as_str()));
    meta
}

/// Axis-aligned extent of a cloud in all three dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub min_z: f64,
    pub max_z: f64,
}

/// Ordered 3D points with a parallel list of metadata maps.
///
/// The cloud is immutable: operations that change it return a new cloud.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointCloud {
    points: Vec<Point3>,
    metadata: Vec<Metadata>,
    attributes: Metadata,
}

impl PointCloud {
    /// Creates a cloud of original survey points.
    pub fn from_points(points: Vec<Point3>) -> Self {
        let metadata = vec![provenance(PointType::Original); points.len()];
        Self {
            points,
            metadata,
            attributes: Metadata::new(),
        }
    }

    /// Creates a cloud from points and their metadata.
    pub fn with_metadata(points: Vec<Point3>, metadata: Vec<Metadata>) -> SurfaceResult<Self> {
        if points.len() != metadata.len() {
            return Err(SurfaceError::MetadataLength {
                points: points.len(),
                metadata: metadata.len(),
            });
        }
        Ok(Self {
            points,
            metadata,
            attributes: Metadata::new(),
        })
    }

    /// Returns the cloud with cloud-level `attributes` replaced.
    pub fn with_attributes(mut self, attributes: Metadata) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    pub fn metadata(&self) -> &[Metadata] {
        &self.metadata
    }

    pub fn attributes(&self) -> &Metadata {
        &self.attributes
    }

    /// Number of points in the cloud.
    pub fn count(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// XY projection of every point.
    pub fn xy(&self) -> Vec<Point> {
        self.points.iter().map(Point3::xy).collect()
    }

    /// Provenance of point `index`. Points without a recognised tag count
    /// as original.
    pub fn point_type(&self, index: usize) -> PointType {
        self.metadata
            .get(index)
            .and_then(|m| m.get(TYPE_KEY))
            .and_then(Value::as_str)
            .and_then(PointType::parse)
            .unwrap_or(PointType::Original)
    }

    /// Points carrying the given provenance tag.
    pub fn points_by_type(&self, point_type: PointType) -> Vec<Point3> {
        self.points
            .iter()
            .enumerate()
            .filter(|(i, _)| self.point_type(*i) == point_type)
            .map(|(_, p)| *p)
            .collect()
    }

    /// Bounding box `(min, max)` on every axis; all zeros for an empty cloud.
    pub fn bounds(&self) -> Bounds {
        let Some(first) = self.points.first() else {
            return Bounds::default();
        };
        self.points.iter().fold(
            Bounds {
                min_x: first.x,
                max_x: first.x,
                min_y: first.y,
                max_y: first.y,
                min_z: first.z,
                max_z: first.z,
            },
            |b, p| Bounds {
                min_x: b.min_x.min(p.x),
                max_x: b.max_x.max(p.x),
                min_y: b.min_y.min(p.y),
                max_y: b.max_y.max(p.y),
                min_z: b.min_z.min(p.z),
                max_z: b.max_z.max(p.z),
            },
        )
    }

    /// Keeps the points whose index satisfies `keep`, with their metadata.
    fn select(&self, keep: impl Fn(usize) -> bool) -> Self {
        let mut points = Vec::new();
        let mut metadata = Vec::new();
        for (i, (p, m)) in self.points.iter().zip(&self.metadata).enumerate() {
            if keep(i) {
                points.push(*p);
                metadata.push(m.clone());
            }
        }
        Self {
            points,
            metadata,
            attributes: self.attributes.clone(),
        }
    }

    /// Appends `extra` points with their metadata, producing a new cloud.
    /// Existing points without a provenance tag are tagged original.
    pub(crate) fn extended(&self, extra: Vec<(Point3, Metadata)>) -> Self {
        let mut points = Vec::with_capacity(self.points.len() + extra.len());
        let mut metadata = Vec::with_capacity(self.points.len() + extra.len());
        points.extend_from_slice(&self.points);
        metadata.extend(self.metadata.iter().map(|m| {
            let mut m = m.clone();
            m.entry(TYPE_KEY.to_string())
                .or_insert_with(|| Value::from(PointType::Original.as_str()));
            m
        }));
        for (p, m) in extra {
            points.push(p);
            metadata.push(m);
        }
        Self {
            points,
            metadata,
            attributes: self.attributes.clone(),
        }
    }
}

/// Removes points lying within `tolerance` (XY) of an earlier point.
///
/// The first point of each cluster survives together with its metadata.
pub fn remove_duplicates(cloud: &PointCloud, tolerance: f64) -> PointCloud {
    if cloud.is_empty() {
        return cloud.clone();
    }
    let xy = cloud.xy();
    let index = index_points(&xy);
    let mut seen = vec![false; xy.len()];
    let mut keep = vec![false; xy.len()];
    for i in 0..xy.len() {
        if seen[i] {
            continue;
        }
        keep[i] = true;
        for j in index.within(&xy, xy[i], tolerance) {
            seen[j] = true;
        }
    }
    let removed = keep.iter().filter(|k| !**k).count();
    if removed > 0 {
        log::debug!("removed {removed} duplicate points (tolerance {tolerance})");
    }
    cloud.select(|i| keep[i])
}

/// Drops points whose elevation deviates from the mean by more than
/// `sigma` population standard deviations.
pub fn filter_outliers(cloud: &PointCloud, sigma: f64) -> PointCloud {
    if cloud.is_empty() {
        return cloud.clone();
    }
    let n = cloud.count() as f64;
    let mean = cloud.points().iter().map(|p| p.z).sum::<f64>() / n;
    let var = cloud
        .points()
        .iter()
        .map(|p| (p.z - mean).powi(2))
        .sum::<f64>()
        / n;
    let limit = sigma * var.sqrt();
    let points = cloud.points();
    cloud.select(|i| (points[i].z - mean).abs() <= limit)
}

/// Nearest-neighbour spacing summary of a cloud in the XY plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SpacingStats {
    pub mean_spacing: f64,
    pub min_spacing: f64,
    pub max_spacing: f64,
    pub median_spacing: f64,
}

/// Computes nearest-neighbour distances for every point. Clouds with fewer
/// than two points report zeros.
pub fn spacing_statistics(cloud: &PointCloud) -> SpacingStats {
    if cloud.count() < 2 {
        return SpacingStats::default();
    }
    let xy = cloud.xy();
    let index = index_points(&xy);
    let mut distances: Vec<f64> = (0..xy.len())
        .filter_map(|i| index.nearest(&xy, xy[i], Some(i)).map(|(_, d)| d))
        .collect();
    if distances.is_empty() {
        return SpacingStats::default();
    }
    distances.sort_by(|a, b| a.total_cmp(b));
    let n = distances.len();
    let median = if n % 2 == 1 {
        distances[n / 2]
    } else {
        (distances[n / 2 - 1] + distances[n / 2]) / 2.0
    };
    SpacingStats {
        mean_spacing: distances.iter().sum::<f64>() / n as f64,
        min_spacing: distances[0],
        max_spacing: distances[n - 1],
        median_spacing: median,
    }
}
