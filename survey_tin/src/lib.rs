//! Terrain surface modeling for survey data.
//!
//! Builds TINs from scattered survey points, honoring breaklines, and
//! densifies under-sampled parts of the surface with interpolated points.

pub mod densify;
pub mod dtm;
pub mod error;
pub mod geometry;
pub mod interpolation;
pub mod point_cloud;
pub mod settings;
pub mod spatial;

pub use densify::{densify, densify_with, Cancellation, DensificationStats, SparseRegion};
pub use dtm::{build_surface, BreaklineMode, Tin, TinBuilder, TinStats};
pub use error::{SurfaceError, SurfaceResult};
pub use geometry::{Point, Point3, Polyline};
pub use interpolation::{InterpolationMethod, Interpolator};
pub use point_cloud::{PointCloud, PointType};
pub use settings::{DensificationSettings, ProjectSettings, TinSettings};
