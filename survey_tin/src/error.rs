//! Error types for surface construction and densification.
//!
//! Only usage mistakes end up here. Degenerate survey data is reported
//! through the `skipped`/`error` fields of the statistics records instead.

use thiserror::Error;

/// Errors raised for invalid settings or malformed inputs.
#[derive(Debug, Error)]
pub enum SurfaceError {
    /// A numeric setting is non-positive or not finite.
    #[error("Invalid value for {name}: {value} (must be a positive finite number)")]
    InvalidSetting { name: &'static str, value: f64 },

    /// Interpolation method name is not one of linear, cubic or nearest.
    #[error("Unknown interpolation method: {0}")]
    UnknownInterpolationMethod(String),

    /// Points and metadata of a point cloud have different lengths.
    #[error("Point cloud has {points} points but {metadata} metadata entries")]
    MetadataLength { points: usize, metadata: usize },

    /// Settings file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not valid JSON for the expected structure.
    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for surface operations.
pub type SurfaceResult<T> = std::result::Result<T, SurfaceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SurfaceError::InvalidSetting {
            name: "grid_spacing",
            value: -1.0,
        };
        let msg = format!("{err}");
        assert!(msg.contains("grid_spacing"));
        assert!(msg.contains("-1"));

        let err = SurfaceError::UnknownInterpolationMethod("spline".into());
        assert_eq!(format!("{err}"), "Unknown interpolation method: spline");
    }
}
