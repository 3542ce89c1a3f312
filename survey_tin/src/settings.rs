use std::fs;

use serde::{Deserialize, Serialize};

use crate::dtm::BreaklineMode;
use crate::error::{SurfaceError, SurfaceResult};
use crate::interpolation::InterpolationMethod;

fn check_positive(name: &'static str, value: f64) -> SurfaceResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SurfaceError::InvalidSetting { name, value })
    }
}

/// Parameters controlling sparse-region densification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensificationSettings {
    pub enabled: bool,
    /// Step of the sampling grid, in projected units.
    pub grid_spacing: f64,
    pub interpolation_method: InterpolationMethod,
    /// Upper bound on generated points across all regions.
    pub max_points: u64,
    /// Triangles whose longest edge exceeds this are treated as sparse.
    pub min_spacing_threshold: f64,
}

impl Default for DensificationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            grid_spacing: 5.0,
            interpolation_method: InterpolationMethod::Linear,
            max_points: 10_000,
            min_spacing_threshold: 10.0,
        }
    }
}

impl DensificationSettings {
    pub fn validate(&self) -> SurfaceResult<()> {
        check_positive("grid_spacing", self.grid_spacing)?;
        check_positive("min_spacing_threshold", self.min_spacing_threshold)
    }
}

/// Parameters controlling surface construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TinSettings {
    pub enabled: bool,
    pub use_breaklines: bool,
    pub max_edge_length: Option<f64>,
    pub breakline_mode: BreaklineMode,
}

impl Default for TinSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            use_breaklines: true,
            max_edge_length: None,
            breakline_mode: BreaklineMode::Reject,
        }
    }
}

impl TinSettings {
    pub fn validate(&self) -> SurfaceResult<()> {
        match self.max_edge_length {
            Some(limit) => check_positive("max_edge_length", limit),
            None => Ok(()),
        }
    }
}

/// All processing settings of a survey project.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub tin: TinSettings,
    pub densification: DensificationSettings,
}

impl ProjectSettings {
    /// Loads and validates settings from a JSON file.
    pub fn from_json(path: &str) -> SurfaceResult<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Parses and validates settings from JSON text. Missing fields take
    /// their default values.
    pub fn from_json_str(data: &str) -> SurfaceResult<Self> {
        let settings: Self = serde_json::from_str(data)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> SurfaceResult<()> {
        self.tin.validate()?;
        self.densification.validate()
    }

    pub fn to_json(&self) -> SurfaceResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_survey_workflow() {
        let s = DensificationSettings::default();
        assert!(!s.enabled);
        assert_eq!(s.grid_spacing, 5.0);
        assert_eq!(s.interpolation_method, InterpolationMethod::Linear);
        assert_eq!(s.max_points, 10_000);
        assert_eq!(s.min_spacing_threshold, 10.0);
        assert!(s.validate().is_ok());

        let t = TinSettings::default();
        assert!(t.enabled && t.use_breaklines);
        assert_eq!(t.breakline_mode, BreaklineMode::Reject);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let json = r#"{"densification": {"enabled": true, "interpolation_method": "cubic"}}"#;
        let s = ProjectSettings::from_json_str(json).unwrap();
        assert!(s.densification.enabled);
        assert_eq!(s.densification.interpolation_method, InterpolationMethod::Cubic);
        assert_eq!(s.densification.grid_spacing, 5.0);
        assert!(s.tin.enabled);
    }

    #[test]
    fn invalid_values_rejected() {
        let json = r#"{"densification": {"grid_spacing": 0.0}}"#;
        match ProjectSettings::from_json_str(json) {
            Err(SurfaceError::InvalidSetting { name, .. }) => assert_eq!(name, "grid_spacing"),
            other => panic!("unexpected {other:?}"),
        }
        let json = r#"{"tin": {"max_edge_length": -1.0}}"#;
        assert!(ProjectSettings::from_json_str(json).is_err());
        let json = r#"{"densification": {"interpolation_method": "spline"}}"#;
        assert!(matches!(
            ProjectSettings::from_json_str(json),
            Err(SurfaceError::Json(_))
        ));
    }

    #[test]
    fn json_round_trip() {
        let mut s = ProjectSettings::default();
        s.tin.breakline_mode = BreaklineMode::Constrained;
        s.densification.max_points = 12;
        let text = s.to_json().unwrap();
        assert!(text.contains("\"constrained\""));
        assert_eq!(ProjectSettings::from_json_str(&text).unwrap(), s);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ProjectSettings::from_json("/nonexistent/settings.json").unwrap_err();
        assert!(matches!(err, SurfaceError::Io(_)));
    }
}
