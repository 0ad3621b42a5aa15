//! Per-run scene configuration: ROI, virtual lines and real-world scale.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geometry::{Line, Point};
use crate::speed::TravelDirection;

/// Detector classes treated as vehicles when a scene does not list its own.
pub const DEFAULT_VEHICLE_CLASSES: [&str; 6] =
    ["car", "bus", "truck", "motorbike", "motorcycle", "bicycle"];

fn default_vehicle_classes() -> Vec<String> {
    DEFAULT_VEHICLE_CLASSES.iter().map(|c| c.to_string()).collect()
}

/// Scene geometry for one video, as drawn by the operator.
///
/// ```json
/// {
///   "video_name": "junction_a",
///   "polygon_roi": [[100, 200], [540, 200], [600, 460], [40, 460]],
///   "line_1": [[80, 300], [560, 300]],
///   "line_2": [[60, 400], [580, 400]],
///   "real_world_distance_m": 20.0
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    #[serde(alias = "video_id")]
    pub video_name: String,
    pub polygon_roi: Vec<Point>,
    pub line_1: Line,
    pub line_2: Line,
    /// Ground distance between the two lines, in meters
    pub real_world_distance_m: f64,
    #[serde(default)]
    pub direction: TravelDirection,
    #[serde(default = "default_vehicle_classes")]
    pub vehicle_classes: Vec<String>,
}

impl SceneConfig {
    /// Read, parse and validate a JSON scene file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SceneConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.video_name.trim().is_empty() {
            return Err(ConfigError::invalid("video_name", "must not be empty"));
        }
        if self.polygon_roi.len() < 3 {
            return Err(ConfigError::invalid(
                "polygon_roi",
                format!("needs at least 3 points, got {}", self.polygon_roi.len()),
            ));
        }
        if !self.polygon_roi.iter().all(Point::is_finite) {
            return Err(ConfigError::invalid("polygon_roi", "coordinates must be finite"));
        }
        for (field, line) in [("line_1", &self.line_1), ("line_2", &self.line_2)] {
            if !line.start.is_finite() || !line.end.is_finite() {
                return Err(ConfigError::invalid(field, "coordinates must be finite"));
            }
        }
        if !(self.real_world_distance_m.is_finite() && self.real_world_distance_m > 0.0) {
            return Err(ConfigError::invalid(
                "real_world_distance_m",
                format!("must be positive, got {}", self.real_world_distance_m),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn line1_y(&self) -> f64 {
        self.line_1.crossing_y()
    }

    #[inline]
    pub fn line2_y(&self) -> f64 {
        self.line_2.crossing_y()
    }

    /// False when line 2 does not come after line 1 along `direction`; such a
    /// scene never yields a speed.
    pub fn lines_ordered(&self) -> bool {
        self.direction.is_ordered(self.line1_y(), self.line2_y())
    }
}
