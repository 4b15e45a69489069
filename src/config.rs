//! Runtime configuration, loaded from TOML.
//!
//! Every field has a default, so running without a config file sends to
//! `127.0.0.1:5005` from camera 0.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    model_download::{
        default_handpose_estimator_model_path, default_palm_detector_model_path,
        default_pose_landmarker_model_path,
    },
    transform::CoordinateConvention,
    types::TrackingMode,
    wire::WireFormat,
};

const CONFIG_FILENAME: &str = "landmark-relay.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub destination: SocketAddr,
    pub wire_format: WireFormat,
    pub preview: bool,
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub hand: HandConfig,
    pub pose: PoseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destination: SocketAddr::from(([127, 0, 0, 1], 5005)),
            wire_format: WireFormat::Legacy,
            preview: true,
            camera: CameraConfig::default(),
            capture: CaptureConfig::default(),
            hand: HandConfig::default(),
            pose: PoseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: u32,
    /// Flip frames horizontally before detection so the output matches a mirror.
    pub mirror: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            mirror: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub max_consecutive_failures: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 100,
            initial_backoff_ms: 5,
            max_backoff_ms: 500,
        }
    }
}

impl CaptureConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandConfig {
    pub convention: CoordinateConvention,
    pub min_detection_confidence: f32,
    pub landmark_model: PathBuf,
    pub palm_model: PathBuf,
}

impl Default for HandConfig {
    fn default() -> Self {
        Self {
            convention: CoordinateConvention::default(),
            min_detection_confidence: 0.7,
            landmark_model: default_handpose_estimator_model_path(),
            palm_model: default_palm_detector_model_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    pub convention: CoordinateConvention,
    pub min_detection_confidence: f32,
    pub landmark_model: PathBuf,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            // Pose data has always gone out as raw normalized coordinates.
            convention: CoordinateConvention::Raw,
            min_detection_confidence: 0.5,
            landmark_model: default_pose_landmarker_model_path(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::ReadFile {
                path: path.as_ref().display().to_string(),
                message: e.to_string(),
            })?;

        Self::from_str(&contents)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Looks for a config file in the working directory, then under `config/`.
    pub fn load() -> Result<Self, ConfigError> {
        let paths = [
            PathBuf::from(CONFIG_FILENAME),
            PathBuf::from("config").join(CONFIG_FILENAME),
        ];

        for path in &paths {
            if path.exists() {
                log::info!("loading config from {}", path.display());
                return Self::from_file(path);
            }
        }

        log::info!("no config file found, using defaults");
        Ok(Self::default())
    }

    pub fn convention_for(&self, mode: TrackingMode) -> CoordinateConvention {
        match mode {
            TrackingMode::Hand => self.hand.convention,
            TrackingMode::Pose => self.pose.convention,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_convention("hand.convention", &self.hand.convention)?;
        validate_convention("pose.convention", &self.pose.convention)?;
        validate_confidence(
            "hand.min_detection_confidence",
            self.hand.min_detection_confidence,
        )?;
        validate_confidence(
            "pose.min_detection_confidence",
            self.pose.min_detection_confidence,
        )?;

        if self.capture.max_consecutive_failures == 0 {
            return Err(ConfigError::InvalidValue {
                field: "capture.max_consecutive_failures".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.capture.initial_backoff_ms > self.capture.max_backoff_ms {
            return Err(ConfigError::InvalidValue {
                field: "capture.initial_backoff_ms".to_string(),
                message: format!(
                    "{} is larger than capture.max_backoff_ms ({})",
                    self.capture.initial_backoff_ms, self.capture.max_backoff_ms
                ),
            });
        }
        if self.destination.port() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "destination".to_string(),
                message: "port must not be 0".to_string(),
            });
        }

        Ok(())
    }
}

fn validate_convention(field: &str, convention: &CoordinateConvention) -> Result<(), ConfigError> {
    if let CoordinateConvention::Centered { scale } = convention {
        if !scale.is_finite() || *scale <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: field.to_string(),
                message: format!("scale must be a positive number, got {scale}"),
            });
        }
    }
    Ok(())
}

fn validate_confidence(field: &str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("must be within [0, 1], got {value}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_local_receiver() {
        let config = Config::default();
        assert_eq!(config.destination.to_string(), "127.0.0.1:5005");
        assert_eq!(config.camera.index, 0);
        assert!(config.camera.mirror);
        assert_eq!(config.wire_format, WireFormat::Legacy);
        assert_eq!(
            config.convention_for(TrackingMode::Hand),
            CoordinateConvention::Centered { scale: 2.0 }
        );
        assert_eq!(
            config.convention_for(TrackingMode::Pose),
            CoordinateConvention::Raw
        );
        assert_eq!(config.hand.min_detection_confidence, 0.7);
        assert_eq!(config.pose.min_detection_confidence, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_file_yields_defaults() {
        assert_eq!(Config::from_str("").unwrap(), Config::default());
    }

    #[test]
    fn partial_override() {
        let config = Config::from_str(
            r#"
            destination = "127.0.0.1:6000"
            wire_format = "tagged"
            preview = false

            [camera]
            index = 2

            [pose]
            convention = { kind = "centered", scale = 1.0 }
            "#,
        )
        .unwrap();

        assert_eq!(config.destination.port(), 6000);
        assert_eq!(config.wire_format, WireFormat::Tagged);
        assert!(!config.preview);
        assert_eq!(config.camera.index, 2);
        assert!(config.camera.mirror);
        assert_eq!(
            config.pose.convention,
            CoordinateConvention::Centered { scale: 1.0 }
        );
        assert_eq!(config.hand, HandConfig::default());
    }

    #[test]
    fn example_file_spells_out_the_defaults() {
        let example = include_str!("../landmark-relay.example.toml");
        assert_eq!(Config::from_str(example).unwrap(), Config::default());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            Config::from_str("destination = "),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = Config::default();
        config.hand.convention = CoordinateConvention::Centered { scale: 0.0 };
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pose.min_detection_confidence = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.capture.max_consecutive_failures = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.capture.initial_backoff_ms = 1_000;
        config.capture.max_backoff_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        match Config::from_file("/definitely/not/here.toml") {
            Err(ConfigError::ReadFile { path, .. }) => assert!(path.contains("not/here.toml")),
            other => panic!("expected read error, got {other:?}"),
        }
    }
}
