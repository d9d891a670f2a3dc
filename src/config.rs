//! Runtime configuration.
//!
//! Configuration is read from a TOML file. Every field is optional:
//!
//! ```toml
//! [detector]
//! palm_model = "3rdparty/onnx/palm_detection_lite.onnx"
//! landmark_model = "3rdparty/onnx/hand_landmark_lite.onnx"
//! min_detection_confidence = 0.5
//! min_presence = 0.5
//!
//! [classifier]
//! model = "models/svm.json"
//!
//! [controls]
//! one = "up"
//! fist = "down"
//! ```

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::controls::DirectionMap;

/// Environment variable holding the path of the configuration file.
pub const CONFIG_ENV: &str = "HANDSIGN_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub detector: DetectorConfig,
    pub classifier: ClassifierConfig,
    /// Gesture to direction mapping. Replaces the default mapping entirely when given.
    pub controls: DirectionMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    /// ONNX file of the palm detection network.
    pub palm_model: PathBuf,
    /// ONNX file of the hand landmark network.
    pub landmark_model: PathBuf,
    /// Palm detections below this confidence are ignored.
    pub min_detection_confidence: f32,
    /// Landmark estimates below this hand presence score are treated as "no hand".
    pub min_presence: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            palm_model: "3rdparty/onnx/palm_detection_lite.onnx".into(),
            landmark_model: "3rdparty/onnx/hand_landmark_lite.onnx".into(),
            min_detection_confidence: 0.5,
            min_presence: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Model file written by the training runner.
    pub model: PathBuf,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: "models/svm.json".into(),
        }
    }
}

impl Config {
    /// Reads the configuration from a TOML file.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config '{}'", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("invalid config '{}'", path.display()))?;
        log::debug!("loaded config from '{}'", path.display());
        Ok(config)
    }

    /// Reads the file named by `HANDSIGN_CONFIG`, or returns the defaults if it isn't set.
    pub fn from_env() -> anyhow::Result<Self> {
        match env::var_os(CONFIG_ENV) {
            Some(path) => Self::open(path),
            None => Ok(Self::default()),
        }
    }

    /// Uses `path` if given, and falls back to [`Config::from_env`] otherwise.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::open(path),
            None => Self::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::Direction;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [detector]
            min_presence = 0.8

            [classifier]
            model = "out/rf.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.detector.min_presence, 0.8);
        assert_eq!(config.detector.min_detection_confidence, 0.5);
        assert_eq!(config.detector.palm_model, DetectorConfig::default().palm_model);
        assert_eq!(config.classifier.model, Path::new("out/rf.json"));
        assert_eq!(config.controls.direction("fist"), Some(Direction::Down));
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(toml::from_str::<Config>("").unwrap(), Config::default());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<Config>("[detector]\nthreshold = 0.2").is_err());
    }

    #[test]
    fn open_reports_path() {
        let err = Config::open("does/not/exist.toml").unwrap_err();
        assert!(err.to_string().contains("does/not/exist.toml"), "{err}");
    }
}
