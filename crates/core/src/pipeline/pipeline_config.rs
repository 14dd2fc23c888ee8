use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::annotation::domain::frame_annotator::{LabelPolicy, DEFAULT_TOP_K};
use crate::detection::domain::face_locator::{
    LocatorConfig, DEFAULT_CONFIDENCE, DEFAULT_MIN_FACE_SIZE, DEFAULT_NMS_IOU,
};
use crate::inference::domain::inference_scheduler::{SchedulerConfig, DEFAULT_INTERVAL};
use crate::inference::infrastructure::classifier_pool::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use crate::tracking::domain::slot_tracker::{
    TrackerConfig, DEFAULT_MATCH_THRESHOLD, DEFAULT_MAX_MISSED_FRAMES,
};

const APP_DIR: &str = "Moodcam";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_TIMEOUT_MS: u64 = 2000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Tunables for one annotation run. Every field has a default, so a config
/// file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Frames between classifications of the same face.
    pub interval: usize,
    pub match_threshold: f64,
    pub max_missed_frames: usize,
    pub worker_pool_size: usize,
    pub queue_capacity: usize,
    pub inference_timeout_ms: u64,
    pub stagger: bool,
    pub top_k: usize,
    /// Percent; emotions scoring lower are not listed.
    pub min_score: f32,
    pub confidence: f64,
    pub min_face_size: u32,
    pub status_bar: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            max_missed_frames: DEFAULT_MAX_MISSED_FRAMES,
            worker_pool_size: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            inference_timeout_ms: DEFAULT_TIMEOUT_MS,
            stagger: true,
            top_k: DEFAULT_TOP_K,
            min_score: 0.0,
            confidence: DEFAULT_CONFIDENCE,
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            status_bar: true,
        }
    }
}

impl PipelineConfig {
    /// `<config dir>/Moodcam/config.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Reads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file at [`Self::default_path`] when it exists, defaults
    /// otherwise. A file that exists but is broken is still an error.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval < 1 {
            return Err(invalid("interval", "must be at least 1"));
        }
        if !(self.match_threshold.is_finite() && self.match_threshold > 0.0) {
            return Err(invalid("match_threshold", "must be a positive number"));
        }
        if self.worker_pool_size < 1 {
            return Err(invalid("worker_pool_size", "must be at least 1"));
        }
        if self.queue_capacity < 1 {
            return Err(invalid("queue_capacity", "must be at least 1"));
        }
        if self.inference_timeout_ms < 1 {
            return Err(invalid("inference_timeout_ms", "must be at least 1"));
        }
        if self.top_k < 1 {
            return Err(invalid("top_k", "must be at least 1"));
        }
        if !(0.0..=100.0).contains(&self.min_score) {
            return Err(invalid("min_score", "must be between 0 and 100"));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(invalid("confidence", "must be between 0 and 1"));
        }
        Ok(())
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_millis(self.inference_timeout_ms)
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            match_threshold: self.match_threshold,
            max_missed_frames: self.max_missed_frames,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: self.interval,
            stagger: self.stagger,
            inference_timeout: self.inference_timeout(),
        }
    }

    pub fn label_policy(&self) -> LabelPolicy {
        LabelPolicy {
            top_k: self.top_k,
            min_score: self.min_score,
        }
    }

    pub fn locator_config(&self) -> LocatorConfig {
        LocatorConfig {
            confidence: self.confidence,
            nms_iou: DEFAULT_NMS_IOU,
            min_face_size: self.min_face_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "interval": 30, "stagger": false }"#).unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.interval, 30);
        assert!(!config.stagger);
        assert_eq!(config.top_k, DEFAULT_TOP_K);
    }

    #[test]
    fn test_json_round_trip() {
        let config = PipelineConfig {
            interval: 7,
            min_score: 5.0,
            ..PipelineConfig::default()
        };
        let parsed: PipelineConfig = serde_json::from_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_non_finite_threshold_prints_as_null_and_is_rejected_on_load() {
        let config = PipelineConfig {
            match_threshold: f64::INFINITY,
            ..PipelineConfig::default()
        };
        let json = config.to_json().unwrap();
        assert!(json.contains("\"match_threshold\": null"));
        assert!(serde_json::from_str::<PipelineConfig>(&json).is_err());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "intervall": 30 }"#).unwrap();
        assert!(matches!(
            PipelineConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        assert!(matches!(
            PipelineConfig::load(Path::new("/nonexistent/config.json")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_invalid_value_in_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "top_k": 0 }"#).unwrap();
        assert!(matches!(
            PipelineConfig::load(&path),
            Err(ConfigError::Invalid { field: "top_k", .. })
        ));
    }

    #[rstest]
    #[case::zero_interval(PipelineConfig { interval: 0, ..Default::default() }, "interval")]
    #[case::zero_threshold(PipelineConfig { match_threshold: 0.0, ..Default::default() }, "match_threshold")]
    #[case::nan_threshold(PipelineConfig { match_threshold: f64::NAN, ..Default::default() }, "match_threshold")]
    #[case::no_workers(PipelineConfig { worker_pool_size: 0, ..Default::default() }, "worker_pool_size")]
    #[case::no_queue(PipelineConfig { queue_capacity: 0, ..Default::default() }, "queue_capacity")]
    #[case::no_timeout(PipelineConfig { inference_timeout_ms: 0, ..Default::default() }, "inference_timeout_ms")]
    #[case::negative_score(PipelineConfig { min_score: -1.0, ..Default::default() }, "min_score")]
    #[case::huge_score(PipelineConfig { min_score: 101.0, ..Default::default() }, "min_score")]
    #[case::bad_confidence(PipelineConfig { confidence: 1.5, ..Default::default() }, "confidence")]
    fn test_validate_rejects(#[case] config: PipelineConfig, #[case] expected: &str) {
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
            other => panic!("expected invalid {expected}, got {other:?}"),
        }
    }

    #[test]
    fn test_derived_component_configs() {
        let config = PipelineConfig {
            interval: 4,
            stagger: false,
            inference_timeout_ms: 250,
            top_k: 2,
            min_score: 5.0,
            ..PipelineConfig::default()
        };
        assert_eq!(config.scheduler_config().interval, 4);
        assert!(!config.scheduler_config().stagger);
        assert_eq!(
            config.scheduler_config().inference_timeout,
            Duration::from_millis(250)
        );
        assert_eq!(config.label_policy(), LabelPolicy { top_k: 2, min_score: 5.0 });
        assert_eq!(config.tracker_config().max_missed_frames, DEFAULT_MAX_MISSED_FRAMES);
        assert_eq!(config.locator_config().nms_iou, DEFAULT_NMS_IOU);
    }
}
