//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use courtside_analytics::{AggregatorConfig, SegmenterConfig};
use courtside_media::{
    BallTrackerConfig, CalibratorConfig, ClassifierConfig, PlayerTrackerConfig, PostProcessConfig,
};

/// Locations of the pretrained models. A missing path means the capability
/// is not provided.
#[derive(Debug, Clone, Default)]
pub struct ModelPaths {
    /// COCO detector used for players, and for the ball unless `ball` is set
    pub person: Option<PathBuf>,
    /// Dedicated single-class ball detector
    pub ball: Option<PathBuf>,
    pub stroke: Option<PathBuf>,
    pub pose: Option<PathBuf>,
}

/// Per-stage tuning handed to the processor.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Every n-th frame goes to the stroke and pose models
    pub sample_stride: u64,
    pub batch_size: usize,
    /// Consecutive unreadable frames tolerated before the run fails
    pub max_consecutive_skips: u32,
    pub progress_every: u64,
    pub highlights: bool,
    pub calibrator: CalibratorConfig,
    pub ball_tracker: BallTrackerConfig,
    pub player_tracker: PlayerTrackerConfig,
    pub classifier: ClassifierConfig,
    pub post_process: PostProcessConfig,
    pub segmenter: SegmenterConfig,
    /// Heatmap grid and highlight windows
    pub aggregator: AggregatorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_stride: 5,
            batch_size: 8,
            max_consecutive_skips: 30,
            progress_every: 100,
            highlights: true,
            calibrator: CalibratorConfig::default(),
            ball_tracker: BallTrackerConfig::default(),
            player_tracker: PlayerTrackerConfig::default(),
            classifier: ClassifierConfig::default(),
            post_process: PostProcessConfig::default(),
            segmenter: SegmenterConfig::default(),
            aggregator: AggregatorConfig::default(),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base URL of the analytics API
    pub api_url: String,
    pub api_version: String,
    /// Sent as `X-Service-Token` when persisting
    pub service_token: Option<String>,
    /// Upper bound on one match run
    pub job_timeout: Duration,
    /// Work directory for highlight intermediates
    pub work_dir: PathBuf,
    pub models: ModelPaths,
    pub pipeline: PipelineConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            api_version: "v1".to_string(),
            service_token: None,
            job_timeout: Duration::from_secs(3600), // 1 hour
            work_dir: PathBuf::from("/tmp/courtside"),
            models: ModelPaths::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = PipelineConfig::default();
        Self {
            api_url: std::env::var("API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            api_version: std::env::var("API_VERSION").unwrap_or_else(|_| "v1".to_string()),
            service_token: std::env::var("ML_SERVICE_TOKEN").ok().filter(|s| !s.is_empty()),
            job_timeout: Duration::from_secs(
                std::env::var("WORKER_JOB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/courtside")),
            models: ModelPaths {
                person: path_var("PERSON_MODEL_PATH"),
                ball: path_var("BALL_MODEL_PATH"),
                stroke: path_var("STROKE_MODEL_PATH"),
                pose: path_var("POSE_MODEL_PATH"),
            },
            pipeline: PipelineConfig {
                sample_stride: std::env::var("PIPELINE_SAMPLE_STRIDE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|&n| n > 0)
                    .unwrap_or(defaults.sample_stride),
                batch_size: std::env::var("PIPELINE_BATCH_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|&n| n > 0)
                    .unwrap_or(defaults.batch_size),
                max_consecutive_skips: std::env::var("PIPELINE_MAX_CONSECUTIVE_SKIPS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.max_consecutive_skips),
                progress_every: std::env::var("PIPELINE_PROGRESS_EVERY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|&n| n > 0)
                    .unwrap_or(defaults.progress_every),
                highlights: std::env::var("PIPELINE_HIGHLIGHTS")
                    .ok()
                    .and_then(|s| parse_flag(&s))
                    .unwrap_or(defaults.highlights),
                ..defaults
            },
        }
    }

    /// Endpoint receiving the finished analytics for `match_id`.
    pub fn save_url(&self, match_id: u64) -> String {
        format!(
            "{}/api/{}/analytics/matches/{}/save-from-ml",
            self.api_url, self.api_version, match_id
        )
    }
}

fn path_var(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.job_timeout, Duration::from_secs(3600));
        assert_eq!(config.pipeline.sample_stride, 5);
        assert_eq!(config.pipeline.batch_size, 8);
        assert_eq!(config.pipeline.max_consecutive_skips, 30);
        assert!(config.models.person.is_none());
    }

    #[test]
    fn test_save_url() {
        let config = WorkerConfig {
            api_url: "https://api.example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.save_url(42),
            "https://api.example.com/api/v1/analytics/matches/42/save-from-ml"
        );
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
