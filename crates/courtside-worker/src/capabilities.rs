//! Pretrained capability handles.
//!
//! Models are loaded once per process and handed to the processor already
//! constructed. A capability that is not configured, or fails to load, is
//! simply absent; the pipeline degrades around it.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use courtside_media::{
    MediaResult, ObjectDetector, OnnxPoseEstimator, OnnxStrokeClassifier, PoseEstimator,
    PoseModelConfig, StrokeModelConfig, StrokePhaseClassifier, YoloDetectorConfig,
    YoloObjectDetector,
};

use crate::config::ModelPaths;

/// Read-only model handles, shareable across concurrent runs.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub person_detector: Option<Arc<dyn ObjectDetector>>,
    /// May be the same handle as `person_detector`
    pub ball_detector: Option<Arc<dyn ObjectDetector>>,
    pub stroke_classifier: Option<Arc<dyn StrokePhaseClassifier>>,
    pub pose_estimator: Option<Arc<dyn PoseEstimator>>,
}

impl Capabilities {
    /// Load every configured model. Load failures are logged and the
    /// capability is left out.
    pub fn load(models: &ModelPaths, batch_size: usize) -> Self {
        let person_detector: Option<Arc<dyn ObjectDetector>> = models
            .person
            .as_deref()
            .and_then(|path| {
                load_model("person detector", path, || {
                    YoloObjectDetector::new(YoloDetectorConfig::coco(path))
                })
            })
            .map(|d| Arc::new(d) as Arc<dyn ObjectDetector>);

        let ball_detector: Option<Arc<dyn ObjectDetector>> = match models.ball.as_deref() {
            Some(path) => load_model("ball detector", path, || {
                YoloObjectDetector::new(YoloDetectorConfig::ball_only(path))
            })
            .map(|d| Arc::new(d) as Arc<dyn ObjectDetector>)
            .or_else(|| person_detector.clone()),
            None => person_detector.clone(),
        };

        let stroke_classifier = models
            .stroke
            .as_deref()
            .and_then(|path| {
                load_model("stroke classifier", path, || {
                    let mut config = StrokeModelConfig::new(path);
                    config.batch_size = batch_size.max(1);
                    OnnxStrokeClassifier::new(config)
                })
            })
            .map(|c| Arc::new(c) as Arc<dyn StrokePhaseClassifier>);

        let pose_estimator = models
            .pose
            .as_deref()
            .and_then(|path| {
                load_model("pose estimator", path, || {
                    OnnxPoseEstimator::new(PoseModelConfig::new(path))
                })
            })
            .map(|p| Arc::new(p) as Arc<dyn PoseEstimator>);

        let capabilities = Self {
            person_detector,
            ball_detector,
            stroke_classifier,
            pose_estimator,
        };
        info!(capabilities = ?capabilities, "Capabilities loaded");
        capabilities
    }

    /// True when one detector call serves both players and ball.
    pub fn shares_detector(&self) -> bool {
        match (&self.person_detector, &self.ball_detector) {
            (Some(person), Some(ball)) => Arc::ptr_eq(person, ball),
            _ => false,
        }
    }

    pub fn has_stroke_model(&self) -> bool {
        self.stroke_classifier.is_some()
    }
}

fn load_model<T>(what: &str, path: &Path, load: impl FnOnce() -> MediaResult<T>) -> Option<T> {
    match load() {
        Ok(model) => {
            info!(model = what, path = %path.display(), "Model loaded");
            Some(model)
        }
        Err(e) => {
            warn!(model = what, path = %path.display(), error = %e, "Model unavailable");
            None
        }
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("person_detector", &self.person_detector.as_ref().map(|d| d.name()))
            .field("ball_detector", &self.ball_detector.as_ref().map(|d| d.name()))
            .field(
                "stroke_classifier",
                &self.stroke_classifier.as_ref().map(|c| c.name()),
            )
            .field("pose_estimator", &self.pose_estimator.as_ref().map(|p| p.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_missing_paths_give_no_capabilities() {
        let capabilities = Capabilities::load(&ModelPaths::default(), 8);
        assert!(capabilities.person_detector.is_none());
        assert!(capabilities.ball_detector.is_none());
        assert!(!capabilities.has_stroke_model());
        assert!(!capabilities.shares_detector());
    }

    #[test]
    fn test_unloadable_model_is_left_out() {
        let models = ModelPaths {
            stroke: Some(PathBuf::from("/nonexistent/stroke.onnx")),
            ..Default::default()
        };
        let capabilities = Capabilities::load(&models, 8);
        assert!(!capabilities.has_stroke_model());
    }
}
