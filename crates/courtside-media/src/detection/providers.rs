//! Capability traits wrapping pretrained inference models.
//!
//! These traits give the trackers and classifiers a uniform, synchronous
//! interface to whatever model backs them. Implementations must be
//! `Send + Sync`: one loaded model is shared read-only by every run in the
//! process.

use image::RgbImage;

use crate::error::MediaResult;
use crate::geometry::{BoundingBox, PixelPoint};

/// What a detection represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    Ball,
    Person,
    /// A model class with no meaning to the pipeline
    Other(u32),
}

/// One object found in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Box in frame pixel coordinates
    pub bbox: BoundingBox,
    pub class: ObjectClass,
    pub confidence: f64,
    /// Ephemeral identity, if the detector tracks objects across frames
    pub track_id: Option<u32>,
}

impl Detection {
    pub fn new(bbox: BoundingBox, class: ObjectClass, confidence: f64) -> Self {
        Self {
            bbox,
            class,
            confidence,
            track_id: None,
        }
    }

    pub fn with_track_id(mut self, track_id: u32) -> Self {
        self.track_id = Some(track_id);
        self
    }

    pub fn center(&self) -> PixelPoint {
        self.bbox.center()
    }
}

/// Object detection provider (players and ball).
pub trait ObjectDetector: Send + Sync {
    /// Detect objects in a full frame.
    fn detect(&self, frame: &RgbImage) -> MediaResult<Vec<Detection>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// COCO keypoint order used by [`PoseKeypoints`].
pub mod keypoint {
    pub const NOSE: usize = 0;
    pub const LEFT_SHOULDER: usize = 5;
    pub const RIGHT_SHOULDER: usize = 6;
    pub const LEFT_WRIST: usize = 9;
    pub const RIGHT_WRIST: usize = 10;
    pub const COUNT: usize = 17;
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keypoint {
    /// Coordinates normalized to the estimated region, `[0, 1]`
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

/// 17 COCO body keypoints for one person.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseKeypoints {
    pub points: [Keypoint; keypoint::COUNT],
}

impl PoseKeypoints {
    pub fn get(&self, index: usize) -> Option<&Keypoint> {
        self.points.get(index)
    }

    /// Whether either wrist is confidently above the nose (smaller y).
    pub fn wrist_above_head(&self, min_confidence: f64) -> bool {
        let nose = &self.points[keypoint::NOSE];
        if nose.confidence < min_confidence {
            return false;
        }
        [keypoint::LEFT_WRIST, keypoint::RIGHT_WRIST]
            .iter()
            .map(|i| &self.points[*i])
            .any(|w| w.confidence >= min_confidence && w.y < nose.y)
    }
}

/// Pose estimation provider, run on a cropped player region.
pub trait PoseEstimator: Send + Sync {
    fn estimate(&self, region: &RgbImage) -> MediaResult<Option<PoseKeypoints>>;

    fn name(&self) -> &'static str;
}

/// Best stroke-phase detection for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokePrediction {
    /// Index into the stroke class table
    pub class_id: u32,
    pub confidence: f64,
    /// Where the stroking player was found, when the model localizes it
    pub bbox: Option<BoundingBox>,
}

/// Stroke-phase classification provider.
pub trait StrokePhaseClassifier: Send + Sync {
    /// Classify a batch of frames. The result has one entry per input frame.
    fn classify_batch(&self, frames: &[&RgbImage]) -> MediaResult<Vec<Option<StrokePrediction>>>;

    /// Preferred number of frames per call.
    fn batch_size(&self) -> usize {
        8
    }

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose_with(nose_y: f64, wrist_y: f64, wrist_conf: f64) -> PoseKeypoints {
        let mut points = [Keypoint::default(); keypoint::COUNT];
        points[keypoint::NOSE] = Keypoint {
            x: 0.5,
            y: nose_y,
            confidence: 0.9,
        };
        points[keypoint::RIGHT_WRIST] = Keypoint {
            x: 0.6,
            y: wrist_y,
            confidence: wrist_conf,
        };
        PoseKeypoints { points }
    }

    #[test]
    fn test_wrist_above_head() {
        assert!(pose_with(0.2, 0.05, 0.8).wrist_above_head(0.3));
        assert!(!pose_with(0.2, 0.5, 0.8).wrist_above_head(0.3));
        assert!(!pose_with(0.2, 0.05, 0.1).wrist_above_head(0.3));
    }

    #[test]
    fn test_detection_builder() {
        let det = Detection::new(BoundingBox::new(0.0, 0.0, 10.0, 20.0), ObjectClass::Person, 0.8)
            .with_track_id(4);
        assert_eq!(det.track_id, Some(4));
        assert_eq!(det.center(), PixelPoint::new(5.0, 10.0));
    }
}
