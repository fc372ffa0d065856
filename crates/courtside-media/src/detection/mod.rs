//! Pretrained inference capabilities.
//!
//! | Trait | ONNX implementation | Model |
//! |-------|---------------------|-------|
//! | `ObjectDetector` | `YoloObjectDetector` | YOLOv8 (COCO persons + sports ball, or a ball-only model) |
//! | `StrokePhaseClassifier` | `OnnxStrokeClassifier` | YOLOv8 over the 11 stroke-phase classes |
//! | `PoseEstimator` | `OnnxPoseEstimator` | YOLOv8-pose, 17 COCO keypoints |
//!
//! Handles are loaded once and shared read-only; callers receive them already
//! constructed.

mod onnx;

pub mod object_detector;
pub mod pose;
pub mod providers;
pub mod stroke_model;

pub use object_detector::{YoloDetectorConfig, YoloObjectDetector, COCO_PERSON, COCO_SPORTS_BALL};
pub use pose::{OnnxPoseEstimator, PoseModelConfig};
pub use providers::{
    keypoint, Detection, Keypoint, ObjectClass, ObjectDetector, PoseEstimator, PoseKeypoints,
    StrokePhaseClassifier, StrokePrediction,
};
pub use stroke_model::{OnnxStrokeClassifier, StrokeModelConfig};
