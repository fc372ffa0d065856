//! Player and ball detection using a YOLOv8 ONNX model.

use std::path::PathBuf;
use std::sync::Mutex;

use image::RgbImage;
use ort::session::Session;
use tracing::{debug, info};

use super::onnx::{create_session, decode_yolo, images_to_nchw, non_maximum_suppression, run_session};
use super::providers::{Detection, ObjectClass, ObjectDetector};
use crate::error::{MediaError, MediaResult};

/// COCO class id for "person".
pub const COCO_PERSON: u32 = 0;
/// COCO class id for "sports ball".
pub const COCO_SPORTS_BALL: u32 = 32;

/// Configuration for a YOLOv8 detector.
#[derive(Debug, Clone)]
pub struct YoloDetectorConfig {
    pub model_path: PathBuf,
    /// Confidence threshold for detections
    pub confidence_threshold: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f64,
    /// Input image size (model expects square input)
    pub input_size: u32,
    /// Number of class scores in the model head
    pub num_classes: usize,
    /// Model class ids the pipeline cares about
    pub class_map: Vec<(u32, ObjectClass)>,
}

impl YoloDetectorConfig {
    /// Stock COCO-trained model: persons and the "sports ball" class.
    pub fn coco(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
            num_classes: 80,
            class_map: vec![
                (COCO_PERSON, ObjectClass::Person),
                (COCO_SPORTS_BALL, ObjectClass::Ball),
            ],
        }
    }

    /// Single-class model trained on tennis balls.
    pub fn ball_only(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            confidence_threshold: 0.15,
            nms_threshold: 0.3,
            input_size: 640,
            num_classes: 1,
            class_map: vec![(0, ObjectClass::Ball)],
        }
    }

    fn map_class(&self, class_id: u32) -> ObjectClass {
        self.class_map
            .iter()
            .find(|(id, _)| *id == class_id)
            .map(|(_, class)| *class)
            .unwrap_or(ObjectClass::Other(class_id))
    }
}

/// Object detector using a YOLOv8 ONNX model.
///
/// The session is created once and guarded by a mutex, so one detector can be
/// shared across concurrent runs.
pub struct YoloObjectDetector {
    session: Mutex<Session>,
    config: YoloDetectorConfig,
}

impl YoloObjectDetector {
    /// Load the model. Fails if the file is missing or cannot be loaded.
    pub fn new(config: YoloDetectorConfig) -> MediaResult<Self> {
        let session = Mutex::new(create_session(&config.model_path)?);
        info!(
            model_path = %config.model_path.display(),
            input_size = config.input_size,
            classes = config.num_classes,
            "Object detector initialized"
        );
        Ok(Self { session, config })
    }

    pub fn config(&self) -> &YoloDetectorConfig {
        &self.config
    }

    /// Turn raw head output into detections in frame pixels.
    fn postprocess(&self, output: &[f32], frame_size: (u32, u32)) -> MediaResult<Vec<Detection>> {
        decode_detections(&self.config, output, frame_size)
    }
}

fn decode_detections(
    config: &YoloDetectorConfig,
    output: &[f32],
    frame_size: (u32, u32),
) -> MediaResult<Vec<Detection>> {
    let (candidates, _) = decode_yolo(
        output,
        4 + config.num_classes,
        config.num_classes,
        config.input_size,
        frame_size,
        config.confidence_threshold,
    )?;

    let detections = non_maximum_suppression(candidates, config.nms_threshold)
        .into_iter()
        .filter_map(|c| match config.map_class(c.class_id) {
            ObjectClass::Other(_) => None,
            class => Some(Detection::new(c.bbox, class, c.score as f64)),
        })
        .collect();
    Ok(detections)
}

impl ObjectDetector for YoloObjectDetector {
    fn detect(&self, frame: &RgbImage) -> MediaResult<Vec<Detection>> {
        let input = images_to_nchw(&[frame], self.config.input_size)?;
        let output = run_session(&self.session, input)
            .map_err(|e| MediaError::detection_failed(e.to_string()))?;
        let detections = self.postprocess(&output, frame.dimensions())?;

        debug!(count = detections.len(), "Object detection completed");
        Ok(detections)
    }

    fn name(&self) -> &'static str {
        "yolov8"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_presets() {
        let coco = YoloDetectorConfig::coco("models/yolov8n.onnx");
        assert_eq!(coco.input_size, 640);
        assert_eq!(coco.map_class(COCO_PERSON), ObjectClass::Person);
        assert_eq!(coco.map_class(COCO_SPORTS_BALL), ObjectClass::Ball);
        assert_eq!(coco.map_class(2), ObjectClass::Other(2));

        let ball = YoloDetectorConfig::ball_only("models/ball.onnx");
        assert_eq!(ball.map_class(0), ObjectClass::Ball);
    }

    #[test]
    fn test_decode_drops_unmapped_classes() {
        let mut config = YoloDetectorConfig::coco("unused.onnx");
        config.num_classes = 3;
        config.class_map = vec![(0, ObjectClass::Person), (2, ObjectClass::Ball)];

        // Three boxes: person, unmapped class 1, ball. Layout is [features, boxes].
        let boxes = [
            [100.0, 100.0, 50.0, 120.0, 0.9, 0.0, 0.0],
            [300.0, 300.0, 40.0, 40.0, 0.0, 0.8, 0.0],
            [500.0, 200.0, 10.0, 10.0, 0.0, 0.0, 0.6],
        ];
        let mut output = vec![0.0f32; 7 * 3];
        for (b, row) in boxes.iter().enumerate() {
            for (f, v) in row.iter().enumerate() {
                output[f * 3 + b] = *v;
            }
        }

        let detections = decode_detections(&config, &output, (640, 640)).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class, ObjectClass::Person);
        assert_eq!(detections[1].class, ObjectClass::Ball);
        assert!((detections[1].confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_missing_model_is_reported() {
        let err = YoloObjectDetector::new(YoloDetectorConfig::coco("/nonexistent/model.onnx"))
            .err()
            .unwrap();
        assert!(matches!(err, MediaError::ModelNotFound(_)));
    }
}
