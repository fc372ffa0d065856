//! Single-person pose estimation with a YOLOv8-pose ONNX model.

use std::path::PathBuf;
use std::sync::Mutex;

use image::RgbImage;
use ort::session::Session;
use tracing::info;

use super::onnx::{create_session, decode_yolo, images_to_nchw, run_session};
use super::providers::{keypoint, Keypoint, PoseEstimator, PoseKeypoints};
use crate::error::{MediaError, MediaResult};

#[derive(Debug, Clone)]
pub struct PoseModelConfig {
    pub model_path: PathBuf,
    pub input_size: u32,
    pub min_confidence: f32,
}

impl PoseModelConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            input_size: 640,
            min_confidence: 0.3,
        }
    }
}

pub struct OnnxPoseEstimator {
    session: Mutex<Session>,
    config: PoseModelConfig,
}

impl OnnxPoseEstimator {
    pub fn new(config: PoseModelConfig) -> MediaResult<Self> {
        let session = Mutex::new(create_session(&config.model_path)?);
        info!(model_path = %config.model_path.display(), "Pose estimator initialized");
        Ok(Self { session, config })
    }
}

/// Box (4) + person score (1) + 17 keypoints of (x, y, confidence).
const POSE_FEATURES: usize = 5 + keypoint::COUNT * 3;

/// Keypoints of the most confident person, normalized to the model input.
fn decode_pose(config: &PoseModelConfig, output: &[f32]) -> MediaResult<Option<PoseKeypoints>> {
    let size = (config.input_size, config.input_size);
    let (candidates, predictions) = decode_yolo(
        output,
        POSE_FEATURES,
        1,
        config.input_size,
        size,
        config.min_confidence,
    )?;

    let Some(best) = candidates.into_iter().max_by(|a, b| a.score.total_cmp(&b.score)) else {
        return Ok(None);
    };

    let row = predictions.row(best.index);
    let input = config.input_size as f64;
    let mut points = [Keypoint::default(); keypoint::COUNT];
    for (k, point) in points.iter_mut().enumerate() {
        let base = 5 + k * 3;
        *point = Keypoint {
            x: (row[base] as f64 / input).clamp(0.0, 1.0),
            y: (row[base + 1] as f64 / input).clamp(0.0, 1.0),
            confidence: row[base + 2] as f64,
        };
    }
    Ok(Some(PoseKeypoints { points }))
}

impl PoseEstimator for OnnxPoseEstimator {
    fn estimate(&self, region: &RgbImage) -> MediaResult<Option<PoseKeypoints>> {
        if region.width() == 0 || region.height() == 0 {
            return Ok(None);
        }
        let input = images_to_nchw(&[region], self.config.input_size)?;
        let output = run_session(&self.session, input)
            .map_err(|e| MediaError::inference(format!("pose: {}", e)))?;
        decode_pose(&self.config, &output)
    }

    fn name(&self) -> &'static str {
        "yolov8-pose"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pose_normalizes_keypoints() {
        let config = PoseModelConfig::new("unused.onnx");
        let mut row = vec![0.0f32; POSE_FEATURES];
        row[..5].copy_from_slice(&[320.0, 320.0, 100.0, 300.0, 0.9]);
        let nose = 5 + keypoint::NOSE * 3;
        row[nose..nose + 3].copy_from_slice(&[320.0, 160.0, 0.95]);

        // Single candidate: [features, 1] has the same layout as the row.
        let pose = decode_pose(&config, &row).unwrap().unwrap();
        let nose = pose.get(keypoint::NOSE).unwrap();
        assert!((nose.x - 0.5).abs() < 1e-6);
        assert!((nose.y - 0.25).abs() < 1e-6);
        assert!((nose.confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_decode_pose_without_person() {
        let config = PoseModelConfig::new("unused.onnx");
        let row = vec![0.0f32; POSE_FEATURES];
        assert!(decode_pose(&config, &row).unwrap().is_none());
    }
}
