//! Stroke-phase classification with a YOLOv8 model trained on the 11 stroke classes.

use std::path::PathBuf;
use std::sync::Mutex;

use image::RgbImage;
use ort::session::Session;
use tracing::{debug, info};

use super::onnx::{create_session, decode_yolo, images_to_nchw, run_session};
use super::providers::{StrokePhaseClassifier, StrokePrediction};
use crate::error::{MediaError, MediaResult};

#[derive(Debug, Clone)]
pub struct StrokeModelConfig {
    pub model_path: PathBuf,
    pub input_size: u32,
    pub num_classes: usize,
    /// Predictions below this confidence are dropped
    pub min_confidence: f32,
    pub batch_size: usize,
}

impl StrokeModelConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            input_size: 640,
            num_classes: 11,
            min_confidence: 0.25,
            batch_size: 8,
        }
    }
}

/// ONNX-backed [`StrokePhaseClassifier`].
pub struct OnnxStrokeClassifier {
    session: Mutex<Session>,
    config: StrokeModelConfig,
}

impl OnnxStrokeClassifier {
    pub fn new(config: StrokeModelConfig) -> MediaResult<Self> {
        let session = Mutex::new(create_session(&config.model_path)?);
        info!(
            model_path = %config.model_path.display(),
            batch_size = config.batch_size,
            "Stroke classifier initialized"
        );
        Ok(Self { session, config })
    }
}

/// Split a batched head output and keep the most confident box per frame.
fn best_per_frame(
    config: &StrokeModelConfig,
    output: &[f32],
    frames: &[&RgbImage],
) -> MediaResult<Vec<Option<StrokePrediction>>> {
    if frames.is_empty() {
        return Ok(Vec::new());
    }
    if output.len() % frames.len() != 0 {
        return Err(MediaError::classification_failed(format!(
            "Output of {} values does not split into {} frames",
            output.len(),
            frames.len()
        )));
    }

    let per_frame = output.len() / frames.len();
    output
        .chunks(per_frame)
        .zip(frames)
        .map(|(chunk, frame)| {
            let (candidates, _) = decode_yolo(
                chunk,
                4 + config.num_classes,
                config.num_classes,
                config.input_size,
                frame.dimensions(),
                config.min_confidence,
            )?;
            Ok(candidates
                .into_iter()
                .max_by(|a, b| a.score.total_cmp(&b.score))
                .map(|c| StrokePrediction {
                    class_id: c.class_id,
                    confidence: c.score as f64,
                    bbox: Some(c.bbox),
                }))
        })
        .collect()
}

impl StrokePhaseClassifier for OnnxStrokeClassifier {
    fn classify_batch(&self, frames: &[&RgbImage]) -> MediaResult<Vec<Option<StrokePrediction>>> {
        if frames.is_empty() {
            return Ok(Vec::new());
        }

        let input = images_to_nchw(frames, self.config.input_size)?;
        let output = run_session(&self.session, input)
            .map_err(|e| MediaError::classification_failed(e.to_string()))?;
        let predictions = best_per_frame(&self.config, &output, frames)?;

        debug!(
            frames = frames.len(),
            hits = predictions.iter().filter(|p| p.is_some()).count(),
            "Stroke batch classified"
        );
        Ok(predictions)
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn name(&self) -> &'static str {
        "yolov8-stroke"
    }
}
