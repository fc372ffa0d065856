//! Shared ONNX Runtime plumbing for the YOLOv8-family models.
//!
//! Execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when `cuda` feature enabled)
//! - CoreML on macOS
//! - CPU fallback on all platforms

use std::path::Path;
use std::sync::Mutex;

use image::{imageops::FilterType, RgbImage};
use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};
use crate::geometry::BoundingBox;

/// Load a model file into an ONNX Runtime session.
pub(crate) fn create_session(model_path: &Path) -> MediaResult<Session> {
    if !model_path.exists() {
        return Err(MediaError::model_not_found(model_path.display().to_string()));
    }

    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::internal(format!("Failed to read model file: {}", e)))?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!(model = %model_path.display(), "Using CUDA execution provider");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!(model = %model_path.display(), "Using CoreML execution provider");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    info!(model = %model_path.display(), "Using CPU execution provider");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {}", e)))
}

/// Resize each image to `size`x`size` and pack them as a `[N, 3, size, size]`
/// tensor normalized to `[0, 1]`.
pub(crate) fn images_to_nchw(images: &[&RgbImage], size: u32) -> MediaResult<Value> {
    let s = size as usize;
    let mut data: Vec<f32> = Vec::with_capacity(images.len() * 3 * s * s);

    for image in images {
        let resized = image::imageops::resize(*image, size, size, FilterType::Triangle);
        for c in 0..3 {
            for px in resized.pixels() {
                data.push(px[c] as f32 / 255.0);
            }
        }
    }

    let shape = vec![images.len(), 3, s, s];
    Tensor::from_array((shape, data.into_boxed_slice()))
        .map(Value::from)
        .map_err(|e| MediaError::inference(format!("Failed to create tensor: {}", e)))
}

/// Run a single-input model and return the flattened `output0` tensor.
pub(crate) fn run_session(session: &Mutex<Session>, input: Value) -> MediaResult<Vec<f32>> {
    let mut session = session
        .lock()
        .map_err(|_| MediaError::internal("Session lock poisoned"))?;

    let outputs = session
        .run(ort::inputs![input])
        .map_err(|e| MediaError::inference(format!("ONNX inference failed: {}", e)))?;

    let output = outputs
        .get("output0")
        .ok_or_else(|| MediaError::inference("Missing output0 tensor"))?;

    let tensor = output
        .try_extract_tensor::<f32>()
        .map_err(|e| MediaError::inference(format!("Failed to extract tensor: {}", e)))?;

    Ok(tensor.1.to_vec())
}

/// A decoded candidate before non-maximum suppression.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Candidate {
    pub bbox: BoundingBox,
    pub class_id: u32,
    pub score: f32,
    /// Row of the prediction matrix, for heads with extra per-box values
    pub index: usize,
}

/// Decode one image's YOLOv8 head output laid out as `[features, boxes]`,
/// where features are `cx, cy, w, h` followed by `num_classes` scores and
/// then any extra values. Boxes are scaled from the square model input to
/// the original frame size.
pub(crate) fn decode_yolo(
    output: &[f32],
    num_features: usize,
    num_classes: usize,
    input_size: u32,
    frame_size: (u32, u32),
    score_threshold: f32,
) -> MediaResult<(Vec<Candidate>, Array2<f32>)> {
    if num_features < 4 + num_classes || output.is_empty() || output.len() % num_features != 0 {
        return Err(MediaError::inference(format!(
            "Unexpected output size {} for {} features",
            output.len(),
            num_features
        )));
    }
    let num_boxes = output.len() / num_features;

    let predictions = Array2::from_shape_vec((num_features, num_boxes), output.to_vec())
        .map_err(|e| MediaError::inference(format!("Failed to reshape output: {}", e)))?
        .reversed_axes();

    let scale_w = frame_size.0 as f32 / input_size as f32;
    let scale_h = frame_size.1 as f32 / input_size as f32;

    let mut candidates = Vec::new();
    for (i, row) in predictions.outer_iter().enumerate() {
        let (best_class, best_score) = (0..num_classes)
            .map(|c| (c, row[4 + c]))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if best_score < score_threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0] * scale_w, row[1] * scale_h, row[2] * scale_w, row[3] * scale_h);
        let bbox = BoundingBox::from_center(cx as f64, cy as f64, w as f64, h as f64);
        let Some(bbox) = bbox.clip_to(frame_size.0, frame_size.1) else {
            continue;
        };

        candidates.push(Candidate {
            bbox,
            class_id: best_class as u32,
            score: best_score,
            index: i,
        });
    }

    Ok((candidates, predictions))
}

/// Greedy per-class non-maximum suppression.
pub(crate) fn non_maximum_suppression(mut candidates: Vec<Candidate>, iou_threshold: f64) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let overlaps = keep.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !overlaps {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a `[features, boxes]` buffer from per-box rows.
    fn layout(rows: &[Vec<f32>]) -> Vec<f32> {
        let features = rows[0].len();
        let mut out = vec![0.0; features * rows.len()];
        for (b, row) in rows.iter().enumerate() {
            for (f, v) in row.iter().enumerate() {
                out[f * rows.len() + b] = *v;
            }
        }
        out
    }

    #[test]
    fn test_decode_scales_to_frame() {
        let output = layout(&[
            vec![320.0, 320.0, 64.0, 128.0, 0.9, 0.1],
            vec![100.0, 100.0, 10.0, 10.0, 0.1, 0.2],
        ]);
        let (candidates, _) = decode_yolo(&output, 6, 2, 640, (1280, 720), 0.25).unwrap();

        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.class_id, 0);
        let center = c.bbox.center();
        assert!((center.x - 640.0).abs() < 1e-3);
        assert!((center.y - 360.0).abs() < 1e-3);
        assert!((c.bbox.width - 128.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        assert!(decode_yolo(&[0.0; 7], 6, 2, 640, (640, 640), 0.25).is_err());
        assert!(decode_yolo(&[0.0; 12], 5, 2, 640, (640, 640), 0.25).is_err());
    }

    #[test]
    fn test_nms_keeps_best_per_class() {
        let make = |x: f64, class_id: u32, score: f32| Candidate {
            bbox: BoundingBox::new(x, 0.0, 100.0, 100.0),
            class_id,
            score,
            index: 0,
        };
        let kept = non_maximum_suppression(
            vec![make(0.0, 0, 0.5), make(5.0, 0, 0.9), make(5.0, 1, 0.4), make(300.0, 0, 0.3)],
            0.45,
        );
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].score, 0.9);
    }
}
