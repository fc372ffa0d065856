//! Strided, batched stroke-phase inference during the tracking pass.
//!
//! The first inference failure stops sampling for the rest of the run; the
//! model-based classifier then refuses the samples and the heuristic path
//! takes over.

use std::sync::Arc;

use image::RgbImage;
use tracing::{debug, warn};

use crate::detection::{StrokePhaseClassifier, StrokePrediction};

/// A stroke prediction for one sampled frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeSample {
    pub frame_index: u64,
    pub timestamp: f64,
    pub prediction: StrokePrediction,
}

/// Everything the sampler collected for a run.
#[derive(Debug, Clone, Default)]
pub struct StrokeSamples {
    pub samples: Vec<StrokeSample>,
    /// Frames sent to the model
    pub frames_sampled: u64,
    /// Frame index and reason of the first inference failure
    pub failure: Option<(u64, String)>,
}

impl StrokeSamples {
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

struct PendingFrame {
    frame_index: u64,
    timestamp: f64,
    image: RgbImage,
}

pub struct StrokeSampler {
    classifier: Arc<dyn StrokePhaseClassifier>,
    stride: u64,
    batch_size: usize,
    pending: Vec<PendingFrame>,
    collected: StrokeSamples,
}

impl StrokeSampler {
    pub fn new(classifier: Arc<dyn StrokePhaseClassifier>, stride: u64, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            classifier,
            stride: stride.max(1),
            batch_size,
            pending: Vec::with_capacity(batch_size),
            collected: StrokeSamples::default(),
        }
    }

    /// Whether this frame index falls on the sampling stride.
    pub fn wants(&self, frame_index: u64) -> bool {
        !self.collected.is_failed() && frame_index % self.stride == 0
    }

    /// Offer a frame. Frames off the stride are ignored; a full batch is run
    /// immediately.
    pub fn offer(&mut self, frame_index: u64, timestamp: f64, image: &RgbImage) {
        if !self.wants(frame_index) {
            return;
        }
        self.pending.push(PendingFrame {
            frame_index,
            timestamp,
            image: image.clone(),
        });
        if self.pending.len() >= self.batch_size {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        let images: Vec<&RgbImage> = batch.iter().map(|p| &p.image).collect();
        self.collected.frames_sampled += batch.len() as u64;

        match self.classifier.classify_batch(&images) {
            Ok(predictions) if predictions.len() == batch.len() => {
                let found = predictions.iter().flatten().count();
                debug!(
                    first_frame = batch[0].frame_index,
                    frames = batch.len(),
                    found,
                    "Stroke batch classified"
                );
                for (frame, prediction) in batch.iter().zip(predictions) {
                    if let Some(prediction) = prediction {
                        self.collected.samples.push(StrokeSample {
                            frame_index: frame.frame_index,
                            timestamp: frame.timestamp,
                            prediction,
                        });
                    }
                }
            }
            Ok(predictions) => {
                self.fail(
                    batch[0].frame_index,
                    format!(
                        "{} returned {} predictions for {} frames",
                        self.classifier.name(),
                        predictions.len(),
                        batch.len()
                    ),
                );
            }
            Err(e) => self.fail(batch[0].frame_index, e.to_string()),
        }
    }

    fn fail(&mut self, frame_index: u64, reason: String) {
        warn!(
            frame = frame_index,
            classifier = self.classifier.name(),
            reason = %reason,
            "Stroke classification failed; sampling stopped"
        );
        self.collected.failure = Some((frame_index, reason));
    }

    /// Run the trailing partial batch and return everything collected.
    pub fn finish(mut self) -> StrokeSamples {
        if !self.collected.is_failed() {
            self.flush();
        }
        self.collected
    }
}
