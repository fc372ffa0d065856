//! Shot classification.
//!
//! Two interchangeable strategies implement [`ShotClassifier`]:
//!
//! | Strategy | Evidence | Confidence |
//! |----------|----------|------------|
//! | [`ModelShotClassifier`] | Sampled stroke-phase predictions | model score |
//! | [`HeuristicShotClassifier`] | Player/ball proximity | fixed |
//!
//! [`build_shot_classifier`] picks one at construction. When the stroke model is
//! available the model strategy is wrapped in a [`FallbackClassifier`], which
//! hands the run to the heuristic strategy if the model path fails. Both
//! strategies emit raw shots; [`finalize_shots`] orders them, assigns ids and
//! adds serve, speed, direction and outcome facts.

pub mod fallback;
pub mod heuristic;
pub mod model;
pub mod postprocess;
pub mod sampler;
pub mod stroke_table;

pub use fallback::FallbackClassifier;
pub use heuristic::{HeuristicConfig, HeuristicShotClassifier};
pub use model::{ModelClassifierConfig, ModelShotClassifier};
pub use postprocess::{finalize_shots, PostProcessConfig};
pub use sampler::{StrokeSample, StrokeSampler, StrokeSamples};
pub use stroke_table::{stroke_class, StrokeClass, STROKE_CLASS_COUNT};

use courtside_models::Shot;

use crate::calibration::CourtCalibration;
use crate::error::MediaResult;
use crate::tracking::{BallObservation, PlayerObservation};

/// Everything the tracking pass produced for one video.
///
/// Player and ball observations are in frame order.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationInput<'a> {
    pub players: &'a [PlayerObservation],
    pub balls: &'a [BallObservation],
    /// `None` when no stroke model sampled this run
    pub strokes: Option<&'a StrokeSamples>,
    pub calibration: &'a CourtCalibration,
}

/// A shot classification strategy.
pub trait ShotClassifier: Send + Sync {
    /// Produce raw shots for the whole run, in any order.
    fn classify(&self, input: &ClassificationInput<'_>) -> MediaResult<Vec<Shot>>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Default)]
pub struct ClassifierConfig {
    pub model: ModelClassifierConfig,
    pub heuristic: HeuristicConfig,
}

/// Select the classification strategy for a run.
pub fn build_shot_classifier(
    config: &ClassifierConfig,
    stroke_model_available: bool,
) -> Box<dyn ShotClassifier> {
    let heuristic = HeuristicShotClassifier::new(config.heuristic.clone());
    if stroke_model_available {
        Box::new(FallbackClassifier::new(
            Box::new(ModelShotClassifier::new(config.model.clone())),
            Box::new(heuristic),
        ))
    } else {
        Box::new(heuristic)
    }
}

/// Indices of observations whose timestamp lies within `tolerance` of `t`.
///
/// `items` must be sorted by timestamp.
pub(crate) fn time_window<T>(
    items: &[T],
    t: f64,
    tolerance: f64,
    timestamp: impl Fn(&T) -> f64,
) -> std::ops::Range<usize> {
    let start = items.partition_point(|i| timestamp(i) < t - tolerance);
    let end = items.partition_point(|i| timestamp(i) <= t + tolerance);
    start..end.max(start)
}

/// The measured ball observation closest in time to `t`, within `tolerance`.
pub(crate) fn nearest_ball(
    balls: &[BallObservation],
    t: f64,
    tolerance: f64,
) -> Option<&BallObservation> {
    balls[time_window(balls, t, tolerance, |b| b.timestamp)]
        .iter()
        .filter(|b| b.is_measured())
        .min_by(|a, b| (a.timestamp - t).abs().total_cmp(&(b.timestamp - t).abs()))
}
