//! Primary strategy with a fallback taking over when it fails.

use courtside_models::Shot;
use tracing::warn;

use super::{ClassificationInput, ShotClassifier};
use crate::error::MediaResult;

pub struct FallbackClassifier {
    primary: Box<dyn ShotClassifier>,
    fallback: Box<dyn ShotClassifier>,
}

impl FallbackClassifier {
    pub fn new(primary: Box<dyn ShotClassifier>, fallback: Box<dyn ShotClassifier>) -> Self {
        Self { primary, fallback }
    }
}

impl ShotClassifier for FallbackClassifier {
    fn classify(&self, input: &ClassificationInput<'_>) -> MediaResult<Vec<Shot>> {
        match self.primary.classify(input) {
            Ok(shots) => Ok(shots),
            Err(e) => {
                warn!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %e,
                    "Shot classification falling back"
                );
                metrics::counter!("courtside_classifier_fallbacks_total").increment(1);
                self.fallback.classify(input)
            }
        }
    }

    fn name(&self) -> &'static str {
        "model+fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::super::sampler::StrokeSamples;
    use super::super::test_support::*;
    use super::super::{HeuristicShotClassifier, ModelShotClassifier};
    use super::*;
    use courtside_models::{ClassificationSource, PlayerNumber};

    #[test]
    fn test_model_failure_hands_over_to_heuristic() {
        let players = vec![player(0, 0.0, PlayerNumber::One, 400.0, 450.0)];
        let balls = vec![ball(0, 0.0, 420.0, 450.0, (0.0, 0.0))];
        let calibration = calibration();
        let failed = StrokeSamples {
            samples: Vec::new(),
            frames_sampled: 8,
            failure: Some((0, "session error".to_string())),
        };
        let input = ClassificationInput {
            players: &players,
            balls: &balls,
            strokes: Some(&failed),
            calibration: &calibration,
        };

        let classifier = FallbackClassifier::new(
            Box::new(ModelShotClassifier::default()),
            Box::new(HeuristicShotClassifier::default()),
        );
        let shots = classifier.classify(&input).unwrap();
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].source, ClassificationSource::Heuristic);
    }

    #[test]
    fn test_model_success_is_used() {
        let calibration = calibration();
        let empty = StrokeSamples::default();
        let players = vec![player(0, 0.0, PlayerNumber::One, 400.0, 450.0)];
        let balls = vec![ball(0, 0.0, 420.0, 450.0, (0.0, 0.0))];
        let input = ClassificationInput {
            players: &players,
            balls: &balls,
            strokes: Some(&empty),
            calibration: &calibration,
        };

        let classifier = FallbackClassifier::new(
            Box::new(ModelShotClassifier::default()),
            Box::new(HeuristicShotClassifier::default()),
        );
        // The model saw no strokes; its empty answer stands.
        assert!(classifier.classify(&input).unwrap().is_empty());
    }
}
