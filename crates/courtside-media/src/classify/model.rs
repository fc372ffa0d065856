//! Shots from sampled stroke-phase predictions.
//!
//! Each confident prediction is tied to the player observed closest to it
//! within the association tolerance. Consecutive emitting predictions of the
//! same stroke type for one player form a single swing and a single shot,
//! timed at the first `stroke` phase sample (or the first `finish` sample when
//! the contact frame was not sampled). A ready or toss phase closes the swing.

use std::collections::BTreeMap;

use tracing::{debug, info};

use courtside_models::{ClassificationSource, PlayerNumber, Shot, ShotType, StrokePhase};

use super::sampler::StrokeSample;
use super::stroke_table::stroke_class;
use super::{nearest_ball, time_window, ClassificationInput, ShotClassifier};
use crate::error::{MediaError, MediaResult};
use crate::tracking::PlayerObservation;

#[derive(Debug, Clone)]
pub struct ModelClassifierConfig {
    /// Predictions below this score are ignored
    pub min_confidence: f64,
    /// Maximum time between a prediction and the player observation it is tied to
    pub association_tolerance_secs: f64,
    /// Samples further apart than this never belong to one swing
    pub swing_gap_secs: f64,
}

impl Default for ModelClassifierConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.25,
            association_tolerance_secs: 0.1,
            swing_gap_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
struct Swing {
    shot_type: ShotType,
    timestamp: f64,
    phase: StrokePhase,
    confidence: f64,
    last_seen: f64,
    observation: PlayerObservation,
}

impl Swing {
    fn into_shot(self, player: PlayerNumber) -> Shot {
        let mut shot = Shot::new(
            player,
            self.timestamp,
            self.shot_type,
            self.confidence,
            ClassificationSource::Model,
        );
        shot.stroke_phase = Some(self.phase);
        shot.court_position = self.observation.court_position;
        shot
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelShotClassifier {
    config: ModelClassifierConfig,
}

impl ModelShotClassifier {
    pub fn new(config: ModelClassifierConfig) -> Self {
        Self { config }
    }

    /// The player observation a prediction belongs to.
    fn associate<'a>(
        &self,
        sample: &StrokeSample,
        input: &ClassificationInput<'a>,
    ) -> Option<&'a PlayerObservation> {
        let tolerance = self.config.association_tolerance_secs;
        let t = sample.timestamp;
        let players: &'a [PlayerObservation] = input.players;
        let candidates = &players[time_window(players, t, tolerance, |p| p.timestamp)];
        if candidates.is_empty() {
            return None;
        }
        let closest_in_time = |a: &&PlayerObservation, b: &&PlayerObservation| {
            (a.timestamp - t).abs().total_cmp(&(b.timestamp - t).abs())
        };

        if let Some(bbox) = sample.prediction.bbox {
            let center = bbox.center();
            return candidates.iter().max_by(|a, b| {
                a.bbox
                    .iou(&bbox)
                    .total_cmp(&b.bbox.iou(&bbox))
                    .then_with(|| {
                        b.center
                            .distance_to(&center)
                            .total_cmp(&a.center.distance_to(&center))
                    })
                    .then_with(|| closest_in_time(b, a))
            });
        }

        // Without a box, the swinging player is the one nearest the ball.
        if let Some(ball) = nearest_ball(input.balls, t, tolerance) {
            return candidates.iter().min_by(|a, b| {
                a.center
                    .distance_to(&ball.position)
                    .total_cmp(&b.center.distance_to(&ball.position))
                    .then_with(|| closest_in_time(a, b))
            });
        }

        let first = candidates[0].player_number;
        if candidates.iter().all(|p| p.player_number == first) {
            candidates.iter().min_by(closest_in_time)
        } else {
            None
        }
    }
}

impl ShotClassifier for ModelShotClassifier {
    fn classify(&self, input: &ClassificationInput<'_>) -> MediaResult<Vec<Shot>> {
        let strokes = input
            .strokes
            .ok_or_else(|| MediaError::classification_failed("No stroke samples for this run"))?;
        if let Some((frame, reason)) = &strokes.failure {
            return Err(MediaError::classification_failed(format!(
                "Stroke model failed at frame {frame}: {reason}"
            )));
        }

        let mut open: BTreeMap<PlayerNumber, Swing> = BTreeMap::new();
        let mut shots = Vec::new();
        let mut unassociated = 0usize;

        for sample in &strokes.samples {
            let prediction = &sample.prediction;
            if prediction.confidence < self.config.min_confidence {
                continue;
            }
            let Some(class) = stroke_class(prediction.class_id) else {
                debug!(class_id = prediction.class_id, "Unknown stroke class");
                continue;
            };
            let Some(observation) = self.associate(sample, input) else {
                unassociated += 1;
                continue;
            };
            let player = observation.player_number;

            let Some(shot_type) = class.emitted_shot() else {
                if let Some(swing) = open.remove(&player) {
                    shots.push(swing.into_shot(player));
                }
                continue;
            };

            let t = sample.timestamp;
            let continues = open.get(&player).is_some_and(|s| {
                s.shot_type == shot_type && t - s.last_seen <= self.config.swing_gap_secs
            });

            if continues {
                if let Some(swing) = open.get_mut(&player) {
                    if class.phase == StrokePhase::Stroke && swing.phase != StrokePhase::Stroke {
                        swing.timestamp = t;
                        swing.phase = StrokePhase::Stroke;
                        swing.observation = observation.clone();
                    }
                    swing.confidence = swing.confidence.max(prediction.confidence);
                    swing.last_seen = t;
                }
            } else {
                let swing = Swing {
                    shot_type,
                    timestamp: t,
                    phase: class.phase,
                    confidence: prediction.confidence,
                    last_seen: t,
                    observation: observation.clone(),
                };
                if let Some(previous) = open.insert(player, swing) {
                    shots.push(previous.into_shot(player));
                }
            }
        }

        shots.extend(open.into_iter().map(|(player, swing)| swing.into_shot(player)));
        shots.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        info!(
            samples = strokes.samples.len(),
            shots = shots.len(),
            unassociated,
            "Model classification complete"
        );
        Ok(shots)
    }

    fn name(&self) -> &'static str {
        "model"
    }
}

#[cfg(test)]
mod tests {
    use super::super::sampler::StrokeSamples;
    use super::super::test_support::*;
    use super::*;
    use crate::detection::StrokePrediction;
    use crate::geometry::BoundingBox;

    fn sample(t: f64, class_id: u32, confidence: f64, bbox: Option<BoundingBox>) -> StrokeSample {
        StrokeSample {
            frame_index: (t * 30.0).round() as u64,
            timestamp: t,
            prediction: StrokePrediction {
                class_id,
                confidence,
                bbox,
            },
        }
    }

    fn players_over(range: std::ops::Range<u64>) -> Vec<PlayerObservation> {
        range
            .flat_map(|i| {
                let t = i as f64 / 30.0;
                [
                    player(i, t, PlayerNumber::One, 300.0, 500.0),
                    player(i, t, PlayerNumber::Two, 700.0, 120.0),
                ]
            })
            .collect()
    }

    fn near_box() -> Option<BoundingBox> {
        Some(BoundingBox::from_center(305.0, 500.0, 60.0, 150.0))
    }

    fn far_box() -> Option<BoundingBox> {
        Some(BoundingBox::from_center(700.0, 118.0, 60.0, 150.0))
    }

    #[test]
    fn test_one_shot_per_swing() {
        let players = players_over(0..120);
        let calibration = calibration();
        let strokes = StrokeSamples {
            samples: vec![
                sample(0.5, 4, 0.8, near_box()),  // forehand-ready
                sample(0.6, 3, 0.7, near_box()),  // forehand-finish
                sample(0.7, 5, 0.9, near_box()),  // forehand-stroke
                sample(0.8, 3, 0.6, near_box()),  // forehand-finish
                sample(1.5, 6, 0.9, near_box()),  // ready-position
                sample(2.0, 2, 0.85, far_box()),  // backhand-stroke
                sample(2.1, 2, 0.10, near_box()), // below threshold
            ],
            frames_sampled: 20,
            failure: None,
        };
        let input = ClassificationInput {
            players: &players,
            balls: &[],
            strokes: Some(&strokes),
            calibration: &calibration,
        };

        let shots = ModelShotClassifier::default().classify(&input).unwrap();
        assert_eq!(shots.len(), 2);

        assert_eq!(shots[0].player_number, PlayerNumber::One);
        assert_eq!(shots[0].shot_type, ShotType::Forehand);
        assert_eq!(shots[0].timestamp, 0.7);
        assert_eq!(shots[0].stroke_phase, Some(StrokePhase::Stroke));
        assert_eq!(shots[0].confidence, 0.9);
        assert_eq!(shots[0].source, ClassificationSource::Model);
        assert!(shots[0].court_position.is_some());

        assert_eq!(shots[1].player_number, PlayerNumber::Two);
        assert_eq!(shots[1].shot_type, ShotType::Backhand);
    }

    #[test]
    fn test_type_change_starts_new_swing() {
        let players = players_over(0..60);
        let calibration = calibration();
        let strokes = StrokeSamples {
            samples: vec![
                sample(0.2, 8, 0.9, near_box()), // serve_hit
                sample(0.4, 5, 0.9, near_box()), // forehand-stroke
            ],
            frames_sampled: 2,
            failure: None,
        };
        let input = ClassificationInput {
            players: &players,
            balls: &[],
            strokes: Some(&strokes),
            calibration: &calibration,
        };

        let shots = ModelShotClassifier::default().classify(&input).unwrap();
        let types: Vec<ShotType> = shots.iter().map(|s| s.shot_type).collect();
        assert_eq!(types, vec![ShotType::Serve, ShotType::Forehand]);
    }

    #[test]
    fn test_boxless_prediction_uses_ball() {
        let players = players_over(0..30);
        let balls = vec![ball(15, 0.5, 690.0, 130.0, (0.0, 5.0))];
        let calibration = calibration();
        let strokes = StrokeSamples {
            samples: vec![sample(0.5, 5, 0.9, None)],
            frames_sampled: 1,
            failure: None,
        };
        let input = ClassificationInput {
            players: &players,
            balls: &balls,
            strokes: Some(&strokes),
            calibration: &calibration,
        };

        let shots = ModelShotClassifier::default().classify(&input).unwrap();
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].player_number, PlayerNumber::Two);
    }

    #[test]
    fn test_failed_or_missing_samples_error() {
        let calibration = calibration();
        let failed = StrokeSamples {
            samples: Vec::new(),
            frames_sampled: 8,
            failure: Some((40, "boom".to_string())),
        };
        let mut input = ClassificationInput {
            players: &[],
            balls: &[],
            strokes: Some(&failed),
            calibration: &calibration,
        };
        let classifier = ModelShotClassifier::default();
        assert!(classifier.classify(&input).is_err());

        input.strokes = None;
        assert!(classifier.classify(&input).is_err());
    }
}
