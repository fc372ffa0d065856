//! Persistent player numbering and movement metrics.
//!
//! The first time a track id is seen it is mapped to a player number by the
//! half of the frame its center falls in (left half is player 1). Two active
//! tracks never share a number; a track that cannot get a free number is left
//! unassigned until one frees up. Once mapped, a track keeps its number for
//! its whole lifetime, wherever it moves. Tracks unseen for longer than the
//! stale timeout are retired, keeping their accumulated statistics.

use std::collections::BTreeMap;

use tracing::{debug, info};

use courtside_models::{CourtPosition, FitnessStats, PlayerNumber, PositionSample};

use super::identity::{IdentityConfig, IouTracker};
use crate::calibration::CourtCalibration;
use crate::detection::{Detection, ObjectClass, PoseKeypoints};
use crate::geometry::{BoundingBox, PixelPoint};

#[derive(Debug, Clone)]
pub struct PlayerTrackerConfig {
    /// Seconds of video time after which an unseen track is retired
    pub stale_timeout_secs: f64,
    /// EMA weight of the newest center
    pub center_smoothing: f64,
    /// Speeds above this are treated as identity glitches and ignored
    pub max_speed_mps: f64,
    pub identity: IdentityConfig,
}

impl Default for PlayerTrackerConfig {
    fn default() -> Self {
        Self {
            stale_timeout_secs: 1.0,
            center_smoothing: 0.5,
            max_speed_mps: 15.0,
            identity: IdentityConfig::default(),
        }
    }
}

/// One player's tracked state in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerObservation {
    pub frame_index: u64,
    pub timestamp: f64,
    pub track_id: u32,
    pub player_number: PlayerNumber,
    pub bbox: BoundingBox,
    /// Smoothed center in pixels
    pub center: PixelPoint,
    pub court_position: Option<CourtPosition>,
    pub speed_mps: f64,
    pub pose: Option<PoseKeypoints>,
}

#[derive(Debug, Clone)]
struct TrackState {
    track_id: u32,
    player_number: PlayerNumber,
    center: PixelPoint,
    last_seen: f64,
    distance_m: f64,
    max_speed_mps: f64,
    speed_sum: f64,
    speed_samples: u32,
}

#[derive(Debug)]
pub struct PlayerTracker {
    config: PlayerTrackerConfig,
    identities: IouTracker,
    active: BTreeMap<u32, TrackState>,
    retired: Vec<TrackState>,
    positions: Vec<PositionSample>,
}

impl PlayerTracker {
    pub fn new(config: PlayerTrackerConfig) -> Self {
        Self {
            identities: IouTracker::new(config.identity.clone()),
            config,
            active: BTreeMap::new(),
            retired: Vec::new(),
            positions: Vec::new(),
        }
    }

    /// Process one frame's person detections.
    ///
    /// Non-person detections are ignored. Detections without a track id get
    /// one from the built-in IoU tracker.
    pub fn observe(
        &mut self,
        frame_index: u64,
        timestamp: f64,
        frame_width: u32,
        detections: &[Detection],
        calibration: &CourtCalibration,
    ) -> Vec<PlayerObservation> {
        self.evict_stale(timestamp);

        let mut persons: Vec<Detection> = detections
            .iter()
            .filter(|d| d.class == ObjectClass::Person)
            .cloned()
            .collect();
        if persons.iter().any(|d| d.track_id.is_none()) {
            self.identities.assign(&mut persons);
        }

        let mut observations = Vec::new();
        for det in persons {
            let Some(track_id) = det.track_id else { continue };
            let raw_center = det.center();

            let Some(player_number) = self.player_for(track_id, raw_center, frame_width) else {
                continue;
            };

            let scale = calibration.pixel_to_meter();
            let alpha = self.config.center_smoothing;
            let max_speed = self.config.max_speed_mps;
            let (center, speed_mps) = match self.active.get_mut(&track_id) {
                Some(state) => {
                    let dt = timestamp - state.last_seen;
                    let center = PixelPoint::new(
                        alpha * raw_center.x + (1.0 - alpha) * state.center.x,
                        alpha * raw_center.y + (1.0 - alpha) * state.center.y,
                    );
                    let step_m = center.distance_to(&state.center) * scale;
                    let speed = if dt > 0.0 { step_m / dt } else { 0.0 };

                    let speed = if speed <= max_speed {
                        state.distance_m += step_m;
                        state.max_speed_mps = state.max_speed_mps.max(speed);
                        state.speed_sum += speed;
                        state.speed_samples += 1;
                        speed
                    } else {
                        0.0
                    };
                    state.center = center;
                    state.last_seen = timestamp;
                    (center, speed)
                }
                None => {
                    self.active.insert(
                        track_id,
                        TrackState {
                            track_id,
                            player_number,
                            center: raw_center,
                            last_seen: timestamp,
                            distance_m: 0.0,
                            max_speed_mps: 0.0,
                            speed_sum: 0.0,
                            speed_samples: 0,
                        },
                    );
                    (raw_center, 0.0)
                }
            };

            let court_position = calibration.pixel_to_court(&center);
            if let Some(position) = court_position {
                self.positions.push(PositionSample {
                    player_number,
                    timestamp,
                    position,
                });
            }

            observations.push(PlayerObservation {
                frame_index,
                timestamp,
                track_id,
                player_number,
                bbox: det.bbox,
                center,
                court_position,
                speed_mps,
                pose: None,
            });
        }

        observations
    }

    /// Mapped number for an active track, or a new mapping for an unseen one.
    fn player_for(&self, track_id: u32, center: PixelPoint, frame_width: u32) -> Option<PlayerNumber> {
        if let Some(state) = self.active.get(&track_id) {
            return Some(state.player_number);
        }

        let preferred = if center.x < frame_width as f64 / 2.0 {
            PlayerNumber::One
        } else {
            PlayerNumber::Two
        };
        let claimed = |n: PlayerNumber| self.active.values().any(|s| s.player_number == n);

        let assigned = [preferred, preferred.opponent()]
            .into_iter()
            .find(|n| !claimed(*n));
        match assigned {
            Some(n) => info!(track_id, player = %n, "Track assigned to player"),
            None => debug!(track_id, "Both player numbers claimed, track unassigned"),
        }
        assigned
    }

    fn evict_stale(&mut self, now: f64) {
        let timeout = self.config.stale_timeout_secs;
        let stale: Vec<u32> = self
            .active
            .values()
            .filter(|s| now - s.last_seen > timeout)
            .map(|s| s.track_id)
            .collect();
        for track_id in stale {
            if let Some(state) = self.active.remove(&track_id) {
                debug!(track_id, player = %state.player_number, "Track retired");
                self.retired.push(state);
            }
        }
    }

    /// Player number currently mapped to an active track.
    pub fn player_number(&self, track_id: u32) -> Option<PlayerNumber> {
        self.active.get(&track_id).map(|s| s.player_number)
    }

    pub fn active_tracks(&self) -> usize {
        self.active.len()
    }

    /// Movement statistics summed over every track mapped to `player`,
    /// including retired ones.
    pub fn fitness(&self, player: PlayerNumber) -> FitnessStats {
        let tracks = self
            .active
            .values()
            .chain(self.retired.iter())
            .filter(|s| s.player_number == player);

        let (mut distance, mut max_speed, mut sum, mut samples) = (0.0, 0.0f64, 0.0, 0u32);
        for s in tracks {
            distance += s.distance_m;
            max_speed = max_speed.max(s.max_speed_mps);
            sum += s.speed_sum;
            samples += s.speed_samples;
        }

        FitnessStats {
            total_distance_m: distance,
            max_speed_mps: max_speed,
            avg_speed_mps: if samples > 0 { sum / samples as f64 } else { 0.0 },
        }
    }

    pub fn fitness_by_player(&self) -> BTreeMap<PlayerNumber, FitnessStats> {
        PlayerNumber::BOTH
            .iter()
            .map(|p| (*p, self.fitness(*p)))
            .collect()
    }

    /// Court positions of both players over the whole run.
    pub fn positions(&self) -> &[PositionSample] {
        &self.positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibratorConfig;

    const WIDTH: u32 = 1000;

    fn calibration() -> CourtCalibration {
        CourtCalibration::fallback(WIDTH, 600, &CalibratorConfig::default())
    }

    fn person(track_id: u32, cx: f64, cy: f64) -> Detection {
        Detection::new(
            BoundingBox::from_center(cx, cy, 60.0, 150.0),
            ObjectClass::Person,
            0.9,
        )
        .with_track_id(track_id)
    }

    #[test]
    fn test_assignment_by_frame_half() {
        let mut tracker = PlayerTracker::new(PlayerTrackerConfig::default());
        let obs = tracker.observe(0, 0.0, WIDTH, &[person(7, 800.0, 200.0), person(3, 200.0, 500.0)], &calibration());

        assert_eq!(obs.len(), 2);
        assert_eq!(tracker.player_number(3), Some(PlayerNumber::One));
        assert_eq!(tracker.player_number(7), Some(PlayerNumber::Two));
    }

    #[test]
    fn test_number_is_stable_across_midline() {
        let mut tracker = PlayerTracker::new(PlayerTrackerConfig::default());
        let cal = calibration();
        for frame in 0..60u64 {
            // Track 1 starts left and drifts well past the midline.
            let x = 300.0 + frame as f64 * 10.0;
            let obs = tracker.observe(frame, frame as f64 / 30.0, WIDTH, &[person(1, x, 300.0)], &cal);
            assert_eq!(obs[0].player_number, PlayerNumber::One);
        }
    }

    #[test]
    fn test_exclusivity_and_third_track() {
        let mut tracker = PlayerTracker::new(PlayerTrackerConfig::default());
        let cal = calibration();

        // Both tracks start on the left; the second gets the free number.
        let obs = tracker.observe(0, 0.0, WIDTH, &[person(1, 100.0, 300.0), person(2, 200.0, 300.0)], &cal);
        assert_eq!(obs[0].player_number, PlayerNumber::One);
        assert_eq!(obs[1].player_number, PlayerNumber::Two);

        // A third simultaneous track is not observed.
        let obs = tracker.observe(
            1,
            0.033,
            WIDTH,
            &[person(1, 100.0, 300.0), person(2, 200.0, 300.0), person(9, 900.0, 300.0)],
            &cal,
        );
        assert_eq!(obs.len(), 2);
        assert_eq!(tracker.player_number(9), None);
    }

    #[test]
    fn test_stale_track_retired_and_stats_kept() {
        let mut tracker = PlayerTracker::new(PlayerTrackerConfig::default());
        let cal = calibration();
        for frame in 0..10u64 {
            let t = frame as f64 / 10.0;
            tracker.observe(frame, t, WIDTH, &[person(1, 100.0 + frame as f64 * 4.0, 300.0)], &cal);
        }
        let before = tracker.fitness(PlayerNumber::One);
        assert!(before.total_distance_m > 0.0);

        // 1.5 s later a new track appears on the left and takes the freed number.
        let obs = tracker.observe(30, 2.4, WIDTH, &[person(5, 150.0, 300.0)], &cal);
        assert_eq!(tracker.player_number(1), None);
        assert_eq!(obs[0].player_number, PlayerNumber::One);
        assert_eq!(tracker.fitness(PlayerNumber::One), before);
    }

    #[test]
    fn test_speed_and_distance() {
        let mut tracker = PlayerTracker::new(PlayerTrackerConfig {
            center_smoothing: 1.0,
            ..Default::default()
        });
        let cal = calibration();
        // 20 px per 0.1 s at 0.05 m/px is 1 m per step, 10 m/s.
        for frame in 0..11u64 {
            tracker.observe(frame, frame as f64 * 0.1, WIDTH, &[person(1, 100.0 + 20.0 * frame as f64, 300.0)], &cal);
        }
        let fitness = tracker.fitness(PlayerNumber::One);
        assert!((fitness.total_distance_m - 10.0).abs() < 1e-6);
        assert!((fitness.avg_speed_mps - 10.0).abs() < 1e-6);
        assert!((fitness.max_speed_mps - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_implausible_jump_ignored() {
        let mut tracker = PlayerTracker::new(PlayerTrackerConfig {
            center_smoothing: 1.0,
            ..Default::default()
        });
        let cal = calibration();
        tracker.observe(0, 0.0, WIDTH, &[person(1, 100.0, 300.0)], &cal);
        let obs = tracker.observe(1, 0.033, WIDTH, &[person(1, 480.0, 300.0)], &cal);
        assert_eq!(obs[0].speed_mps, 0.0);
        assert_eq!(tracker.fitness(PlayerNumber::One).total_distance_m, 0.0);
    }

    #[test]
    fn test_positions_recorded_for_heatmap() {
        let mut tracker = PlayerTracker::new(PlayerTrackerConfig::default());
        tracker.observe(0, 0.0, WIDTH, &[person(1, 500.0, 300.0)], &calibration());
        let samples = tracker.positions();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].player_number, PlayerNumber::Two);
        assert!((samples[0].position.x() - 5.485).abs() < 0.01);
    }

    #[test]
    fn test_missing_track_ids_are_assigned() {
        let mut tracker = PlayerTracker::new(PlayerTrackerConfig::default());
        let det = Detection::new(BoundingBox::from_center(200.0, 300.0, 60.0, 150.0), ObjectClass::Person, 0.8);
        let obs = tracker.observe(0, 0.0, WIDTH, &[det.clone()], &calibration());
        let id = obs[0].track_id;
        let obs = tracker.observe(1, 0.033, WIDTH, &[det], &calibration());
        assert_eq!(obs[0].track_id, id);
        assert_eq!(obs[0].player_number, PlayerNumber::One);
    }
}
