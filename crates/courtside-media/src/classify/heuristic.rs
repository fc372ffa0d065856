//! Shots from player and ball proximity alone.
//!
//! A contact is a player observation whose nearest-in-time ball measurement
//! lies within the contact distance of the player's box. Contacts by one
//! player closer together than the refractory period are one swing; the
//! closest approach wins.
//!
//! Type rules, first match wins:
//! 1. serve: first contact after a quiet period, player near a baseline, ball
//!    above the player (or a wrist raised above the head)
//! 2. volley: player within the near-net band
//! 3. overhead: ball well above the player's center, or a raised wrist
//! 4. forehand or backhand by which side of the body the ball is on, assuming
//!    a right-handed player

use std::collections::HashMap;

use tracing::info;

use courtside_models::{court, ClassificationSource, CourtPosition, PlayerNumber, Shot, ShotType};

use super::{nearest_ball, time_window, ClassificationInput, ShotClassifier};
use crate::error::MediaResult;
use crate::tracking::{BallObservation, PlayerObservation};

#[derive(Debug, Clone)]
pub struct HeuristicConfig {
    /// Maximum player-box to ball distance for a contact, pixels
    pub contact_distance_px: f64,
    /// Ball this far above the player center counts as overhead, pixels
    pub overhead_margin_px: f64,
    /// Distance from the net within which a shot is a volley, meters
    pub near_net_m: f64,
    /// Confidence assigned to every heuristic shot
    pub confidence: f64,
    /// Maximum player/ball time offset when pairing observations
    pub time_tolerance_secs: f64,
    /// Contacts by one player closer than this are one swing
    pub refractory_secs: f64,
    /// Quiet period before a contact that can be a serve
    pub serve_gap_secs: f64,
    /// Distance from a baseline within which a player can be serving, meters
    pub baseline_margin_m: f64,
    pub wrist_min_confidence: f64,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            contact_distance_px: 50.0,
            overhead_margin_px: 50.0,
            near_net_m: 3.0,
            confidence: 0.7,
            time_tolerance_secs: 0.1,
            refractory_secs: 0.5,
            serve_gap_secs: 5.0,
            baseline_margin_m: 2.0,
            wrist_min_confidence: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Contact<'a> {
    player: &'a PlayerObservation,
    ball: &'a BallObservation,
    distance: f64,
}

#[derive(Debug, Clone, Default)]
pub struct HeuristicShotClassifier {
    config: HeuristicConfig,
}

impl HeuristicShotClassifier {
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    fn contacts<'a>(&self, input: &ClassificationInput<'a>) -> Vec<Contact<'a>> {
        let players: &'a [PlayerObservation] = input.players;
        let balls: &'a [BallObservation] = input.balls;

        let mut contacts: Vec<Contact<'a>> = Vec::new();
        // Index of each player's most recent kept contact
        let mut last_kept: HashMap<PlayerNumber, usize> = HashMap::new();
        for player in players {
            let Some(ball) = nearest_ball(balls, player.timestamp, self.config.time_tolerance_secs)
            else {
                continue;
            };
            let distance = player.bbox.distance_to_point(&ball.position);
            if distance >= self.config.contact_distance_px {
                continue;
            }
            let contact = Contact {
                player,
                ball,
                distance,
            };

            // Same swing: the last kept contact by this player within the
            // refractory period.
            let same_swing = last_kept.get(&player.player_number).copied().filter(|&i| {
                player.timestamp - contacts[i].player.timestamp <= self.config.refractory_secs
            });
            match same_swing {
                Some(i) if contacts[i].distance <= distance => {}
                Some(i) => contacts[i] = contact,
                None => {
                    last_kept.insert(player.player_number, contacts.len());
                    contacts.push(contact);
                }
            }
        }
        contacts
    }

    fn raised_wrist(&self, contact: &Contact<'_>, players: &[PlayerObservation]) -> bool {
        let t = contact.player.timestamp;
        players[time_window(players, t, self.config.time_tolerance_secs * 2.0, |p| p.timestamp)]
            .iter()
            .filter(|p| p.player_number == contact.player.player_number)
            .filter_map(|p| p.pose.as_ref())
            .any(|pose| pose.wrist_above_head(self.config.wrist_min_confidence))
    }

    fn near_baseline(&self, position: Option<CourtPosition>) -> bool {
        position.is_some_and(|p| {
            p.y() <= self.config.baseline_margin_m
                || p.y() >= court::LENGTH_M - self.config.baseline_margin_m
        })
    }

    fn shot_type(&self, contact: &Contact<'_>, raised_wrist: bool, may_serve: bool) -> ShotType {
        let player = contact.player;
        let ball_above =
            contact.ball.position.y < player.center.y - self.config.overhead_margin_px;

        if may_serve && self.near_baseline(player.court_position) && (ball_above || raised_wrist) {
            return ShotType::Serve;
        }
        if player
            .court_position
            .is_some_and(|p| (p.y() - court::NET_Y_M).abs() < self.config.near_net_m)
        {
            return ShotType::Volley;
        }
        if ball_above || raised_wrist {
            return ShotType::Overhead;
        }

        // The near player faces away from the camera, so their right hand is
        // on the image right; the far player faces the camera.
        let near_end = player
            .court_position
            .map_or(true, |p| p.y() >= court::NET_Y_M);
        let ball_on_image_right = contact.ball.position.x >= player.center.x;
        if near_end == ball_on_image_right {
            ShotType::Forehand
        } else {
            ShotType::Backhand
        }
    }
}

impl ShotClassifier for HeuristicShotClassifier {
    fn classify(&self, input: &ClassificationInput<'_>) -> MediaResult<Vec<Shot>> {
        let contacts = self.contacts(input);

        let mut shots = Vec::with_capacity(contacts.len());
        let mut last_contact: Option<f64> = None;
        for contact in &contacts {
            let t = contact.player.timestamp;
            let may_serve = last_contact.map_or(true, |last| t - last >= self.config.serve_gap_secs);
            let raised_wrist = self.raised_wrist(contact, input.players);
            let shot_type = self.shot_type(contact, raised_wrist, may_serve);

            let mut shot = Shot::new(
                contact.player.player_number,
                t,
                shot_type,
                self.config.confidence,
                ClassificationSource::Heuristic,
            );
            shot.court_position = contact.player.court_position;
            shots.push(shot);
            last_contact = Some(t);
        }

        info!(
            player_observations = input.players.len(),
            ball_observations = input.balls.len(),
            shots = shots.len(),
            "Heuristic classification complete"
        );
        Ok(shots)
    }

    fn name(&self) -> &'static str {
        "heuristic"
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::detection::{keypoint, Keypoint, PoseKeypoints};

    fn classify(players: &[PlayerObservation], balls: &[BallObservation]) -> Vec<Shot> {
        let calibration = calibration();
        let input = ClassificationInput {
            players,
            balls,
            strokes: None,
            calibration: &calibration,
        };
        HeuristicShotClassifier::default().classify(&input).unwrap()
    }

    #[test]
    fn test_contact_frames_collapse_to_one_shot() {
        // Player 1 on the near baseline; ball passes close for three frames.
        let players: Vec<_> = (0..6)
            .map(|i| player(i, i as f64 / 30.0, PlayerNumber::One, 400.0, 450.0))
            .collect();
        let balls = vec![
            ball(0, 0.0, 600.0, 450.0, (0.0, 0.0)),
            ball(1, 1.0 / 30.0, 440.0, 450.0, (0.0, 0.0)),
            ball(2, 2.0 / 30.0, 420.0, 450.0, (0.0, 0.0)),
            ball(3, 3.0 / 30.0, 430.0, 450.0, (0.0, 0.0)),
            ball(4, 4.0 / 30.0, 600.0, 450.0, (0.0, 0.0)),
        ];

        let shots = classify(&players, &balls);
        assert_eq!(shots.len(), 1);
        assert!((shots[0].timestamp - 2.0 / 30.0).abs() < 1e-9);
        assert_eq!(shots[0].confidence, 0.7);
        assert_eq!(shots[0].source, ClassificationSource::Heuristic);
        // Ball on the image right of a near-end player
        assert_eq!(shots[0].shot_type, ShotType::Forehand);
    }

    #[test]
    fn test_swings_are_tracked_per_player() {
        // Both players reach the ball in the same frames; player one gets
        // closest on frame 2 and swings again a second later.
        let mut players = Vec::new();
        let mut balls = Vec::new();
        for i in 0..4u64 {
            let t = i as f64 / 30.0;
            players.push(player(i, t, PlayerNumber::One, 400.0, 300.0));
            players.push(player(i, t, PlayerNumber::Two, 470.0, 300.0));
            let x = if i == 2 { 432.0 } else { 435.0 };
            balls.push(ball(i, t, x, 300.0, (0.0, 0.0)));
        }
        players.push(player(30, 1.0, PlayerNumber::One, 400.0, 300.0));
        balls.push(ball(30, 1.0, 435.0, 300.0, (0.0, 0.0)));

        let shots: Vec<(PlayerNumber, f64)> = classify(&players, &balls)
            .iter()
            .map(|s| (s.player_number, s.timestamp))
            .collect();
        assert_eq!(shots.len(), 3, "{:?}", shots);
        assert_eq!(shots[0].0, PlayerNumber::One);
        assert!((shots[0].1 - 2.0 / 30.0).abs() < 1e-9);
        assert_eq!(shots[1], (PlayerNumber::Two, 0.0));
        assert_eq!(shots[2], (PlayerNumber::One, 1.0));
    }

    #[test]
    fn test_long_match_keeps_every_swing() {
        let mut players = Vec::new();
        let mut balls = Vec::new();
        for swing in 0..2000u64 {
            for offset in 0..3 {
                let frame = swing * 30 + offset;
                let t = frame as f64 / 30.0;
                players.push(player(frame, t, PlayerNumber::One, 400.0, 450.0));
                balls.push(ball(frame, t, 440.0, 450.0, (0.0, 0.0)));
            }
        }
        assert_eq!(classify(&players, &balls).len(), 2000);
    }

    #[test]
    fn test_serve_then_volley_then_overhead() {
        let players = vec![
            // Near baseline, ball above: serve
            player(0, 0.0, PlayerNumber::One, 600.0, 530.0),
            // Far player close to the net
            player(30, 1.0, PlayerNumber::Two, 400.0, 250.0),
            // Mid court, ball high: overhead (no longer a serve, too soon)
            player(60, 2.0, PlayerNumber::One, 500.0, 400.0),
            // Far player on their baseline, ball to the image right: backhand
            player(90, 3.0, PlayerNumber::Two, 400.0, 80.0),
        ];
        let balls = vec![
            ball(0, 0.0, 600.0, 470.0, (0.0, -5.0)),
            ball(30, 1.0, 420.0, 240.0, (0.0, 5.0)),
            ball(60, 2.0, 500.0, 345.0, (0.0, -5.0)),
            ball(90, 3.0, 430.0, 80.0, (0.0, 5.0)),
        ];

        let types: Vec<ShotType> = classify(&players, &balls).iter().map(|s| s.shot_type).collect();
        assert_eq!(
            types,
            vec![
                ShotType::Serve,
                ShotType::Volley,
                ShotType::Overhead,
                ShotType::Backhand
            ]
        );
    }

    #[test]
    fn test_raised_wrist_marks_serve() {
        let mut points = [Keypoint::default(); keypoint::COUNT];
        points[keypoint::NOSE] = Keypoint {
            x: 0.5,
            y: 0.2,
            confidence: 0.9,
        };
        points[keypoint::RIGHT_WRIST] = Keypoint {
            x: 0.6,
            y: 0.05,
            confidence: 0.8,
        };
        let mut server = player(0, 0.0, PlayerNumber::Two, 400.0, 80.0);
        server.pose = Some(PoseKeypoints { points });

        // Ball level with the player's center
        let balls = vec![ball(0, 0.0, 430.0, 80.0, (0.0, 5.0))];
        let shots = classify(&[server], &balls);
        assert_eq!(shots[0].shot_type, ShotType::Serve);
    }

    #[test]
    fn test_far_ball_is_not_a_contact() {
        let players = vec![player(0, 0.0, PlayerNumber::One, 400.0, 450.0)];
        let balls = vec![ball(0, 0.0, 500.0, 450.0, (0.0, 0.0))];
        assert!(classify(&players, &balls).is_empty());
    }
}
