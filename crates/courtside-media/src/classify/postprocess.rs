//! Shot post-processing shared by every classification strategy.
//!
//! Shots are put in time order and numbered from 1, then walked once in that
//! order. Each shot looks at the ball after contact: the first bounce before
//! the next shot decides the outcome, and the bounce (or, without one, the
//! filtered ball velocity) decides the direction. Serves additionally get a
//! side, a serve number and the point-start flag. A serve is a second serve
//! only when the shot right before it was a fault by the same player from the
//! same side, so outcomes are settled before the next shot is tagged.
//!
//! Court coordinates run from the far-left corner: x across the court, y
//! towards the camera.

use tracing::debug;

use courtside_models::{
    court, CourtPosition, PlayerNumber, ServeDetails, ServePlacement, ServeSide, ServeType, Shot,
    ShotDirection, ShotOutcome,
};

use super::{nearest_ball, time_window, ClassificationInput};
use crate::tracking::{BallObservation, Bounce};

#[derive(Debug, Clone)]
pub struct PostProcessConfig {
    /// Ball observations this close to contact give the contact speed
    pub contact_tolerance_secs: f64,
    /// Ball velocity is averaged over this long after contact
    pub velocity_window_secs: f64,
    /// Bounces this soon after contact are the racket or the toss, not a landing
    pub bounce_min_delay_secs: f64,
    /// Longest a shot's landing is searched for
    pub bounce_window_secs: f64,
    /// A serve landing in that is not returned within this is an ace
    pub ace_return_secs: f64,
    /// A shot landing in with no further shot within this is a winner
    pub winner_return_secs: f64,
    /// Line tolerance for in/out calls, meters
    pub line_tolerance_m: f64,
    /// Lateral to depth velocity ratio above which the ball is travelling across
    pub lateral_ratio: f64,
    pub flat_min_speed_mps: f64,
    pub kick_speed_mps: (f64, f64),
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            contact_tolerance_secs: 0.1,
            velocity_window_secs: 0.5,
            bounce_min_delay_secs: 0.15,
            bounce_window_secs: 3.0,
            ace_return_secs: 3.0,
            winner_return_secs: 5.0,
            line_tolerance_m: 0.1,
            lateral_ratio: 0.3,
            flat_min_speed_mps: 40.0,
            kick_speed_mps: (25.0, 40.0),
        }
    }
}

/// Order, number and annotate raw shots.
pub fn finalize_shots(
    mut shots: Vec<Shot>,
    input: &ClassificationInput<'_>,
    config: &PostProcessConfig,
) -> Vec<Shot> {
    shots.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut bounces: Vec<Bounce> = input.balls.iter().filter_map(|b| b.bounce).collect();
    bounces.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

    let mut last_serve: Option<(PlayerNumber, Option<ServeSide>)> = None;
    for i in 0..shots.len() {
        let (done, rest) = shots.split_at_mut(i);
        let (shot, later) = match rest.split_first_mut() {
            Some(split) => split,
            None => break,
        };
        let previous = done.last();
        let next = later.first().map(|n| (n.timestamp, n.player_number));

        shot.shot_id = i as u32 + 1;
        let t = shot.timestamp;

        shot.speed_mps = nearest_ball(input.balls, t, config.contact_tolerance_secs)
            .map(|b| b.speed_mps)
            .or(shot.speed_mps);
        let velocity = mean_velocity_after(input.balls, t, config.velocity_window_secs);

        let window_end = next.map_or(t + config.bounce_window_secs, |(next_t, _)| {
            next_t.min(t + config.bounce_window_secs)
        });
        let landing = bounces
            .iter()
            .filter(|b| b.timestamp > t + config.bounce_min_delay_secs && b.timestamp <= window_end)
            .find_map(|b| b.court_position);

        if shot.is_serve() {
            tag_serve(shot, previous, &mut last_serve);
            if shot.outcome.is_none() {
                shot.outcome = serve_outcome(shot, landing, next, config);
            }
            let speed = shot.speed_mps.unwrap_or(0.0);
            let landed_in = matches!(shot.outcome, Some(ShotOutcome::InPlay | ShotOutcome::Ace));
            let details = shot.serve.get_or_insert_with(ServeDetails::default);
            details.serve_type = velocity.map(|v| serve_type(speed, v, config));
            details.placement = landing.filter(|_| landed_in).map(placement);
        } else {
            if shot.outcome.is_none() {
                shot.outcome = rally_outcome(shot, landing, next, config);
            }
            if shot.direction.is_none() {
                shot.direction = shot
                    .court_position
                    .and_then(|hitter| direction(hitter, landing, velocity, config));
            }
        }
    }

    debug!(shots = shots.len(), "Shots finalized");
    shots
}

fn tag_serve(
    shot: &mut Shot,
    previous: Option<&Shot>,
    last_serve: &mut Option<(PlayerNumber, Option<ServeSide>)>,
) {
    if shot.serve_side.is_none() {
        shot.serve_side = shot.court_position.map(serve_side);
    }

    let second = previous.is_some_and(|p| {
        p.is_serve()
            && p.player_number == shot.player_number
            && p.serve_side == shot.serve_side
            && p.outcome == Some(ShotOutcome::Fault)
    });
    let serve_number = if second { 2 } else { 1 };

    let new_server = match *last_serve {
        None => true,
        Some((player, side)) => {
            player != shot.player_number
                || matches!((side, shot.serve_side), (Some(a), Some(b)) if a != b)
        }
    };
    if serve_number == 1 && new_server {
        shot.is_point_start = true;
    }
    *last_serve = Some((shot.player_number, shot.serve_side));

    shot.serve.get_or_insert_with(ServeDetails::default).serve_number = Some(serve_number);
}

/// Side a server stands on, from where they stand.
///
/// The near player faces up the image, so their right is +x; the far player
/// faces the camera.
pub fn serve_side(position: CourtPosition) -> ServeSide {
    let near_end = position.y() >= court::NET_Y_M;
    let right_half = position.x() >= court::CENTER_X_M;
    if near_end == right_half {
        ServeSide::Deuce
    } else {
        ServeSide::Ad
    }
}

/// Whether a serve from `server` on `side` landing at `landing` is in.
fn in_service_box(server: CourtPosition, side: ServeSide, landing: CourtPosition, tol: f64) -> bool {
    let server_near = server.y() >= court::NET_Y_M;
    let (y_min, y_max) = if server_near {
        (court::far_service_line_y(), court::NET_Y_M)
    } else {
        (court::NET_Y_M, court::near_service_line_y())
    };
    // Diagonal: near deuce and far ad serve into the left half.
    let target_left = server_near == (side == ServeSide::Deuce);
    let (x_min, x_max) = if target_left {
        (0.0, court::CENTER_X_M)
    } else {
        (court::CENTER_X_M, court::WIDTH_M)
    };

    landing.x() >= x_min - tol
        && landing.x() <= x_max + tol
        && landing.y() >= y_min - tol
        && landing.y() <= y_max + tol
}

fn in_court(position: CourtPosition, tol: f64) -> bool {
    position.x() >= -tol
        && position.x() <= court::WIDTH_M + tol
        && position.y() >= -tol
        && position.y() <= court::LENGTH_M + tol
}

fn serve_outcome(
    shot: &Shot,
    landing: Option<CourtPosition>,
    next: Option<(f64, PlayerNumber)>,
    config: &PostProcessConfig,
) -> Option<ShotOutcome> {
    let landing = landing?;
    let server = shot.court_position?;
    let side = shot.serve_side?;

    if in_service_box(server, side, landing, config.line_tolerance_m) {
        let returned = next.is_some_and(|(next_t, player)| {
            player != shot.player_number && next_t - shot.timestamp <= config.ace_return_secs
        });
        Some(if returned {
            ShotOutcome::InPlay
        } else {
            ShotOutcome::Ace
        })
    } else if shot.serve_number() == Some(2) {
        Some(ShotOutcome::DoubleFault)
    } else {
        Some(ShotOutcome::Fault)
    }
}

fn rally_outcome(
    shot: &Shot,
    landing: Option<CourtPosition>,
    next: Option<(f64, PlayerNumber)>,
    config: &PostProcessConfig,
) -> Option<ShotOutcome> {
    let landing = landing?;
    let tol = config.line_tolerance_m;

    if let Some(hitter) = shot.court_position {
        let hitter_near = hitter.y() >= court::NET_Y_M;
        let landed_near = landing.y() >= court::NET_Y_M;
        if hitter_near == landed_near && in_court(landing, tol) {
            return Some(ShotOutcome::Net);
        }
    }
    if !in_court(landing, tol) {
        return Some(ShotOutcome::Out);
    }
    let answered = next.is_some_and(|(next_t, _)| next_t - shot.timestamp <= config.winner_return_secs);
    Some(if answered {
        ShotOutcome::InPlay
    } else {
        ShotOutcome::Winner
    })
}

fn direction(
    hitter: CourtPosition,
    landing: Option<CourtPosition>,
    velocity: Option<(f64, f64)>,
    config: &PostProcessConfig,
) -> Option<ShotDirection> {
    let hitter_left = hitter.x() < court::CENTER_X_M;
    let crosses = match (landing, velocity) {
        (Some(landing), _) => (landing.x() < court::CENTER_X_M) != hitter_left,
        (None, Some((vx, vy))) => {
            let lateral = vx.abs() > config.lateral_ratio * vy.abs();
            let towards_other_half = if hitter_left { vx > 0.0 } else { vx < 0.0 };
            lateral && towards_other_half
        }
        (None, None) => return None,
    };
    Some(if crosses {
        ShotDirection::CrossCourt
    } else {
        ShotDirection::DownTheLine
    })
}

fn serve_type(speed_mps: f64, (vx, vy): (f64, f64), config: &PostProcessConfig) -> ServeType {
    let (kick_min, kick_max) = config.kick_speed_mps;
    if speed_mps > config.flat_min_speed_mps && vx.abs() < 0.5 * vy.abs() {
        ServeType::Flat
    } else if vx.abs() > 1.5 * vy.abs() {
        ServeType::Slice
    } else if (kick_min..=kick_max).contains(&speed_mps) && vy < 0.0 {
        ServeType::Kick
    } else {
        ServeType::Unknown
    }
}

/// Wide, body or T by distance of the landing from the centre service line.
fn placement(landing: CourtPosition) -> ServePlacement {
    let box_width = court::CENTER_X_M;
    let from_center = (landing.x() - court::CENTER_X_M).abs();
    if from_center < box_width / 3.0 {
        ServePlacement::T
    } else if from_center > 2.0 * box_width / 3.0 {
        ServePlacement::Wide
    } else {
        ServePlacement::Body
    }
}

/// Mean filtered pixel velocity over the window after contact.
fn mean_velocity_after(balls: &[BallObservation], t: f64, window: f64) -> Option<(f64, f64)> {
    let half = window / 2.0;
    let after = balls[time_window(balls, t + half, half, |b| b.timestamp)]
        .iter()
        .filter(|b| b.timestamp > t);

    let (mut sx, mut sy, mut n) = (0.0, 0.0, 0usize);
    for b in after {
        sx += b.velocity.0;
        sy += b.velocity.1;
        n += 1;
    }
    (n > 0).then(|| (sx / n as f64, sy / n as f64))
}
