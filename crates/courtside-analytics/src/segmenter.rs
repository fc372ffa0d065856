//! State machine grouping an ordered shot stream into rallies.
//!
//! The segmenter consumes shots one at a time and closes rallies as soon as
//! their boundary is known. It is a pure function of its input: the same shot
//! sequence always yields the same rallies.
//!
//! # State Machine
//!
//! ```text
//!                 first shot / gap >= continuation
//!      ┌──────┐ ───────────────────────────────────▶ ┌──────┐
//!      │ Idle │                                      │ Open │◀──┐ gap < continuation,
//!      └──────┘ ◀─────────────────────────────────── └──────┘───┘ second serve
//!                  terminal outcome (winner/error)       │
//!                                                        │ point-start serve,
//!                                                        │ new (player, side),
//!                                                        │ long gap before serve
//!                                                        ▼
//!                                              close + open at this shot
//! ```
//!
//! Rules are evaluated in order for every incoming shot:
//! 1. A new-point serve closes the open rally (`point_end`) and opens a new one.
//! 2. A second serve after a fault by the same player from the same side is appended.
//! 3. A shot within the continuation gap of the open rally is appended.
//! 4. Anything else closes the open rally (`play_stopped`) and opens a new one.
//! 5. A terminal outcome on the appended shot closes the rally immediately.

use serde::{Deserialize, Serialize};
use tracing::debug;

use courtside_models::{
    PlayerNumber, Rally, RallyEndReason, ServeSide, Shot, ShotOutcome, ShotSpan,
};

/// Gap thresholds for rally segmentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// A shot closer than this to the previous shot continues the rally (seconds)
    pub continuation_gap_secs: f64,
    /// A serve without side information after a gap longer than this starts a new point
    pub serve_override_gap_secs: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            continuation_gap_secs: 5.0,
            serve_override_gap_secs: 10.0,
        }
    }
}

/// Summary of the previous shot needed by the second-serve rule.
#[derive(Debug, Clone, Copy)]
struct PreviousShot {
    player: PlayerNumber,
    is_serve: bool,
    side: Option<ServeSide>,
    outcome: Option<ShotOutcome>,
}

/// Rally being accumulated.
#[derive(Debug, Clone)]
struct OpenRally {
    first_index: usize,
    start_time: f64,
    end_time: f64,
    last_time: f64,
    player1_shots: u32,
    player2_shots: u32,
    shot_ids: Vec<u32>,
}

impl OpenRally {
    fn start(index: usize, shot: &Shot) -> Self {
        let mut rally = Self {
            first_index: index,
            start_time: shot.timestamp,
            end_time: shot.timestamp,
            last_time: shot.timestamp,
            player1_shots: 0,
            player2_shots: 0,
            shot_ids: Vec::new(),
        };
        rally.push(shot);
        rally
    }

    fn push(&mut self, shot: &Shot) {
        match shot.player_number {
            PlayerNumber::One => self.player1_shots += 1,
            PlayerNumber::Two => self.player2_shots += 1,
        }
        self.end_time = self.end_time.max(shot.timestamp);
        self.last_time = shot.timestamp;
        self.shot_ids.push(shot.shot_id);
    }

    fn majority_winner(&self) -> Option<PlayerNumber> {
        use std::cmp::Ordering;
        match self.player1_shots.cmp(&self.player2_shots) {
            Ordering::Greater => Some(PlayerNumber::One),
            Ordering::Less => Some(PlayerNumber::Two),
            Ordering::Equal => None,
        }
    }
}

enum State {
    /// No rally open.
    Idle,
    /// Accumulating shots into the current rally.
    Open(OpenRally),
}

/// Groups a time-ordered shot stream into rallies.
pub struct RallySegmenter {
    config: SegmenterConfig,
    state: State,
    rallies: Vec<Rally>,
    next_index: usize,
    last_serve: Option<(PlayerNumber, ServeSide)>,
    previous: Option<PreviousShot>,
}

impl RallySegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            state: State::Idle,
            rallies: Vec::new(),
            next_index: 0,
            last_serve: None,
            previous: None,
        }
    }

    /// Segment a complete shot list.
    pub fn segment(config: SegmenterConfig, shots: &[Shot]) -> Vec<Rally> {
        let mut segmenter = Self::new(config);
        for shot in shots {
            segmenter.ingest(shot);
        }
        segmenter.finish()
    }

    /// Feed the next shot of the stream.
    pub fn ingest(&mut self, shot: &Shot) {
        let index = self.next_index;
        self.next_index += 1;

        let gap = match &self.state {
            State::Open(open) => Some((shot.timestamp - open.last_time).max(0.0)),
            State::Idle => None,
        };

        if self.starts_new_point(shot, gap) {
            self.close(RallyEndReason::PointEnd, None);
            self.state = State::Open(OpenRally::start(index, shot));
        } else if self.is_second_serve(shot) || gap.is_some_and(|g| g < self.config.continuation_gap_secs) {
            match &mut self.state {
                State::Open(open) => open.push(shot),
                State::Idle => self.state = State::Open(OpenRally::start(index, shot)),
            }
        } else {
            self.close(RallyEndReason::PlayStopped, None);
            self.state = State::Open(OpenRally::start(index, shot));
        }

        if let Some(outcome) = shot.outcome {
            if outcome.is_winning() {
                self.close(RallyEndReason::Winner, Some(shot.player_number));
            } else if outcome.is_error() {
                self.close(RallyEndReason::Error, Some(shot.player_number.opponent()));
            }
        }

        if shot.is_serve() {
            if let Some(side) = shot.serve_side {
                self.last_serve = Some((shot.player_number, side));
            }
        }
        self.previous = Some(PreviousShot {
            player: shot.player_number,
            is_serve: shot.is_serve(),
            side: shot.serve_side,
            outcome: shot.outcome,
        });
    }

    /// Close any open rally as `match_end` and return every rally in order.
    pub fn finish(mut self) -> Vec<Rally> {
        self.close(RallyEndReason::MatchEnd, None);
        self.rallies
    }

    fn starts_new_point(&self, shot: &Shot, gap: Option<f64>) -> bool {
        if !shot.is_serve() {
            return false;
        }
        if shot.is_point_start {
            return true;
        }
        match (shot.serve_side, self.last_serve) {
            (Some(side), Some(previous)) => (shot.player_number, side) != previous,
            (Some(_), None) => true,
            (None, _) => gap.is_some_and(|g| g > self.config.serve_override_gap_secs),
        }
    }

    fn is_second_serve(&self, shot: &Shot) -> bool {
        let Some(previous) = self.previous else {
            return false;
        };
        shot.is_serve()
            && previous.is_serve
            && previous.player == shot.player_number
            && previous.side.is_some()
            && previous.side == shot.serve_side
            && previous.outcome == Some(ShotOutcome::Fault)
    }

    fn close(&mut self, reason: RallyEndReason, forced_winner: Option<PlayerNumber>) {
        let State::Open(open) = std::mem::replace(&mut self.state, State::Idle) else {
            return;
        };

        let winner_player = match reason {
            RallyEndReason::Winner | RallyEndReason::Error => forced_winner,
            _ => open.majority_winner(),
        };
        let shot_count = open.player1_shots + open.player2_shots;
        let rally = Rally {
            rally_id: self.rallies.len() as u32 + 1,
            start_time: open.start_time,
            end_time: open.end_time,
            duration: open.end_time - open.start_time,
            shot_count,
            player1_shots: open.player1_shots,
            player2_shots: open.player2_shots,
            winner_player,
            ended_by: reason,
            shots: ShotSpan {
                start: open.first_index,
                end: open.first_index + shot_count as usize,
            },
            shot_ids: open.shot_ids,
        };

        debug!(
            rally_id = rally.rally_id,
            shot_count = rally.shot_count,
            ended_by = %rally.ended_by,
            "Rally closed"
        );
        self.rallies.push(rally);
    }
}
