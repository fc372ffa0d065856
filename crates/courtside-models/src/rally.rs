//! Rally (point) records produced by rally segmentation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::player::PlayerNumber;
use crate::shot::Shot;

/// Why a rally was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RallyEndReason {
    /// Last shot was a winner or an ace
    Winner,
    /// Last shot was an error, the opponent takes the point
    Error,
    /// Too long a pause between shots
    PlayStopped,
    /// A new point started with a serve
    PointEnd,
    /// The shot stream ended with the rally still open
    MatchEnd,
}

impl RallyEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RallyEndReason::Winner => "winner",
            RallyEndReason::Error => "error",
            RallyEndReason::PlayStopped => "play_stopped",
            RallyEndReason::PointEnd => "point_end",
            RallyEndReason::MatchEnd => "match_end",
        }
    }
}

impl fmt::Display for RallyEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Half-open index range `[start, end)` into the shot arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ShotSpan {
    pub start: usize,
    pub end: usize,
}

impl ShotSpan {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A closed rally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Rally {
    /// Sequential id within a run, starting at 1
    pub rally_id: u32,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub shot_count: u32,
    pub player1_shots: u32,
    pub player2_shots: u32,
    pub winner_player: Option<PlayerNumber>,
    pub ended_by: RallyEndReason,
    /// Shots owned by this rally
    pub shots: ShotSpan,
    pub shot_ids: Vec<u32>,
}

impl Rally {
    /// Borrow the shots this rally owns from the arena.
    pub fn shots_in<'a>(&self, arena: &'a [Shot]) -> &'a [Shot] {
        let end = self.shots.end.min(arena.len());
        let start = self.shots.start.min(end);
        &arena[start..end]
    }

    /// Number of shots hit by `player`.
    pub fn shots_by(&self, player: PlayerNumber) -> u32 {
        match player {
            PlayerNumber::One => self.player1_shots,
            PlayerNumber::Two => self.player2_shots,
        }
    }
}
