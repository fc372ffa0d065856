//! Shot records produced by shot classification.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::player::{CourtPosition, PlayerNumber};

/// Kind of stroke.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ShotType {
    Forehand,
    Backhand,
    Volley,
    Slice,
    DropShot,
    Overhead,
    Smash,
    Serve,
    Return,
}

impl ShotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotType::Forehand => "forehand",
            ShotType::Backhand => "backhand",
            ShotType::Volley => "volley",
            ShotType::Slice => "slice",
            ShotType::DropShot => "drop_shot",
            ShotType::Overhead => "overhead",
            ShotType::Smash => "smash",
            ShotType::Serve => "serve",
            ShotType::Return => "return",
        }
    }

    /// Overheads and smashes both count as smashes for highlight selection.
    pub fn is_smash(&self) -> bool {
        matches!(self, ShotType::Overhead | ShotType::Smash)
    }
}

impl fmt::Display for ShotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a shot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ShotOutcome {
    InPlay,
    Winner,
    Ace,
    Error,
    UnforcedError,
    ForcedError,
    Out,
    Net,
    Fault,
    DoubleFault,
    Let,
}

impl ShotOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotOutcome::InPlay => "in_play",
            ShotOutcome::Winner => "winner",
            ShotOutcome::Ace => "ace",
            ShotOutcome::Error => "error",
            ShotOutcome::UnforcedError => "unforced_error",
            ShotOutcome::ForcedError => "forced_error",
            ShotOutcome::Out => "out",
            ShotOutcome::Net => "net",
            ShotOutcome::Fault => "fault",
            ShotOutcome::DoubleFault => "double_fault",
            ShotOutcome::Let => "let",
        }
    }

    /// Outcomes that credit the point to the shooting player.
    pub fn is_winning(&self) -> bool {
        matches!(self, ShotOutcome::Winner | ShotOutcome::Ace)
    }

    /// Outcomes that credit the point to the opponent.
    ///
    /// A single `Fault` is not an error: the server still has a second serve.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ShotOutcome::Error
                | ShotOutcome::UnforcedError
                | ShotOutcome::ForcedError
                | ShotOutcome::Out
                | ShotOutcome::Net
                | ShotOutcome::DoubleFault
        )
    }

    /// Outcomes that end the point.
    pub fn is_terminal(&self) -> bool {
        self.is_winning() || self.is_error()
    }
}

impl fmt::Display for ShotOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Direction of travel relative to the hitter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum ShotDirection {
    CrossCourt,
    DownTheLine,
}

/// Which half of the baseline a serve is struck from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ServeSide {
    Deuce,
    Ad,
}

/// Swing sub-state reported by the stroke-phase model.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum StrokePhase {
    Ready,
    Toss,
    Stroke,
    Finish,
}

impl StrokePhase {
    /// Phases that produce a shot record.
    pub fn emits_shot(&self) -> bool {
        matches!(self, StrokePhase::Stroke | StrokePhase::Finish)
    }
}

/// Serve flavour estimated from ball speed and spin direction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ServeType {
    Flat,
    Slice,
    Kick,
    Unknown,
}

/// Where a serve landed inside the service box.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ServePlacement {
    Wide,
    Body,
    T,
}

/// How a shot was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Model,
    Heuristic,
}

/// Serve-specific facts attached to a serve shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct ServeDetails {
    /// 1 for a first serve, 2 for a second serve
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serve_number: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub serve_type: Option<ServeType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement: Option<ServePlacement>,
}

/// A single classified shot.
///
/// Shots live in a flat, timestamp-ordered arena; rallies refer to them by index range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Shot {
    /// Monotonic id within a run, starting at 1
    pub shot_id: u32,

    pub player_number: PlayerNumber,

    /// Seconds from the start of the video
    pub timestamp: f64,

    pub shot_type: ShotType,

    pub direction: Option<ShotDirection>,

    pub outcome: Option<ShotOutcome>,

    pub court_position: Option<CourtPosition>,

    pub confidence: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_phase: Option<StrokePhase>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub serve_side: Option<ServeSide>,

    #[serde(default)]
    pub is_point_start: bool,

    /// Ball speed at contact, meters per second
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub serve: Option<ServeDetails>,

    pub source: ClassificationSource,
}

impl Shot {
    /// Create a shot with only the required fields set.
    pub fn new(
        player_number: PlayerNumber,
        timestamp: f64,
        shot_type: ShotType,
        confidence: f64,
        source: ClassificationSource,
    ) -> Self {
        Self {
            shot_id: 0,
            player_number,
            timestamp,
            shot_type,
            direction: None,
            outcome: None,
            court_position: None,
            confidence,
            stroke_phase: None,
            serve_side: None,
            is_point_start: false,
            speed_mps: None,
            serve: None,
            source,
        }
    }

    pub fn is_serve(&self) -> bool {
        self.shot_type == ShotType::Serve
    }

    pub fn serve_number(&self) -> Option<u8> {
        self.serve.as_ref().and_then(|s| s.serve_number)
    }

    pub fn with_outcome(mut self, outcome: ShotOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn with_serve_side(mut self, side: ServeSide) -> Self {
        self.serve_side = Some(side);
        self
    }

    pub fn point_start(mut self) -> Self {
        self.is_point_start = true;
        self
    }

    pub fn with_court_position(mut self, position: CourtPosition) -> Self {
        self.court_position = Some(position);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_outcomes() {
        assert!(ShotOutcome::Winner.is_terminal());
        assert!(ShotOutcome::Ace.is_terminal());
        assert!(ShotOutcome::Out.is_terminal());
        assert!(ShotOutcome::DoubleFault.is_terminal());
        assert!(!ShotOutcome::Fault.is_terminal());
        assert!(!ShotOutcome::InPlay.is_terminal());
        assert!(!ShotOutcome::Let.is_terminal());
    }

    #[test]
    fn test_error_vs_winning() {
        assert!(ShotOutcome::Net.is_error());
        assert!(!ShotOutcome::Net.is_winning());
        assert!(ShotOutcome::Ace.is_winning());
        assert!(!ShotOutcome::Ace.is_error());
    }

    #[test]
    fn test_shot_serialization_fields() {
        let shot = Shot::new(
            PlayerNumber::One,
            12.5,
            ShotType::DropShot,
            0.7,
            ClassificationSource::Heuristic,
        )
        .with_outcome(ShotOutcome::Winner)
        .with_court_position(CourtPosition::new(3.0, 20.0));

        let value = serde_json::to_value(&shot).unwrap();
        assert_eq!(value["player_number"], 1);
        assert_eq!(value["shot_type"], "drop_shot");
        assert_eq!(value["outcome"], "winner");
        assert_eq!(value["court_position"][1], 20.0);
        assert!(value.get("serve_side").is_none());
        assert!(value["direction"].is_null());
    }

    #[test]
    fn test_direction_strings() {
        assert_eq!(
            serde_json::to_string(&ShotDirection::CrossCourt).unwrap(),
            "\"cross-court\""
        );
        assert_eq!(
            serde_json::to_string(&ShotDirection::DownTheLine).unwrap(),
            "\"down-the-line\""
        );
    }

    #[test]
    fn test_stroke_phase_emits() {
        assert!(StrokePhase::Stroke.emits_shot());
        assert!(StrokePhase::Finish.emits_shot());
        assert!(!StrokePhase::Ready.emits_shot());
        assert!(!StrokePhase::Toss.emits_shot());
    }
}
