//! Highlight clip descriptors.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::player::PlayerNumber;

/// Event that makes a moment highlight-worthy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum HighlightKind {
    Winner,
    Ace,
    Smash,
}

impl HighlightKind {
    pub fn label(&self) -> &'static str {
        match self {
            HighlightKind::Winner => "Winner",
            HighlightKind::Ace => "Ace",
            HighlightKind::Smash => "Smash",
        }
    }
}

impl fmt::Display for HighlightKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A time window of the source video worth keeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HighlightClip {
    /// Seconds from the start of the video
    pub start_time: f64,
    pub end_time: f64,
    pub kinds: Vec<HighlightKind>,
    pub description: String,
    /// Set when every merged event belongs to the same player
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_number: Option<PlayerNumber>,
    pub shot_ids: Vec<u32>,
}

impl HighlightClip {
    pub fn duration(&self) -> f64 {
        (self.end_time - self.start_time).max(0.0)
    }
}
