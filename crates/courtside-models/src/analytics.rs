//! Match analytics payload handed to the persistence service.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::highlight::HighlightClip;
use crate::ids::{MatchId, RunId};
use crate::player::{CourtPosition, PlayerNumber};
use crate::rally::Rally;
use crate::shot::{ServePlacement, ServeType, Shot, ShotDirection, ShotOutcome, ShotType};

/// A player position on the court at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PositionSample {
    pub player_number: PlayerNumber,
    pub timestamp: f64,
    pub position: CourtPosition,
}

/// One heatmap cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HeatmapPoint {
    /// Cell center, meters across the court
    pub x: f64,
    /// Cell center, meters along the court
    pub y: f64,
    /// Relative density in (0, 1]
    pub intensity: f64,
}

/// Where a shot was struck from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShotPlacement {
    pub shot_id: u32,
    pub timestamp: f64,
    pub position: CourtPosition,
    pub shot_type: ShotType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<ShotDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ShotOutcome>,
}

/// Serve sub-statistics for one player.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ServeStats {
    pub total_serves: u32,
    pub first_serves: u32,
    pub first_serves_in: u32,
    /// Percentage in 0..=100
    pub first_serve_in_pct: f64,
    pub second_serves: u32,
    pub second_serves_in: u32,
    pub second_serve_in_pct: f64,
    pub aces: u32,
    pub double_faults: u32,
    pub avg_speed_mps: Option<f64>,
    pub max_speed_mps: Option<f64>,
    pub placement_distribution: BTreeMap<ServePlacement, u32>,
    pub serve_types: BTreeMap<ServeType, u32>,
}

/// Movement statistics for one player.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct FitnessStats {
    pub total_distance_m: f64,
    pub max_speed_mps: f64,
    pub avg_speed_mps: f64,
}

/// Outcome and type histograms for one player's strokes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct StrokeSummary {
    pub total_strokes: u32,
    pub winners: u32,
    pub errors: u32,
    pub outcomes: BTreeMap<ShotOutcome, u32>,
    pub shot_types: BTreeMap<ShotType, u32>,
}

/// Aggregated statistics for one player.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct PlayerStats {
    pub total_shots: u32,
    pub shot_distribution: BTreeMap<ShotType, u32>,
    pub heatmap: Vec<HeatmapPoint>,
    pub shot_placements: Vec<ShotPlacement>,
    pub serve_stats: ServeStats,
    pub fitness: FitnessStats,
    pub stroke_summary: StrokeSummary,
}

/// Match-level rally statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct RallyStats {
    pub total_rallies: u32,
    /// Mean shot count per rally
    pub average_rally_length: f64,
    /// Largest shot count of any rally
    pub longest_rally: u32,
    pub rallies: Vec<Rally>,
}

/// Court calibration facts included with the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CalibrationSummary {
    pub pixel_to_meter: f64,
    /// Far-left, far-right, near-right, near-left corners in pixels
    pub corners: [[f64; 2]; 4],
    pub court_center: [f64; 2],
    /// Set when the calibrator fell back to the default quadrilateral
    pub low_confidence: bool,
}

/// Pipeline health counters for one run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ProcessingSummary {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    /// Frames with a ball detection divided by frames processed
    pub ball_detection_rate: f64,
    pub video_duration_secs: f64,
    pub processing_secs: f64,
    pub classifier: String,
}

/// Complete analytics for one processed match video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MatchAnalytics {
    pub match_id: MatchId,
    pub run_id: RunId,
    pub player1_stats: PlayerStats,
    pub player2_stats: PlayerStats,
    pub rally_stats: RallyStats,
    /// Ordered by timestamp
    pub shots: Vec<Shot>,
    pub highlights: Vec<HighlightClip>,
    /// Set only if highlight generation succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlights_video_path: Option<String>,
    pub calibration: CalibrationSummary,
    pub processing: ProcessingSummary,
    pub generated_at: DateTime<Utc>,
}

impl MatchAnalytics {
    pub fn player_stats(&self, player: PlayerNumber) -> &PlayerStats {
        match player {
            PlayerNumber::One => &self.player1_stats,
            PlayerNumber::Two => &self.player2_stats,
        }
    }
}
