//! Shared data models for the Courtside match analytics pipeline.
//!
//! Shots live in a flat, timestamp-ordered arena and rallies reference them by index span,
//! so the payload has no cyclic ownership.

pub mod analytics;
pub mod highlight;
pub mod ids;
pub mod player;
pub mod rally;
pub mod shot;

pub use analytics::{
    CalibrationSummary, FitnessStats, HeatmapPoint, MatchAnalytics, PlayerStats, PositionSample,
    ProcessingSummary, RallyStats, ServeStats, ShotPlacement, StrokeSummary,
};
pub use highlight::{HighlightClip, HighlightKind};
pub use ids::{MatchId, RunId, RunState};
pub use player::{court, CourtPosition, InvalidPlayerNumber, PlayerNumber};
pub use rally::{Rally, RallyEndReason, ShotSpan};
pub use shot::{
    ClassificationSource, ServeDetails, ServePlacement, ServeSide, ServeType, Shot,
    ShotDirection, ShotOutcome, ShotType, StrokePhase,
};
