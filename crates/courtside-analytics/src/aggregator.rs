//! Per-player and match-level statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use courtside_models::{
    court, FitnessStats, HeatmapPoint, HighlightClip, PlayerNumber, PlayerStats, PositionSample,
    Rally, RallyStats, ServeStats, Shot, ShotOutcome, ShotPlacement, StrokeSummary,
};

use crate::highlights::{build_highlights, HighlightConfig};

/// Heatmap binning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeatmapConfig {
    /// Square cell size in meters
    pub cell_size_m: f64,
    /// Area around the court lines that is still binned, in meters
    pub apron_m: f64,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            cell_size_m: 1.0,
            apron_m: 3.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub heatmap: HeatmapConfig,
    pub highlights: HighlightConfig,
}

/// Everything the aggregator reads.
#[derive(Debug, Clone, Copy)]
pub struct AggregationInput<'a> {
    pub shots: &'a [Shot],
    pub rallies: &'a [Rally],
    pub positions: &'a [PositionSample],
    pub fitness: &'a BTreeMap<PlayerNumber, FitnessStats>,
}

/// Aggregated statistics for one run.
#[derive(Debug, Clone)]
pub struct MatchReport {
    pub player1_stats: PlayerStats,
    pub player2_stats: PlayerStats,
    pub rally_stats: RallyStats,
    pub highlights: Vec<HighlightClip>,
}

/// Builds match statistics from closed shot, rally and position collections.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsAggregator {
    config: AggregatorConfig,
}

impl AnalyticsAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn aggregate(&self, input: AggregationInput<'_>) -> MatchReport {
        MatchReport {
            player1_stats: self.player_stats(PlayerNumber::One, &input),
            player2_stats: self.player_stats(PlayerNumber::Two, &input),
            rally_stats: rally_stats(input.rallies),
            highlights: build_highlights(input.shots, &self.config.highlights),
        }
    }

    fn player_stats(&self, player: PlayerNumber, input: &AggregationInput<'_>) -> PlayerStats {
        let shots: Vec<&Shot> = input
            .shots
            .iter()
            .filter(|s| s.player_number == player)
            .collect();

        let mut shot_distribution = BTreeMap::new();
        for shot in &shots {
            *shot_distribution.entry(shot.shot_type).or_insert(0) += 1;
        }

        let shot_placements = shots
            .iter()
            .filter_map(|s| {
                s.court_position.map(|position| ShotPlacement {
                    shot_id: s.shot_id,
                    timestamp: s.timestamp,
                    position,
                    shot_type: s.shot_type,
                    direction: s.direction,
                    outcome: s.outcome,
                })
            })
            .collect();

        let positions: Vec<&PositionSample> = input
            .positions
            .iter()
            .filter(|p| p.player_number == player)
            .collect();

        PlayerStats {
            total_shots: shots.len() as u32,
            shot_distribution,
            heatmap: heatmap(&positions, &self.config.heatmap),
            shot_placements,
            serve_stats: serve_stats(&shots),
            fitness: input.fitness.get(&player).copied().unwrap_or_default(),
            stroke_summary: stroke_summary(&shots),
        }
    }
}

/// Bin positions into a court grid; intensity is relative to the busiest cell.
pub fn heatmap(positions: &[&PositionSample], config: &HeatmapConfig) -> Vec<HeatmapPoint> {
    if config.cell_size_m <= 0.0 {
        return Vec::new();
    }

    let min_x = -config.apron_m;
    let min_y = -config.apron_m;
    let max_x = court::WIDTH_M + config.apron_m;
    let max_y = court::LENGTH_M + config.apron_m;

    let mut bins: BTreeMap<(i64, i64), u32> = BTreeMap::new();
    for sample in positions {
        let (x, y) = (sample.position.x(), sample.position.y());
        if !x.is_finite() || !y.is_finite() || x < min_x || x > max_x || y < min_y || y > max_y {
            continue;
        }
        let cell = (
            ((x - min_x) / config.cell_size_m).floor() as i64,
            ((y - min_y) / config.cell_size_m).floor() as i64,
        );
        *bins.entry(cell).or_insert(0) += 1;
    }

    let Some(max_count) = bins.values().copied().max() else {
        return Vec::new();
    };

    bins.into_iter()
        .map(|((cx, cy), count)| HeatmapPoint {
            x: min_x + (cx as f64 + 0.5) * config.cell_size_m,
            y: min_y + (cy as f64 + 0.5) * config.cell_size_m,
            intensity: count as f64 / max_count as f64,
        })
        .collect()
}

fn serve_landed(outcome: Option<ShotOutcome>) -> bool {
    match outcome {
        Some(ShotOutcome::Fault) => false,
        Some(o) => !o.is_error(),
        None => true,
    }
}

/// Serve sub-statistics for one player's shots.
pub fn serve_stats(shots: &[&Shot]) -> ServeStats {
    let mut stats = ServeStats::default();
    let mut speeds = Vec::new();

    for shot in shots.iter().filter(|s| s.is_serve()) {
        stats.total_serves += 1;
        let landed = serve_landed(shot.outcome);

        if shot.serve_number() == Some(2) {
            stats.second_serves += 1;
            if landed {
                stats.second_serves_in += 1;
            } else {
                stats.double_faults += 1;
            }
        } else {
            stats.first_serves += 1;
            if landed {
                stats.first_serves_in += 1;
            } else if shot.outcome == Some(ShotOutcome::DoubleFault) {
                stats.double_faults += 1;
            }
        }

        if shot.outcome == Some(ShotOutcome::Ace) {
            stats.aces += 1;
        }
        if let Some(speed) = shot.speed_mps.filter(|s| s.is_finite()) {
            speeds.push(speed);
        }
        if let Some(details) = &shot.serve {
            if let Some(placement) = details.placement {
                *stats.placement_distribution.entry(placement).or_insert(0) += 1;
            }
            if let Some(serve_type) = details.serve_type {
                *stats.serve_types.entry(serve_type).or_insert(0) += 1;
            }
        }
    }

    stats.first_serve_in_pct = percentage(stats.first_serves_in, stats.first_serves);
    stats.second_serve_in_pct = percentage(stats.second_serves_in, stats.second_serves);
    if !speeds.is_empty() {
        stats.avg_speed_mps = Some(speeds.iter().sum::<f64>() / speeds.len() as f64);
        stats.max_speed_mps = speeds.iter().copied().reduce(f64::max);
    }

    stats
}

fn percentage(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

pub fn stroke_summary(shots: &[&Shot]) -> StrokeSummary {
    let mut summary = StrokeSummary {
        total_strokes: shots.len() as u32,
        ..Default::default()
    };

    for shot in shots {
        *summary.shot_types.entry(shot.shot_type).or_insert(0) += 1;
        if let Some(outcome) = shot.outcome {
            *summary.outcomes.entry(outcome).or_insert(0) += 1;
            if outcome.is_winning() {
                summary.winners += 1;
            } else if outcome.is_error() {
                summary.errors += 1;
            }
        }
    }

    summary
}

pub fn rally_stats(rallies: &[Rally]) -> RallyStats {
    let total_rallies = rallies.len() as u32;
    let total_shots: u32 = rallies.iter().map(|r| r.shot_count).sum();

    RallyStats {
        total_rallies,
        average_rally_length: if total_rallies == 0 {
            0.0
        } else {
            total_shots as f64 / total_rallies as f64
        },
        longest_rally: rallies.iter().map(|r| r.shot_count).max().unwrap_or(0),
        rallies: rallies.to_vec(),
    }
}
