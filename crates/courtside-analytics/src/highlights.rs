//! Highlight candidate selection and window merging.

use serde::{Deserialize, Serialize};

use courtside_models::{HighlightClip, HighlightKind, Shot, ShotOutcome};

/// Padding around an event, in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClipPadding {
    pub before: f64,
    pub after: f64,
}

/// Clip windows per event type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightConfig {
    pub winner: ClipPadding,
    pub ace: ClipPadding,
    pub smash: ClipPadding,
    /// Windows separated by less than this are merged (seconds)
    pub merge_gap_secs: f64,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            winner: ClipPadding {
                before: 5.0,
                after: 2.0,
            },
            ace: ClipPadding {
                before: 2.0,
                after: 3.0,
            },
            smash: ClipPadding {
                before: 2.0,
                after: 2.0,
            },
            merge_gap_secs: 1.0,
        }
    }
}

impl HighlightConfig {
    fn padding(&self, kind: HighlightKind) -> ClipPadding {
        match kind {
            HighlightKind::Winner => self.winner,
            HighlightKind::Ace => self.ace,
            HighlightKind::Smash => self.smash,
        }
    }
}

/// Scan shots for winners, aces and smashes and build one window per event.
pub fn select_candidates(shots: &[Shot], config: &HighlightConfig) -> Vec<HighlightClip> {
    let mut candidates = Vec::new();

    for shot in shots {
        let mut kinds = Vec::new();
        match shot.outcome {
            Some(ShotOutcome::Winner) => kinds.push(HighlightKind::Winner),
            Some(ShotOutcome::Ace) => kinds.push(HighlightKind::Ace),
            _ => {}
        }
        if shot.shot_type.is_smash() {
            kinds.push(HighlightKind::Smash);
        }

        for kind in kinds {
            let padding = config.padding(kind);
            candidates.push(HighlightClip {
                start_time: (shot.timestamp - padding.before).max(0.0),
                end_time: shot.timestamp + padding.after,
                kinds: vec![kind],
                description: format!("{} by Player {}", kind.label(), shot.player_number),
                player_number: Some(shot.player_number),
                shot_ids: vec![shot.shot_id],
            });
        }
    }

    candidates
}

/// Merge overlapping or near-adjacent windows, sorted by start time.
pub fn merge_windows(mut candidates: Vec<HighlightClip>, merge_gap_secs: f64) -> Vec<HighlightClip> {
    candidates.sort_by(|a, b| {
        a.start_time
            .total_cmp(&b.start_time)
            .then(a.end_time.total_cmp(&b.end_time))
    });

    let mut merged: Vec<HighlightClip> = Vec::with_capacity(candidates.len());
    for clip in candidates {
        match merged.last_mut() {
            Some(last) if clip.start_time - last.end_time < merge_gap_secs => {
                last.end_time = last.end_time.max(clip.end_time);
                for kind in clip.kinds {
                    if !last.kinds.contains(&kind) {
                        last.kinds.push(kind);
                    }
                }
                last.description = format!("{} | {}", last.description, clip.description);
                if last.player_number != clip.player_number {
                    last.player_number = None;
                }
                last.shot_ids.extend(clip.shot_ids);
            }
            _ => merged.push(clip),
        }
    }

    merged
}

/// Select and merge highlight clips for a shot list.
pub fn build_highlights(shots: &[Shot], config: &HighlightConfig) -> Vec<HighlightClip> {
    merge_windows(select_candidates(shots, config), config.merge_gap_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtside_models::{ClassificationSource, PlayerNumber, ShotType};

    fn clip(start: f64, end: f64, kind: HighlightKind) -> HighlightClip {
        HighlightClip {
            start_time: start,
            end_time: end,
            kinds: vec![kind],
            description: format!("{} by Player 1", kind.label()),
            player_number: Some(PlayerNumber::One),
            shot_ids: Vec::new(),
        }
    }

    #[test]
    fn test_near_adjacent_windows_merge() {
        let merged = merge_windows(
            vec![
                clip(10.0, 13.0, HighlightKind::Winner),
                clip(13.5, 15.0, HighlightKind::Ace),
            ],
            1.0,
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].start_time, 10.0);
        assert_eq!(merged[0].end_time, 15.0);
        assert_eq!(merged[0].kinds, vec![HighlightKind::Winner, HighlightKind::Ace]);
        assert_eq!(merged[0].description, "Winner by Player 1 | Ace by Player 1");
    }

    #[test]
    fn test_distant_windows_stay_separate() {
        let merged = merge_windows(
            vec![
                clip(20.0, 22.0, HighlightKind::Smash),
                clip(10.0, 13.0, HighlightKind::Winner),
            ],
            1.0,
        );

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].start_time, 10.0);
        assert_eq!(merged[1].start_time, 20.0);
    }

    #[test]
    fn test_candidate_windows_and_clamping() {
        let mut winner = Shot::new(
            PlayerNumber::Two,
            3.0,
            ShotType::Forehand,
            0.9,
            ClassificationSource::Model,
        )
        .with_outcome(ShotOutcome::Winner);
        winner.shot_id = 1;
        let mut smash = Shot::new(
            PlayerNumber::One,
            60.0,
            ShotType::Overhead,
            0.9,
            ClassificationSource::Model,
        );
        smash.shot_id = 2;

        let candidates = select_candidates(&[winner, smash], &HighlightConfig::default());
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].start_time, 0.0);
        assert_eq!(candidates[0].end_time, 5.0);
        assert_eq!(candidates[0].description, "Winner by Player 2");
        assert_eq!(candidates[1].start_time, 58.0);
        assert_eq!(candidates[1].end_time, 62.0);
    }

    #[test]
    fn test_mixed_players_clear_player_number() {
        let mut a = clip(10.0, 13.0, HighlightKind::Winner);
        a.player_number = Some(PlayerNumber::Two);
        let merged = merge_windows(vec![a, clip(12.0, 14.0, HighlightKind::Smash)], 1.0);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].player_number, None);
    }
}
