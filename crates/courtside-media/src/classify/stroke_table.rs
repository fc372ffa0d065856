//! Fixed lookup from stroke-phase model classes to shot type and phase.

use courtside_models::{ShotType, StrokePhase};

/// One row of the stroke-phase model's label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrokeClass {
    pub label: &'static str,
    /// `None` for the neutral ready position
    pub shot_type: Option<ShotType>,
    pub phase: StrokePhase,
}

const STROKE_CLASSES: [StrokeClass; 11] = [
    StrokeClass {
        label: "backhand-finish",
        shot_type: Some(ShotType::Backhand),
        phase: StrokePhase::Finish,
    },
    StrokeClass {
        label: "backhand-ready",
        shot_type: Some(ShotType::Backhand),
        phase: StrokePhase::Ready,
    },
    StrokeClass {
        label: "backhand-stroke",
        shot_type: Some(ShotType::Backhand),
        phase: StrokePhase::Stroke,
    },
    StrokeClass {
        label: "forehand-finish",
        shot_type: Some(ShotType::Forehand),
        phase: StrokePhase::Finish,
    },
    StrokeClass {
        label: "forehand-ready",
        shot_type: Some(ShotType::Forehand),
        phase: StrokePhase::Ready,
    },
    StrokeClass {
        label: "forehand-stroke",
        shot_type: Some(ShotType::Forehand),
        phase: StrokePhase::Stroke,
    },
    StrokeClass {
        label: "ready-position",
        shot_type: None,
        phase: StrokePhase::Ready,
    },
    StrokeClass {
        label: "serve_followthrough",
        shot_type: Some(ShotType::Serve),
        phase: StrokePhase::Finish,
    },
    StrokeClass {
        label: "serve_hit",
        shot_type: Some(ShotType::Serve),
        phase: StrokePhase::Stroke,
    },
    StrokeClass {
        label: "serve_ready",
        shot_type: Some(ShotType::Serve),
        phase: StrokePhase::Ready,
    },
    StrokeClass {
        label: "serve_toss",
        shot_type: Some(ShotType::Serve),
        phase: StrokePhase::Toss,
    },
];

/// Number of classes the stroke-phase model predicts.
pub const STROKE_CLASS_COUNT: usize = STROKE_CLASSES.len();

/// Look up a model class id. Unknown ids yield `None`.
pub fn stroke_class(class_id: u32) -> Option<&'static StrokeClass> {
    STROKE_CLASSES.get(class_id as usize)
}

impl StrokeClass {
    /// Shot type for phases that produce a shot record.
    pub fn emitted_shot(&self) -> Option<ShotType> {
        self.shot_type.filter(|_| self.phase.emits_shot())
    }
}
