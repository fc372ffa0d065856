//! Court calibration: pixel coordinates to court meters.

mod calibrator;
mod homography;
mod lines;

pub use calibrator::{CalibratorConfig, CourtCalibration, CourtCalibrator};
pub use homography::Homography;
pub use lines::{
    classify_lines, detect_lines, detect_segments, merge_segments, ClassifiedLines, HoughLine,
    LineDetectorParams, Segment,
};
