#![deny(unreachable_patterns)]
//! Everything in the pipeline that touches pixels or FFmpeg.
//!
//! This crate provides:
//! - FFmpeg command building and running, with progress and cancellation
//! - Sequential frame decoding through a rawvideo pipe
//! - Court calibration from a single frame
//! - Kalman ball tracking and persistent player tracking
//! - Capability traits for the detector, pose and stroke-phase models, with
//!   ONNX Runtime implementations
//! - Shot classification strategies and shot post-processing
//! - Highlight reel cutting

pub mod calibration;
pub mod classify;
pub mod command;
pub mod detection;
pub mod error;
pub mod frames;
pub mod geometry;
pub mod highlights;
#[cfg(feature = "opencv")]
mod imaging;
pub mod probe;
pub mod progress;
pub mod tracking;

pub use calibration::{CalibratorConfig, CourtCalibration, CourtCalibrator, Homography};
pub use classify::{
    build_shot_classifier, finalize_shots, ClassificationInput, ClassifierConfig,
    PostProcessConfig, ShotClassifier, StrokeSampler, StrokeSamples,
};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use detection::{
    Detection, ObjectClass, ObjectDetector, OnnxPoseEstimator, OnnxStrokeClassifier,
    PoseEstimator, PoseKeypoints, PoseModelConfig, StrokeModelConfig, StrokePhaseClassifier,
    YoloDetectorConfig, YoloObjectDetector,
};
pub use error::{MediaError, MediaResult};
pub use frames::{FfmpegFrameReader, Frame, FrameSource, MemoryFrameSource};
pub use geometry::{BoundingBox, PixelPoint};
pub use highlights::render_highlight_reel;
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
pub use tracking::{
    BallObservation, BallTracker, BallTrackerConfig, PlayerObservation, PlayerTracker,
    PlayerTrackerConfig,
};
