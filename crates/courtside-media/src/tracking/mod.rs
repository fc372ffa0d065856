//! Per-frame ball and player tracking.
//!
//! Tracker state belongs to exactly one video run and is never shared.

pub mod ball_tracker;
pub mod color_detector;
pub mod identity;
pub mod kalman;
pub mod player_tracker;
pub mod ring_buffer;

pub use ball_tracker::{BallObservation, BallSource, BallTracker, BallTrackerConfig, Bounce};
pub use color_detector::{ColorBallDetector, ColorDetectorConfig};
pub use identity::{IdentityConfig, IouTracker};
pub use kalman::{KalmanFilter, KalmanParams};
pub use player_tracker::{PlayerObservation, PlayerTracker, PlayerTrackerConfig};
pub use ring_buffer::RingBuffer;
