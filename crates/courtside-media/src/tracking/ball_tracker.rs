//! Single-ball tracking with a constant-velocity Kalman filter.
//!
//! Per frame the tracker takes the detector's best ball, falls back to the
//! color heuristic when the detector has nothing, and either updates the
//! filter with the measurement or coasts on prediction alone. Velocity, speed
//! and bounces are read from the filtered state. The recent trajectory lives
//! in a bounded ring buffer, which is also where a bounce's turning point is
//! looked up.

use image::RgbImage;
use tracing::{debug, trace};

use courtside_models::CourtPosition;

use super::color_detector::{ColorBallDetector, ColorDetectorConfig};
use super::kalman::{KalmanFilter, KalmanParams};
use super::ring_buffer::RingBuffer;
use crate::calibration::CourtCalibration;
use crate::detection::{Detection, ObjectClass};
use crate::geometry::PixelPoint;

#[derive(Debug, Clone)]
pub struct BallTrackerConfig {
    pub kalman: KalmanParams,
    pub color: ColorDetectorConfig,
    /// Run the color fallback when the detector finds no ball
    pub color_fallback: bool,
    /// Confidence reported for prediction-only frames
    pub predicted_confidence: f64,
    /// Frames without a measurement before the track is dropped
    pub max_coast_frames: u32,
    /// Change of filtered vertical velocity (px/frame) between consecutive
    /// states that a sign reversal must exceed to count as a bounce
    pub bounce_min_delta_vy: f64,
    /// Accepted detector box side range in pixels
    pub min_box_side: f64,
    pub max_box_side: f64,
    pub history_capacity: usize,
}

impl Default for BallTrackerConfig {
    fn default() -> Self {
        Self {
            kalman: KalmanParams::default(),
            color: ColorDetectorConfig::default(),
            color_fallback: true,
            predicted_confidence: 0.5,
            max_coast_frames: 30,
            bounce_min_delta_vy: 1.0,
            min_box_side: 3.0,
            max_box_side: 50.0,
            history_capacity: 60,
        }
    }
}

/// Where a ball position came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BallSource {
    Detector,
    Color,
    Predicted,
}

/// Filtered ball state for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct BallObservation {
    pub frame_index: u64,
    pub timestamp: f64,
    pub position: PixelPoint,
    /// Filtered velocity in pixels per frame
    pub velocity: (f64, f64),
    pub speed_mps: f64,
    pub confidence: f64,
    pub source: BallSource,
    /// Set on the frame where a bounce is recognized
    pub bounce: Option<Bounce>,
    pub court_position: Option<CourtPosition>,
}

impl BallObservation {
    pub fn is_measured(&self) -> bool {
        self.source != BallSource::Predicted
    }

    pub fn is_bounce(&self) -> bool {
        self.bounce.is_some()
    }
}

/// The vertical turning point of the ball before a recognized reversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounce {
    pub timestamp: f64,
    pub position: PixelPoint,
    pub court_position: Option<CourtPosition>,
}

/// Tracker state for one video. Never shared between videos.
#[derive(Debug)]
pub struct BallTracker {
    config: BallTrackerConfig,
    fps: f64,
    color: ColorBallDetector,
    filter: Option<KalmanFilter>,
    frames_since_measurement: u32,
    history: RingBuffer<BallObservation>,
    frames_seen: u64,
    frames_detected: u64,
    bounces: u64,
    /// Filtered vertical velocity of the previous state
    last_vy: Option<f64>,
    /// First frame of the current vertical movement segment
    segment_start: u64,
}

impl BallTracker {
    pub fn new(config: BallTrackerConfig, fps: f64) -> Self {
        Self {
            color: ColorBallDetector::new(config.color.clone()),
            history: RingBuffer::new(config.history_capacity),
            fps: if fps > 0.0 { fps } else { 30.0 },
            config,
            filter: None,
            frames_since_measurement: 0,
            frames_seen: 0,
            frames_detected: 0,
            bounces: 0,
            last_vy: None,
            segment_start: 0,
        }
    }

    /// Process one frame.
    ///
    /// `detections` is the detector's output for this frame, or `None` when no
    /// detector is available or it failed on this frame. Returns nothing until
    /// the first measurement and after the track is lost.
    pub fn observe(
        &mut self,
        frame_index: u64,
        timestamp: f64,
        image: &RgbImage,
        detections: Option<&[Detection]>,
        calibration: &CourtCalibration,
    ) -> Option<BallObservation> {
        self.frames_seen += 1;

        let measurement = detections
            .and_then(|d| self.best_detection(d))
            .map(|(p, c)| (p, c, BallSource::Detector))
            .or_else(|| {
                self.config
                    .color_fallback
                    .then(|| self.color.detect(image))
                    .flatten()
                    .map(|(p, c)| (p, c, BallSource::Color))
            });

        let (confidence, source) = match (measurement, self.filter.as_mut()) {
            (Some((point, confidence, source)), Some(filter)) => {
                filter.predict();
                filter.update(point.x, point.y);
                (confidence, source)
            }
            (Some((point, confidence, source)), None) => {
                self.filter = Some(KalmanFilter::new(point.x, point.y, self.config.kalman));
                self.last_vy = None;
                self.segment_start = frame_index;
                debug!(frame = frame_index, "Ball track started");
                (confidence, source)
            }
            (None, Some(filter)) => {
                self.frames_since_measurement += 1;
                if self.frames_since_measurement > self.config.max_coast_frames {
                    debug!(frame = frame_index, "Ball track lost");
                    self.filter = None;
                    self.frames_since_measurement = 0;
                    return None;
                }
                filter.predict();
                (self.config.predicted_confidence, BallSource::Predicted)
            }
            (None, None) => return None,
        };

        if source != BallSource::Predicted {
            self.frames_since_measurement = 0;
            self.frames_detected += 1;
        }

        let filter = self.filter.as_ref()?;
        let (x, y) = filter.position();
        let velocity = filter.velocity();
        let position = PixelPoint::new(x, y);

        let court_position = calibration.pixel_to_court(&position);
        let bounce = self.track_reversal(frame_index, velocity.1);
        if let Some(b) = &bounce {
            self.bounces += 1;
            trace!(frame = frame_index, at = b.timestamp, "Ball bounce");
        }

        let observation = BallObservation {
            frame_index,
            timestamp,
            position,
            velocity,
            speed_mps: self.speed_mps(velocity, calibration.pixel_to_meter()),
            confidence,
            source,
            bounce,
            court_position,
        };
        self.history.push(observation.clone());
        Some(observation)
    }

    /// A bounce is a sign change of the filtered vertical velocity between two
    /// consecutive states whose step exceeds `bounce_min_delta_vy`. A ball
    /// settling to rest crosses zero with a tiny step and is not a bounce. The
    /// filter lags the true reversal, so the reported point is the vertical
    /// extreme of the segment that just ended, taken from the history.
    fn track_reversal(&mut self, frame_index: u64, vy: f64) -> Option<Bounce> {
        let last_vy = self.last_vy.replace(vy)?;
        if last_vy * vy >= 0.0 {
            return None;
        }

        let segment_start = std::mem::replace(&mut self.segment_start, frame_index);
        if (vy - last_vy).abs() <= self.config.bounce_min_delta_vy {
            return None;
        }

        let moving_down = last_vy > 0.0;
        self.history
            .iter()
            .filter(|o| o.frame_index >= segment_start)
            .max_by(|a, b| {
                if moving_down {
                    a.position.y.total_cmp(&b.position.y)
                } else {
                    b.position.y.total_cmp(&a.position.y)
                }
            })
            .map(|turn| Bounce {
                timestamp: turn.timestamp,
                position: turn.position,
                court_position: turn.court_position,
            })
    }

    /// Most confident ball-class detection with a plausible box size.
    fn best_detection(&self, detections: &[Detection]) -> Option<(PixelPoint, f64)> {
        detections
            .iter()
            .filter(|d| d.class == ObjectClass::Ball)
            .filter(|d| {
                let side = d.bbox.width.max(d.bbox.height);
                side >= self.config.min_box_side && side <= self.config.max_box_side
            })
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .map(|d| (d.center(), d.confidence))
    }

    fn speed_mps(&self, velocity: (f64, f64), pixel_to_meter: f64) -> f64 {
        (velocity.0.powi(2) + velocity.1.powi(2)).sqrt() * self.fps * pixel_to_meter
    }

    /// Frames with a measurement divided by frames seen.
    pub fn detection_rate(&self) -> f64 {
        if self.frames_seen == 0 {
            0.0
        } else {
            self.frames_detected as f64 / self.frames_seen as f64
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn bounce_count(&self) -> u64 {
        self.bounces
    }

    /// Most recent filtered states, oldest first. Bounce turning points are
    /// looked up here; callers that need the whole match keep their own copy.
    pub fn history(&self) -> &RingBuffer<BallObservation> {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibratorConfig;
    use crate::geometry::BoundingBox;

    fn calibration() -> CourtCalibration {
        CourtCalibration::fallback(640, 360, &CalibratorConfig::default())
    }

    fn ball_at(x: f64, y: f64) -> Vec<Detection> {
        vec![Detection::new(
            BoundingBox::from_center(x, y, 8.0, 8.0),
            ObjectClass::Ball,
            0.9,
        )]
    }

    fn tracker() -> BallTracker {
        let config = BallTrackerConfig {
            color_fallback: false,
            ..Default::default()
        };
        BallTracker::new(config, 30.0)
    }

    #[test]
    fn test_nothing_before_first_measurement() {
        let mut t = tracker();
        let img = RgbImage::new(640, 360);
        assert!(t.observe(0, 0.0, &img, Some(&[]), &calibration()).is_none());
        assert!(t.observe(1, 0.033, &img, None, &calibration()).is_none());
        assert_eq!(t.detection_rate(), 0.0);
    }

    #[test]
    fn test_predict_only_reduces_confidence_then_drops() {
        let config = BallTrackerConfig {
            color_fallback: false,
            max_coast_frames: 2,
            ..Default::default()
        };
        let mut t = BallTracker::new(config, 30.0);
        let img = RgbImage::new(640, 360);
        let cal = calibration();

        let first = t.observe(0, 0.0, &img, Some(&ball_at(100.0, 100.0)), &cal).unwrap();
        assert_eq!(first.source, BallSource::Detector);
        assert!((first.confidence - 0.9).abs() < 1e-9);

        let coast = t.observe(1, 0.033, &img, None, &cal).unwrap();
        assert_eq!(coast.source, BallSource::Predicted);
        assert_eq!(coast.confidence, 0.5);
        assert!(t.observe(2, 0.066, &img, None, &cal).is_some());
        assert!(t.observe(3, 0.1, &img, None, &cal).is_none());
        assert!((t.detection_rate() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_velocity_and_speed_come_from_filter() {
        let mut t = tracker();
        let img = RgbImage::new(640, 360);
        let cal = calibration();

        let mut last = None;
        for i in 0..30u64 {
            let x = 50.0 + 4.0 * i as f64;
            last = t.observe(i, i as f64 / 30.0, &img, Some(&ball_at(x, 200.0)), &cal);
        }
        let obs = last.unwrap();
        assert!((obs.velocity.0 - 4.0).abs() < 0.3);
        // 4 px/frame * 30 fps * 0.05 m/px
        assert!((obs.speed_mps - 6.0).abs() < 0.5);
        assert!(obs.court_position.is_some());
    }

    #[test]
    fn test_bounce_on_vertical_reversal() {
        let mut t = tracker();
        let img = RgbImage::new(640, 360);
        let cal = calibration();

        let mut bounces = Vec::new();
        for i in 0..40u64 {
            // Falls 12 px/frame for 20 frames, then rises 12 px/frame.
            let y = if i < 20 { 20.0 + 12.0 * i as f64 } else { 260.0 - 12.0 * (i - 20) as f64 };
            let obs = t
                .observe(i, i as f64 / 30.0, &img, Some(&ball_at(300.0, y)), &cal)
                .unwrap();
            if let Some(bounce) = obs.bounce {
                bounces.push((i, bounce));
            }
        }
        assert_eq!(bounces.len(), 1, "bounces at {:?}", bounces);
        let (frame, bounce) = bounces[0];
        assert!(frame > 20 && frame < 32);
        // Reported at the turning point, not where the filter crossed zero.
        assert!((bounce.position.y - 260.0).abs() < 10.0);
        assert!((bounce.timestamp - 20.0 / 30.0).abs() < 0.1);
        assert_eq!(t.bounce_count(), 1);
    }

    #[test]
    fn test_ball_coming_to_rest_is_not_a_bounce() {
        let mut t = tracker();
        let img = RgbImage::new(640, 360);
        let cal = calibration();

        let mut reversed = false;
        let mut last_vy: f64 = 0.0;
        for i in 0..60u64 {
            // Falls 8 px/frame for 20 frames, then lies still.
            let y = 20.0 + 8.0 * i.min(19) as f64;
            let obs = t
                .observe(i, i as f64 / 30.0, &img, Some(&ball_at(300.0, y)), &cal)
                .unwrap();
            assert!(obs.bounce.is_none(), "bounce at frame {}", i);
            reversed |= last_vy * obs.velocity.1 < 0.0;
            last_vy = obs.velocity.1;
        }
        // The filtered velocity does overshoot through zero while settling.
        assert!(reversed);
        assert_eq!(t.bounce_count(), 0);
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn test_rejects_implausible_box_and_uses_color_fallback() {
        use image::Rgb;

        let mut t = BallTracker::new(BallTrackerConfig::default(), 30.0);
        let mut img = RgbImage::from_pixel(200, 100, Rgb([30, 80, 160]));
        for y in 0..100u32 {
            for x in 0..200u32 {
                if ((x as f64 - 120.0).powi(2) + (y as f64 - 40.0).powi(2)).sqrt() <= 4.0 {
                    img.put_pixel(x, y, Rgb([230, 220, 40]));
                }
            }
        }
        let huge = vec![Detection::new(
            BoundingBox::new(0.0, 0.0, 120.0, 90.0),
            ObjectClass::Ball,
            0.99,
        )];

        let obs = t.observe(0, 0.0, &img, Some(&huge), &calibration()).unwrap();
        assert_eq!(obs.source, BallSource::Color);
        assert!((obs.position.x - 120.0).abs() < 1.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut t = tracker();
        let img = RgbImage::new(64, 64);
        let cal = calibration();
        for i in 0..100u64 {
            t.observe(i, i as f64 / 30.0, &img, Some(&ball_at(30.0, 30.0)), &cal);
        }
        assert_eq!(t.history().len(), 60);
        assert_eq!(t.history().evicted(), 40);
    }
}
