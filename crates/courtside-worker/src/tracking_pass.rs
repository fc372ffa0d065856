//! Per-frame work of one run.
//!
//! A [`TrackingPass`] owns every piece of mutable per-video state: the
//! trackers, the stroke sampler and the collected observations. It is moved
//! into a blocking task for each frame and handed back afterwards, so the
//! async side never holds it across inference.

use std::collections::BTreeMap;

use image::imageops;
use tracing::debug;

use courtside_media::{
    BallObservation, BallTracker, CourtCalibration, CourtCalibrator, Detection, Frame,
    ObjectDetector, PlayerObservation, PlayerTracker, StrokeSampler, StrokeSamples,
};
use courtside_models::{FitnessStats, PlayerNumber, PositionSample};

use crate::capabilities::Capabilities;
use crate::config::PipelineConfig;

/// Everything tracking produced for one video.
#[derive(Debug)]
pub struct TrackingOutcome {
    /// `None` when no frame could be decoded
    pub calibration: Option<CourtCalibration>,
    pub balls: Vec<BallObservation>,
    pub players: Vec<PlayerObservation>,
    /// `None` when no stroke model sampled the run
    pub strokes: Option<StrokeSamples>,
    pub positions: Vec<PositionSample>,
    pub fitness: BTreeMap<PlayerNumber, FitnessStats>,
    pub ball_detection_rate: f64,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub detector_failures: u64,
    pub last_timestamp: f64,
}

pub struct TrackingPass {
    capabilities: Capabilities,
    calibrator: CourtCalibrator,
    calibration: Option<CourtCalibration>,
    ball_tracker: BallTracker,
    player_tracker: PlayerTracker,
    sampler: Option<StrokeSampler>,
    sample_stride: u64,
    /// Every ball state of the run. Shot classification and outcome inference
    /// look across the whole match once tracking ends, so the tracker's
    /// bounded history is not enough here.
    balls: Vec<BallObservation>,
    /// Every player state of the run, kept for the same reason
    players: Vec<PlayerObservation>,
    frames_processed: u64,
    frames_skipped: u64,
    detector_failures: u64,
    last_timestamp: f64,
}

impl TrackingPass {
    pub fn new(capabilities: Capabilities, config: &PipelineConfig, fps: f64) -> Self {
        let sampler = capabilities.stroke_classifier.clone().map(|classifier| {
            StrokeSampler::new(classifier, config.sample_stride, config.batch_size)
        });
        Self {
            capabilities,
            calibrator: CourtCalibrator::new(config.calibrator.clone()),
            calibration: None,
            ball_tracker: BallTracker::new(config.ball_tracker.clone(), fps),
            player_tracker: PlayerTracker::new(config.player_tracker.clone()),
            sampler,
            sample_stride: config.sample_stride.max(1),
            balls: Vec::new(),
            players: Vec::new(),
            frames_processed: 0,
            frames_skipped: 0,
            detector_failures: 0,
            last_timestamp: 0.0,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn calibration(&self) -> Option<&CourtCalibration> {
        self.calibration.as_ref()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Count a frame that could not be decoded.
    pub fn record_skipped(&mut self) {
        self.frames_skipped += 1;
    }

    /// Feed one decoded frame through calibration, detection, tracking, pose
    /// and stroke sampling.
    pub fn ingest(&mut self, frame: &Frame) {
        let (persons, balls) = self.detect(frame);

        let calibrator = &self.calibrator;
        let calibration = &*self
            .calibration
            .get_or_insert_with(|| calibrator.calibrate(&frame.image));

        if let Some(ball) = self.ball_tracker.observe(
            frame.index,
            frame.timestamp,
            &frame.image,
            balls.as_deref(),
            calibration,
        ) {
            self.balls.push(ball);
        }

        // A frame without person detections leaves the players untouched.
        if let Some(persons) = persons.as_deref() {
            let mut observed = self.player_tracker.observe(
                frame.index,
                frame.timestamp,
                frame.width(),
                persons,
                calibration,
            );
            if frame.index % self.sample_stride == 0 {
                attach_poses(&self.capabilities, frame, &mut observed);
            }
            self.players.extend(observed);
        }

        if let Some(sampler) = self.sampler.as_mut() {
            sampler.offer(frame.index, frame.timestamp, &frame.image);
        }

        self.frames_processed += 1;
        self.last_timestamp = frame.timestamp;
    }

    /// Person and ball detections for this frame; `None` where the detector is
    /// missing or failed.
    fn detect(&mut self, frame: &Frame) -> (Option<Vec<Detection>>, Option<Vec<Detection>>) {
        let persons = self
            .capabilities
            .person_detector
            .clone()
            .and_then(|detector| self.run_detector(detector.as_ref(), frame));

        let balls = if self.capabilities.shares_detector() {
            persons.clone()
        } else {
            self.capabilities
                .ball_detector
                .clone()
                .and_then(|detector| self.run_detector(detector.as_ref(), frame))
        };
        (persons, balls)
    }

    fn run_detector(&mut self, detector: &dyn ObjectDetector, frame: &Frame) -> Option<Vec<Detection>> {
        match detector.detect(&frame.image) {
            Ok(detections) => Some(detections),
            Err(e) => {
                self.detector_failures += 1;
                debug!(frame = frame.index, detector = detector.name(), error = %e, "Detection failed");
                None
            }
        }
    }

    pub fn finish(self) -> TrackingOutcome {
        TrackingOutcome {
            calibration: self.calibration,
            strokes: self.sampler.map(StrokeSampler::finish),
            positions: self.player_tracker.positions().to_vec(),
            fitness: self.player_tracker.fitness_by_player(),
            ball_detection_rate: self.ball_tracker.detection_rate(),
            balls: self.balls,
            players: self.players,
            frames_processed: self.frames_processed,
            frames_skipped: self.frames_skipped,
            detector_failures: self.detector_failures,
            last_timestamp: self.last_timestamp,
        }
    }
}

/// Crop each player out of the frame and attach the estimated pose.
fn attach_poses(capabilities: &Capabilities, frame: &Frame, players: &mut [PlayerObservation]) {
    let Some(estimator) = capabilities.pose_estimator.as_ref() else {
        return;
    };
    for player in players.iter_mut() {
        let Some(region) = player.bbox.clip_to(frame.width(), frame.height()) else {
            continue;
        };
        let crop = imageops::crop_imm(
            &frame.image,
            region.x as u32,
            region.y as u32,
            region.width.round() as u32,
            region.height.round() as u32,
        )
        .to_image();

        match estimator.estimate(&crop) {
            Ok(pose) => player.pose = pose,
            Err(e) => debug!(
                frame = frame.index,
                track_id = player.track_id,
                error = %e,
                "Pose estimation failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courtside_media::{BoundingBox, MediaResult, ObjectClass, PoseEstimator, PoseKeypoints};
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingDetector {
        calls: AtomicUsize,
        fail: bool,
    }

    impl ObjectDetector for CountingDetector {
        fn detect(&self, _frame: &RgbImage) -> MediaResult<Vec<Detection>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(courtside_media::MediaError::detection_failed("gpu lost"));
            }
            Ok(vec![
                Detection::new(BoundingBox::new(370.0, 375.0, 60.0, 150.0), ObjectClass::Person, 0.9)
                    .with_track_id(1),
                Detection::new(BoundingBox::new(570.0, 75.0, 60.0, 150.0), ObjectClass::Person, 0.9)
                    .with_track_id(2),
                Detection::new(BoundingBox::new(495.0, 295.0, 10.0, 10.0), ObjectClass::Ball, 0.8),
            ])
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    struct CountingPose {
        calls: AtomicUsize,
    }

    impl PoseEstimator for CountingPose {
        fn estimate(&self, _region: &RgbImage) -> MediaResult<Option<PoseKeypoints>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        fn name(&self) -> &'static str {
            "counting-pose"
        }
    }

    fn frame(index: u64) -> Frame {
        Frame {
            index,
            timestamp: index as f64 / 30.0,
            image: RgbImage::new(1000, 600),
        }
    }

    #[test]
    fn test_shared_detector_runs_once_per_frame() {
        let detector = Arc::new(CountingDetector {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let shared: Arc<dyn ObjectDetector> = detector.clone();
        let capabilities = Capabilities {
            person_detector: Some(shared.clone()),
            ball_detector: Some(shared),
            ..Default::default()
        };

        let mut pass = TrackingPass::new(capabilities, &PipelineConfig::default(), 30.0);
        for i in 0..3 {
            pass.ingest(&frame(i));
        }
        let outcome = pass.finish();

        assert_eq!(detector.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.frames_processed, 3);
        assert_eq!(outcome.players.len(), 6);
        assert_eq!(outcome.balls.len(), 3);
        assert!(outcome.calibration.unwrap().is_low_confidence());
    }

    #[test]
    fn test_detector_failure_degrades() {
        let detector: Arc<dyn ObjectDetector> = Arc::new(CountingDetector {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let capabilities = Capabilities {
            person_detector: Some(detector.clone()),
            ball_detector: Some(detector),
            ..Default::default()
        };

        let mut pass = TrackingPass::new(capabilities, &PipelineConfig::default(), 30.0);
        pass.ingest(&frame(0));
        let outcome = pass.finish();

        assert_eq!(outcome.frames_processed, 1);
        assert_eq!(outcome.detector_failures, 1);
        assert!(outcome.players.is_empty());
    }

    #[test]
    fn test_pose_only_on_sampled_frames() {
        let detector: Arc<dyn ObjectDetector> = Arc::new(CountingDetector {
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let pose = Arc::new(CountingPose {
            calls: AtomicUsize::new(0),
        });
        let capabilities = Capabilities {
            person_detector: Some(detector.clone()),
            ball_detector: Some(detector),
            pose_estimator: Some(pose.clone()),
            ..Default::default()
        };

        let mut pass = TrackingPass::new(capabilities, &PipelineConfig::default(), 30.0);
        for i in 0..6 {
            pass.ingest(&frame(i));
        }

        // Frames 0 and 5 are sampled, two players each.
        assert_eq!(pose.calls.load(Ordering::SeqCst), 4);
        assert!(pass.finish().strokes.is_none());
    }
}
