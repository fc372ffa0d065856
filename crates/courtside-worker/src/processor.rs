//! Match run orchestration.
//!
//! One run takes a match video through calibration, tracking, shot
//! classification, rally segmentation, aggregation and optional highlight
//! cutting, then hands the payload to the [`AnalyticsSink`]. Every run owns
//! its tracker and segmenter state; only the capability handles are shared.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tracing::Instrument;

use courtside_analytics::{AggregationInput, AnalyticsAggregator, RallySegmenter};
use courtside_media::{
    build_shot_classifier, finalize_shots, probe_video, render_highlight_reel,
    ClassificationInput, FfmpegFrameReader, FfmpegRunner, FrameSource, MediaError,
};
use courtside_models::{HighlightClip, MatchAnalytics, MatchId, ProcessingSummary, RunId};

use crate::capabilities::Capabilities;
use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::RunLogger;
use crate::metrics;
use crate::persistence::AnalyticsSink;
use crate::status::{RunEvent, RunStatus, Stage, StatusSink};
use crate::tracking_pass::{TrackingOutcome, TrackingPass};

const OPERATION: &str = "match_analysis";

/// One match video to analyze.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub match_id: MatchId,
    pub run_id: RunId,
    pub video_path: PathBuf,
    /// Cut a highlight reel when the worker config allows it
    pub highlights: bool,
}

impl MatchRequest {
    pub fn new(match_id: MatchId, video_path: impl Into<PathBuf>) -> Self {
        Self {
            match_id,
            run_id: RunId::new(),
            video_path: video_path.into(),
            highlights: true,
        }
    }

    pub fn with_highlights(mut self, highlights: bool) -> Self {
        self.highlights = highlights;
        self
    }
}

/// Drives match runs.
pub struct MatchProcessor {
    config: WorkerConfig,
    capabilities: Capabilities,
    status: Arc<dyn StatusSink>,
    sink: Arc<dyn AnalyticsSink>,
}

impl MatchProcessor {
    pub fn new(
        config: WorkerConfig,
        capabilities: Capabilities,
        status: Arc<dyn StatusSink>,
        sink: Arc<dyn AnalyticsSink>,
    ) -> Self {
        Self {
            config,
            capabilities,
            status,
            sink,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Analyze the video file named in the request.
    ///
    /// Setting `cancel` to `true` aborts the run; like a timeout, this drops
    /// all tracker state and nothing is persisted.
    pub async fn process(
        &self,
        request: &MatchRequest,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<MatchAnalytics> {
        let run = async move {
            let info = probe_video(&request.video_path).await?;
            let source = FfmpegFrameReader::open(&request.video_path, &info)?;
            self.run(request, source, Some(info.duration), cancel).await
        };
        self.supervise(request, run).await
    }

    /// Analyze frames from an already opened source.
    pub async fn process_source<S: FrameSource>(
        &self,
        request: &MatchRequest,
        source: S,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<MatchAnalytics> {
        self.supervise(request, self.run(request, source, None, cancel))
            .await
    }

    /// Timeout, lifecycle reports and run metrics around one run.
    async fn supervise<F>(&self, request: &MatchRequest, run: F) -> WorkerResult<MatchAnalytics>
    where
        F: Future<Output = WorkerResult<MatchAnalytics>>,
    {
        let logger = RunLogger::new(request.match_id, &request.run_id, OPERATION);
        let started = Instant::now();

        logger.log_start(&request.video_path.display().to_string());
        metrics::record_run_started();
        self.report(request, RunEvent::Started).await;

        let timeout = self.config.job_timeout;
        let result = match tokio::time::timeout(timeout, run.instrument(logger.create_span())).await {
            Ok(result) => result,
            Err(_) => Err(WorkerError::Timeout(timeout.as_secs())),
        };

        metrics::record_run_finished();
        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(analytics) => {
                logger.log_completion(&format!(
                    "{} shots, {} rallies in {:.1}s",
                    analytics.shots.len(),
                    analytics.rally_stats.total_rallies,
                    elapsed
                ));
                metrics::record_run("completed", elapsed);
                self.report(request, RunEvent::Completed).await;
            }
            Err(e) => {
                logger.log_error(&e.to_string());
                metrics::record_run(e.kind(), elapsed);
                self.report(
                    request,
                    RunEvent::Failed {
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }
        result
    }

    async fn run<S: FrameSource>(
        &self,
        request: &MatchRequest,
        mut source: S,
        duration: Option<f64>,
        cancel: watch::Receiver<bool>,
    ) -> WorkerResult<MatchAnalytics> {
        let started = Instant::now();
        let logger = RunLogger::new(request.match_id, &request.run_id, OPERATION);
        let pipeline = &self.config.pipeline;
        let fps = source.frame_rate();

        let tracking = self.track(request, &mut source, &cancel, &logger).await?;
        check_cancel(&cancel)?;
        let Some(calibration) = tracking.calibration.as_ref() else {
            return Err(MediaError::InvalidVideo("no decodable frames".to_string()).into());
        };

        self.stage(request, &logger, Stage::Classifying).await;
        let classifier = build_shot_classifier(&pipeline.classifier, tracking.strokes.is_some());
        let input = ClassificationInput {
            players: &tracking.players,
            balls: &tracking.balls,
            strokes: tracking.strokes.as_ref(),
            calibration,
        };
        let shots = finalize_shots(classifier.classify(&input)?, &input, &pipeline.post_process);
        check_cancel(&cancel)?;

        self.stage(request, &logger, Stage::Segmenting).await;
        let rallies = RallySegmenter::segment(pipeline.segmenter.clone(), &shots);
        metrics::record_analytics(classifier.name(), shots.len(), rallies.len());

        self.stage(request, &logger, Stage::Aggregating).await;
        let report = AnalyticsAggregator::new(pipeline.aggregator.clone()).aggregate(
            AggregationInput {
                shots: &shots,
                rallies: &rallies,
                positions: &tracking.positions,
                fitness: &tracking.fitness,
            },
        );

        let highlights_video_path =
            if request.highlights && pipeline.highlights && !report.highlights.is_empty() {
                self.stage(request, &logger, Stage::Highlights).await;
                self.render_highlights(request, &report.highlights, &cancel, &logger)
                    .await
            } else {
                None
            };
        check_cancel(&cancel)?;

        let video_duration_secs = duration
            .filter(|d| *d > 0.0)
            .unwrap_or_else(|| tracking.last_timestamp + 1.0 / fps.max(1.0));
        let analytics = MatchAnalytics {
            match_id: request.match_id,
            run_id: request.run_id.clone(),
            player1_stats: report.player1_stats,
            player2_stats: report.player2_stats,
            rally_stats: report.rally_stats,
            shots,
            highlights: report.highlights,
            highlights_video_path,
            calibration: calibration.summary(),
            processing: ProcessingSummary {
                frames_processed: tracking.frames_processed,
                frames_skipped: tracking.frames_skipped,
                ball_detection_rate: tracking.ball_detection_rate,
                video_duration_secs,
                processing_secs: started.elapsed().as_secs_f64(),
                classifier: classifier.name().to_string(),
            },
            generated_at: Utc::now(),
        };

        self.stage(request, &logger, Stage::Persisting).await;
        let persist_started = Instant::now();
        let persisted = self.sink.persist(request.match_id, &analytics).await;
        metrics::record_persist(
            self.sink.name(),
            persisted.is_ok(),
            persist_started.elapsed().as_secs_f64(),
        );
        persisted?;

        Ok(analytics)
    }

    /// Decode and track every frame.
    async fn track<S: FrameSource>(
        &self,
        request: &MatchRequest,
        source: &mut S,
        cancel: &watch::Receiver<bool>,
        logger: &RunLogger,
    ) -> WorkerResult<TrackingOutcome> {
        let pipeline = &self.config.pipeline;
        let total = source.expected_frames();
        let mut pass = TrackingPass::new(self.capabilities.clone(), pipeline, source.frame_rate());
        let mut consecutive_skips = 0u32;

        self.stage(request, logger, Stage::Calibrating).await;
        loop {
            check_cancel(cancel)?;

            let frame = match source.next_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) if e.is_recoverable_frame_error() => {
                    consecutive_skips += 1;
                    pass.record_skipped();
                    logger.log_warning(&format!("Skipping unreadable frame: {}", e));
                    if consecutive_skips > pipeline.max_consecutive_skips {
                        let frame = match e {
                            MediaError::CorruptFrame { index, .. } => index,
                            _ => pass.frames_processed(),
                        };
                        return Err(WorkerError::TooManySkippedFrames {
                            skipped: consecutive_skips,
                            frame,
                        });
                    }
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            consecutive_skips = 0;

            let was_calibrated = pass.is_calibrated();
            pass = tokio::task::spawn_blocking(move || {
                pass.ingest(&frame);
                pass
            })
            .await
            .map_err(|e| WorkerError::internal(format!("Frame task join error: {}", e)))?;

            if !was_calibrated {
                if let Some(calibration) = pass.calibration() {
                    if calibration.is_low_confidence() {
                        logger.log_warning("Court not found, using default calibration");
                    }
                }
                self.stage(request, logger, Stage::Tracking).await;
            }

            let processed = pass.frames_processed();
            if processed % pipeline.progress_every.max(1) == 0 {
                logger.log_progress(processed, total);
                self.report(
                    request,
                    RunEvent::Progress {
                        frames: processed,
                        total,
                    },
                )
                .await;
            }
        }

        let outcome = pass.finish();
        self.report(
            request,
            RunEvent::Progress {
                frames: outcome.frames_processed,
                total,
            },
        )
        .await;
        if outcome.detector_failures > 0 {
            logger.log_warning(&format!(
                "Detector failed on {} frame(s)",
                outcome.detector_failures
            ));
        }
        metrics::record_frames(outcome.frames_processed, outcome.frames_skipped);
        metrics::record_ball_detection_rate(outcome.ball_detection_rate);
        Ok(outcome)
    }

    /// Cut the highlight reel. Failures are logged and leave the path empty.
    async fn render_highlights(
        &self,
        request: &MatchRequest,
        clips: &[HighlightClip],
        cancel: &watch::Receiver<bool>,
        logger: &RunLogger,
    ) -> Option<String> {
        let result = async {
            let work_dir = &self.config.work_dir;
            tokio::fs::create_dir_all(work_dir).await?;
            let scratch = tempfile::Builder::new()
                .prefix("highlights-")
                .tempdir_in(work_dir)?;

            let extension = request
                .video_path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("mp4");
            let output = work_dir.join(format!(
                "match_{}_{}_highlights.{}",
                request.match_id, request.run_id, extension
            ));

            let runner = FfmpegRunner::new().with_cancel(cancel.clone());
            let path =
                render_highlight_reel(&runner, &request.video_path, clips, scratch.path(), &output)
                    .await?;
            Ok::<_, WorkerError>(path)
        }
        .await;

        match result {
            Ok(path) => Some(path.display().to_string()),
            Err(e) => {
                logger.log_warning(&format!("Highlight reel failed: {}", e));
                metrics::record_highlight_failure();
                None
            }
        }
    }

    async fn stage(&self, request: &MatchRequest, logger: &RunLogger, stage: Stage) {
        logger.log_stage(stage.as_str());
        self.report(request, RunEvent::Stage { name: stage }).await;
    }

    async fn report(&self, request: &MatchRequest, event: RunEvent) {
        self.status
            .report(&RunStatus::new(request.match_id, &request.run_id, event))
            .await;
    }
}

fn check_cancel(cancel: &watch::Receiver<bool>) -> WorkerResult<()> {
    if *cancel.borrow() {
        Err(WorkerError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = MatchRequest::new(MatchId::new(4), "/videos/final.mp4");
        assert!(request.highlights);
        assert!(!request.with_highlights(false).highlights);
    }

    #[test]
    fn test_check_cancel() {
        let (tx, rx) = watch::channel(false);
        assert!(check_cancel(&rx).is_ok());
        tx.send(true).unwrap();
        assert!(matches!(check_cancel(&rx), Err(WorkerError::Cancelled)));
    }
}
