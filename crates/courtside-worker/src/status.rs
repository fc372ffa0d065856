//! Run status reporting.
//!
//! The processor reports coarse progress to a [`StatusSink`]. Reports are
//! fire-and-forget: a sink that cannot deliver drops the update, it never
//! fails the run.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use courtside_models::{MatchId, RunId, RunState};

/// Pipeline stage names as reported to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Calibrating,
    Tracking,
    Classifying,
    Segmenting,
    Aggregating,
    Highlights,
    Persisting,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Calibrating => "calibrating",
            Stage::Tracking => "tracking",
            Stage::Classifying => "classifying",
            Stage::Segmenting => "segmenting",
            Stage::Aggregating => "aggregating",
            Stage::Highlights => "highlights",
            Stage::Persisting => "persisting",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started,
    Progress { frames: u64, total: Option<u64> },
    Stage { name: Stage },
    Completed,
    Failed { message: String },
}

impl RunEvent {
    /// Run state implied by this event.
    pub fn state(&self) -> RunState {
        match self {
            RunEvent::Started | RunEvent::Progress { .. } | RunEvent::Stage { .. } => {
                RunState::Processing
            }
            RunEvent::Completed => RunState::Completed,
            RunEvent::Failed { .. } => RunState::Failed,
        }
    }
}

/// One status update of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    pub match_id: MatchId,
    pub run_id: RunId,
    #[serde(flatten)]
    pub event: RunEvent,
}

impl RunStatus {
    pub fn new(match_id: MatchId, run_id: &RunId, event: RunEvent) -> Self {
        Self {
            match_id,
            run_id: run_id.clone(),
            event,
        }
    }

    /// Fraction of frames done, when the total is known.
    pub fn progress_fraction(&self) -> Option<f64> {
        match self.event {
            RunEvent::Progress {
                frames,
                total: Some(total),
            } if total > 0 => Some((frames as f64 / total as f64).min(1.0)),
            _ => None,
        }
    }
}

#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn report(&self, status: &RunStatus);
}

/// Writes every update to the log.
#[derive(Debug, Clone, Default)]
pub struct TracingStatusSink;

#[async_trait]
impl StatusSink for TracingStatusSink {
    async fn report(&self, status: &RunStatus) {
        match &status.event {
            RunEvent::Failed { message } => warn!(
                match_id = %status.match_id,
                run_id = %status.run_id,
                state = status.event.state().as_str(),
                "Run failed: {}", message
            ),
            RunEvent::Progress { frames, total } => debug!(
                match_id = %status.match_id,
                run_id = %status.run_id,
                frames,
                total = ?total,
                "Run progress"
            ),
            event => info!(
                match_id = %status.match_id,
                run_id = %status.run_id,
                state = event.state().as_str(),
                event = ?event,
                "Run status"
            ),
        }
    }
}

/// Forwards updates over a channel, e.g. to a websocket or queue publisher.
#[derive(Debug, Clone)]
pub struct ChannelStatusSink {
    tx: mpsc::Sender<RunStatus>,
}

impl ChannelStatusSink {
    pub fn new(tx: mpsc::Sender<RunStatus>) -> Self {
        Self { tx }
    }

    /// Sink plus the receiving end, with room for `buffer` pending updates.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<RunStatus>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl StatusSink for ChannelStatusSink {
    async fn report(&self, status: &RunStatus) {
        // Progress may be dropped under backpressure; state changes wait for room.
        let result = match status.event {
            RunEvent::Progress { .. } => self.tx.try_send(status.clone()).map_err(|e| e.to_string()),
            _ => self.tx.send(status.clone()).await.map_err(|e| e.to_string()),
        };
        if let Err(e) = result {
            debug!(match_id = %status.match_id, error = %e, "Status update dropped");
        }
    }
}
