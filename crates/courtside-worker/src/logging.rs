//! Structured run logging.
//!
//! Every line logged through [`RunLogger`] carries the match id, run id and
//! operation, so one run can be followed through interleaved worker output.

use tracing::{error, info, warn, Span};

use courtside_models::{MatchId, RunId};

/// Logs lifecycle events of one match run.
#[derive(Debug, Clone)]
pub struct RunLogger {
    match_id: MatchId,
    run_id: RunId,
    operation: String,
}

impl RunLogger {
    pub fn new(match_id: MatchId, run_id: &RunId, operation: &str) -> Self {
        Self {
            match_id,
            run_id: run_id.clone(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            match_id = %self.match_id,
            run_id = %self.run_id,
            operation = %self.operation,
            "Run started: {}", message
        );
    }

    pub fn log_stage(&self, stage: &str) {
        info!(
            match_id = %self.match_id,
            run_id = %self.run_id,
            operation = %self.operation,
            stage,
            "Run stage: {}", stage
        );
    }

    pub fn log_progress(&self, frames: u64, total: Option<u64>) {
        info!(
            match_id = %self.match_id,
            run_id = %self.run_id,
            operation = %self.operation,
            frames,
            total = ?total,
            "Run progress"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            match_id = %self.match_id,
            run_id = %self.run_id,
            operation = %self.operation,
            "Run warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            match_id = %self.match_id,
            run_id = %self.run_id,
            operation = %self.operation,
            "Run error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            match_id = %self.match_id,
            run_id = %self.run_id,
            operation = %self.operation,
            "Run completed: {}", message
        );
    }

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span covering the whole run; enter it around work that logs without
    /// going through the logger.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "run",
            match_id = %self.match_id,
            run_id = %self.run_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_logger_creation() {
        let run_id = RunId::new();
        let logger = RunLogger::new(MatchId::new(7), &run_id, "match_analysis");

        assert_eq!(logger.match_id(), MatchId::new(7));
        assert_eq!(logger.run_id(), &run_id);
        assert_eq!(logger.operation(), "match_analysis");
    }
}
