//! Match analytics worker.
//!
//! This crate provides:
//! - `MatchProcessor`, which runs one match video through the whole pipeline
//! - Worker configuration from the environment
//! - Capability loading for the pretrained models
//! - Status reporting and analytics persistence sinks
//! - Structured run logging and Prometheus metrics

pub mod capabilities;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod persistence;
pub mod processor;
pub mod status;
pub mod tracking_pass;

pub use capabilities::Capabilities;
pub use config::{ModelPaths, PipelineConfig, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use logging::RunLogger;
pub use persistence::{AnalyticsSink, ApiAnalyticsSink, JsonFileSink};
pub use processor::{MatchProcessor, MatchRequest};
pub use status::{ChannelStatusSink, RunEvent, RunStatus, Stage, StatusSink, TracingStatusSink};
