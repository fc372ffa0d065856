//! Hand-off of finished analytics.
//!
//! A run persists exactly once, after every stage has succeeded. Sinks make a
//! single attempt; retrying is left to whoever dispatched the run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use courtside_models::{MatchAnalytics, MatchId};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Header carrying the service token on API calls.
pub const SERVICE_TOKEN_HEADER: &str = "X-Service-Token";

const PERSIST_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn persist(&self, match_id: MatchId, analytics: &MatchAnalytics) -> WorkerResult<()>;

    fn name(&self) -> &'static str;
}

/// Posts the payload to the analytics API.
#[derive(Debug, Clone)]
pub struct ApiAnalyticsSink {
    client: Client,
    config: WorkerConfig,
}

impl ApiAnalyticsSink {
    pub fn new(config: WorkerConfig) -> WorkerResult<Self> {
        let client = Client::builder()
            .timeout(PERSIST_TIMEOUT)
            .build()
            .map_err(|e| WorkerError::config_error(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl AnalyticsSink for ApiAnalyticsSink {
    async fn persist(&self, match_id: MatchId, analytics: &MatchAnalytics) -> WorkerResult<()> {
        let url = self.config.save_url(match_id.0);
        debug!(match_id = %match_id, url = %url, "Posting analytics");

        let mut request = self.client.post(&url).json(analytics);
        if let Some(token) = &self.config.service_token {
            request = request.header(SERVICE_TOKEN_HEADER, token);
        }

        let response = request.send().await.map_err(|e| {
            WorkerError::persistence_failed(format!("Analytics API request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(WorkerError::persistence_failed(format!(
                "Analytics API returned {}: {}",
                status, error_text
            )));
        }

        info!(match_id = %match_id, shots = analytics.shots.len(), "Analytics saved");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "api"
    }
}

/// Writes the payload as pretty-printed JSON to a file.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AnalyticsSink for JsonFileSink {
    async fn persist(&self, match_id: MatchId, analytics: &MatchAnalytics) -> WorkerResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(analytics)?;
        tokio::fs::write(&self.path, body).await.map_err(|e| {
            WorkerError::persistence_failed(format!(
                "Failed to write {}: {}",
                self.path.display(),
                e
            ))
        })?;

        info!(match_id = %match_id, path = %self.path.display(), "Analytics written");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "file"
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::empty_analytics;
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> WorkerConfig {
        WorkerConfig {
            api_url: server.uri(),
            service_token: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_api_sink_posts_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/analytics/matches/12/save-from-ml"))
            .and(header("X-Service-Token", "secret"))
            .and(body_partial_json(serde_json::json!({ "match_id": 12 })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = ApiAnalyticsSink::new(config_for(&server)).unwrap();
        sink.persist(MatchId::new(12), &empty_analytics(12))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_api_sink_single_attempt_on_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(1)
            .mount(&server)
            .await;

        let sink = ApiAnalyticsSink::new(config_for(&server)).unwrap();
        let err = sink
            .persist(MatchId::new(12), &empty_analytics(12))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkerError::PersistenceFailed(_)));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_file_sink_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("out").join("match-5.json"));
        sink.persist(MatchId::new(5), &empty_analytics(5))
            .await
            .unwrap();

        let body = tokio::fs::read_to_string(sink.path()).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["match_id"], 5);
        assert!(value["highlights_video_path"].is_null());
    }
}
