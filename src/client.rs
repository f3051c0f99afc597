//! Analytics backend client
//!
//! `DashboardBackend` is the contract every other component consumes.
//! `ApiClient` implements it over HTTP with a long-lived reqwest::Client
//! for connection pooling.

use crate::config::DashboardConfig;
use crate::error::DashboardError;
use crate::models::{AskRagRequest, AskRagResponse, Insight, KpiMetrics, ModelConfig, PipelineStatus, Provider};
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

/// Remote Data Source contract
#[async_trait]
pub trait DashboardBackend: Send + Sync {
    async fn pipeline_status(&self) -> Result<PipelineStatus>;
    async fn kpis(&self) -> Result<KpiMetrics>;
    async fn generate_insight(&self, provider: Provider) -> Result<Insight>;
    async fn ask_rag(&self, request: &AskRagRequest) -> Result<AskRagResponse>;
    async fn model_config(&self) -> Result<ModelConfig>;
}

/// Error body the backend attaches to non-2xx responses
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

/// Reusable backend client (connection-pooled)
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &DashboardConfig) -> Result<Self> {
        Self::new(config.api_base_url.clone(), config.http_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, path: &str, request: RequestBuilder) -> Result<T> {
        debug!(path, "Calling analytics backend");

        let response = request.send().await.map_err(|e| {
            error!(path, "Backend request failed: {}", e);
            DashboardError::Network(format!("request to {} failed: {}", path, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = extract_detail(&body)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| "request failed".to_string());

            error!(path, status = status.as_u16(), %detail, "Backend error response");
            return Err(DashboardError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        response.json::<T>().await.map_err(|e| {
            error!(path, "Failed to parse backend response: {}", e);
            DashboardError::Network(format!("invalid response from {}: {}", path, e))
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(path, self.client.get(self.url(path))).await
    }
}

/// `{detail}` from an error body; falls back to the raw text when the body
/// is not the expected shape.
fn extract_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<ErrorBody>(trimmed) {
        Ok(ErrorBody { detail: Some(serde_json::Value::String(s)) }) => Some(s),
        Ok(ErrorBody { detail: Some(other) }) => Some(other.to_string()),
        _ => Some(trimmed.to_string()),
    }
}

#[async_trait]
impl DashboardBackend for ApiClient {
    async fn pipeline_status(&self) -> Result<PipelineStatus> {
        self.get_json("/status/pipeline").await
    }

    async fn kpis(&self) -> Result<KpiMetrics> {
        self.get_json("/analytics/kpis").await
    }

    async fn generate_insight(&self, provider: Provider) -> Result<Insight> {
        let path = "/llm/generate_insight";
        let request = self
            .client
            .get(self.url(path))
            .query(&[("provider", provider.as_str())]);
        self.send(path, request).await
    }

    async fn ask_rag(&self, request: &AskRagRequest) -> Result<AskRagResponse> {
        let path = "/llm/ask_rag";
        let builder = self
            .client
            .post(self.url(path))
            .json(request);
        self.send(path, builder).await
    }

    async fn model_config(&self) -> Result<ModelConfig> {
        self.get_json("/config/model").await
    }
}
