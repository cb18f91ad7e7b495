//! Transport to the analytics backend query API

use super::handle::QueryState;
use super::QueryRequest;
use crate::error_handling::{ErrorContext, ValidatorResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Failure talking to the backend, before query context is attached
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Connect(#[source] anyhow::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Status reported by the backend for one query id
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub state: QueryState,
    pub error: Option<String>,
}

/// Query API implemented by the analytics backend
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Submit a query and return the backend query id
    async fn submit(&self, request: &QueryRequest) -> Result<String, TransportError>;

    async fn status(&self, query_id: &str) -> Result<StatusReport, TransportError>;

    /// Ordered event records of a finished query
    async fn results(&self, query_id: &str) -> Result<Vec<Value>, TransportError>;
}

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    query: &'a str,
    scope: &'a str,
    window_start: String,
    window_end: String,
    limit: u32,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(rename = "queryId")]
    query_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultsResponse {
    #[serde(default)]
    events: Vec<Value>,
}

/// reqwest implementation of [`QueryBackend`]
pub struct HttpQueryBackend {
    client: Client,
    base_url: String,
}

impl HttpQueryBackend {
    pub fn new(base_url: &str, timeout: Duration) -> ValidatorResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .with_context(|| "Failed to create HTTP client".to_string())?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl QueryBackend for HttpQueryBackend {
    async fn submit(&self, request: &QueryRequest) -> Result<String, TransportError> {
        let body = SubmitBody {
            query: &request.query,
            scope: request.scope.as_str(),
            window_start: request.window.start.to_rfc3339(),
            window_end: request.window.end.to_rfc3339(),
            limit: request.limit,
        };

        let response = self
            .client
            .post(format!("{}/api/query", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.into()))?;

        let submitted: SubmitResponse = Self::read_json(response).await?;
        debug!("Backend accepted query as {}", submitted.query_id);
        Ok(submitted.query_id)
    }

    async fn status(&self, query_id: &str) -> Result<StatusReport, TransportError> {
        let response = self
            .client
            .get(format!("{}/api/query/{}", self.base_url, query_id))
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.into()))?;

        let report: StatusResponse = Self::read_json(response).await?;
        let state = QueryState::from_wire(&report.status).ok_or_else(|| {
            TransportError::Malformed(format!("unknown query status '{}'", report.status))
        })?;

        Ok(StatusReport {
            state,
            error: report.error,
        })
    }

    async fn results(&self, query_id: &str) -> Result<Vec<Value>, TransportError> {
        let response = self
            .client
            .get(format!("{}/api/query/{}/results", self.base_url, query_id))
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.into()))?;

        let results: ResultsResponse = Self::read_json(response).await?;
        Ok(results.events)
    }
}
