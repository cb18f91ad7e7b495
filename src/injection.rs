//! Event injection into the ingestion pipeline
//! Sends generated samples as gzip-compressed NDJSON, one attempt per batch

use crate::error_handling::{ErrorContext, ValidatorError, ValidatorResult};
use crate::models::SampleEvent;
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::debug;

/// Per-item outcome reported by the ingestion endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectionOutcome {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InjectionOutcome {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            error: None,
        }
    }

    pub fn rejected<S: Into<String>>(reason: S) -> Self {
        Self {
            accepted: false,
            error: Some(reason.into()),
        }
    }
}

/// Pushes sample events into the pipeline ahead of a validation query
#[async_trait]
pub trait EventInjector: Send + Sync {
    /// Submit events for a product; returns one outcome per event, in order
    async fn submit(
        &self,
        events: &[SampleEvent],
        product_id: &str,
    ) -> ValidatorResult<Vec<InjectionOutcome>>;
}

#[derive(Debug, Deserialize)]
struct IngestResponse {
    #[serde(default)]
    results: Option<Vec<InjectionOutcome>>,
}

/// HTTP ingestion client
pub struct HttpEventInjector {
    client: Client,
    endpoint: String,
}

impl HttpEventInjector {
    pub fn new(endpoint: &str, timeout: Duration) -> ValidatorResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| "Failed to create ingestion HTTP client".to_string())?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    /// Serialize events as NDJSON; text events are sent as JSON strings
    fn encode(events: &[SampleEvent]) -> ValidatorResult<(Vec<u8>, usize)> {
        let mut payload = String::new();
        for event in events {
            let line = serde_json::to_string(&event.to_wire_value())
                .with_context(|| "Failed to serialize sample event".to_string())?;
            payload.push_str(&line);
            payload.push('\n');
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload.as_bytes())?;
        let compressed = encoder.finish()?;
        Ok((compressed, payload.len()))
    }
}

#[async_trait]
impl EventInjector for HttpEventInjector {
    async fn submit(
        &self,
        events: &[SampleEvent],
        product_id: &str,
    ) -> ValidatorResult<Vec<InjectionOutcome>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let (body, raw_len) = Self::encode(events)?;
        debug!(
            "Injecting {} events for {} ({} bytes, {} compressed)",
            events.len(),
            product_id,
            raw_len,
            body.len()
        );

        let target = format!("inject {} events for {}", events.len(), product_id);
        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/x-ndjson")
            .header("Content-Encoding", "gzip")
            .header("X-Product-Id", product_id)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                ValidatorError::connectivity(
                    "failed to reach ingestion endpoint",
                    target.clone(),
                    started.elapsed().as_millis() as u64,
                    Some(e.into()),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ValidatorError::backend(
                format!("HTTP {}: {}", status.as_u16(), text),
                target,
                started.elapsed().as_millis() as u64,
                Some(status.as_u16()),
            ));
        }

        // Endpoints that do not report per-item results accept the whole batch
        let text = response.text().await.unwrap_or_default();
        let reported = serde_json::from_str::<IngestResponse>(&text)
            .ok()
            .and_then(|r| r.results);

        match reported {
            None => Ok(vec![InjectionOutcome::accepted(); events.len()]),
            Some(outcomes) if outcomes.len() == events.len() => Ok(outcomes),
            Some(outcomes) => Err(ValidatorError::backend(
                format!(
                    "ingestion endpoint reported {} results for {} events",
                    outcomes.len(),
                    events.len()
                ),
                target,
                started.elapsed().as_millis() as u64,
                Some(status.as_u16()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use serde_json::json;
    use std::io::Read;

    #[test]
    fn test_encode_ndjson() {
        let events = vec![
            SampleEvent::structured(json!({"a": 1})),
            SampleEvent::text("date=2024-01-01 action=deny"),
        ];
        let (body, raw_len) = HttpEventInjector::encode(&events).unwrap();

        let mut decoded = String::new();
        GzDecoder::new(body.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded.len(), raw_len);

        let lines: Vec<&str> = decoded.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"a":1}"#);
        assert_eq!(lines[1], r#""date=2024-01-01 action=deny""#);
    }
}
