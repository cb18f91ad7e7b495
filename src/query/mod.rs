//! Asynchronous backend query client
//!
//! Submits a query, polls it to completion with a bounded attempt count,
//! fetches the resulting events and memoizes successful results.

pub mod backend;
pub mod cache;
pub mod handle;
pub mod metrics;

pub use backend::{HttpQueryBackend, QueryBackend, StatusReport, TransportError};
pub use cache::{CacheKey, QueryCache};
pub use handle::{QueryHandle, QueryState};
pub use metrics::{ClientStats, QueryMetrics};

use crate::config::ValidatorConfig;
use crate::error_handling::{ValidatorError, ValidatorResult};
use crate::models::SampleEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 30;

/// Tenant/account a query runs under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryScope(String);

impl QueryScope {
    pub fn new<S: Into<String>>(scope: S) -> Self {
        Self(scope.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Inclusive time range a query searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window covering the last `minutes` up to now
    pub fn last_minutes(minutes: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - chrono::Duration::minutes(minutes),
            end,
        }
    }
}

/// Everything sent to the backend for one submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub scope: QueryScope,
    pub query: String,
    pub window: TimeWindow,
    pub limit: u32,
}

/// Ordered events of a finished query, consumed once
#[derive(Debug)]
pub struct QueryResults {
    events: std::vec::IntoIter<SampleEvent>,
    total: usize,
    from_cache: bool,
}

impl QueryResults {
    fn new(events: Vec<SampleEvent>, from_cache: bool) -> Self {
        Self {
            total: events.len(),
            events: events.into_iter(),
            from_cache,
        }
    }

    /// Number of events the query returned, independent of consumption
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn from_cache(&self) -> bool {
        self.from_cache
    }
}

impl Iterator for QueryResults {
    type Item = SampleEvent;

    fn next(&mut self) -> Option<SampleEvent> {
        self.events.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.events.size_hint()
    }
}

impl ExactSizeIterator for QueryResults {}

/// Backend query client shared by every worker of a batch
#[derive(Clone)]
pub struct QueryClient {
    backend: Arc<dyn QueryBackend>,
    cache: Option<Arc<QueryCache>>,
    metrics: Arc<QueryMetrics>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl QueryClient {
    pub fn new(backend: Arc<dyn QueryBackend>) -> Self {
        Self {
            backend,
            cache: None,
            metrics: Arc::new(QueryMetrics::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
        }
    }

    /// HTTP client configured from the `backend`, `query` and `cache` sections
    pub fn from_config(config: &ValidatorConfig) -> ValidatorResult<Self> {
        let backend = HttpQueryBackend::new(&config.backend.url, config.request_timeout())?;
        let mut client = Self::new(Arc::new(backend))
            .with_polling(config.poll_interval(), config.query.max_poll_attempts);

        if config.cache.enabled {
            client = client.with_cache(Arc::new(QueryCache::new(
                config.cache.max_entries,
                config.cache_ttl(),
            )));
        }

        Ok(client)
    }

    pub fn with_cache(mut self, cache: Arc<QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn stats(&self) -> ClientStats {
        self.metrics.snapshot()
    }

    /// Submit a query; the returned handle starts in `Submitted`
    pub async fn submit(
        &self,
        scope: &QueryScope,
        query: &str,
        window: TimeWindow,
        limit: u32,
    ) -> ValidatorResult<QueryHandle> {
        let started = Instant::now();
        let request = QueryRequest {
            scope: scope.clone(),
            query: query.to_string(),
            window,
            limit,
        };

        self.metrics.record_submit();
        match self.backend.submit(&request).await {
            Ok(id) => {
                debug!("Submitted query {} for scope {}", id, scope);
                Ok(QueryHandle::new(id, request.query))
            }
            Err(e) => {
                self.metrics.record_failure();
                Err(attach_context(e, query, elapsed_ms(started)))
            }
        }
    }

    /// Poll until the query reaches a terminal state or attempts run out
    pub async fn poll(&self, handle: &mut QueryHandle) -> ValidatorResult<QueryState> {
        if handle.state().is_terminal() {
            return terminal_outcome(handle);
        }

        while handle.attempts() < self.max_attempts {
            let attempt = handle.record_attempt();
            self.metrics.record_poll();

            let report = match self.backend.status(handle.id()).await {
                Ok(report) => report,
                Err(e) => {
                    let err = attach_context(e, handle.query(), handle.elapsed_ms());
                    handle.fail(err.to_string())?;
                    self.metrics.record_failure();
                    return Err(err);
                }
            };

            debug!(
                "Query {} poll {}/{}: {}",
                handle.id(),
                attempt,
                self.max_attempts,
                report.state
            );

            match report.state {
                QueryState::Finished => {
                    handle.advance(QueryState::Finished)?;
                    return Ok(QueryState::Finished);
                }
                QueryState::Failed => {
                    let message = report
                        .error
                        .unwrap_or_else(|| "backend reported query failure".to_string());
                    handle.fail(message)?;
                    self.metrics.record_failure();
                    return terminal_outcome(handle);
                }
                state if state > handle.state() => handle.advance(state)?,
                _ => {}
            }

            if handle.attempts() < self.max_attempts {
                sleep(self.poll_interval).await;
            }
        }

        handle.advance(QueryState::TimedOut)?;
        self.metrics.record_timeout();
        warn!(
            "Query {} timed out after {} poll attempts",
            handle.id(),
            handle.attempts()
        );
        terminal_outcome(handle)
    }

    /// Fetch the events of a finished query
    pub async fn fetch(&self, handle: &QueryHandle) -> ValidatorResult<QueryResults> {
        if handle.state() != QueryState::Finished {
            return Err(ValidatorError::invalid_state(format!(
                "cannot fetch results of query {} in state {}",
                handle.id(),
                handle.state()
            )));
        }

        let records = match self.backend.results(handle.id()).await {
            Ok(records) => records,
            Err(e) => {
                self.metrics.record_failure();
                return Err(attach_context(e, handle.query(), handle.elapsed_ms()));
            }
        };

        let events: Vec<SampleEvent> = records.into_iter().map(SampleEvent::from).collect();
        self.metrics.record_success(events.len(), handle.elapsed());
        Ok(QueryResults::new(events, false))
    }

    /// Cached submit, poll and fetch
    pub async fn run_query(
        &self,
        scope: &QueryScope,
        query: &str,
        window: TimeWindow,
        limit: u32,
    ) -> ValidatorResult<QueryResults> {
        let key = CacheKey::new(scope, query, &window, limit);

        if let Some(cache) = &self.cache {
            if let Some(events) = cache.get(&key) {
                self.metrics.record_cache_hit();
                debug!("Cache hit for query '{}'", query);
                return Ok(QueryResults::new(events.as_ref().clone(), true));
            }
            self.metrics.record_cache_miss();
        }

        self.execute(key, scope, query, window, limit).await
    }

    /// Like [`run_query`](Self::run_query) but never served from the cache.
    /// Used after new events were pushed into the pipeline; the fresh result
    /// replaces any cached entry.
    pub async fn refresh_query(
        &self,
        scope: &QueryScope,
        query: &str,
        window: TimeWindow,
        limit: u32,
    ) -> ValidatorResult<QueryResults> {
        let key = CacheKey::new(scope, query, &window, limit);
        if let Some(cache) = &self.cache {
            cache.remove(&key);
        }
        self.execute(key, scope, query, window, limit).await
    }

    async fn execute(
        &self,
        key: CacheKey,
        scope: &QueryScope,
        query: &str,
        window: TimeWindow,
        limit: u32,
    ) -> ValidatorResult<QueryResults> {

        let mut handle = self.submit(scope, query, window, limit).await?;
        self.poll(&mut handle).await?;
        let events: Vec<SampleEvent> = self.fetch(&handle).await?.collect();

        info!(
            "Query '{}' returned {} events in {}ms",
            query,
            events.len(),
            handle.elapsed_ms()
        );

        if let Some(cache) = &self.cache {
            cache.insert(key, Arc::new(events.clone()));
        }

        Ok(QueryResults::new(events, false))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn attach_context(err: TransportError, query: &str, elapsed_ms: u64) -> ValidatorError {
    match err {
        TransportError::Connect(source) => ValidatorError::connectivity(
            "failed to reach analytics backend",
            query,
            elapsed_ms,
            Some(source),
        ),
        TransportError::Status { status, body } => ValidatorError::backend(
            format!("HTTP {}: {}", status, body),
            query,
            elapsed_ms,
            Some(status),
        ),
        TransportError::Malformed(message) => {
            ValidatorError::backend(message, query, elapsed_ms, None)
        }
    }
}

fn terminal_outcome(handle: &QueryHandle) -> ValidatorResult<QueryState> {
    match handle.state() {
        QueryState::Finished => Ok(QueryState::Finished),
        QueryState::Failed => Err(ValidatorError::backend(
            handle.error().unwrap_or("query failed").to_string(),
            handle.query(),
            handle.elapsed_ms(),
            None,
        )),
        QueryState::TimedOut => Err(ValidatorError::timeout(
            handle.query(),
            handle.attempts(),
            handle.elapsed_ms(),
        )),
        state => Err(ValidatorError::invalid_state(format!(
            "query {} is not terminal ({})",
            handle.id(),
            state
        ))),
    }
}
