//! Batch orchestrator
//!
//! Validates many (generator, parser) pairs concurrently on a bounded worker
//! pool. Every unit of work ends in exactly one [`ValidationResult`]: errors,
//! per-pair timeouts and worker panics are recorded as failed results instead
//! of aborting the batch.

use crate::analyzer::{AnalysisStatus, FieldAnalyzer};
use crate::config::{render_query, ThresholdConfig, ValidatorConfig};
use crate::error_handling::{ValidatorError, ValidatorResult};
use crate::generator::{draw_samples, EventGenerator, GeneratorRegistry};
use crate::injection::{EventInjector, HttpEventInjector};
use crate::models::{SampleEvent, ValidationPair, ValidationResult, ValidationStatus};
use crate::query::{QueryClient, QueryScope, TimeWindow};
use crate::scoring::ScoringEngine;
use crate::summary::BatchResult;
use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_PAIR_TIMEOUT: Duration = Duration::from_secs(120);

/// Category used when a generator does not declare one: the first segment of its id
pub fn category_from_id(generator_id: &str) -> String {
    generator_id
        .split(|c: char| c == '_' || c == '-' || c == '.')
        .find(|part| !part.is_empty())
        .unwrap_or("uncategorized")
        .to_ascii_lowercase()
}

fn category_for(generator: &dyn EventGenerator) -> String {
    generator
        .category()
        .map(str::to_string)
        .unwrap_or_else(|| category_from_id(generator.id()))
}

/// Sequential submit, poll, fetch, analyze and score for one pair
#[derive(Clone)]
struct PairValidator {
    client: QueryClient,
    registry: GeneratorRegistry,
    scoring: ScoringEngine,
    analyzer: FieldAnalyzer,
    injector: Option<Arc<dyn EventInjector>>,
    scope: QueryScope,
    samples_per_pair: usize,
    limit: u32,
    query_template: String,
}

impl PairValidator {
    fn query_for(&self, pair: &ValidationPair) -> String {
        pair.query
            .clone()
            .unwrap_or_else(|| render_query(&self.query_template, &pair.parser))
    }

    fn samples(&self, generator: &dyn EventGenerator) -> ValidatorResult<Vec<SampleEvent>> {
        let samples = draw_samples(generator, self.samples_per_pair)?;
        if let Some(position) = samples
            .iter()
            .position(|s| matches!(s, SampleEvent::Text(line) if line.trim().is_empty()))
        {
            return Err(ValidatorError::generation(
                generator.id(),
                format!("sample {} is empty", position + 1),
            ));
        }
        Ok(samples)
    }

    async fn validate(
        &self,
        pair: &ValidationPair,
        window: TimeWindow,
    ) -> ValidatorResult<ValidationResult> {
        let started = Instant::now();
        let generator = self.registry.get(&pair.generator)?;
        let category = category_for(generator.as_ref());
        let samples = self.samples(generator.as_ref())?;

        let query = self.query_for(pair);
        let results = match &self.injector {
            Some(injector) => {
                let outcomes = injector.submit(&samples, generator.product_id()).await?;
                let accepted = outcomes.iter().filter(|o| o.accepted).count();
                if accepted < outcomes.len() {
                    warn!(
                        "{}: ingestion accepted {}/{} samples",
                        pair,
                        accepted,
                        outcomes.len()
                    );
                }
                // a cached result predates this injection
                self.client
                    .refresh_query(&self.scope, &query, window, self.limit)
                    .await?
            }
            None => {
                self.client
                    .run_query(&self.scope, &query, window, self.limit)
                    .await?
            }
        };
        let events: Vec<SampleEvent> = results.collect();

        let expected = self.analyzer.aggregate(&samples);
        let extracted = self.analyzer.aggregate(&events);

        let (status, scorecard, matched, missing, extra, degenerate) = match extracted.status {
            AnalysisStatus::NoEvents => (
                ValidationStatus::NoEvents,
                self.scoring.no_events_scorecard(),
                Vec::new(),
                expected.fields.names().map(str::to_string).collect(),
                Vec::new(),
                None,
            ),
            AnalysisStatus::NoFields => {
                let comparison = self.scoring.compare(&expected.fields, &extracted.fields);
                (
                    ValidationStatus::NoFields,
                    self.scoring.no_fields_scorecard(events.len()),
                    Vec::new(),
                    comparison.missing,
                    Vec::new(),
                    comparison.degenerate,
                )
            }
            AnalysisStatus::Ok => {
                let (comparison, scorecard) = self.scoring.score(&expected, &extracted);
                (
                    ValidationStatus::Validated,
                    scorecard,
                    comparison.matched,
                    comparison.missing,
                    comparison.extra,
                    comparison.degenerate,
                )
            }
        };

        debug!(
            "{}: {} events, grade {}, extraction {:.1}%",
            pair,
            events.len(),
            scorecard.grade,
            scorecard.metrics.extraction_rate
        );

        Ok(ValidationResult {
            generator_id: pair.generator.clone(),
            parser_id: pair.parser.clone(),
            category,
            status,
            events_generated: samples.len(),
            events_found: events.len(),
            metrics: scorecard.metrics,
            grade: scorecard.grade,
            matched_fields: matched,
            missing_fields: missing,
            extra_fields: extra,
            recommendations: scorecard.recommendations,
            degenerate,
            error: None,
            elapsed_ms: started.elapsed().as_millis() as u64,
            validated_at: Utc::now(),
        })
    }

    fn category_hint(&self, pair: &ValidationPair) -> String {
        match self.registry.get(&pair.generator) {
            Ok(generator) => category_for(generator.as_ref()),
            Err(_) => category_from_id(&pair.generator),
        }
    }
}

/// Runs pair validations on a bounded worker pool
pub struct BatchOrchestrator {
    validator: PairValidator,
    workers: usize,
    pair_timeout: Duration,
    window_minutes: i64,
    thresholds: ThresholdConfig,
}

impl BatchOrchestrator {
    pub fn new(client: QueryClient, registry: GeneratorRegistry, scope: QueryScope) -> Self {
        let defaults = ValidatorConfig::default();
        Self {
            validator: PairValidator {
                client,
                registry,
                scoring: ScoringEngine::default(),
                analyzer: FieldAnalyzer::default(),
                injector: None,
                scope,
                samples_per_pair: defaults.batch.samples_per_pair,
                limit: defaults.query.limit,
                query_template: defaults.query.template,
            },
            workers: DEFAULT_WORKERS,
            pair_timeout: DEFAULT_PAIR_TIMEOUT,
            window_minutes: defaults.query.window_minutes,
            thresholds: defaults.thresholds,
        }
    }

    /// Orchestrator wired from configuration, with an HTTP injector when enabled
    pub fn from_config(
        config: &ValidatorConfig,
        client: QueryClient,
        registry: GeneratorRegistry,
    ) -> ValidatorResult<Self> {
        let mut orchestrator = Self::new(client, registry, QueryScope::new(&config.backend.scope))
            .with_workers(config.batch.workers)
            .with_pair_timeout(config.pair_timeout())
            .with_scoring(ScoringEngine::from_config(&config.scoring))
            .with_analyzer(FieldAnalyzer::new(config.scoring.max_depth))
            .with_query(&config.query.template, config.query.limit, config.query.window_minutes)
            .with_samples_per_pair(config.batch.samples_per_pair)
            .with_thresholds(config.thresholds.clone());

        if config.batch.inject_samples {
            let endpoint = config.backend.ingest_url.as_deref().ok_or_else(|| {
                ValidatorError::configuration("inject_samples requires backend.ingest_url")
            })?;
            orchestrator = orchestrator.with_injector(Arc::new(HttpEventInjector::new(
                endpoint,
                config.request_timeout(),
            )?));
        }

        Ok(orchestrator)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_pair_timeout(mut self, timeout: Duration) -> Self {
        self.pair_timeout = timeout;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringEngine) -> Self {
        self.validator.scoring = scoring;
        self
    }

    pub fn with_analyzer(mut self, analyzer: FieldAnalyzer) -> Self {
        self.validator.analyzer = analyzer;
        self
    }

    pub fn with_injector(mut self, injector: Arc<dyn EventInjector>) -> Self {
        self.validator.injector = Some(injector);
        self
    }

    pub fn with_samples_per_pair(mut self, samples: usize) -> Self {
        self.validator.samples_per_pair = samples.max(1);
        self
    }

    /// Query template (`{parser}` placeholder), result limit and look-back window
    pub fn with_query(mut self, template: &str, limit: u32, window_minutes: i64) -> Self {
        let validator = &mut self.validator;
        validator.query_template = template.to_string();
        validator.limit = limit;
        self.window_minutes = window_minutes;
        self
    }

    pub fn with_thresholds(mut self, thresholds: ThresholdConfig) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn client(&self) -> &QueryClient {
        &self.validator.client
    }

    /// Validate every pair; the result holds one record per pair, in request order
    pub async fn run(&self, pairs: &[ValidationPair]) -> ValidatorResult<BatchResult> {
        let started_at = Utc::now();
        // one window per batch so repeated queries share cache entries
        let window = TimeWindow::last_minutes(self.window_minutes);
        let shared = Arc::new(self.validator.clone());
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let collected: Arc<Mutex<Vec<(usize, ValidationResult)>>> =
            Arc::new(Mutex::new(Vec::with_capacity(pairs.len())));

        info!(
            "Validating {} pairs with {} workers (timeout {}s)",
            pairs.len(),
            self.workers,
            self.pair_timeout.as_secs()
        );

        let tasks: Vec<_> = pairs
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, pair)| {
                let validator = Arc::clone(&shared);
                let semaphore = Arc::clone(&semaphore);
                let collected = Arc::clone(&collected);
                let pair_timeout = self.pair_timeout;

                tokio::spawn(async move {
                    let result = match semaphore.acquire_owned().await {
                        Ok(_permit) => {
                            let started = Instant::now();
                            match tokio::time::timeout(pair_timeout, validator.validate(&pair, window))
                                .await
                            {
                                Ok(Ok(result)) => result,
                                Ok(Err(e)) => {
                                    warn!("{} failed: {}", pair, e);
                                    ValidationResult::failed(
                                        &pair,
                                        &validator.category_hint(&pair),
                                        e.to_summary(),
                                        started.elapsed().as_millis() as u64,
                                    )
                                }
                                Err(_) => {
                                    warn!("{} exceeded {:?}", pair, pair_timeout);
                                    ValidationResult::failed(
                                        &pair,
                                        &validator.category_hint(&pair),
                                        ValidatorError::pair_timeout(pair.to_string(), pair_timeout)
                                            .to_summary(),
                                        started.elapsed().as_millis() as u64,
                                    )
                                }
                            }
                        }
                        Err(e) => ValidationResult::failed(
                            &pair,
                            &validator.category_hint(&pair),
                            ValidatorError::internal(format!("worker pool closed: {}", e)).to_summary(),
                            0,
                        ),
                    };
                    collected.lock().push((index, result));
                })
            })
            .collect();

        let joined = join_all(tasks).await;

        for (index, outcome) in joined.into_iter().enumerate() {
            if let Err(join_error) = outcome {
                let pair = &pairs[index];
                warn!("Worker for {} aborted: {}", pair, join_error);
                let result = ValidationResult::failed(
                    pair,
                    &self.validator.category_hint(pair),
                    ValidatorError::internal(format!("validation worker panicked: {}", join_error))
                        .to_summary(),
                    0,
                );
                collected.lock().push((index, result));
            }
        }

        let mut ordered = std::mem::take(&mut *collected.lock());
        ordered.sort_by_key(|(index, _)| *index);
        if ordered.len() != pairs.len() {
            return Err(ValidatorError::internal(format!(
                "collected {} results for {} pairs",
                ordered.len(),
                pairs.len()
            )));
        }

        let results: Vec<ValidationResult> = ordered.into_iter().map(|(_, result)| result).collect();
        let batch = BatchResult::from_results(results, &self.thresholds)
            .with_client_stats(self.validator.client.stats())
            .with_timing(started_at, Utc::now());

        info!(
            "Batch complete: {} validated, {} without events, {} failed in {}ms",
            batch.validated,
            batch.no_events,
            batch.failed,
            batch.duration_ms()
        );
        if batch.has_critical_issues() {
            warn!("{} critical issues detected", batch.critical_issues.len());
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_id() {
        assert_eq!(category_from_id("fortinet_fortigate"), "fortinet");
        assert_eq!(category_from_id("Okta-SSO"), "okta");
        assert_eq!(category_from_id("standalone"), "standalone");
        assert_eq!(category_from_id(""), "uncategorized");
    }
}
