//! BatchOrchestrator integration tests
//!
//! Covers failure isolation, the zero-events path and end-to-end scoring
//! against a mock backend.

use async_trait::async_trait;
use serde_json::{json, Value};
use parking_lot::Mutex;
use siem_parser_validator::error_handling::ValidatorResult;
use siem_parser_validator::generator::{EventGenerator, GeneratorRegistry};
use siem_parser_validator::injection::{EventInjector, InjectionOutcome};
use siem_parser_validator::models::{
    Degenerate, Grade, SampleEvent, ValidationPair, ValidationStatus,
};
use siem_parser_validator::orchestrator::BatchOrchestrator;
use siem_parser_validator::query::{
    HttpQueryBackend, QueryBackend, QueryCache, QueryClient, QueryRequest, QueryScope, QueryState,
    StatusReport, TransportError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Generator that always returns the same structured event
struct FixedGenerator {
    id: String,
    event: Value,
}

impl EventGenerator for FixedGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> Option<&str> {
        Some("test_vendor")
    }

    fn produce_sample(&self) -> ValidatorResult<SampleEvent> {
        Ok(SampleEvent::structured(self.event.clone()))
    }
}

struct PanickingGenerator;

impl EventGenerator for PanickingGenerator {
    fn id(&self) -> &str {
        "panicky"
    }

    fn produce_sample(&self) -> ValidatorResult<SampleEvent> {
        panic!("template exploded");
    }
}

/// Backend whose status calls never return in time
struct StalledBackend {
    submits: AtomicUsize,
}

#[async_trait]
impl QueryBackend for StalledBackend {
    async fn submit(&self, _request: &QueryRequest) -> Result<String, TransportError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst);
        Ok(format!("stalled-{}", n))
    }

    async fn status(&self, _query_id: &str) -> Result<StatusReport, TransportError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(TransportError::Malformed("unreachable".to_string()))
    }

    async fn results(&self, _query_id: &str) -> Result<Vec<Value>, TransportError> {
        Ok(Vec::new())
    }
}

/// In-memory pipeline: every query returns whatever has been ingested so far
#[derive(Default)]
struct PipelineBackend {
    stored: Mutex<Vec<Value>>,
    submits: AtomicUsize,
}

#[async_trait]
impl QueryBackend for PipelineBackend {
    async fn submit(&self, _request: &QueryRequest) -> Result<String, TransportError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst);
        Ok(format!("pipeline-{}", n))
    }

    async fn status(&self, _query_id: &str) -> Result<StatusReport, TransportError> {
        Ok(StatusReport {
            state: QueryState::Finished,
            error: None,
        })
    }

    async fn results(&self, _query_id: &str) -> Result<Vec<Value>, TransportError> {
        Ok(self.stored.lock().clone())
    }
}

/// Injector whose first batch is lost in transit
struct LossyInjector {
    pipeline: Arc<PipelineBackend>,
    calls: AtomicUsize,
}

#[async_trait]
impl EventInjector for LossyInjector {
    async fn submit(
        &self,
        events: &[SampleEvent],
        _product_id: &str,
    ) -> ValidatorResult<Vec<InjectionOutcome>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            self.pipeline
                .stored
                .lock()
                .extend(events.iter().map(SampleEvent::to_wire_value));
        }
        Ok(vec![InjectionOutcome::accepted(); events.len()])
    }
}

fn registry() -> GeneratorRegistry {
    let mut registry = GeneratorRegistry::new();
    registry.register(Arc::new(FixedGenerator {
        id: "acme_firewall".to_string(),
        event: json!({
            "class_uid": 4001,
            "activity_id": 1,
            "user": { "name": "alice" },
            "src_ip": "10.1.2.3"
        }),
    }));
    registry
}

fn http_client(server: &MockServer) -> QueryClient {
    let backend = HttpQueryBackend::new(&server.uri(), Duration::from_secs(5)).unwrap();
    QueryClient::new(Arc::new(backend)).with_polling(Duration::from_millis(5), 5)
}

async fn mount_finished_query(server: &MockServer, events: Value) {
    Mock::given(method("POST"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "queryId": "q-1" })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/query/q-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "FINISHED" })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/query/q-1/results"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "events": events })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_every_pair_gets_a_result_when_all_fail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let pairs: Vec<ValidationPair> = (0..7)
        .map(|i| {
            if i % 2 == 0 {
                ValidationPair::new("acme_firewall", format!("parser-{}", i))
            } else {
                ValidationPair::new(format!("missing_gen_{}", i), format!("parser-{}", i))
            }
        })
        .collect();

    let orchestrator = BatchOrchestrator::new(http_client(&server), registry(), QueryScope::new("acme"))
        .with_workers(3);
    let batch = orchestrator.run(&pairs).await.unwrap();

    assert_eq!(batch.results.len(), pairs.len());
    assert_eq!(batch.failed, pairs.len());
    for (pair, result) in pairs.iter().zip(&batch.results) {
        assert_eq!(result.parser_id, pair.parser);
        assert_eq!(result.status, ValidationStatus::Failed);
        assert_eq!(result.grade, Grade::F);
        assert_eq!(result.metrics.f1, 0.0);
        assert!(result.error.is_some());
    }

    assert_eq!(batch.results[0].error.as_ref().unwrap().code, "BACKEND_ERROR");
    assert_eq!(batch.results[1].error.as_ref().unwrap().code, "UNKNOWN_GENERATOR");
    assert_eq!(batch.results[1].category, "missing");
    assert!(batch.has_critical_issues());
}

#[tokio::test]
async fn test_zero_events_is_distinct_from_failure() {
    let server = MockServer::start().await;
    mount_finished_query(&server, json!([])).await;

    let orchestrator = BatchOrchestrator::new(http_client(&server), registry(), QueryScope::new("acme"));
    let batch = orchestrator
        .run(&[ValidationPair::new("acme_firewall", "Acme")])
        .await
        .unwrap();

    let result = &batch.results[0];
    assert_eq!(result.status, ValidationStatus::NoEvents);
    assert_eq!(result.status.to_string(), "no_events");
    assert_eq!(result.grade, Grade::F);
    assert_eq!(result.metrics.precision, 0.0);
    assert_eq!(result.metrics.extraction_rate, 0.0);
    assert_eq!(result.metrics.ocsf_score, 0.0);
    assert!(result.error.is_none());
    assert!(result
        .recommendations
        .iter()
        .any(|r| r.contains("ingestion") && r.contains("connectivity")));
    assert_eq!(result.missing_fields.len(), 4);
    assert_eq!(batch.no_events, 1);
}

#[tokio::test]
async fn test_end_to_end_scoring() {
    let server = MockServer::start().await;
    mount_finished_query(
        &server,
        json!([{
            "class_uid": 4001,
            "user": { "name": "alice" },
            "src_ip": "10.1.2.3",
            "extra_field": "x"
        }]),
    )
    .await;

    let orchestrator = BatchOrchestrator::new(http_client(&server), registry(), QueryScope::new("acme"))
        .with_samples_per_pair(3);
    let batch = orchestrator
        .run(&[ValidationPair::new("acme_firewall", "Acme")])
        .await
        .unwrap();

    let result = &batch.results[0];
    assert_eq!(result.status, ValidationStatus::Validated);
    assert_eq!(result.category, "test_vendor");
    assert_eq!(result.events_generated, 3);
    assert_eq!(result.events_found, 1);
    assert_eq!(result.missing_fields, vec!["activity_id".to_string()]);
    assert_eq!(result.extra_fields, vec!["extra_field".to_string()]);
    assert!((result.metrics.extraction_rate - 75.0).abs() < 1e-9);
    assert!(result.metrics.f1 > 0.0 && result.metrics.f1 < 1.0);
    assert_eq!(result.grade, result.metrics.grade());
    assert_eq!(batch.top_performers.len(), 1);
    assert!(batch.client_stats.is_some());
}

#[tokio::test]
async fn test_identical_pairs_share_cache_entry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "queryId": "q-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/query/q-1$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "FINISHED" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/query/q-1/results"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "events": [{ "class_uid": 1 }] })))
        .mount(&server)
        .await;

    let cache = Arc::new(siem_parser_validator::QueryCache::new(8, Duration::from_secs(60)));
    let client = http_client(&server).with_cache(cache);
    let orchestrator = BatchOrchestrator::new(client, registry(), QueryScope::new("acme")).with_workers(1);

    let pairs = vec![
        ValidationPair::new("acme_firewall", "Acme"),
        ValidationPair::new("acme_firewall", "Acme"),
    ];
    let batch = orchestrator.run(&pairs).await.unwrap();
    assert_eq!(batch.validated, 2);
    assert_eq!(batch.client_stats.unwrap().cache_hits, 1);
}

#[tokio::test]
async fn test_pair_timeout_and_panic_are_isolated() {
    let mut registry = registry();
    registry.register(Arc::new(PanickingGenerator));

    let backend = Arc::new(StalledBackend {
        submits: AtomicUsize::new(0),
    });
    let client = QueryClient::new(backend).with_polling(Duration::from_millis(1), 100);
    let orchestrator = BatchOrchestrator::new(client, registry, QueryScope::new("acme"))
        .with_workers(2)
        .with_pair_timeout(Duration::from_millis(100));

    let pairs = vec![
        ValidationPair::new("acme_firewall", "Slow"),
        ValidationPair::new("panicky", "Any"),
        ValidationPair::new("acme_firewall", "AlsoSlow"),
    ];
    let batch = orchestrator.run(&pairs).await.unwrap();

    assert_eq!(batch.results.len(), 3);
    assert_eq!(batch.results[0].error.as_ref().unwrap().code, "PAIR_TIMEOUT");
    assert_eq!(batch.results[1].error.as_ref().unwrap().code, "INTERNAL_ERROR");
    assert_eq!(batch.results[1].parser_id, "Any");
    assert_eq!(batch.results[2].error.as_ref().unwrap().code, "PAIR_TIMEOUT");
    assert_eq!(batch.failed, 3);
}

#[tokio::test]
async fn test_builtin_generators_run_against_backend() {
    let server = MockServer::start().await;
    mount_finished_query(
        &server,
        json!([{
            "class_uid": 4001,
            "activity_id": 6,
            "category_uid": 4,
            "severity": "Informational",
            "time": 1704067200000u64,
            "src_endpoint": { "ip": "10.0.0.1", "port": 51000 },
            "dst_endpoint": { "ip": "52.1.2.3", "port": 443 }
        }]),
    )
    .await;

    let orchestrator = BatchOrchestrator::new(
        http_client(&server),
        GeneratorRegistry::with_builtins(7),
        QueryScope::new("acme"),
    );
    let pairs: Vec<ValidationPair> = GeneratorRegistry::with_builtins(7)
        .ids()
        .map(|id| ValidationPair::new(id, "OCSF"))
        .collect();
    let batch = orchestrator.run(&pairs).await.unwrap();

    assert_eq!(batch.results.len(), pairs.len());
    assert_eq!(batch.failed, 0);
    for result in &batch.results {
        assert_eq!(result.metrics.ocsf_score, 100.0);
    }
}

#[test]
fn test_empty_batch_completes() {
    let backend = Arc::new(StalledBackend {
        submits: AtomicUsize::new(0),
    });
    let orchestrator = BatchOrchestrator::new(QueryClient::new(backend), registry(), QueryScope::new("acme"));

    let batch = tokio_test::block_on(orchestrator.run(&[])).unwrap();
    assert_eq!(batch.total, 0);
    assert!(batch.results.is_empty());
    assert!(!batch.has_critical_issues());
}

#[tokio::test]
async fn test_events_without_fields_are_not_successes() {
    let server = MockServer::start().await;
    mount_finished_query(&server, json!([{}, {}])).await;

    let orchestrator = BatchOrchestrator::new(http_client(&server), registry(), QueryScope::new("acme"));
    let batch = orchestrator
        .run(&[ValidationPair::new("acme_firewall", "Acme")])
        .await
        .unwrap();

    let result = &batch.results[0];
    assert_eq!(result.status, ValidationStatus::NoFields);
    assert_eq!(result.status.to_string(), "no_fields");
    assert_eq!(result.events_found, 2);
    assert_eq!(result.degenerate, Some(Degenerate::EmptyExtracted));
    assert_eq!(result.grade, Grade::F);
    assert_eq!(result.missing_fields.len(), 4);
    assert!(!result.is_success());
    assert!(result
        .recommendations
        .iter()
        .any(|r| r.contains("no fields were extracted")));

    assert_eq!(batch.no_fields, 1);
    assert_eq!(batch.validated, 0);
    assert_eq!(batch.success_rate, 0.0);
    assert!(batch.top_performers.is_empty());
    assert!(batch.improvement_candidates.is_empty());
}

#[tokio::test]
async fn test_injected_pairs_bypass_stale_cache() {
    let pipeline = Arc::new(PipelineBackend::default());
    let injector = Arc::new(LossyInjector {
        pipeline: Arc::clone(&pipeline),
        calls: AtomicUsize::new(0),
    });
    let cache = Arc::new(QueryCache::new(8, Duration::from_secs(300)));
    let client = QueryClient::new(pipeline.clone())
        .with_polling(Duration::from_millis(1), 3)
        .with_cache(cache);
    let orchestrator = BatchOrchestrator::new(client, registry(), QueryScope::new("acme"))
        .with_workers(1)
        .with_samples_per_pair(3)
        .with_injector(injector);

    let pairs = vec![
        ValidationPair::new("acme_firewall", "P"),
        ValidationPair::new("acme_firewall", "P"),
    ];
    let batch = orchestrator.run(&pairs).await.unwrap();

    let statuses: Vec<ValidationStatus> = batch.results.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![ValidationStatus::NoEvents, ValidationStatus::Validated]);
    assert_eq!(batch.results[1].events_found, 3);
    assert_eq!(pipeline.submits.load(Ordering::SeqCst), 2);
    assert_eq!(batch.client_stats.unwrap().cache_hits, 0);
}
