//! HttpEventInjector integration tests against a mock ingestion endpoint

use flate2::read::GzDecoder;
use serde_json::{json, Value};
use siem_parser_validator::injection::{EventInjector, HttpEventInjector, InjectionOutcome};
use siem_parser_validator::SampleEvent;
use std::io::Read;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn samples(count: usize) -> Vec<SampleEvent> {
    (0..count)
        .map(|i| SampleEvent::structured(json!({ "class_uid": 4001, "seq": i })))
        .collect()
}

fn injector_for(server: &MockServer) -> HttpEventInjector {
    HttpEventInjector::new(&format!("{}/api/ingest", server.uri()), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_sends_gzip_ndjson_with_product_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ingest"))
        .and(header("X-Product-Id", "fortinet_fortigate"))
        .and(header("Content-Encoding", "gzip"))
        .and(header("Content-Type", "application/x-ndjson"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let injector = injector_for(&server);
    let events = vec![
        SampleEvent::structured(json!({ "a": 1 })),
        SampleEvent::text("srcip=10.0.0.1 action=deny"),
    ];
    let outcomes = injector.submit(&events, "fortinet_fortigate").await.unwrap();
    assert_eq!(outcomes, vec![InjectionOutcome::accepted(); 2]);

    let requests = server.received_requests().await.unwrap();
    let mut decoded = String::new();
    GzDecoder::new(requests[0].body.as_slice())
        .read_to_string(&mut decoded)
        .unwrap();
    let lines: Vec<Value> = decoded
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines, vec![json!({ "a": 1 }), json!("srcip=10.0.0.1 action=deny")]);
}

#[tokio::test]
async fn test_per_item_rejections_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ingest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "accepted": true },
                { "accepted": false, "error": "unparseable timestamp" },
                { "accepted": true }
            ]
        })))
        .mount(&server)
        .await;

    let outcomes = injector_for(&server).submit(&samples(3), "okta").await.unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].accepted);
    assert_eq!(outcomes[1], InjectionOutcome::rejected("unparseable timestamp"));
    assert!(outcomes[2].accepted);
}

#[tokio::test]
async fn test_short_result_list_is_a_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ingest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{ "accepted": false, "error": "bad" }]
        })))
        .mount(&server)
        .await;

    let err = injector_for(&server)
        .submit(&samples(3), "okta")
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "BACKEND_ERROR");
    assert!(err.to_string().contains("1 results for 3 events"));
}

#[tokio::test]
async fn test_body_without_results_accepts_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ingest"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "status": "queued" })))
        .mount(&server)
        .await;

    let outcomes = injector_for(&server).submit(&samples(4), "zeek").await.unwrap();
    assert_eq!(outcomes.len(), 4);
    assert!(outcomes.iter().all(|o| o.accepted));
}

#[tokio::test]
async fn test_http_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ingest"))
        .respond_with(ResponseTemplate::new(500).set_body_string("pipeline down"))
        .expect(1)
        .mount(&server)
        .await;

    let err = injector_for(&server)
        .submit(&samples(2), "zeek")
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "BACKEND_ERROR");
    assert!(err.to_string().contains("pipeline down"));
}
