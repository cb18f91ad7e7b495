//! Property and scenario tests for scoring, grading and classification

use proptest::prelude::*;
use serde_json::{json, Map, Value};
use siem_parser_validator::analyzer::{classify_observable, FieldAnalyzer};
use siem_parser_validator::models::{FieldSet, Grade, ObservableType, SampleEvent};
use siem_parser_validator::scoring::{FieldWeights, ScoringEngine, OCSF_CORE_FIELDS};
use std::collections::BTreeSet;

fn field_name() -> impl Strategy<Value = String> {
    "[a-z]{1,6}(\\.[a-z]{1,6}){0,2}"
}

fn disjoint_sets() -> impl Strategy<Value = (BTreeSet<String>, BTreeSet<String>)> {
    (
        prop::collection::btree_set(field_name(), 0..8),
        prop::collection::btree_set(field_name(), 0..8),
    )
        .prop_filter("at least one side non-empty", |(e, x)| !e.is_empty() || !x.is_empty())
        .prop_map(|(expected, extracted)| {
            let expected: BTreeSet<String> = expected.into_iter().map(|n| format!("e_{}", n)).collect();
            let extracted: BTreeSet<String> = extracted.into_iter().map(|n| format!("x_{}", n)).collect();
            (expected, extracted)
        })
}

proptest! {
    #[test]
    fn disjoint_sets_have_zero_f1((expected, extracted) in disjoint_sets()) {
        let engine = ScoringEngine::default();
        let result = engine.compare(&FieldSet::from_names(expected), &FieldSet::from_names(extracted));
        prop_assert_eq!(result.f1, 0.0);
        prop_assert!(!result.precision.is_nan());
        prop_assert!(!result.recall.is_nan());
    }

    #[test]
    fn self_comparison_is_perfect(names in prop::collection::btree_set(field_name(), 1..10)) {
        let engine = ScoringEngine::default();
        let set = FieldSet::from_names(names);
        let result = engine.compare(&set, &set);
        prop_assert!((result.precision - 1.0).abs() < 1e-9);
        prop_assert!((result.recall - 1.0).abs() < 1e-9);
        prop_assert!((result.f1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ocsf_score_is_monotonic(
        others in prop::collection::btree_set(field_name(), 0..6),
        order in Just(OCSF_CORE_FIELDS.to_vec()).prop_shuffle(),
    ) {
        let engine = ScoringEngine::default();
        let mut names: Vec<String> = others.into_iter().collect();
        let mut previous = engine.ocsf_score(&FieldSet::from_names(names.clone()));
        for core in order {
            names.push(core.to_string());
            let score = engine.ocsf_score(&FieldSet::from_names(names.clone()));
            prop_assert!(score >= previous, "{} dropped score {} -> {}", core, previous, score);
            previous = score;
        }
        prop_assert_eq!(previous, 100.0);
    }

    #[test]
    fn sha256_hex_is_never_a_domain(hex in "[0-9a-f]{64}") {
        let class = classify_observable("file_hash", &hex);
        prop_assert_ne!(class, Some(ObservableType::Domain));
        prop_assert_eq!(class, Some(ObservableType::Hash));
    }

    #[test]
    fn classification_is_pure(value in "\\PC{0,40}") {
        prop_assert_eq!(
            classify_observable("field", &value),
            classify_observable("field", &value)
        );
    }

    #[test]
    fn grade_is_a_step_function(score in 0.0f64..100.0) {
        let grade = Grade::from_score(score);
        prop_assert_eq!(grade, Grade::from_score(score));
        // raising the score never lowers the grade
        prop_assert!(Grade::from_score((score + 5.0).min(100.0)) >= grade);
    }

    #[test]
    fn flatten_is_idempotent_on_flat_maps(
        entries in prop::collection::btree_map("[a-z_]{1,8}", any::<i64>(), 1..10)
    ) {
        let analyzer = FieldAnalyzer::default();
        let map: Map<String, Value> = entries.into_iter().map(|(k, v)| (k, json!(v))).collect();
        let flat = analyzer.flatten_value(&Value::Object(map.clone()));
        prop_assert_eq!(flat.to_flat_map(), map);
    }
}

#[test]
fn grade_thresholds_belong_to_their_band() {
    let bands = [
        (95.0, Grade::APlus),
        (90.0, Grade::A),
        (85.0, Grade::AMinus),
        (80.0, Grade::BPlus),
        (75.0, Grade::B),
        (70.0, Grade::BMinus),
        (65.0, Grade::CPlus),
        (60.0, Grade::C),
        (55.0, Grade::CMinus),
        (50.0, Grade::D),
    ];
    for (threshold, grade) in bands {
        assert_eq!(Grade::from_score(threshold), grade, "score {}", threshold);
        assert!(Grade::from_score(threshold - 0.001) < grade);
    }
    assert_eq!(Grade::from_score(0.0), Grade::F);
    assert_eq!(Grade::from_score(100.0), Grade::APlus);
}

#[test]
fn reference_scenario_with_equal_weights() {
    let engine = ScoringEngine::new(FieldWeights::uniform(1.0));
    let expected = FieldSet::from_names(["class_uid", "activity_id", "user.name", "src_ip"]);
    let extracted = FieldSet::from_names(["class_uid", "user.name", "src_ip", "extra_field"]);

    let result = engine.compare(&expected, &extracted);
    assert_eq!(result.matched.len(), 3);
    assert_eq!(result.missing, vec!["activity_id"]);
    assert_eq!(result.extra, vec!["extra_field"]);
    assert!((result.precision - 0.75).abs() < 1e-9);
    assert!((result.recall - 0.75).abs() < 1e-9);
    assert!((result.f1 - 0.75).abs() < 1e-9);
}

#[test]
fn ambiguous_values_follow_precedence() {
    assert_eq!(classify_observable("ip", "192.168.1.10"), Some(ObservableType::Ipv4));
    assert_eq!(classify_observable("host", "evil.example.com"), Some(ObservableType::Domain));
    assert_eq!(classify_observable("email", "bob@example.com"), Some(ObservableType::Email));
    assert_eq!(
        classify_observable("md5", "d41d8cd98f00b204e9800998ecf8427e"),
        Some(ObservableType::Hash)
    );
    assert_eq!(
        classify_observable("url", "https://evil.example.com/payload"),
        Some(ObservableType::Url)
    );
    assert_eq!(classify_observable("mac", "00:50:56:aa:bb:cc"), Some(ObservableType::Mac));
    assert_eq!(classify_observable("agent_version", "10.2.3.4"), None);
    assert_eq!(classify_observable("note", "hello"), None);
}

#[test]
fn text_samples_contribute_fields() {
    let analyzer = FieldAnalyzer::default();
    let analysis = analyzer.aggregate(&[
        SampleEvent::text("<134>srcip=10.0.0.1 dstip=10.0.0.2 action=accept"),
        SampleEvent::structured(json!({ "srcip": "10.0.0.3" })),
    ]);
    let srcip = analysis.fields.get("srcip").unwrap();
    assert_eq!(srcip.frequency, 2);
    assert_eq!(srcip.consistency, 1.0);
    assert_eq!(srcip.observables.get(&ObservableType::Ipv4), Some(&2));
    assert!(analysis.fields.contains("syslog.facility"));
}
