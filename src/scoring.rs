//! Extraction quality scoring
//!
//! Compares the field set a generator produces with the field set the backend
//! extracted, weighting fields by their importance in the OCSF taxonomy.

use crate::analyzer::FieldAnalysis;
use crate::config::ScoringConfig;
pub use crate::models::Degenerate;
use crate::models::{FieldSet, Grade, ValidationMetrics};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Fields every OCSF-normalized event is expected to carry
pub const OCSF_CORE_FIELDS: [&str; 5] = ["class_uid", "activity_id", "category_uid", "severity", "time"];

const IDENTITY_FIELDS: [&str; 4] = ["class_uid", "activity_id", "category_uid", "type_uid"];
const ENDPOINT_FIELDS: [&str; 8] = [
    "src_ip", "dst_ip", "src_port", "dst_port", "srcip", "dstip", "srcport", "dstport",
];
const OUTCOME_FIELDS: [&str; 7] = [
    "severity",
    "severity_id",
    "time",
    "status",
    "status_id",
    "disposition",
    "action",
];

pub const UNKNOWN_FIELD_WEIGHT: f64 = 0.4;

const LOW_EXTRACTION_RATE: f64 = 50.0;
const LOW_OCSF_SCORE: f64 = 60.0;
const LOW_OBSERVABLE_RATE: f64 = 50.0;

/// Lowercase with `-` folded into `_`
pub fn normalize_field(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('-', "_")
}

#[derive(Debug, Clone, PartialEq)]
enum WeightTable {
    Ocsf,
    Uniform(f64),
}

/// Importance weight per field name
#[derive(Debug, Clone, PartialEq)]
pub struct FieldWeights {
    table: WeightTable,
    overrides: HashMap<String, f64>,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self::ocsf_default()
    }
}

impl FieldWeights {
    /// OCSF importance table
    pub fn ocsf_default() -> Self {
        Self {
            table: WeightTable::Ocsf,
            overrides: HashMap::new(),
        }
    }

    /// Every field weighs the same
    pub fn uniform(weight: f64) -> Self {
        Self {
            table: WeightTable::Uniform(weight),
            overrides: HashMap::new(),
        }
    }

    pub fn with_override<S: Into<String>>(mut self, field: S, weight: f64) -> Self {
        self.overrides.insert(normalize_field(&field.into()), weight);
        self
    }

    pub fn with_overrides(mut self, overrides: &HashMap<String, f64>) -> Self {
        for (field, weight) in overrides {
            self.overrides.insert(normalize_field(field), *weight);
        }
        self
    }

    pub fn weight(&self, field: &str) -> f64 {
        let name = normalize_field(field);
        if let Some(weight) = self.overrides.get(&name) {
            return *weight;
        }
        match self.table {
            WeightTable::Uniform(weight) => weight,
            WeightTable::Ocsf => ocsf_weight(&name),
        }
    }
}

fn ocsf_weight(name: &str) -> f64 {
    let leaf = name.rsplit('.').next().unwrap_or(name);

    if IDENTITY_FIELDS.contains(&name) || IDENTITY_FIELDS.contains(&leaf) {
        1.0
    } else if name.starts_with("actor.") || name.starts_with("user.") || name == "user" {
        0.9
    } else if name.starts_with("src_endpoint.")
        || name.starts_with("dst_endpoint.")
        || ENDPOINT_FIELDS.contains(&name)
    {
        0.85
    } else if name.starts_with("device.") || OUTCOME_FIELDS.contains(&leaf) {
        0.8
    } else if name == "message" || name == "raw_data" {
        0.6
    } else if name.starts_with("metadata.") {
        0.5
    } else {
        UNKNOWN_FIELD_WEIGHT
    }
}

/// Field-level comparison of expected vs extracted sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMetrics {
    /// Expected field names that were extracted
    pub matched: Vec<String>,
    pub missing: Vec<String>,
    /// Extracted field names no expected field maps to
    pub extra: Vec<String>,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub extraction_rate: f64,
    pub ocsf_score: f64,
    pub observable_rate: f64,
    pub degenerate: Option<Degenerate>,
}

/// Metrics, grade and advice for one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scorecard {
    pub metrics: ValidationMetrics,
    pub grade: Grade,
    pub recommendations: Vec<String>,
}

/// Scores extraction quality
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    weights: FieldWeights,
    aliases: HashMap<String, String>,
    observable_bonus: f64,
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self {
            weights: FieldWeights::ocsf_default(),
            aliases: HashMap::new(),
            observable_bonus: 10.0,
        }
    }
}

impl ScoringEngine {
    pub fn new(weights: FieldWeights) -> Self {
        Self {
            weights,
            ..Self::default()
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self {
            weights: FieldWeights::ocsf_default().with_overrides(&config.weight_overrides),
            aliases: config
                .aliases
                .iter()
                .map(|(expected, extracted)| (normalize_field(expected), normalize_field(extracted)))
                .collect(),
            observable_bonus: config.observable_bonus,
        }
    }

    pub fn with_alias<E: Into<String>, X: Into<String>>(mut self, expected: E, extracted: X) -> Self {
        self.aliases
            .insert(normalize_field(&expected.into()), normalize_field(&extracted.into()));
        self
    }

    pub fn weights(&self) -> &FieldWeights {
        &self.weights
    }

    /// Compare using the engine's own weights
    pub fn compare(&self, expected: &FieldSet, extracted: &FieldSet) -> ComparisonMetrics {
        self.compare_with(expected, extracted, &self.weights)
    }

    pub fn compare_with(
        &self,
        expected: &FieldSet,
        extracted: &FieldSet,
        weights: &FieldWeights,
    ) -> ComparisonMetrics {
        // normalized extracted name -> every original spelling
        let mut extracted_index: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for name in extracted.names() {
            extracted_index.entry(normalize_field(name)).or_default().push(name);
        }

        let mut matched = Vec::new();
        let mut missing = Vec::new();
        let mut matched_extracted: BTreeMap<&str, ()> = BTreeMap::new();

        for name in expected.names() {
            let normalized = normalize_field(name);
            let target = self.aliases.get(&normalized).unwrap_or(&normalized);
            match extracted_index.get(target) {
                Some(originals) => {
                    matched.push(name.to_string());
                    for original in originals {
                        matched_extracted.insert(*original, ());
                    }
                }
                None => missing.push(name.to_string()),
            }
        }

        let extra: Vec<String> = extracted
            .names()
            .filter(|name| !matched_extracted.contains_key(name))
            .map(str::to_string)
            .collect();

        let expected_weight: f64 = expected.names().map(|n| weights.weight(n)).sum();
        let extracted_weight: f64 = extracted.names().map(|n| weights.weight(n)).sum();
        let recall_hits: f64 = matched.iter().map(|n| weights.weight(n)).sum();
        let precision_hits: f64 = matched_extracted.keys().map(|n| weights.weight(n)).sum();

        let precision = ratio(precision_hits, extracted_weight);
        let recall = ratio(recall_hits, expected_weight);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        let extraction_rate = ratio(matched.len() as f64, expected.len() as f64) * 100.0;

        let expected_observables = expected.observable_fields();
        let observable_rate = if expected_observables.is_empty() {
            100.0
        } else {
            let hits = expected_observables
                .iter()
                .filter(|name| matched.iter().any(|m| m == *name))
                .count();
            ratio(hits as f64, expected_observables.len() as f64) * 100.0
        };

        let degenerate = match (expected.is_empty(), extracted.is_empty()) {
            (true, true) => Some(Degenerate::BothEmpty),
            (true, false) => Some(Degenerate::EmptyExpected),
            (false, true) => Some(Degenerate::EmptyExtracted),
            (false, false) => None,
        };

        ComparisonMetrics {
            matched,
            missing,
            extra,
            precision,
            recall,
            f1,
            extraction_rate,
            ocsf_score: self.ocsf_score(extracted),
            observable_rate,
            degenerate,
        }
    }

    /// Percentage of OCSF core fields present, plus a capped observable bonus
    pub fn ocsf_score(&self, extracted: &FieldSet) -> f64 {
        let present = OCSF_CORE_FIELDS
            .iter()
            .filter(|core| has_core_field(extracted, core))
            .count();
        let base = present as f64 / OCSF_CORE_FIELDS.len() as f64 * 100.0;

        let has_observables = extracted.has_observables()
            || extracted
                .names()
                .any(|n| n == "observables" || n.starts_with("observables."));
        let bonus = if has_observables { self.observable_bonus } else { 0.0 };

        (base + bonus).min(100.0)
    }

    /// Full scorecard for a pair whose backend query returned events
    pub fn score(&self, expected: &FieldAnalysis, extracted: &FieldAnalysis) -> (ComparisonMetrics, Scorecard) {
        let comparison = self.compare(&expected.fields, &extracted.fields);
        let metrics = ValidationMetrics {
            precision: comparison.precision,
            recall: comparison.recall,
            f1: comparison.f1,
            extraction_rate: comparison.extraction_rate,
            ocsf_score: comparison.ocsf_score,
            format_compatibility: expected.format_compatibility(),
            observable_rate: comparison.observable_rate,
        };
        let recommendations = recommendations(&metrics, &comparison, &extracted.fields);
        let scorecard = Scorecard {
            grade: metrics.grade(),
            metrics,
            recommendations,
        };
        (comparison, scorecard)
    }

    /// Scorecard for a finished query that returned zero events
    pub fn no_events_scorecard(&self) -> Scorecard {
        Scorecard {
            metrics: ValidationMetrics::default(),
            grade: Grade::F,
            recommendations: vec![
                "No events returned for this parser: check event ingestion and backend connectivity before tuning field mappings".to_string(),
            ],
        }
    }

    /// Scorecard for a query whose events yielded zero extractable fields
    pub fn no_fields_scorecard(&self, events_found: usize) -> Scorecard {
        Scorecard {
            metrics: ValidationMetrics::default(),
            grade: Grade::F,
            recommendations: vec![format!(
                "{} events returned but no fields were extracted: the parser matches the source but maps nothing, review its field extraction rules",
                events_found
            )],
        }
    }
}

fn has_core_field(extracted: &FieldSet, core: &str) -> bool {
    let suffix = format!(".{}", core);
    extracted.names().any(|name| {
        let name = normalize_field(name);
        name == core || name.ends_with(&suffix)
    })
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Rule-based advice derived from the computed metrics
pub fn recommendations(
    metrics: &ValidationMetrics,
    comparison: &ComparisonMetrics,
    extracted: &FieldSet,
) -> Vec<String> {
    let mut advice = Vec::new();

    if comparison.degenerate == Some(Degenerate::EmptyExpected) {
        advice.push(
            "Generated samples carry no fields: fix the generator template before judging this parser"
                .to_string(),
        );
    }

    if metrics.extraction_rate < LOW_EXTRACTION_RATE {
        advice.push(format!(
            "Extraction rate {:.1}% is below {:.0}%: review the parser configuration and field patterns",
            metrics.extraction_rate, LOW_EXTRACTION_RATE
        ));
    }

    if metrics.ocsf_score < LOW_OCSF_SCORE {
        let absent: Vec<&str> = OCSF_CORE_FIELDS
            .iter()
            .copied()
            .filter(|core| !has_core_field(extracted, core))
            .collect();
        advice.push(format!(
            "OCSF compliance {:.1} is low: add field mappings for {}",
            metrics.ocsf_score,
            absent.join(", ")
        ));
    }

    if comparison.missing.len() > comparison.matched.len() {
        advice.push(format!(
            "{} expected fields missing vs {} matched: verify the parser is active and bound to this source",
            comparison.missing.len(),
            comparison.matched.len()
        ));
    }

    if metrics.observable_rate < LOW_OBSERVABLE_RATE {
        advice.push(format!(
            "Only {:.1}% of observable fields extracted: improve observable extraction for IPs, domains, hashes and URLs",
            metrics.observable_rate
        ));
    }

    advice
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_table() {
        let weights = FieldWeights::ocsf_default();
        assert_eq!(weights.weight("class_uid"), 1.0);
        assert_eq!(weights.weight("Activity-ID"), 1.0);
        assert_eq!(weights.weight("actor.user.name"), 0.9);
        assert_eq!(weights.weight("src_endpoint.ip"), 0.85);
        assert_eq!(weights.weight("device.hostname"), 0.8);
        assert_eq!(weights.weight("metadata.product.name"), 0.5);
        assert_eq!(weights.weight("some_vendor_field"), UNKNOWN_FIELD_WEIGHT);

        let weights = weights.with_override("some_vendor_field", 0.7);
        assert_eq!(weights.weight("some_vendor_field"), 0.7);
    }

    #[test]
    fn test_reference_scenario() {
        let engine = ScoringEngine::new(FieldWeights::uniform(1.0));
        let expected = FieldSet::from_names(["class_uid", "activity_id", "user.name", "src_ip"]);
        let extracted = FieldSet::from_names(["class_uid", "user.name", "src_ip", "extra_field"]);

        let result = engine.compare(&expected, &extracted);
        assert_eq!(result.matched.len(), 3);
        assert_eq!(result.missing, vec!["activity_id".to_string()]);
        assert_eq!(result.extra, vec!["extra_field".to_string()]);
        assert!((result.precision - 0.75).abs() < 1e-9);
        assert!((result.recall - 0.75).abs() < 1e-9);
        assert!((result.f1 - 0.75).abs() < 1e-9);
        assert!((result.extraction_rate - 75.0).abs() < 1e-9);
        assert!(result.degenerate.is_none());
    }

    #[test]
    fn test_identical_sets_score_one() {
        let engine = ScoringEngine::default();
        let set = FieldSet::from_names(["class_uid", "src_endpoint.ip", "vendor_thing"]);
        let result = engine.compare(&set, &set);
        assert_eq!(result.precision, 1.0);
        assert_eq!(result.recall, 1.0);
        assert_eq!(result.f1, 1.0);
    }

    #[test]
    fn test_disjoint_sets_score_zero() {
        let engine = ScoringEngine::default();
        let result = engine.compare(
            &FieldSet::from_names(["a", "b"]),
            &FieldSet::from_names(["c"]),
        );
        assert_eq!(result.f1, 0.0);
        assert!(!result.f1.is_nan());

        let result = engine.compare(&FieldSet::new(), &FieldSet::new());
        assert_eq!(result.f1, 0.0);
        assert_eq!(result.degenerate, Some(Degenerate::BothEmpty));

        let result = engine.compare(&FieldSet::from_names(["a"]), &FieldSet::new());
        assert_eq!(result.degenerate, Some(Degenerate::EmptyExtracted));
        assert_eq!(result.precision, 0.0);
    }

    #[test]
    fn test_spelling_variants_all_match() {
        let engine = ScoringEngine::new(FieldWeights::uniform(1.0));
        let result = engine.compare(
            &FieldSet::from_names(["src_ip", "class_uid"]),
            &FieldSet::from_names(["Src-IP", "src_ip", "class_uid"]),
        );
        assert!(result.missing.is_empty());
        assert!(result.extra.is_empty(), "unexpected extras: {:?}", result.extra);
        assert_eq!(result.precision, 1.0);
        assert_eq!(result.recall, 1.0);
    }

    #[test]
    fn test_alias_matching() {
        let engine = ScoringEngine::new(FieldWeights::uniform(1.0)).with_alias("srcip", "src_endpoint.ip");
        let result = engine.compare(
            &FieldSet::from_names(["srcip"]),
            &FieldSet::from_names(["src_endpoint.ip"]),
        );
        assert_eq!(result.matched, vec!["srcip".to_string()]);
        assert!(result.extra.is_empty());
        assert_eq!(result.f1, 1.0);
    }

    #[test]
    fn test_ocsf_score_and_bonus() {
        let engine = ScoringEngine::default();
        assert_eq!(engine.ocsf_score(&FieldSet::new()), 0.0);

        let partial = FieldSet::from_names(["class_uid", "activity_id", "finding.time"]);
        assert!((engine.ocsf_score(&partial) - 60.0).abs() < 1e-9);

        let mut full = FieldSet::from_names(OCSF_CORE_FIELDS);
        assert_eq!(engine.ocsf_score(&full), 100.0);
        full.tag_observable("src_endpoint.ip", crate::models::ObservableType::Ipv4);
        assert_eq!(engine.ocsf_score(&full), 100.0);

        let with_observables = FieldSet::from_names(["class_uid", "observables.name"]);
        assert!((engine.ocsf_score(&with_observables) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_recommendations() {
        let comparison = ComparisonMetrics {
            matched: vec!["a".into()],
            missing: vec!["b".into(), "c".into()],
            extra: vec![],
            precision: 1.0,
            recall: 0.33,
            f1: 0.5,
            extraction_rate: 33.3,
            ocsf_score: 20.0,
            observable_rate: 0.0,
            degenerate: None,
        };
        let metrics = ValidationMetrics {
            precision: 1.0,
            recall: 0.33,
            f1: 0.5,
            extraction_rate: 33.3,
            ocsf_score: 20.0,
            format_compatibility: 100.0,
            observable_rate: 0.0,
        };
        let advice = recommendations(&metrics, &comparison, &FieldSet::from_names(["class_uid"]));
        assert_eq!(advice.len(), 4);
        assert!(advice[0].contains("parser configuration"));
        assert!(advice[1].contains("activity_id, category_uid, severity, time"));
        assert!(advice[2].contains("verify the parser is active"));
        assert!(advice[3].contains("observable extraction"));

        let engine = ScoringEngine::default();
        let none = engine.no_events_scorecard();
        assert_eq!(none.grade, Grade::F);
        assert!(none.recommendations[0].contains("connectivity"));

        let empty = engine.no_fields_scorecard(2);
        assert_eq!(empty.grade, Grade::F);
        assert!(empty.recommendations[0].starts_with("2 events returned"));

        let comparison = engine.compare(&FieldSet::new(), &FieldSet::from_names(["class_uid"]));
        let advice = recommendations(&ValidationMetrics::default(), &comparison, &FieldSet::new());
        assert!(advice[0].contains("fix the generator template"));
    }
}
