//! Validation Model Definitions
//!
//! Sample events, flattened field sets and per-pair validation records shared by
//! the analyzer, the scoring engine and the batch orchestrator.

use crate::error_handling::ErrorSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One generated or retrieved log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleEvent {
    /// Nested JSON-like map
    Structured(Value),
    /// Raw text line (JSON text, CEF, key=value or delimited)
    Text(String),
}

impl SampleEvent {
    pub fn structured(value: Value) -> Self {
        SampleEvent::Structured(value)
    }

    pub fn text<S: Into<String>>(line: S) -> Self {
        SampleEvent::Text(line.into())
    }

    /// Payload as sent to an ingestion endpoint
    pub fn to_wire_value(&self) -> Value {
        match self {
            SampleEvent::Structured(value) => value.clone(),
            SampleEvent::Text(line) => Value::String(line.clone()),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, SampleEvent::Text(_))
    }
}

impl From<Value> for SampleEvent {
    fn from(value: Value) -> Self {
        match value {
            Value::String(line) => SampleEvent::Text(line),
            other => SampleEvent::Structured(other),
        }
    }
}

/// Detected wire format of a sample event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    Json,
    Cef,
    KeyValue,
    Delimited,
    Raw,
}

impl SampleFormat {
    /// How readily a backend parser can consume this format (0-100)
    pub fn compatibility_score(&self) -> f64 {
        match self {
            SampleFormat::Json => 100.0,
            SampleFormat::Cef => 90.0,
            SampleFormat::KeyValue => 80.0,
            SampleFormat::Delimited => 60.0,
            SampleFormat::Raw => 30.0,
        }
    }
}

/// Value with threat-intelligence significance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservableType {
    Ipv4,
    Domain,
    Email,
    Hash,
    Url,
    Mac,
}

impl fmt::Display for ObservableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObservableType::Ipv4 => "ipv4",
            ObservableType::Domain => "domain",
            ObservableType::Email => "email",
            ObservableType::Hash => "hash",
            ObservableType::Url => "url",
            ObservableType::Mac => "mac",
        };
        write!(f, "{}", name)
    }
}

/// Observed leaf value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Integer,
    Float,
    Boolean,
    Null,
    /// Empty array or object
    Empty,
    /// Subtree cut off at the depth bound
    Truncated,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => ValueKind::String,
            Value::Number(n) if n.is_f64() => ValueKind::Float,
            Value::Number(_) => ValueKind::Integer,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Null => ValueKind::Null,
            Value::Array(_) | Value::Object(_) => ValueKind::Empty,
        }
    }
}

/// Per-field statistics inside a FieldSet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    /// Number of samples the field appeared in
    pub frequency: usize,
    /// frequency / sample count
    pub consistency: f64,
    pub types: BTreeMap<ValueKind, usize>,
    pub observables: BTreeMap<ObservableType, usize>,
}

/// Dotted leaf paths derived from one or more sample events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSet {
    pub sample_count: usize,
    pub fields: BTreeMap<String, FieldStats>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a single-sample field set from bare names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = FieldSet {
            sample_count: 1,
            fields: BTreeMap::new(),
        };
        for name in names {
            set.fields.insert(
                name.into(),
                FieldStats {
                    frequency: 1,
                    consistency: 1.0,
                    ..FieldStats::default()
                },
            );
        }
        set
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.fields.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&FieldStats> {
        self.fields.get(path)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    /// Fields whose values were classified as observables at least once
    pub fn observable_fields(&self) -> BTreeSet<&str> {
        self.fields
            .iter()
            .filter(|(_, stats)| !stats.observables.is_empty())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn has_observables(&self) -> bool {
        self.fields.values().any(|s| !s.observables.is_empty())
    }

    /// Mark an observable classification on an existing or new field
    pub fn tag_observable(&mut self, path: &str, observable: ObservableType) {
        let stats = self.fields.entry(path.to_string()).or_default();
        *stats.observables.entry(observable).or_insert(0) += 1;
    }

    /// Recompute consistency ratios from frequencies
    pub(crate) fn finalize(&mut self) {
        let samples = self.sample_count.max(1) as f64;
        for stats in self.fields.values_mut() {
            stats.consistency = stats.frequency as f64 / samples;
        }
    }
}

/// Why a comparison had nothing to measure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degenerate {
    EmptyExpected,
    EmptyExtracted,
    BothEmpty,
}

/// A (generator, parser) pair to validate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationPair {
    pub generator: String,
    pub parser: String,
    /// Explicit backend query; the configured template is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl ValidationPair {
    pub fn new<G: Into<String>, P: Into<String>>(generator: G, parser: P) -> Self {
        Self {
            generator: generator.into(),
            parser: parser.into(),
            query: None,
        }
    }

    pub fn with_query<Q: Into<String>>(mut self, query: Q) -> Self {
        self.query = Some(query.into());
        self
    }
}

impl fmt::Display for ValidationPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.generator, self.parser)
    }
}

/// Outcome class of a pair validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Backend returned events and they were scored
    Validated,
    /// Backend query finished with zero events
    NoEvents,
    /// Backend returned events but no field could be extracted from them
    NoFields,
    /// Error or timeout inside the unit of work
    Failed,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationStatus::Validated => "validated",
            ValidationStatus::NoEvents => "no_events",
            ValidationStatus::NoFields => "no_fields",
            ValidationStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Letter grade banded from the blended score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "F")]
    F,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A+")]
    APlus,
}

/// Lower bound of each band, highest first
const GRADE_BANDS: [(f64, Grade); 10] = [
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

impl Grade {
    /// Band a 0-100 score; a score exactly on a threshold belongs to that band
    pub fn from_score(score: f64) -> Self {
        if score.is_nan() {
            return Grade::F;
        }
        GRADE_BANDS
            .iter()
            .find(|(threshold, _)| score >= *threshold)
            .map(|(_, grade)| *grade)
            .unwrap_or(Grade::F)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::AMinus => "A-",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::BMinus => "B-",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::CMinus => "C-",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Extraction quality metrics for one pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    /// Weighted precision (0-1)
    pub precision: f64,
    /// Weighted recall (0-1)
    pub recall: f64,
    /// Harmonic mean of precision and recall (0-1)
    pub f1: f64,
    /// Percentage of expected fields extracted (0-100)
    pub extraction_rate: f64,
    /// OCSF compliance score (0-100)
    pub ocsf_score: f64,
    /// Sample format compatibility (0-100)
    pub format_compatibility: f64,
    /// Percentage of expected observable fields extracted (0-100)
    pub observable_rate: f64,
}

impl ValidationMetrics {
    /// Blended 0-100 score the grade is banded from
    pub fn overall_score(&self) -> f64 {
        self.extraction_rate * 0.4
            + self.ocsf_score * 0.3
            + self.precision * 100.0 * 0.2
            + self.format_compatibility * 0.1
    }

    pub fn grade(&self) -> Grade {
        Grade::from_score(self.overall_score())
    }
}

/// One record per validated (generator, parser) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub generator_id: String,
    pub parser_id: String,
    pub category: String,
    pub status: ValidationStatus,
    pub events_generated: usize,
    pub events_found: usize,
    pub metrics: ValidationMetrics,
    pub grade: Grade,
    pub matched_fields: Vec<String>,
    pub missing_fields: Vec<String>,
    pub extra_fields: Vec<String>,
    pub recommendations: Vec<String>,
    /// Set when either field set was empty and the metrics measure nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degenerate: Option<Degenerate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSummary>,
    pub elapsed_ms: u64,
    pub validated_at: DateTime<Utc>,
}

impl ValidationResult {
    /// Terminal record for a pair whose unit of work failed
    pub fn failed(
        pair: &ValidationPair,
        category: &str,
        error: ErrorSummary,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            generator_id: pair.generator.clone(),
            parser_id: pair.parser.clone(),
            category: category.to_string(),
            status: ValidationStatus::Failed,
            events_generated: 0,
            events_found: 0,
            metrics: ValidationMetrics::default(),
            grade: Grade::F,
            matched_fields: Vec::new(),
            missing_fields: Vec::new(),
            extra_fields: Vec::new(),
            recommendations: Vec::new(),
            degenerate: None,
            error: Some(error),
            elapsed_ms,
            validated_at: Utc::now(),
        }
    }

    /// Scored against a non-empty comparison
    pub fn is_success(&self) -> bool {
        self.status == ValidationStatus::Validated && self.degenerate.is_none()
    }

    pub fn returned_events(&self) -> bool {
        self.events_found > 0
    }
}
