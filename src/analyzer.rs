//! Field analysis for sample and backend events
//!
//! Flattens nested events into dotted leaf paths, detects the wire format of
//! text events, classifies leaf values as observables and aggregates per-field
//! frequency and consistency across a sample.

use crate::models::{FieldSet, ObservableType, SampleEvent, SampleFormat, ValueKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Default nesting bound for flattening
pub const DEFAULT_MAX_DEPTH: usize = 10;

static IPV4_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").unwrap());
static DOMAIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$").unwrap()
});
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[a-z0-9._%+-]+@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$")
        .unwrap()
});
static HASH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:[0-9a-f]{32}|[0-9a-f]{40}|[0-9a-f]{64})$").unwrap()
});
static URL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^https?://\S+$").unwrap());
static MAC_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:[0-9a-f]{2}[:-]){5}[0-9a-f]{2}$").unwrap());

// RFC3164 priority header, optionally followed by "Mmm dd hh:mm:ss host"
static SYSLOG_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^<(\d{1,3})>(?:\d\s+)?(?:[A-Za-z]{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}\s+\S+\s+)?")
        .unwrap()
});
static KV_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([A-Za-z_][\w.\-]*)=("[^"]*"|\S+)"#).unwrap());
static CEF_EXTENSION_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)([A-Za-z_][\w.]*)=").unwrap());

const CEF_HEADER_FIELDS: [&str; 7] = [
    "cef.version",
    "cef.device_vendor",
    "cef.device_product",
    "cef.device_version",
    "cef.signature_id",
    "cef.name",
    "cef.severity",
];

/// Classify a leaf value as an observable.
///
/// Matchers run in a fixed order and the first match wins:
/// IPv4, domain, email, hash (32/40/64 hex), URL, MAC.
pub fn classify_observable(field_name: &str, value: &str) -> Option<ObservableType> {
    let value = value.trim();
    if value.is_empty() || value.len() > 2048 || is_non_observable_field(field_name) {
        return None;
    }

    if IPV4_PATTERN.is_match(value) && value.parse::<Ipv4Addr>().is_ok() {
        return Some(ObservableType::Ipv4);
    }
    if DOMAIN_PATTERN.is_match(value) {
        return Some(ObservableType::Domain);
    }
    if EMAIL_PATTERN.is_match(value) {
        return Some(ObservableType::Email);
    }
    if HASH_PATTERN.is_match(value) {
        return Some(ObservableType::Hash);
    }
    if URL_PATTERN.is_match(value) {
        return Some(ObservableType::Url);
    }
    if MAC_PATTERN.is_match(value) {
        return Some(ObservableType::Mac);
    }
    None
}

/// Version strings look like IPs and domains; timestamps never carry observables.
fn is_non_observable_field(field_name: &str) -> bool {
    let leaf = field_name
        .rsplit('.')
        .next()
        .unwrap_or(field_name)
        .to_ascii_lowercase();
    leaf.contains("version") || leaf == "time" || leaf.ends_with("timestamp")
}

/// How nested keys count toward an event's field total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountPolicy {
    /// Each leaf path counted once
    Strict,
    /// Intermediate container keys also count toward richness
    Cumulative,
}

/// Whether an analyzed sample can be scored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Ok,
    /// The event collection was empty
    NoEvents,
    /// Events were present but yielded zero fields
    NoFields,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Ok => "ok",
            AnalysisStatus::NoEvents => "no_events",
            AnalysisStatus::NoFields => "no_fields",
        }
    }
}

/// A sample event after format detection
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSample {
    pub value: Value,
    pub format: SampleFormat,
}

/// Leaf paths and values of one event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedEvent {
    /// Leaf path -> every value observed under it
    pub leaves: BTreeMap<String, Vec<Value>>,
    /// Leaf path -> kinds observed under it
    pub kinds: BTreeMap<String, Vec<ValueKind>>,
    /// Number of non-empty intermediate containers walked through
    pub containers: usize,
}

impl FlattenedEvent {
    pub fn count(&self, policy: CountPolicy) -> usize {
        match policy {
            CountPolicy::Strict => self.leaves.len(),
            CountPolicy::Cumulative => self.leaves.len() + self.containers,
        }
    }

    /// Rebuild a flat map; repeated values under one path become an array
    pub fn to_flat_map(&self) -> Map<String, Value> {
        self.leaves
            .iter()
            .map(|(path, values)| {
                let value = match values.as_slice() {
                    [single] => single.clone(),
                    many => Value::Array(many.to_vec()),
                };
                (path.clone(), value)
            })
            .collect()
    }

    fn push(&mut self, path: String, value: Value, kind: ValueKind) {
        self.kinds.entry(path.clone()).or_default().push(kind);
        self.leaves.entry(path).or_default().push(value);
    }
}

/// Result of analyzing a collection of events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAnalysis {
    pub status: AnalysisStatus,
    pub fields: FieldSet,
    pub formats: BTreeMap<SampleFormat, usize>,
    /// Cumulative field total across all events
    pub richness: usize,
}

impl FieldAnalysis {
    /// Mean format compatibility across samples (0-100)
    pub fn format_compatibility(&self) -> f64 {
        let total: usize = self.formats.values().sum();
        if total == 0 {
            return 0.0;
        }
        let weighted: f64 = self
            .formats
            .iter()
            .map(|(format, count)| format.compatibility_score() * *count as f64)
            .sum();
        weighted / total as f64
    }
}

/// Flattens, classifies and aggregates event fields
#[derive(Debug, Clone)]
pub struct FieldAnalyzer {
    max_depth: usize,
}

impl Default for FieldAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl FieldAnalyzer {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Detect the format of an event and turn it into a JSON value
    pub fn parse_event(&self, event: &SampleEvent) -> ParsedSample {
        match event {
            SampleEvent::Structured(Value::String(line)) | SampleEvent::Text(line) => {
                parse_text_event(line)
            }
            SampleEvent::Structured(value) => ParsedSample {
                value: value.clone(),
                format: SampleFormat::Json,
            },
        }
    }

    /// Walk an event into its leaf paths
    pub fn flatten_event(&self, event: &SampleEvent) -> FlattenedEvent {
        let parsed = self.parse_event(event);
        self.flatten_value(&parsed.value)
    }

    pub fn flatten_value(&self, value: &Value) -> FlattenedEvent {
        let mut out = FlattenedEvent::default();
        match value {
            Value::Object(_) | Value::Array(_) => self.walk("", value, 0, &mut out),
            scalar => out.push("value".to_string(), scalar.clone(), ValueKind::of(scalar)),
        }
        out
    }

    fn walk(&self, prefix: &str, value: &Value, depth: usize, out: &mut FlattenedEvent) {
        match value {
            Value::Object(map) if map.is_empty() => {
                if !prefix.is_empty() {
                    out.push(prefix.to_string(), value.clone(), ValueKind::Empty);
                }
            }
            Value::Array(items) if items.is_empty() => {
                if !prefix.is_empty() {
                    out.push(prefix.to_string(), value.clone(), ValueKind::Empty);
                }
            }
            Value::Object(_) | Value::Array(_) if depth >= self.max_depth => {
                let path = if prefix.is_empty() { "value" } else { prefix };
                out.push(path.to_string(), Value::Null, ValueKind::Truncated);
            }
            Value::Object(map) => {
                for (key, child) in map {
                    let path = join_path(prefix, key);
                    if is_nonempty_container(child) {
                        out.containers += 1;
                    }
                    self.walk(&path, child, depth + 1, out);
                }
            }
            // Array elements merge under the array's own path
            Value::Array(items) => {
                for item in items {
                    if prefix.is_empty() && !is_nonempty_container(item) {
                        out.push("value".to_string(), item.clone(), ValueKind::of(item));
                    } else {
                        self.walk(prefix, item, depth + 1, out);
                    }
                }
            }
            scalar => out.push(prefix.to_string(), scalar.clone(), ValueKind::of(scalar)),
        }
    }

    /// Field set of a single event
    pub fn flatten(&self, event: &SampleEvent) -> FieldSet {
        self.aggregate(std::slice::from_ref(event)).fields
    }

    /// Field total of a single event under the given counting policy
    pub fn field_count(&self, event: &SampleEvent, policy: CountPolicy) -> usize {
        self.flatten_event(event).count(policy)
    }

    /// Per-field frequency, consistency and type histograms across events
    pub fn aggregate(&self, events: &[SampleEvent]) -> FieldAnalysis {
        let mut fields = FieldSet::new();
        let mut formats = BTreeMap::new();
        let mut richness = 0;

        if events.is_empty() {
            return FieldAnalysis {
                status: AnalysisStatus::NoEvents,
                fields,
                formats,
                richness,
            };
        }

        for event in events {
            let parsed = self.parse_event(event);
            *formats.entry(parsed.format).or_insert(0) += 1;

            let flat = self.flatten_value(&parsed.value);
            richness += flat.count(CountPolicy::Cumulative);

            for (path, values) in &flat.leaves {
                let stats = fields.fields.entry(path.clone()).or_default();
                stats.frequency += 1;

                if let Some(kinds) = flat.kinds.get(path) {
                    for kind in kinds {
                        *stats.types.entry(*kind).or_insert(0) += 1;
                    }
                }

                for value in values {
                    if let Value::String(text) = value {
                        if let Some(observable) = classify_observable(path, text) {
                            *stats.observables.entry(observable).or_insert(0) += 1;
                        }
                    }
                }
            }
        }

        fields.sample_count = events.len();
        fields.finalize();

        let status = if fields.is_empty() {
            AnalysisStatus::NoFields
        } else {
            AnalysisStatus::Ok
        };

        FieldAnalysis {
            status,
            fields,
            formats,
            richness,
        }
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn is_nonempty_container(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => false,
    }
}

/// Detect and parse a text event: JSON, CEF, key=value, delimited, then raw.
pub fn parse_text_event(line: &str) -> ParsedSample {
    let trimmed = line.trim();
    let mut syslog = Map::new();

    let body = match SYSLOG_HEADER.captures(trimmed) {
        Some(captures) => {
            if let Some(priority) = captures.get(1).and_then(|m| m.as_str().parse::<u16>().ok())
            {
                syslog.insert("syslog.facility".to_string(), Value::from(priority >> 3));
                syslog.insert("syslog.severity".to_string(), Value::from(priority & 7));
            }
            trimmed[captures.get(0).map(|m| m.end()).unwrap_or(0)..].trim()
        }
        None => trimmed,
    };

    let (mut fields, format) = if let Some(json) = parse_json_object(body) {
        (json, SampleFormat::Json)
    } else if let Some(cef) = body.find("CEF:").and_then(|at| parse_cef(&body[at..])) {
        (cef, SampleFormat::Cef)
    } else if let Some(kv) = parse_key_value(body) {
        (kv, SampleFormat::KeyValue)
    } else if let Some(delimited) = parse_delimited(body) {
        (delimited, SampleFormat::Delimited)
    } else {
        let mut raw = Map::new();
        raw.insert("message".to_string(), Value::String(body.to_string()));
        (raw, SampleFormat::Raw)
    };

    for (key, value) in syslog {
        fields.entry(key).or_insert(value);
    }

    ParsedSample {
        value: Value::Object(fields),
        format,
    }
}

fn parse_json_object(body: &str) -> Option<Map<String, Value>> {
    if !body.starts_with('{') {
        return None;
    }
    match serde_json::from_str::<Value>(body).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn parse_cef(body: &str) -> Option<Map<String, Value>> {
    let parts: Vec<&str> = body.splitn(8, '|').collect();
    if parts.len() < 7 {
        return None;
    }

    let mut fields = Map::new();
    let version = parts[0].trim_start_matches("CEF:");
    fields.insert(CEF_HEADER_FIELDS[0].to_string(), typed_value(version));
    for (name, value) in CEF_HEADER_FIELDS.iter().zip(parts.iter()).skip(1) {
        fields.insert(name.to_string(), typed_value(value));
    }

    if let Some(extension) = parts.get(7) {
        // Extension values may contain spaces; each runs until the next key
        let keys: Vec<(usize, usize, &str)> = CEF_EXTENSION_KEY
            .captures_iter(extension)
            .filter_map(|c| {
                let whole = c.get(0)?;
                let key = c.get(1)?;
                Some((whole.start(), whole.end(), key.as_str()))
            })
            .collect();

        for (i, (_, value_start, key)) in keys.iter().enumerate() {
            let value_end = keys
                .get(i + 1)
                .map(|(next_start, _, _)| *next_start)
                .unwrap_or(extension.len());
            let value = extension[*value_start..value_end].trim();
            fields.insert(key.to_string(), typed_value(value));
        }
    }

    Some(fields)
}

fn parse_key_value(body: &str) -> Option<Map<String, Value>> {
    let mut fields = Map::new();
    for captures in KV_PAIR.captures_iter(body) {
        let key = captures.get(1)?.as_str();
        let raw = captures.get(2)?.as_str();
        let clean = if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
            &raw[1..raw.len() - 1]
        } else {
            raw
        };
        fields.insert(key.to_string(), typed_value(clean));
    }

    // A single pair is more likely prose than a key=value record
    if fields.len() >= 2 {
        Some(fields)
    } else {
        None
    }
}

fn parse_delimited(body: &str) -> Option<Map<String, Value>> {
    let delimiter = [',', '|', '\t']
        .into_iter()
        .max_by_key(|d| body.matches(*d).count())?;
    let parts: Vec<&str> = body.split(delimiter).collect();
    if parts.len() < 3 {
        return None;
    }

    Some(
        parts
            .iter()
            .enumerate()
            .map(|(i, part)| (format!("field_{}", i + 1), typed_value(part.trim())))
            .collect(),
    )
}

fn typed_value(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        Value::Number(int.into())
    } else if let Some(float) = raw
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && raw.contains('.'))
        .and_then(Number::from_f64)
    {
        Value::Number(float)
    } else {
        Value::String(raw.to_string())
    }
}
