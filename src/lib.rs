//! SIEM Parser Validator Library
//!
//! Validates that an analytics backend parses and field-maps vendor security
//! logs correctly. Synthetic samples are generated per vendor, the backend is
//! queried for the events it ingested, and both sides are flattened and scored
//! for extraction quality and OCSF compliance.
//!
//! # Modules
//!
//! - `query`: Asynchronous query client with bounded polling and a TTL/LRU result cache
//! - `analyzer`: Field flattening, format detection and observable classification
//! - `scoring`: Weighted precision/recall/F1, OCSF compliance, grades and recommendations
//! - `orchestrator`: Bounded-concurrency batch runs with per-pair failure isolation
//! - `summary`: Category statistics, rankings and critical issue detection
//! - `report`: Markdown and JSON report projections
//! - `generator`: Built-in vendor sample generators and the generator registry
//! - `injection`: Event injection collaborator
//! - `error_handling`: Error taxonomy shared by all of the above

pub mod analyzer;
pub mod config;
pub mod error_handling;
pub mod generator;
pub mod injection;
pub mod models;
pub mod orchestrator;
pub mod query;
pub mod report;
pub mod scoring;
pub mod summary;

// Re-export the main types for convenience
pub use analyzer::{classify_observable, AnalysisStatus, CountPolicy, FieldAnalysis, FieldAnalyzer};
pub use config::ValidatorConfig;
pub use error_handling::{ErrorSummary, ValidatorError, ValidatorResult};
pub use generator::{BuiltinGenerator, EventGenerator, GeneratorRegistry, TemplateGenerator};
pub use injection::{EventInjector, HttpEventInjector, InjectionOutcome};
pub use models::{
    Degenerate, FieldSet, Grade, ObservableType, SampleEvent, SampleFormat, ValidationMetrics, ValidationPair,
    ValidationResult, ValidationStatus,
};
pub use orchestrator::BatchOrchestrator;
pub use query::{
    ClientStats, HttpQueryBackend, QueryBackend, QueryCache, QueryClient, QueryHandle, QueryScope,
    QueryState, TimeWindow,
};
pub use report::{export_json, export_records, render_markdown};
pub use scoring::{ComparisonMetrics, FieldWeights, ScoringEngine};
pub use summary::{BatchResult, CriticalIssue};
