//! Configuration module for parser validation runs
//! Handles backend endpoints, polling bounds, cache policy, worker pool and report thresholds

use crate::error_handling::{ErrorContext, ValidatorError, ValidatorResult};
use crate::models::ValidationPair;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the validator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Analytics backend configuration
    pub backend: BackendConfig,
    /// Query submission and polling settings
    pub query: QueryConfig,
    /// Query result cache settings
    pub cache: CacheConfig,
    /// Batch orchestration settings
    pub batch: BatchConfig,
    /// Scoring adjustments
    pub scoring: ScoringConfig,
    /// Critical issue and ranking thresholds
    pub thresholds: ThresholdConfig,
}

/// Analytics backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the query API
    pub url: String,
    /// Tenant/account scope every query runs under
    pub scope: String,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,
    /// Event ingestion endpoint, used only when sample injection is enabled
    pub ingest_url: Option<String>,
}

/// Query submission and polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Delay between status polls in milliseconds
    pub poll_interval_ms: u64,
    /// Maximum number of status polls before the query times out
    pub max_poll_attempts: u32,
    /// Look-back window for backend queries in minutes
    pub window_minutes: i64,
    /// Maximum events fetched per query
    pub limit: u32,
    /// Query template; `{parser}` is replaced with the parser identifier
    pub template: String,
}

/// Query result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable query result caching
    pub enabled: bool,
    /// Cache TTL in seconds
    pub ttl_secs: u64,
    /// Maximum number of cached query results
    pub max_entries: usize,
}

/// Batch orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of pairs validated concurrently
    pub workers: usize,
    /// Per-pair timeout in seconds
    pub pair_timeout_secs: u64,
    /// Generator samples drawn per pair
    pub samples_per_pair: usize,
    /// Inject generated samples before querying the backend
    pub inject_samples: bool,
}

/// Scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Bonus added to the OCSF score when observables are present
    pub observable_bonus: f64,
    /// Maximum flattening depth
    pub max_depth: usize,
    /// Expected field name -> extracted field name
    pub aliases: HashMap<String, String>,
    /// Per-field weight overrides
    pub weight_overrides: HashMap<String, f64>,
}

/// Thresholds for critical issue detection and rankings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Zero-event rate (0-1) above which a critical issue is raised
    pub max_zero_event_rate: f64,
    /// Failure rate (0-1) above which a critical issue is raised
    pub max_failure_rate: f64,
    /// Extraction rate (percent) considered too low
    pub min_extraction_rate: f64,
    /// Number of low-extraction pairs tolerated before raising an issue
    pub low_extraction_pair_limit: usize,
    /// Number of entries in the top performers list
    pub top_performers: usize,
    /// Number of entries in the improvement candidates list
    pub improvement_candidates: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8084".to_string(),
            scope: "default".to_string(),
            request_timeout_secs: 30,
            ingest_url: None,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            max_poll_attempts: 30,
            window_minutes: 60,
            limit: 50,
            template: "parser = '{parser}'".to_string(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300, // 5 minutes
            max_entries: 256,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            pair_timeout_secs: 120,
            samples_per_pair: 5,
            inject_samples: false,
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            observable_bonus: 10.0,
            max_depth: 10,
            aliases: HashMap::new(),
            weight_overrides: HashMap::new(),
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            max_zero_event_rate: 0.3,
            max_failure_rate: 0.2,
            min_extraction_rate: 50.0,
            low_extraction_pair_limit: 5,
            top_performers: 10,
            improvement_candidates: 10,
        }
    }
}

impl ValidatorConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> ValidatorResult<Self> {
        let content = std::fs::read_to_string(path)
            .with_config_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: ValidatorConfig = toml::from_str(&content)
            .with_config_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables and defaults
    pub fn from_env() -> ValidatorResult<Self> {
        let mut config = ValidatorConfig::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override values from environment variables
    pub fn apply_env(&mut self) -> ValidatorResult<()> {
        if let Ok(url) = std::env::var("VALIDATOR_BACKEND_URL") {
            self.backend.url = url;
        }

        if let Ok(scope) = std::env::var("VALIDATOR_SCOPE") {
            self.backend.scope = scope;
        }

        if let Ok(workers) = std::env::var("VALIDATOR_WORKERS") {
            self.batch.workers = workers
                .parse()
                .with_config_context(|| "Invalid VALIDATOR_WORKERS".to_string())?;
        }

        if let Ok(ingest_url) = std::env::var("VALIDATOR_INGEST_URL") {
            self.backend.ingest_url = Some(ingest_url);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> ValidatorResult<()> {
        if !self.backend.url.starts_with("http://") && !self.backend.url.starts_with("https://") {
            return Err(ValidatorError::configuration(
                "Backend URL must be a valid HTTP/HTTPS URL",
            ));
        }

        if self.backend.scope.trim().is_empty() {
            return Err(ValidatorError::configuration("Query scope cannot be empty"));
        }

        if self.query.max_poll_attempts == 0 {
            return Err(ValidatorError::configuration(
                "max_poll_attempts must be greater than 0",
            ));
        }

        if self.query.limit == 0 {
            return Err(ValidatorError::configuration("Query limit cannot be 0"));
        }

        if self.query.window_minutes <= 0 {
            return Err(ValidatorError::configuration(
                "Query window must be a positive number of minutes",
            ));
        }

        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ValidatorError::configuration(
                "Cache max_entries cannot be 0 when caching is enabled",
            ));
        }

        if self.batch.workers == 0 {
            return Err(ValidatorError::configuration("Worker count must be greater than 0"));
        }

        if self.batch.pair_timeout_secs == 0 {
            return Err(ValidatorError::configuration("Pair timeout cannot be 0"));
        }

        if self.batch.samples_per_pair == 0 {
            return Err(ValidatorError::configuration(
                "samples_per_pair must be greater than 0",
            ));
        }

        if self.batch.inject_samples && self.backend.ingest_url.is_none() {
            return Err(ValidatorError::configuration(
                "inject_samples requires backend.ingest_url",
            ));
        }

        if self.scoring.max_depth == 0 {
            return Err(ValidatorError::configuration("max_depth must be greater than 0"));
        }

        for (name, rate) in [
            ("max_zero_event_rate", self.thresholds.max_zero_event_rate),
            ("max_failure_rate", self.thresholds.max_failure_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ValidatorError::configuration(format!(
                    "{} must be between 0 and 1",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Get poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.query.poll_interval_ms)
    }

    /// Get per-pair timeout as Duration
    pub fn pair_timeout(&self) -> Duration {
        Duration::from_secs(self.batch.pair_timeout_secs)
    }

    /// Get HTTP request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    /// Get cache TTL as Duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}

/// Backend query for a parser: `{parser}` in the template is replaced with its id
pub fn render_query(template: &str, parser_id: &str) -> String {
    template.replace("{parser}", parser_id)
}

/// List of pairs to validate, loaded from YAML or JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PairFile {
    Document { pairs: Vec<ValidationPair> },
    List(Vec<ValidationPair>),
}

impl PairFile {
    /// Load by extension: `.json` is JSON, anything else is parsed as YAML
    pub fn load(path: &Path) -> ValidatorResult<Vec<ValidationPair>> {
        let content = std::fs::read_to_string(path)
            .with_config_context(|| format!("Failed to read pairs file: {:?}", path))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let file: PairFile = if is_json {
            serde_json::from_str(&content)
                .with_config_context(|| format!("Failed to parse pairs file: {:?}", path))?
        } else {
            serde_yaml::from_str(&content)
                .with_config_context(|| format!("Failed to parse pairs file: {:?}", path))?
        };

        let pairs = file.into_pairs();
        if pairs.is_empty() {
            return Err(ValidatorError::configuration(format!(
                "Pairs file {:?} does not list any pairs",
                path
            )));
        }
        Ok(pairs)
    }

    pub fn into_pairs(self) -> Vec<ValidationPair> {
        match self {
            PairFile::Document { pairs } | PairFile::List(pairs) => pairs,
        }
    }
}
