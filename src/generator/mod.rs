//! Sample event generators
//! Built-in vendor templates and the registry the orchestrator resolves generator ids against

pub mod templates;

use crate::error_handling::{ValidatorError, ValidatorResult};
use crate::models::SampleEvent;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Produces synthetic sample events for one vendor log format
pub trait EventGenerator: Send + Sync {
    fn id(&self) -> &str;

    /// Vendor family used for report bucketing
    fn category(&self) -> Option<&str> {
        None
    }

    /// Product identifier sent with injected events
    fn product_id(&self) -> &str {
        self.id()
    }

    fn produce_sample(&self) -> ValidatorResult<SampleEvent>;
}

/// Built-in vendor formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinGenerator {
    FortinetFortigate,
    CiscoAsa,
    SophosWaf,
    F5Asm,
    AwsCloudtrail,
    OktaSystemLog,
    ZeekConn,
    PaloaltoTraffic,
}

impl BuiltinGenerator {
    pub const ALL: [BuiltinGenerator; 8] = [
        Self::FortinetFortigate,
        Self::CiscoAsa,
        Self::SophosWaf,
        Self::F5Asm,
        Self::AwsCloudtrail,
        Self::OktaSystemLog,
        Self::ZeekConn,
        Self::PaloaltoTraffic,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Self::FortinetFortigate => "fortinet_fortigate",
            Self::CiscoAsa => "cisco_asa",
            Self::SophosWaf => "sophos_waf",
            Self::F5Asm => "f5_asm",
            Self::AwsCloudtrail => "aws_cloudtrail",
            Self::OktaSystemLog => "okta_system_log",
            Self::ZeekConn => "zeek_conn",
            Self::PaloaltoTraffic => "paloalto_traffic",
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::FortinetFortigate | Self::CiscoAsa | Self::PaloaltoTraffic => "network_security",
            Self::SophosWaf | Self::F5Asm => "web_security",
            Self::AwsCloudtrail => "cloud",
            Self::OktaSystemLog => "identity",
            Self::ZeekConn => "network_monitoring",
        }
    }

    pub fn product_id(&self) -> &'static str {
        match self {
            Self::FortinetFortigate => "fortinet-fortigate",
            Self::CiscoAsa => "cisco-asa",
            Self::SophosWaf => "sophos-waf",
            Self::F5Asm => "f5-asm",
            Self::AwsCloudtrail => "aws-cloudtrail",
            Self::OktaSystemLog => "okta",
            Self::ZeekConn => "zeek",
            Self::PaloaltoTraffic => "paloalto-ngfw",
        }
    }

    fn render(&self, rng: &mut StdRng, base: DateTime<Utc>) -> SampleEvent {
        match self {
            Self::FortinetFortigate => templates::fortigate_traffic(rng, base),
            Self::CiscoAsa => templates::cisco_asa(rng, base),
            Self::SophosWaf => templates::sophos_waf(rng, base),
            Self::F5Asm => templates::f5_asm(rng, base),
            Self::AwsCloudtrail => templates::aws_cloudtrail(rng, base),
            Self::OktaSystemLog => templates::okta_system_log(rng, base),
            Self::ZeekConn => templates::zeek_conn(rng, base),
            Self::PaloaltoTraffic => templates::paloalto_traffic(rng, base),
        }
    }
}

/// Seeded generator for one built-in format.
///
/// Given the same seed and base time the sequence of samples is identical.
pub struct TemplateGenerator {
    kind: BuiltinGenerator,
    rng: Mutex<StdRng>,
    base_time: DateTime<Utc>,
}

impl TemplateGenerator {
    pub fn new(kind: BuiltinGenerator, seed: u64) -> Self {
        Self::with_base_time(kind, seed, Utc::now())
    }

    pub fn with_base_time(kind: BuiltinGenerator, seed: u64, base_time: DateTime<Utc>) -> Self {
        Self {
            kind,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            base_time,
        }
    }

    pub fn kind(&self) -> BuiltinGenerator {
        self.kind
    }
}

impl EventGenerator for TemplateGenerator {
    fn id(&self) -> &str {
        self.kind.id()
    }

    fn category(&self) -> Option<&str> {
        Some(self.kind.category())
    }

    fn product_id(&self) -> &str {
        self.kind.product_id()
    }

    fn produce_sample(&self) -> ValidatorResult<SampleEvent> {
        let mut rng = self.rng.lock();
        Ok(self.kind.render(&mut rng, self.base_time))
    }
}

/// Generators available to a run, keyed by id
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    generators: BTreeMap<String, Arc<dyn EventGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in generator; each derives its seed from `seed`
    pub fn with_builtins(seed: u64) -> Self {
        let mut registry = Self::new();
        for (offset, kind) in BuiltinGenerator::ALL.iter().enumerate() {
            registry.register(Arc::new(TemplateGenerator::new(
                *kind,
                seed.wrapping_add(offset as u64),
            )));
        }
        registry
    }

    /// Add or replace a generator
    pub fn register(&mut self, generator: Arc<dyn EventGenerator>) {
        self.generators.insert(generator.id().to_string(), generator);
    }

    pub fn get(&self, id: &str) -> ValidatorResult<Arc<dyn EventGenerator>> {
        self.generators
            .get(id)
            .cloned()
            .ok_or_else(|| ValidatorError::unknown_generator(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.generators.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.generators.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn EventGenerator>> {
        self.generators.values()
    }
}

/// Draw `count` samples, failing on the first generator error
pub fn draw_samples(generator: &dyn EventGenerator, count: usize) -> ValidatorResult<Vec<SampleEvent>> {
    (0..count).map(|_| generator.produce_sample()).collect()
}
