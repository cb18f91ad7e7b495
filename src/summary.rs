//! Batch aggregation
//!
//! Everything in a [`BatchResult`] except the client statistics and timing is
//! derived from its validation records, so rebuilding from the same records
//! always produces the same summary.

use crate::config::ThresholdConfig;
use crate::models::{Grade, ValidationResult, ValidationStatus};
use crate::query::ClientStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Per-category roll-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub category: String,
    pub total: usize,
    pub validated: usize,
    pub no_events: usize,
    pub no_fields: usize,
    pub failed: usize,
    /// Percentage of pairs scored against non-empty field sets
    pub success_rate: f64,
    pub avg_extraction_rate: f64,
    pub avg_ocsf_score: f64,
}

/// Entry in a ranking list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPair {
    pub generator_id: String,
    pub parser_id: String,
    pub category: String,
    pub grade: Grade,
    pub extraction_rate: f64,
    pub ocsf_score: f64,
    pub f1: f64,
}

impl From<&ValidationResult> for RankedPair {
    fn from(result: &ValidationResult) -> Self {
        Self {
            generator_id: result.generator_id.clone(),
            parser_id: result.parser_id.clone(),
            category: result.category.clone(),
            grade: result.grade,
            extraction_rate: result.metrics.extraction_rate,
            ocsf_score: result.metrics.ocsf_score,
            f1: result.metrics.f1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalIssueKind {
    HighZeroEventRate,
    HighFailureRate,
    WidespreadLowExtraction,
}

/// Condition that needs operator attention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalIssue {
    pub kind: CriticalIssueKind,
    pub message: String,
    /// "generator -> parser" of the pairs involved
    pub affected: Vec<String>,
}

/// Aggregate over one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<ValidationResult>,
    pub total: usize,
    pub validated: usize,
    pub no_events: usize,
    /// Events came back but yielded zero fields
    pub no_fields: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub avg_extraction_rate: f64,
    pub avg_ocsf_score: f64,
    pub avg_f1: f64,
    pub grade_distribution: BTreeMap<Grade, usize>,
    pub categories: Vec<CategoryStats>,
    pub top_performers: Vec<RankedPair>,
    pub improvement_candidates: Vec<RankedPair>,
    pub critical_issues: Vec<CriticalIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_stats: Option<ClientStats>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl BatchResult {
    pub fn from_results(results: Vec<ValidationResult>, thresholds: &ThresholdConfig) -> Self {
        let total = results.len();
        let validated = count_status(&results, ValidationStatus::Validated);
        let no_events = count_status(&results, ValidationStatus::NoEvents);
        let no_fields = count_status(&results, ValidationStatus::NoFields);
        let failed = count_status(&results, ValidationStatus::Failed);
        let successful = results.iter().filter(|r| r.is_success()).count();

        let mut grade_distribution = BTreeMap::new();
        for result in &results {
            *grade_distribution.entry(result.grade).or_insert(0) += 1;
        }

        let started_at = results
            .iter()
            .map(|r| r.validated_at)
            .min()
            .unwrap_or_else(Utc::now);
        let completed_at = results
            .iter()
            .map(|r| r.validated_at)
            .max()
            .unwrap_or(started_at);

        Self {
            total,
            validated,
            no_events,
            no_fields,
            failed,
            success_rate: percent(successful, total),
            avg_extraction_rate: mean(results.iter().map(|r| r.metrics.extraction_rate)),
            avg_ocsf_score: mean(results.iter().map(|r| r.metrics.ocsf_score)),
            avg_f1: mean(results.iter().map(|r| r.metrics.f1)),
            grade_distribution,
            categories: category_stats(&results),
            top_performers: top_performers(&results, thresholds.top_performers),
            improvement_candidates: improvement_candidates(
                &results,
                thresholds.improvement_candidates,
            ),
            critical_issues: critical_issues(&results, thresholds),
            client_stats: None,
            started_at,
            completed_at,
            results,
        }
    }

    pub fn with_client_stats(mut self, stats: ClientStats) -> Self {
        self.client_stats = Some(stats);
        self
    }

    pub fn with_timing(mut self, started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self.completed_at = completed_at;
        self
    }

    pub fn duration_ms(&self) -> i64 {
        (self.completed_at - self.started_at).num_milliseconds()
    }

    pub fn has_critical_issues(&self) -> bool {
        !self.critical_issues.is_empty()
    }
}

fn count_status(results: &[ValidationResult], status: ValidationStatus) -> usize {
    results.iter().filter(|r| r.status == status).count()
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn mean<I: Iterator<Item = f64>>(values: I) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn category_stats(results: &[ValidationResult]) -> Vec<CategoryStats> {
    let mut buckets: BTreeMap<&str, Vec<&ValidationResult>> = BTreeMap::new();
    for result in results {
        buckets.entry(result.category.as_str()).or_default().push(result);
    }

    buckets
        .into_iter()
        .map(|(category, members)| {
            let validated = members
                .iter()
                .filter(|r| r.status == ValidationStatus::Validated)
                .count();
            let successful = members.iter().filter(|r| r.is_success()).count();
            CategoryStats {
                category: category.to_string(),
                total: members.len(),
                validated,
                no_events: members
                    .iter()
                    .filter(|r| r.status == ValidationStatus::NoEvents)
                    .count(),
                no_fields: members
                    .iter()
                    .filter(|r| r.status == ValidationStatus::NoFields)
                    .count(),
                failed: members
                    .iter()
                    .filter(|r| r.status == ValidationStatus::Failed)
                    .count(),
                success_rate: percent(successful, members.len()),
                avg_extraction_rate: mean(members.iter().map(|r| r.metrics.extraction_rate)),
                avg_ocsf_score: mean(members.iter().map(|r| r.metrics.ocsf_score)),
            }
        })
        .collect()
}

/// Descending by extraction rate, then OCSF score, then F1
fn performance_order(a: &ValidationResult, b: &ValidationResult) -> Ordering {
    b.metrics
        .extraction_rate
        .total_cmp(&a.metrics.extraction_rate)
        .then_with(|| b.metrics.ocsf_score.total_cmp(&a.metrics.ocsf_score))
        .then_with(|| b.metrics.f1.total_cmp(&a.metrics.f1))
}

fn top_performers(results: &[ValidationResult], limit: usize) -> Vec<RankedPair> {
    let mut ranked: Vec<&ValidationResult> = results.iter().filter(|r| r.is_success()).collect();
    ranked.sort_by(|a, b| performance_order(a, b));
    ranked.into_iter().take(limit).map(RankedPair::from).collect()
}

/// Low-grade scored pairs, worst first
fn improvement_candidates(results: &[ValidationResult], limit: usize) -> Vec<RankedPair> {
    let mut ranked: Vec<&ValidationResult> = results
        .iter()
        .filter(|r| r.is_success() && r.grade < Grade::C)
        .collect();
    ranked.sort_by(|a, b| performance_order(b, a));
    ranked.into_iter().take(limit).map(RankedPair::from).collect()
}

fn pair_label(result: &ValidationResult) -> String {
    format!("{} -> {}", result.generator_id, result.parser_id)
}

fn critical_issues(results: &[ValidationResult], thresholds: &ThresholdConfig) -> Vec<CriticalIssue> {
    let mut issues = Vec::new();
    let total = results.len();
    if total == 0 {
        return issues;
    }

    let zero_event: Vec<&ValidationResult> = results
        .iter()
        .filter(|r| r.status == ValidationStatus::NoEvents)
        .collect();
    let zero_event_rate = zero_event.len() as f64 / total as f64;
    if zero_event_rate > thresholds.max_zero_event_rate {
        issues.push(CriticalIssue {
            kind: CriticalIssueKind::HighZeroEventRate,
            message: format!(
                "{:.1}% of pairs returned no events (threshold {:.1}%): check event ingestion and backend connectivity",
                zero_event_rate * 100.0,
                thresholds.max_zero_event_rate * 100.0
            ),
            affected: zero_event.iter().map(|r| pair_label(r)).collect(),
        });
    }

    let failed: Vec<&ValidationResult> = results
        .iter()
        .filter(|r| r.status == ValidationStatus::Failed)
        .collect();
    let failure_rate = failed.len() as f64 / total as f64;
    if failure_rate > thresholds.max_failure_rate {
        issues.push(CriticalIssue {
            kind: CriticalIssueKind::HighFailureRate,
            message: format!(
                "{:.1}% of pairs failed to validate (threshold {:.1}%)",
                failure_rate * 100.0,
                thresholds.max_failure_rate * 100.0
            ),
            affected: failed.iter().map(|r| pair_label(r)).collect(),
        });
    }

    let low_extraction: Vec<&ValidationResult> = results
        .iter()
        .filter(|r| r.returned_events() && r.metrics.extraction_rate < thresholds.min_extraction_rate)
        .collect();
    if low_extraction.len() > thresholds.low_extraction_pair_limit {
        issues.push(CriticalIssue {
            kind: CriticalIssueKind::WidespreadLowExtraction,
            message: format!(
                "{} pairs extract less than {:.0}% of expected fields",
                low_extraction.len(),
                thresholds.min_extraction_rate
            ),
            affected: low_extraction.iter().map(|r| pair_label(r)).collect(),
        });
    }

    issues
}
