//! Report rendering and export
//! Pure projections of a BatchResult; nothing here recomputes metrics

use crate::error_handling::{ErrorContext, ValidatorResult};
use crate::models::{Degenerate, Grade, ValidationResult, ValidationStatus};
use crate::query::ClientStats;
use crate::summary::{BatchResult, RankedPair};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::info;

pub const MARKDOWN_REPORT_FILE: &str = "validation_report.md";
pub const JSON_REPORT_FILE: &str = "validation_results.json";

/// One exported row per validated pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub generator_id: String,
    pub parser_id: String,
    pub category: String,
    pub status: ValidationStatus,
    pub grade: Grade,
    pub overall_score: f64,
    pub events_generated: usize,
    pub events_found: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub extraction_rate: f64,
    pub ocsf_score: f64,
    pub format_compatibility: f64,
    pub observable_rate: f64,
    pub missing_fields: Vec<String>,
    pub extra_fields: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degenerate: Option<Degenerate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
    pub validated_at: DateTime<Utc>,
}

impl From<&ValidationResult> for ExportRecord {
    fn from(result: &ValidationResult) -> Self {
        Self {
            generator_id: result.generator_id.clone(),
            parser_id: result.parser_id.clone(),
            category: result.category.clone(),
            status: result.status,
            grade: result.grade,
            overall_score: result.metrics.overall_score(),
            events_generated: result.events_generated,
            events_found: result.events_found,
            precision: result.metrics.precision,
            recall: result.metrics.recall,
            f1: result.metrics.f1,
            extraction_rate: result.metrics.extraction_rate,
            ocsf_score: result.metrics.ocsf_score,
            format_compatibility: result.metrics.format_compatibility,
            observable_rate: result.metrics.observable_rate,
            missing_fields: result.missing_fields.clone(),
            extra_fields: result.extra_fields.clone(),
            recommendations: result.recommendations.clone(),
            degenerate: result.degenerate,
            error: result.error.as_ref().map(|e| e.message.clone()),
            elapsed_ms: result.elapsed_ms,
            validated_at: result.validated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSummary {
    pub total: usize,
    pub validated: usize,
    pub no_events: usize,
    pub no_fields: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub avg_extraction_rate: f64,
    pub avg_ocsf_score: f64,
    pub critical_issues: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_stats: Option<ClientStats>,
}

/// Machine-readable export document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub generated_at: DateTime<Utc>,
    pub summary: ExportSummary,
    pub results: Vec<ExportRecord>,
}

pub fn export_records(batch: &BatchResult) -> Vec<ExportRecord> {
    batch.results.iter().map(ExportRecord::from).collect()
}

pub fn export_document(batch: &BatchResult) -> ExportDocument {
    ExportDocument {
        generated_at: batch.completed_at,
        summary: ExportSummary {
            total: batch.total,
            validated: batch.validated,
            no_events: batch.no_events,
            no_fields: batch.no_fields,
            failed: batch.failed,
            success_rate: batch.success_rate,
            avg_extraction_rate: batch.avg_extraction_rate,
            avg_ocsf_score: batch.avg_ocsf_score,
            critical_issues: batch.critical_issues.len(),
            client_stats: batch.client_stats.clone(),
        },
        results: export_records(batch),
    }
}

pub fn export_json(batch: &BatchResult) -> ValidatorResult<String> {
    serde_json::to_string_pretty(&export_document(batch))
        .with_context(|| "Failed to serialize validation results to JSON".to_string())
}

fn ranking_table(out: &mut String, pairs: &[RankedPair]) {
    out.push_str("| Generator | Parser | Grade | Extraction | OCSF | F1 |\n");
    out.push_str("|---|---|---|---|---|---|\n");
    for pair in pairs {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {:.1}% | {:.1} | {:.2} |",
            pair.generator_id, pair.parser_id, pair.grade, pair.extraction_rate, pair.ocsf_score, pair.f1
        );
    }
    out.push('\n');
}

/// Human-readable summary
pub fn render_markdown(batch: &BatchResult) -> String {
    let mut out = String::new();

    out.push_str("# Parser Validation Report\n\n");
    let _ = writeln!(
        out,
        "**Generated:** {}\n",
        batch.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    out.push_str("## Executive Summary\n\n");
    let _ = writeln!(out, "- **Pairs Validated:** {}", batch.total);
    let _ = writeln!(out, "- **Validated:** {} ({:.1}% success)", batch.validated, batch.success_rate);
    let _ = writeln!(out, "- **No Events:** {}", batch.no_events);
    let _ = writeln!(out, "- **No Fields Extracted:** {}", batch.no_fields);
    let _ = writeln!(out, "- **Failed:** {}", batch.failed);
    let _ = writeln!(out, "- **Average Extraction Rate:** {:.1}%", batch.avg_extraction_rate);
    let _ = writeln!(out, "- **Average OCSF Score:** {:.1}", batch.avg_ocsf_score);
    let _ = writeln!(out, "- **Average F1:** {:.2}", batch.avg_f1);
    let _ = writeln!(out, "- **Critical Issues:** {}", batch.critical_issues.len());
    let _ = writeln!(out, "- **Duration:** {}ms\n", batch.duration_ms());

    if !batch.grade_distribution.is_empty() {
        out.push_str("### Grade Distribution\n\n");
        for (grade, count) in batch.grade_distribution.iter().rev() {
            let _ = writeln!(out, "- **{}:** {}", grade, count);
        }
        out.push('\n');
    }

    out.push_str("## Categories\n\n");
    out.push_str("| Category | Pairs | Validated | No Events | No Fields | Failed | Success | Avg Extraction | Avg OCSF |\n");
    out.push_str("|---|---|---|---|---|---|---|---|---|\n");
    for category in &batch.categories {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {:.1}% | {:.1}% | {:.1} |",
            category.category,
            category.total,
            category.validated,
            category.no_events,
            category.no_fields,
            category.failed,
            category.success_rate,
            category.avg_extraction_rate,
            category.avg_ocsf_score
        );
    }
    out.push('\n');

    out.push_str("## Top Performers\n\n");
    if batch.top_performers.is_empty() {
        out.push_str("No pairs validated successfully.\n\n");
    } else {
        ranking_table(&mut out, &batch.top_performers);
    }

    out.push_str("## Improvement Candidates\n\n");
    if batch.improvement_candidates.is_empty() {
        out.push_str("None.\n\n");
    } else {
        ranking_table(&mut out, &batch.improvement_candidates);
        for pair in &batch.improvement_candidates {
            if let Some(result) = batch
                .results
                .iter()
                .find(|r| r.generator_id == pair.generator_id && r.parser_id == pair.parser_id)
            {
                let _ = writeln!(out, "### {} -> {}\n", pair.generator_id, pair.parser_id);
                for recommendation in &result.recommendations {
                    let _ = writeln!(out, "- {}", recommendation);
                }
                out.push('\n');
            }
        }
    }

    out.push_str("## Critical Issues\n\n");
    if batch.critical_issues.is_empty() {
        out.push_str("None detected.\n\n");
    } else {
        for issue in &batch.critical_issues {
            let _ = writeln!(out, "- **{:?}:** {}", issue.kind, issue.message);
            for affected in &issue.affected {
                let _ = writeln!(out, "  - {}", affected);
            }
        }
        out.push('\n');
    }

    let failures: Vec<&ValidationResult> = batch
        .results
        .iter()
        .filter(|r| r.status == ValidationStatus::Failed)
        .collect();
    if !failures.is_empty() {
        out.push_str("## Failures\n\n");
        for result in failures {
            let message = result.error.as_ref().map(|e| e.message.as_str()).unwrap_or("unknown error");
            let _ = writeln!(out, "- **{} -> {}:** {}", result.generator_id, result.parser_id, message);
        }
        out.push('\n');
    }

    let unmapped: Vec<&ValidationResult> = batch
        .results
        .iter()
        .filter(|r| r.status == ValidationStatus::NoFields)
        .collect();
    if !unmapped.is_empty() {
        out.push_str("## Events Without Fields

");
        for result in unmapped {
            let _ = writeln!(
                out,
                "- **{} -> {}:** {} events returned, nothing extracted",
                result.generator_id, result.parser_id, result.events_found
            );
        }
        out.push('\n');
    }

    if let Some(stats) = &batch.client_stats {
        out.push_str("## Client Performance\n\n");
        let _ = writeln!(out, "- **Queries Submitted:** {}", stats.queries_submitted);
        let _ = writeln!(out, "- **Succeeded:** {}", stats.queries_succeeded);
        let _ = writeln!(out, "- **Failed:** {}", stats.queries_failed);
        let _ = writeln!(out, "- **Timed Out:** {}", stats.queries_timed_out);
        let _ = writeln!(
            out,
            "- **Cache Hits:** {} ({:.1}%)",
            stats.cache_hits, stats.cache_hit_rate
        );
        let _ = writeln!(out, "- **Poll Attempts:** {}", stats.poll_attempts);
        let _ = writeln!(out, "- **Average Query Latency:** {:.0}ms", stats.avg_query_latency_ms);
        out.push('\n');
    }

    out
}

/// Write both reports into `dir`
pub fn write_reports(batch: &BatchResult, dir: &Path) -> ValidatorResult<()> {
    fs::create_dir_all(dir)?;

    let markdown_path = dir.join(MARKDOWN_REPORT_FILE);
    fs::write(&markdown_path, render_markdown(batch))
        .with_context(|| format!("Failed to write Markdown report to: {:?}", markdown_path))?;
    info!("Markdown report exported to: {:?}", markdown_path);

    let json_path = dir.join(JSON_REPORT_FILE);
    fs::write(&json_path, export_json(batch)?)
        .with_context(|| format!("Failed to write JSON report to: {:?}", json_path))?;
    info!("JSON report exported to: {:?}", json_path);

    Ok(())
}
