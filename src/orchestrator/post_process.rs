//! Post-run processing utilities.
//!
//! Turns the store's final state into a [`RunReport`] and handles exports once
//! a run reaches a terminal status.

use crate::cli::Cli;
use crate::model::RunReport;
use crate::projection;
use crate::store::{RunState, RunStore};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    pub report: RunReport,
    pub export_messages: Vec<String>,
}

/// Freeze a state snapshot into a report.
pub(crate) fn build_report(api_url: &str, state: &RunState, now: Instant) -> RunReport {
    let generated_at_utc = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    RunReport {
        generated_at_utc,
        api_url: api_url.to_string(),
        run_id: state.run_id.clone(),
        configuration: state.config.clone(),
        status: state.status,
        status_label: projection::status_label(state.status),
        elapsed_seconds: projection::elapsed_seconds(state, now),
        display_score: projection::display_score(state),
        run_summary: state.run_summary.clone(),
        score_breakdown: state.score_breakdown.clone(),
        fixes_applied: state.fixes_applied.clone(),
        ci_cd_timeline: state.ci_cd_timeline.clone(),
        logs: state.logs.clone(),
    }
}

pub(crate) fn export_json(path: &Path, report: &RunReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Default target for on-demand exports from the dashboard.
pub(crate) fn default_export_path(report: &RunReport) -> PathBuf {
    let stem = report
        .run_id
        .as_ref()
        .map(|id| sanitize_file_stem(id.as_str()))
        .unwrap_or_else(|| "no-run".to_string());
    PathBuf::from(format!("healing-run-{stem}.json"))
}

fn sanitize_file_stem(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Process a finished run: build the report and export it if requested.
pub(crate) fn process_run_completion(args: &Cli, store: &RunStore) -> ProcessedRun {
    let report = store.read_with(|state| build_report(&args.api_url, state, Instant::now()));

    let mut export_messages = Vec::new();
    if let Some(export_path) = args.export_json.as_deref() {
        match export_json(export_path, &report) {
            Ok(_) => export_messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    ProcessedRun {
        report,
        export_messages,
    }
}
