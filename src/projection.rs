//! Derived views over a [`RunState`] snapshot.
//!
//! Everything here is pure: no I/O, no store mutation. Missing upstream data
//! is replaced by the defaults the dashboard has always shown.

use crate::model::{RunStatus, BASE_SCORE};
use crate::store::RunState;
use std::time::Instant;

/// Highest score the agent can award (base 100 plus the speed bonus).
pub const MAX_SCORE: f64 = 110.0;
pub const LAST_LOG_PLACEHOLDER: &str = "Initializing...";
pub const ITERATION_PLACEHOLDER: &str = "0/5";
pub const BRANCH_PLACEHOLDER: &str = "Waiting...";
pub const REPOSITORY_PLACEHOLDER: &str = "N/A";

/// Severity class of a status, mapped to colours by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTone {
    Success,
    Danger,
    Warning,
    Muted,
}

pub fn status_label(status: RunStatus) -> String {
    match status {
        RunStatus::Completed => "PASSED".to_string(),
        other => other.as_str().to_uppercase(),
    }
}

pub fn status_tone(status: RunStatus) -> StatusTone {
    match status {
        RunStatus::Completed => StatusTone::Success,
        RunStatus::Failed => StatusTone::Danger,
        RunStatus::Running => StatusTone::Warning,
        RunStatus::Idle => StatusTone::Muted,
    }
}

/// Whole seconds the run has taken.
///
/// A finalized summary is authoritative. Otherwise the local clock is used,
/// running up to `now` while the run is active and frozen at the moment it
/// left `Running` after that.
pub fn elapsed_seconds(state: &RunState, now: Instant) -> u64 {
    if let Some(summary) = state.run_summary.as_ref() {
        if summary.terminal_status().is_some() {
            return summary.total_time_seconds;
        }
    }
    if state.status == RunStatus::Idle {
        return 0;
    }
    let Some(start) = state.started_at else {
        return 0;
    };
    let end = if state.is_running() {
        now
    } else {
        state.finished_at.unwrap_or(now)
    };
    end.saturating_duration_since(start).as_secs()
}

pub fn last_log_message(state: &RunState) -> &str {
    state
        .logs
        .last()
        .map(|entry| entry.message.as_str())
        .unwrap_or(LAST_LOG_PLACEHOLDER)
}

pub fn display_score(state: &RunState) -> f64 {
    state
        .score_breakdown
        .as_ref()
        .map(|score| score.final_total_score)
        .unwrap_or(BASE_SCORE)
}

/// Gauge fill in `[0, 1]`; out-of-range scores are clamped for display only.
pub fn score_ratio(state: &RunState) -> f64 {
    let ratio = display_score(state) / MAX_SCORE;
    if ratio.is_finite() {
        ratio.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn iteration_display(state: &RunState) -> &str {
    state
        .ci_cd_timeline
        .last()
        .map(|entry| entry.iteration.as_str())
        .unwrap_or(ITERATION_PLACEHOLDER)
}

pub fn branch_display(state: &RunState) -> &str {
    state
        .run_summary
        .as_ref()
        .map(|s| s.branch_created.as_str())
        .filter(|b| !b.is_empty())
        .unwrap_or(BRANCH_PLACEHOLDER)
}

pub fn repository_display(state: &RunState) -> &str {
    state
        .run_summary
        .as_ref()
        .map(|s| s.repository_url.as_str())
        .filter(|r| !r.is_empty())
        .or_else(|| Some(state.config.repository_url.as_str()).filter(|r| !r.trim().is_empty()))
        .unwrap_or(REPOSITORY_PLACEHOLDER)
}

pub fn format_duration(seconds: u64) -> String {
    format!("{}m {}s", seconds / 60, seconds % 60)
}

pub fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{score:.0}")
    } else {
        format!("{score:.1}")
    }
}
