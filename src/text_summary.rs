//! Text summary builder for CLI output.
//!
//! Formats the final run report as human-readable lines for text mode.

use crate::model::RunReport;
use crate::projection::{self, format_duration, format_score};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from a finished run's report.
pub(crate) fn build_text_summary(report: &RunReport) -> TextSummary {
    let mut lines = Vec::new();
    let summary = report.run_summary.as_ref();

    if let Some(run_id) = report.run_id.as_ref() {
        lines.push(format!("Run: {run_id}"));
    }
    let repo = summary
        .map(|s| s.repository_url.as_str())
        .filter(|r| !r.is_empty())
        .unwrap_or(report.configuration.repository_url.as_str());
    lines.push(format!("Repository: {repo}"));
    lines.push(format!(
        "Team: {} (leader {})",
        report.configuration.team_name, report.configuration.leader_name
    ));
    let branch = summary
        .map(|s| s.branch_created.as_str())
        .filter(|b| !b.is_empty())
        .unwrap_or(projection::BRANCH_PLACEHOLDER);
    lines.push(format!("Branch: {branch}"));
    lines.push(format!(
        "Status: {}  Time: {}",
        report.status_label,
        format_duration(report.elapsed_seconds)
    ));

    match report.score_breakdown.as_ref() {
        Some(score) => lines.push(format!(
            "Score: {} (base {}, speed bonus +{}, efficiency penalty -{})",
            format_score(score.final_total_score),
            format_score(score.base_score),
            format_score(score.speed_bonus),
            format_score(score.efficiency_penalty)
        )),
        None => lines.push(format!("Score: {}", format_score(report.display_score))),
    }

    if report.fixes_applied.is_empty() {
        lines.push("Fixes: none".to_string());
    } else {
        lines.push(format!("Fixes ({}):", report.fixes_applied.len()));
        for fix in &report.fixes_applied {
            lines.push(format!(
                "  {}:{} [{}] {} ({})",
                fix.file, fix.line_number, fix.bug_type, fix.commit_message, fix.status
            ));
        }
    }

    if !report.ci_cd_timeline.is_empty() {
        let passes: Vec<String> = report
            .ci_cd_timeline
            .iter()
            .map(|entry| format!("{} {}", entry.iteration, entry.status))
            .collect();
        lines.push(format!("CI/CD: {}", passes.join(" -> ")));
    }

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        FixEntry, RunConfiguration, RunId, RunStatus, RunSummary, ScoreBreakdown, TimelineEntry,
    };

    fn report() -> RunReport {
        RunReport {
            generated_at_utc: "2026-01-01T00:00:00Z".into(),
            api_url: "http://127.0.0.1:8000".into(),
            run_id: Some(RunId::new("abc")),
            configuration: RunConfiguration::new("https://github.com/x/y", "Alpha", "A. Lead"),
            status: RunStatus::Completed,
            status_label: "PASSED".into(),
            elapsed_seconds: 125,
            display_score: 95.0,
            run_summary: Some(RunSummary {
                final_status: "PASSED".into(),
                branch_created: "fix/1".into(),
                ..Default::default()
            }),
            score_breakdown: Some(ScoreBreakdown {
                base_score: 100.0,
                speed_bonus: 0.0,
                efficiency_penalty: 5.0,
                final_total_score: 95.0,
            }),
            fixes_applied: vec![FixEntry {
                file: "app.py".into(),
                bug_type: "LOGIC".into(),
                line_number: 3,
                commit_message: "fix off-by-one".into(),
                status: "Applied".into(),
            }],
            ci_cd_timeline: vec![
                TimelineEntry {
                    iteration: "1/5".into(),
                    status: "FAILED".into(),
                    ..Default::default()
                },
                TimelineEntry {
                    iteration: "2/5".into(),
                    status: "PASSED".into(),
                    ..Default::default()
                },
            ],
            logs: Vec::new(),
        }
    }

    #[test]
    fn summary_covers_outcome_score_and_fixes() {
        let lines = build_text_summary(&report()).lines;
        assert_eq!(lines[0], "Run: abc");
        assert!(lines.contains(&"Repository: https://github.com/x/y".to_string()));
        assert!(lines.contains(&"Branch: fix/1".to_string()));
        assert!(lines.contains(&"Status: PASSED  Time: 2m 5s".to_string()));
        assert!(lines
            .iter()
            .any(|l| l.starts_with("Score: 95 (base 100, speed bonus +0, efficiency penalty -5)")));
        assert!(lines.contains(&"  app.py:3 [LOGIC] fix off-by-one (Applied)".to_string()));
        assert!(lines.contains(&"CI/CD: 1/5 FAILED -> 2/5 PASSED".to_string()));
    }

    #[test]
    fn summary_falls_back_when_agent_sent_little() {
        let mut r = report();
        r.run_summary = None;
        r.score_breakdown = None;
        r.fixes_applied.clear();
        r.ci_cd_timeline.clear();
        let lines = build_text_summary(&r).lines;
        assert!(lines.contains(&"Branch: Waiting...".to_string()));
        assert!(lines.contains(&"Score: 95".to_string()));
        assert!(lines.contains(&"Fixes: none".to_string()));
        assert!(!lines.iter().any(|l| l.starts_with("CI/CD")));
    }
}
