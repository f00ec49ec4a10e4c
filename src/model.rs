use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// `final_status` value the agent reports once the repaired repository passes CI.
pub const FINAL_STATUS_PASSED: &str = "PASSED";
/// `final_status` value the agent reports once it gives up.
pub const FINAL_STATUS_FAILED: &str = "FAILED";
/// `final_status` the client assumes for a freshly started run.
pub const FINAL_STATUS_RUNNING: &str = "RUNNING";
/// Score the agent starts every run with.
pub const BASE_SCORE: f64 = 100.0;

/// The three user-supplied run parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigField {
    RepositoryUrl,
    TeamName,
    LeaderName,
}

impl ConfigField {
    pub const ALL: [ConfigField; 3] = [
        ConfigField::RepositoryUrl,
        ConfigField::TeamName,
        ConfigField::LeaderName,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ConfigField::RepositoryUrl => "GitHub Repository URL",
            ConfigField::TeamName => "Team Name",
            ConfigField::LeaderName => "Team Leader",
        }
    }

    pub fn placeholder(self) -> &'static str {
        match self {
            ConfigField::RepositoryUrl => "https://github.com/...",
            ConfigField::TeamName => "e.g. Kepler Force",
            ConfigField::LeaderName => "e.g. Sarah Connor",
        }
    }

    pub fn next(self) -> Self {
        match self {
            ConfigField::RepositoryUrl => ConfigField::TeamName,
            ConfigField::TeamName => ConfigField::LeaderName,
            ConfigField::LeaderName => ConfigField::RepositoryUrl,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            ConfigField::RepositoryUrl => ConfigField::LeaderName,
            ConfigField::TeamName => ConfigField::RepositoryUrl,
            ConfigField::LeaderName => ConfigField::TeamName,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{} is required", .0.label())]
    MissingField(ConfigField),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfiguration {
    pub repository_url: String,
    pub team_name: String,
    pub leader_name: String,
}

impl RunConfiguration {
    pub fn new(
        repository_url: impl Into<String>,
        team_name: impl Into<String>,
        leader_name: impl Into<String>,
    ) -> Self {
        Self {
            repository_url: repository_url.into(),
            team_name: team_name.into(),
            leader_name: leader_name.into(),
        }
    }

    pub fn get(&self, field: ConfigField) -> &str {
        match field {
            ConfigField::RepositoryUrl => &self.repository_url,
            ConfigField::TeamName => &self.team_name,
            ConfigField::LeaderName => &self.leader_name,
        }
    }

    pub fn set(&mut self, field: ConfigField, value: String) {
        match field {
            ConfigField::RepositoryUrl => self.repository_url = value,
            ConfigField::TeamName => self.team_name = value,
            ConfigField::LeaderName => self.leader_name = value,
        }
    }

    /// Every field must carry something other than whitespace.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for field in ConfigField::ALL {
            if self.get(field).trim().is_empty() {
                return Err(ValidationError::MissingField(field));
            }
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn to_trigger_request(&self) -> TriggerRequest {
        TriggerRequest {
            github_url: self.repository_url.trim().to_string(),
            team_name: self.team_name.trim().to_string(),
            leader_name: self.leader_name.trim().to_string(),
        }
    }
}

/// Opaque identifier the agent hands out for a triggered run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Only `final_status` drives behaviour; the other fields are display-only and
/// fall back to defaults when the agent sends `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSummary {
    #[serde(deserialize_with = "null_as_default")]
    pub repository_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub team_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub leader_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub branch_created: String,
    pub final_status: String,
    #[serde(deserialize_with = "whole_number")]
    pub total_time_seconds: u64,
}

impl RunSummary {
    /// Placeholder shown between trigger and the first status response.
    pub fn in_progress() -> Self {
        Self {
            final_status: FINAL_STATUS_RUNNING.to_string(),
            ..Default::default()
        }
    }

    /// Map the agent's verbatim `final_status` onto a terminal run status.
    /// Anything other than PASSED/FAILED means the run is still going.
    pub fn terminal_status(&self) -> Option<RunStatus> {
        match self.final_status.as_str() {
            FINAL_STATUS_PASSED => Some(RunStatus::Completed),
            FINAL_STATUS_FAILED => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// Score numbers are computed by the agent; the client never recomputes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreBreakdown {
    #[serde(deserialize_with = "null_as_default")]
    pub base_score: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub speed_bonus: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub efficiency_penalty: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub final_total_score: f64,
}

impl ScoreBreakdown {
    pub fn baseline() -> Self {
        Self {
            base_score: BASE_SCORE,
            speed_bonus: 0.0,
            efficiency_penalty: 0.0,
            final_total_score: BASE_SCORE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixEntry {
    #[serde(deserialize_with = "null_as_default")]
    pub file: String,
    #[serde(deserialize_with = "null_as_default")]
    pub bug_type: String,
    #[serde(deserialize_with = "whole_number")]
    pub line_number: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub commit_message: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    #[serde(default, deserialize_with = "null_as_default")]
    pub iteration: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    // Fields the agent adds later are carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    #[default]
    Info,
    Error,
    Success,
    #[serde(other)]
    Other,
}

/// Source recorded for log lines the agent sends as bare strings.
pub const AGENT_LOG_SOURCE: &str = "agent";
/// Source recorded for log lines produced by this client.
pub const DASHBOARD_LOG_SOURCE: &str = "dashboard";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireLogEntry")]
pub struct LogEntry {
    pub timestamp: String,
    pub source: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: LogKind,
}

impl LogEntry {
    /// Build a client-side entry stamped with the local wall clock.
    pub fn now(source: &str, message: impl Into<String>, kind: LogKind) -> Self {
        let format = time::macros::format_description!("[hour]:[minute]:[second]");
        let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
        Self {
            timestamp: now.format(&format).unwrap_or_default(),
            source: source.to_string(),
            message: message.into(),
            kind,
        }
    }
}

/// The agent emits plain strings today; structured entries are accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireLogEntry {
    Text(String),
    Structured {
        #[serde(default)]
        timestamp: String,
        #[serde(default)]
        source: String,
        #[serde(default)]
        message: String,
        #[serde(rename = "type", default)]
        kind: LogKind,
    },
}

impl From<WireLogEntry> for LogEntry {
    fn from(wire: WireLogEntry) -> Self {
        match wire {
            WireLogEntry::Text(message) => LogEntry {
                timestamp: String::new(),
                source: AGENT_LOG_SOURCE.to_string(),
                message,
                kind: LogKind::Info,
            },
            WireLogEntry::Structured {
                timestamp,
                source,
                message,
                kind,
            } => LogEntry {
                timestamp,
                source,
                message,
                kind,
            },
        }
    }
}

/// Body of `GET /status/{run_id}` (schema v1).
///
/// `run_summary` is required: a body without it is rejected at decode time.
/// Every other section is optional and defaults to empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub run_summary: RunSummary,
    #[serde(default)]
    pub score_breakdown: Option<ScoreBreakdown>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fixes_applied: Vec<FixEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ci_cd_timeline: Vec<TimelineEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub logs: Vec<LogEntry>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Any JSON number, floored; `null`, negative or out-of-range values become 0.
fn whole_number<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64> + Default,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value
        .filter(|v| v.is_finite() && *v >= 0.0)
        .and_then(|v| T::try_from(v.floor() as u64).ok())
        .unwrap_or_default())
}

/// Body of `POST /trigger-agent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub github_url: String,
    pub team_name: String,
    pub leader_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerResponse {
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Events emitted by the run controller for presentation layers.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Info(InfoEvent),
    Started { run_id: RunId },
    TriggerFailed { reason: String },
    /// A poll response was merged into the store.
    Synced,
    PollFailed { reason: String },
    Finished { status: RunStatus },
}

/// Structured info events consumed by UI/CLI layers.
#[derive(Debug, Clone)]
pub enum InfoEvent {
    Message(String),
    Rejected(ValidationError),
    AlreadyRunning,
    Restarting,
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Rejected(err) => format!("Cannot start run: {err}"),
            InfoEvent::AlreadyRunning => "A run is already in progress".to_string(),
            InfoEvent::Restarting => "Restarting run…".to_string(),
        }
    }
}

/// Final snapshot of a run, written by exports and the `--json` mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at_utc: String,
    pub api_url: String,
    pub run_id: Option<RunId>,
    pub configuration: RunConfiguration,
    pub status: RunStatus,
    pub status_label: String,
    pub elapsed_seconds: u64,
    pub display_score: f64,
    pub run_summary: Option<RunSummary>,
    pub score_breakdown: Option<ScoreBreakdown>,
    pub fixes_applied: Vec<FixEntry>,
    pub ci_cd_timeline: Vec<TimelineEntry>,
    pub logs: Vec<LogEntry>,
}
