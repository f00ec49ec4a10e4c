//! Shared run-state container.
//!
//! A single [`RunStore`] is constructed at startup and handed to the run
//! controller (the only writer) and to every display surface (readers).
//! Each mutation holds the write lock for its whole duration, so a reader
//! never observes half of an action.

use crate::model::{
    ConfigField, FixEntry, LogEntry, RunConfiguration, RunId, RunStatus, RunSummary,
    ScoreBreakdown, StatusPayload, TimelineEntry,
};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// Everything the dashboard knows about the current (or last) run.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub config: RunConfiguration,
    pub status: RunStatus,
    pub run_id: Option<RunId>,
    pub started_at: Option<Instant>,
    /// Set when the run leaves `Running`; freezes the elapsed clock.
    pub finished_at: Option<Instant>,
    pub run_summary: Option<RunSummary>,
    pub score_breakdown: Option<ScoreBreakdown>,
    pub fixes_applied: Vec<FixEntry>,
    pub ci_cd_timeline: Vec<TimelineEntry>,
    pub logs: Vec<LogEntry>,
    /// Bumped by every `start_run`; identifies which run a poll belongs to.
    pub epoch: u64,
}

/// Result of merging one poll response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollSync {
    /// The payload belonged to a run that has since been replaced; nothing was written.
    Stale,
    InProgress,
    Finished(RunStatus),
}

impl RunState {
    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    fn start(&mut self, now: Instant) -> u64 {
        self.epoch += 1;
        self.status = RunStatus::Running;
        self.run_id = None;
        self.started_at = Some(now);
        self.finished_at = None;
        self.logs.clear();
        self.run_summary = Some(RunSummary::in_progress());
        self.score_breakdown = Some(ScoreBreakdown::baseline());
        self.fixes_applied.clear();
        self.ci_cd_timeline.clear();
        self.epoch
    }

    fn apply(&mut self, payload: StatusPayload) {
        let StatusPayload {
            run_summary,
            score_breakdown,
            fixes_applied,
            ci_cd_timeline,
            logs,
        } = payload;
        self.run_summary = Some(run_summary);
        self.score_breakdown = score_breakdown;
        self.fixes_applied = fixes_applied;
        self.ci_cd_timeline = ci_cd_timeline;
        if !logs.is_empty() {
            self.logs = logs;
        }
    }

    fn set_status(&mut self, status: RunStatus, now: Instant) {
        if self.status == status {
            return;
        }
        if status == RunStatus::Running {
            self.finished_at = None;
        } else if self.status == RunStatus::Running {
            self.finished_at = Some(now);
        }
        self.status = status;
    }
}

/// Cheaply clonable handle to the shared [`RunState`].
#[derive(Debug, Clone, Default)]
pub struct RunStore {
    inner: Arc<RwLock<RunState>>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_configuration(config: RunConfiguration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RunState {
                config,
                ..Default::default()
            })),
        }
    }

    // A panicking writer cannot leave the state half-updated in a way readers
    // care about, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, RunState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RunState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consistent copy of the whole state.
    pub fn snapshot(&self) -> RunState {
        self.read().clone()
    }

    /// Borrow the state for a synchronous read without cloning it.
    pub fn read_with<R>(&self, f: impl FnOnce(&RunState) -> R) -> R {
        f(&self.read())
    }

    pub fn status(&self) -> RunStatus {
        self.read().status
    }

    pub fn is_running(&self) -> bool {
        self.read().is_running()
    }

    pub fn configuration(&self) -> RunConfiguration {
        self.read().config.clone()
    }

    pub fn set_configuration(&self, field: ConfigField, value: impl Into<String>) {
        self.write().config.set(field, value.into());
    }

    /// Discard the previous run and enter `Running` with a fresh baseline.
    /// Returns the epoch of the new run.
    pub fn start_run(&self) -> u64 {
        let epoch = self.write().start(Instant::now());
        tracing::debug!(epoch, "run started");
        epoch
    }

    /// Record the identifier of the run started at `epoch`.
    pub fn attach_run(&self, epoch: u64, run_id: RunId) -> bool {
        let mut state = self.write();
        if state.epoch != epoch {
            return false;
        }
        state.run_id = Some(run_id);
        true
    }

    /// Replace summary, score, fixes and timeline with the payload's.
    /// Logs are replaced only when the payload carries some.
    pub fn apply_run_data(&self, payload: StatusPayload) {
        self.write().apply(payload);
    }

    /// Merge a poll response for the run started at `epoch` and apply the
    /// terminal transition it implies, all under one lock.
    pub fn sync_from_poll(&self, epoch: u64, payload: StatusPayload) -> PollSync {
        let mut state = self.write();
        if state.epoch != epoch {
            return PollSync::Stale;
        }
        state.apply(payload);
        let terminal = state
            .run_summary
            .as_ref()
            .and_then(RunSummary::terminal_status);
        match terminal {
            Some(status) => {
                state.set_status(status, Instant::now());
                PollSync::Finished(status)
            }
            None => PollSync::InProgress,
        }
    }

    pub fn update_status(&self, status: RunStatus) {
        self.write().set_status(status, Instant::now());
    }

    pub fn append_log(&self, entry: LogEntry) {
        self.write().logs.push(entry);
    }
}
