//! Scripted agent used by controller tests.

use crate::agent::{AgentApi, AgentError};
use crate::model::{
    RunId, RunSummary, ScoreBreakdown, StatusPayload, TriggerRequest, FINAL_STATUS_RUNNING,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted answer to `GET /status/{run_id}`.
pub enum ScriptedStatus {
    Payload(StatusPayload),
    Fail,
}

/// In-memory agent with a queue of status answers.
///
/// Once the queue is drained every further poll answers "RUNNING".
pub struct ScriptedAgent {
    trigger_result: Mutex<Option<Result<RunId, ()>>>,
    statuses: Mutex<VecDeque<ScriptedStatus>>,
    status_delay: Duration,
    pub triggers: Mutex<Vec<TriggerRequest>>,
    pub polled_ids: Mutex<Vec<RunId>>,
    status_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new(run_id: &str) -> Self {
        Self {
            trigger_result: Mutex::new(Some(Ok(RunId::new(run_id)))),
            statuses: Mutex::new(VecDeque::new()),
            status_delay: Duration::ZERO,
            triggers: Mutex::new(Vec::new()),
            polled_ids: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing_trigger() -> Self {
        let agent = Self::new("unused");
        *agent.trigger_result.lock().expect("lock") = Some(Err(()));
        agent
    }

    /// Every status request takes this long to answer.
    pub fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    pub fn push_status(&self, status: ScriptedStatus) {
        self.statuses.lock().expect("lock").push_back(status);
    }

    pub fn set_trigger_run_id(&self, run_id: &str) {
        *self.trigger_result.lock().expect("lock") = Some(Ok(RunId::new(run_id)));
    }

    pub fn trigger_calls(&self) -> usize {
        self.triggers.lock().expect("lock").len()
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl AgentApi for ScriptedAgent {
    async fn trigger(&self, request: &TriggerRequest) -> Result<RunId, AgentError> {
        self.triggers.lock().expect("lock").push(request.clone());
        let scripted = self.trigger_result.lock().expect("lock").clone();
        match scripted {
            Some(Ok(id)) => Ok(id),
            _ => Err(AgentError::Status {
                url: "scripted://trigger-agent".into(),
                status: reqwest::StatusCode::BAD_GATEWAY,
            }),
        }
    }

    async fn fetch_status(&self, run_id: &RunId) -> Result<StatusPayload, AgentError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.polled_ids.lock().expect("lock").push(run_id.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.status_delay.is_zero() {
            tokio::time::sleep(self.status_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let next = self.statuses.lock().expect("lock").pop_front();
        match next {
            Some(ScriptedStatus::Payload(payload)) => Ok(payload),
            Some(ScriptedStatus::Fail) => Err(AgentError::Status {
                url: format!("scripted://status/{run_id}"),
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
            }),
            None => Ok(status_payload(FINAL_STATUS_RUNNING)),
        }
    }
}

/// Minimal payload with the given `final_status`.
pub fn status_payload(final_status: &str) -> StatusPayload {
    StatusPayload {
        run_summary: RunSummary {
            final_status: final_status.to_string(),
            ..Default::default()
        },
        score_breakdown: Some(ScoreBreakdown::baseline()),
        fixes_applied: Vec::new(),
        ci_cd_timeline: Vec::new(),
        logs: Vec::new(),
    }
}
