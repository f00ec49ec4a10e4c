//! Run lifecycle controller.
//!
//! Validates input, triggers runs against the agent, and owns the serialized
//! poll loop that keeps the store in step with the agent's view of the run.

use crate::agent::AgentApi;
use crate::model::{
    InfoEvent, LogEntry, LogKind, RunConfiguration, RunEvent, RunId, RunStatus, ValidationError,
    DASHBOARD_LOG_SOURCE,
};
use crate::store::{PollSync, RunStore};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// Period between the end of one status request and the start of the next.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Commands emitted by UI layers to control runs.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    /// Start a run with the configuration currently held by the store.
    Submit,
    /// Stop the active poll loop (if any) and start over.
    Restart,
    Quit,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub poll_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What a call to [`RunController::submit`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Started(RunId),
    /// Input was incomplete; nothing was touched.
    Rejected(ValidationError),
    /// A poll loop is still active; nothing was touched.
    AlreadyRunning,
    /// The trigger request failed and the store went back to `Idle`.
    TriggerFailed { reason: String },
}

/// How a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    Finished(RunStatus),
    /// A newer run took over the store before this loop saw a terminal status.
    Superseded,
}

/// Orchestrates exactly one run at a time against an [`AgentApi`].
///
/// Holds no run data of its own: everything lives in the injected store.
/// The only private state is the handle of the active poll loop.
pub struct RunController<A: AgentApi> {
    api: Arc<A>,
    store: RunStore,
    config: ControllerConfig,
    events: Option<UnboundedSender<RunEvent>>,
    poll: Option<JoinHandle<PollExit>>,
}

impl<A: AgentApi> RunController<A> {
    pub fn new(api: Arc<A>, store: RunStore, config: ControllerConfig) -> Self {
        Self {
            api,
            store,
            config,
            events: None,
            poll: None,
        }
    }

    pub fn with_events(mut self, events: UnboundedSender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    /// True while a poll loop task is alive.
    pub fn is_polling(&self) -> bool {
        self.poll.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Validate, start and trigger a run, then begin polling it.
    pub async fn submit(&mut self, config: &RunConfiguration) -> SubmitOutcome {
        if let Err(err) = config.validate() {
            debug!(%err, "submit rejected");
            emit(&self.events, RunEvent::Info(InfoEvent::Rejected(err)));
            return SubmitOutcome::Rejected(err);
        }
        if self.is_polling() {
            emit(&self.events, RunEvent::Info(InfoEvent::AlreadyRunning));
            return SubmitOutcome::AlreadyRunning;
        }
        // A loop that ended on its own still leaves its handle behind.
        self.stop_polling();

        let epoch = self.store.start_run();
        let request = config.to_trigger_request();
        match self.api.trigger(&request).await {
            Ok(run_id) => {
                info!(run_id = %run_id, repo = %request.github_url, "agent run triggered");
                self.store.attach_run(epoch, run_id.clone());
                self.store.append_log(LogEntry::now(
                    DASHBOARD_LOG_SOURCE,
                    format!("Run {run_id} started for {}", request.github_url),
                    LogKind::Info,
                ));
                emit(
                    &self.events,
                    RunEvent::Started {
                        run_id: run_id.clone(),
                    },
                );
                self.poll = Some(tokio::spawn(poll_loop(PollLoop {
                    api: self.api.clone(),
                    store: self.store.clone(),
                    run_id: run_id.clone(),
                    epoch,
                    interval: self.config.poll_interval,
                    events: self.events.clone(),
                })));
                SubmitOutcome::Started(run_id)
            }
            Err(err) => {
                warn!(error = %err, "trigger failed; run reset to idle");
                self.store.update_status(RunStatus::Idle);
                let reason = err.to_string();
                emit(
                    &self.events,
                    RunEvent::TriggerFailed {
                        reason: reason.clone(),
                    },
                );
                SubmitOutcome::TriggerFailed { reason }
            }
        }
    }

    /// Stop whatever is being polled and submit again.
    pub async fn restart(&mut self, config: &RunConfiguration) -> SubmitOutcome {
        if let Err(err) = config.validate() {
            emit(&self.events, RunEvent::Info(InfoEvent::Rejected(err)));
            return SubmitOutcome::Rejected(err);
        }
        if self.stop_polling() {
            emit(&self.events, RunEvent::Info(InfoEvent::Restarting));
        }
        self.submit(config).await
    }

    /// Abort the active poll loop. Returns false when there was none.
    pub fn stop_polling(&mut self) -> bool {
        match self.poll.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Resolves when the active poll loop ends; never resolves if there is none.
    ///
    /// Cancel safe: dropping the future leaves the loop running.
    pub async fn poll_exit(&mut self) -> Option<PollExit> {
        let Some(handle) = self.poll.as_mut() else {
            return futures::future::pending().await;
        };
        let joined = handle.await;
        self.poll = None;
        match joined {
            Ok(exit) => Some(exit),
            Err(err) => {
                if !err.is_cancelled() {
                    warn!(error = %err, "poll loop task failed");
                }
                None
            }
        }
    }

    /// Wait for the active poll loop to end on its own.
    pub async fn wait_for_poll_exit(&mut self) -> Option<PollExit> {
        if self.poll.is_none() {
            return None;
        }
        self.poll_exit().await
    }

    /// Tear down: no poll task survives this call.
    pub fn dispose(&mut self) {
        self.stop_polling();
    }
}

impl<A: AgentApi> Drop for RunController<A> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn emit(events: &Option<UnboundedSender<RunEvent>>, event: RunEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// Parameters for one run's poll loop.
struct PollLoop<A> {
    api: Arc<A>,
    store: RunStore,
    run_id: RunId,
    epoch: u64,
    interval: Duration,
    events: Option<UnboundedSender<RunEvent>>,
}

/// Serialized polling: the next tick is scheduled only after the previous
/// response (or failure) has been processed.
async fn poll_loop<A: AgentApi>(params: PollLoop<A>) -> PollExit {
    let PollLoop {
        api,
        store,
        run_id,
        epoch,
        interval,
        events,
    } = params;
    let mut tick = 0u64;

    loop {
        tokio::time::sleep(interval).await;
        tick += 1;

        match api.fetch_status(&run_id).await {
            Ok(payload) => match store.sync_from_poll(epoch, payload) {
                PollSync::Stale => {
                    debug!(run_id = %run_id, tick, "poll loop superseded by a newer run");
                    return PollExit::Superseded;
                }
                PollSync::InProgress => emit(&events, RunEvent::Synced),
                PollSync::Finished(status) => {
                    info!(run_id = %run_id, tick, %status, "run reached terminal status");
                    emit(&events, RunEvent::Synced);
                    emit(&events, RunEvent::Finished { status });
                    return PollExit::Finished(status);
                }
            },
            Err(err) => {
                // A single failed tick never ends the loop or touches status.
                warn!(run_id = %run_id, tick, error = %err, "status poll failed");
                emit(
                    &events,
                    RunEvent::PollFailed {
                        reason: err.to_string(),
                    },
                );
            }
        }
    }
}

/// Drive a controller from UI commands until the UI quits.
pub(crate) async fn run_controller<A: AgentApi>(
    mut controller: RunController<A>,
    submit_on_launch: bool,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    if submit_on_launch {
        let config = controller.store().configuration();
        if config.is_complete() {
            controller.submit(&config).await;
        } else {
            emit(
                &controller.events,
                RunEvent::Info(InfoEvent::Message(
                    "Form incomplete; fill it in and press Enter".into(),
                )),
            );
        }
    }

    let res = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Submit) => {
                        let config = controller.store().configuration();
                        controller.submit(&config).await;
                    }
                    Some(UiCommand::Restart) => {
                        let config = controller.store().configuration();
                        controller.restart(&config).await;
                    }
                    Some(UiCommand::Quit) | None => {
                        controller.dispose();
                        break Ok(());
                    }
                }
            }
            // Terminal-state handling is event driven; this branch only reaps the handle.
            exit = controller.poll_exit() => {
                debug!(?exit, "poll loop ended");
            }
        }
    };

    res
}
