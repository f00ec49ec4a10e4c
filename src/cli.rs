use crate::agent::HttpAgentClient;
use crate::logging::LogTarget;
use crate::model::{LogEntry, RunConfiguration, RunEvent, RunStatus};
use crate::orchestrator::{ControllerConfig, RunController, SubmitOutcome};
use crate::store::RunStore;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "healing-dashboard",
    version,
    about = "Dashboard for triggering and watching autonomous CI/CD healing runs"
)]
pub struct Cli {
    /// Base URL of the healing agent service
    #[arg(
        long,
        env = "HEALING_AGENT_API_URL",
        default_value = "http://127.0.0.1:8000"
    )]
    pub api_url: String,

    /// Repository to heal (prefills the dashboard form)
    #[arg(long)]
    pub repo_url: Option<String>,

    /// Team name (prefills the dashboard form)
    #[arg(long)]
    pub team_name: Option<String>,

    /// Team leader name (prefills the dashboard form)
    #[arg(long)]
    pub leader_name: Option<String>,

    /// Wait between the end of one status request and the next
    #[arg(long, default_value = "2s")]
    pub poll_interval: humantime::Duration,

    /// Timeout for each request to the agent
    #[arg(long, default_value = "10s")]
    pub request_timeout: humantime::Duration,

    /// Run once, stream the feed to stderr and print the final JSON report (no TUI)
    #[arg(long, conflicts_with = "text")]
    pub json: bool,

    /// Run once, stream the feed to stderr and print a text summary (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Trigger a run as soon as the dashboard opens, if the form is complete
    #[arg(long)]
    pub submit_on_launch: bool,

    /// Write the final run report as JSON once the run finishes
    #[arg(long)]
    pub export_json: Option<std::path::PathBuf>,

    /// Diagnostics log file (defaults to the user cache dir when the TUI is active)
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,
}

impl Cli {
    pub fn headless(&self) -> bool {
        self.json || self.text || !cfg!(feature = "tui")
    }

    /// Form values supplied on the command line; missing ones stay empty.
    pub fn run_configuration(&self) -> RunConfiguration {
        RunConfiguration::new(
            self.repo_url.clone().unwrap_or_default(),
            self.team_name.clone().unwrap_or_default(),
            self.leader_name.clone().unwrap_or_default(),
        )
    }

    /// Where diagnostics should go for the selected mode.
    pub fn log_target(&self) -> Option<LogTarget> {
        match (&self.log_file, self.headless()) {
            (Some(path), _) => Some(LogTarget::File(path.clone())),
            (None, true) => Some(LogTarget::Stderr),
            (None, false) => crate::logging::default_log_file().map(LogTarget::File),
        }
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if !args.headless() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
    }

    run_headless(args).await
}

/// Build a `ControllerConfig` from CLI arguments.
pub fn build_controller_config(args: &Cli) -> ControllerConfig {
    ControllerConfig {
        poll_interval: Duration::from(args.poll_interval),
    }
}

pub fn build_client(args: &Cli) -> Result<HttpAgentClient> {
    HttpAgentClient::new(&args.api_url, Duration::from(args.request_timeout))
}

/// Trigger one run, follow it to a terminal status and report on it.
async fn run_headless(args: Cli) -> Result<()> {
    let config = args.run_configuration();
    config
        .validate()
        .context("--repo-url, --team-name and --leader-name are required without the TUI")?;

    let api = Arc::new(build_client(&args)?);
    let store = RunStore::with_configuration(config.clone());
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<RunEvent>();
    let mut controller =
        RunController::new(api, store.clone(), build_controller_config(&args)).with_events(evt_tx);

    let (out_tx, out_handle) = spawn_output_writer();
    let mut printed_logs = LogCursor::default();

    match controller.submit(&config).await {
        SubmitOutcome::Started(run_id) => {
            let _ = out_tx.send(OutputLine::Stderr(format!(
                "Run {run_id} started against {}",
                args.api_url
            )));
        }
        SubmitOutcome::TriggerFailed { reason } => {
            drop(out_tx);
            let _ = out_handle.await;
            anyhow::bail!("failed to trigger agent run: {reason}");
        }
        other => {
            drop(out_tx);
            let _ = out_handle.await;
            anyhow::bail!("run not started: {other:?}");
        }
    }
    stream_new_logs(&store, &out_tx, &mut printed_logs);

    let status = loop {
        tokio::select! {
            ev = evt_rx.recv() => {
                match ev {
                    Some(RunEvent::Synced) => stream_new_logs(&store, &out_tx, &mut printed_logs),
                    Some(RunEvent::PollFailed { reason }) => {
                        let _ = out_tx.send(OutputLine::Stderr(format!("poll failed: {reason}")));
                    }
                    Some(RunEvent::Finished { status }) => {
                        stream_new_logs(&store, &out_tx, &mut printed_logs);
                        break status;
                    }
                    Some(RunEvent::Info(info)) => {
                        let _ = out_tx.send(OutputLine::Stderr(info.to_message()));
                    }
                    Some(_) => {}
                    None => break store.status(),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                controller.dispose();
                drop(out_tx);
                let _ = out_handle.await;
                anyhow::bail!("interrupted before the run finished");
            }
        }
    };
    controller.dispose();

    let processed = crate::orchestrator::process_run_completion(&args, &store);
    for msg in &processed.export_messages {
        let _ = out_tx.send(OutputLine::Stderr(msg.clone()));
    }

    if args.json {
        let out = serde_json::to_string_pretty(&processed.report)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        let summary = crate::text_summary::build_text_summary(&processed.report);
        for line in summary.lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }

    drop(out_tx);
    let _ = out_handle.await;

    if status == RunStatus::Failed {
        anyhow::bail!("run finished with status FAILED");
    }
    Ok(())
}

/// Position in the store's log already written to stderr.
#[derive(Debug, Default)]
struct LogCursor {
    printed: usize,
    last: Option<LogEntry>,
}

/// Forward log entries not yet printed. The agent resends its whole log on
/// every poll and may replace the dashboard's own lines, so printing restarts
/// whenever the entry at the cursor is no longer the one printed last.
fn stream_new_logs(
    store: &RunStore,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
    cursor: &mut LogCursor,
) {
    let lines: Vec<String> = store.read_with(|state| {
        let logs = &state.logs;
        let replaced = match cursor.printed.checked_sub(1) {
            Some(idx) => logs.get(idx) != cursor.last.as_ref(),
            None => false,
        };
        if replaced {
            cursor.printed = 0;
        }
        let fresh = logs[cursor.printed..]
            .iter()
            .map(|entry| {
                if entry.timestamp.is_empty() {
                    entry.message.clone()
                } else {
                    format!("[{}] {}", entry.timestamp, entry.message)
                }
            })
            .collect();
        cursor.printed = logs.len();
        cursor.last = logs.last().cloned();
        fresh
    });
    for line in lines {
        let _ = out_tx.send(OutputLine::Stderr(line));
    }
}
