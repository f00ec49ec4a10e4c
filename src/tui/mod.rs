mod export;
mod help;
mod state;

use crate::cli::{build_client, build_controller_config, Cli};
use crate::model::{ConfigField, LogKind, RunEvent, RunStatus};
use crate::orchestrator::{self, RunController, UiCommand};
use crate::projection::{self, StatusTone};
use crate::store::{RunState, RunStore};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use export::{copy_to_clipboard, export_report};
use help::draw_help;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Gauge, List, ListItem, Paragraph, Row, Table, Tabs},
    Terminal,
};
use state::{UiState, TAB_DASHBOARD};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli) -> Result<()> {
    // Unbounded channels avoid backpressure between the controller and the UI thread.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<RunEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let store = RunStore::with_configuration(args.run_configuration());
    let api = Arc::new(build_client(&args)?);
    let controller = RunController::new(api, store.clone(), build_controller_config(&args))
        .with_events(event_tx);

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_args = args.clone();
    let ui_store = store.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(ui_args, ui_store, event_rx, cmd_tx));

    let res = orchestrator::run_controller(controller, args.submit_on_launch, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
pub fn run_threaded(
    args: Cli,
    store: RunStore,
    mut event_rx: UnboundedReceiver<RunEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; run data is read from the store.
    let mut state = UiState::default();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&args, &store, &mut state, ev);
        }

        if last_tick.elapsed() >= tick_rate {
            let snapshot = store.snapshot();
            terminal
                .draw(|f| draw(f.area(), f, &state, &snapshot))
                .ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match handle_key(&mut state, &store, k) {
                    KeyAction::None => {}
                    KeyAction::Send(cmd) => {
                        let _ = cmd_tx.send(cmd);
                    }
                    KeyAction::ExportReport => export_current(&args, &store, &mut state),
                    KeyAction::CopyBranch => copy_branch(&store, &mut state),
                    KeyAction::Quit => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

/// What a key press asks the UI loop to do beyond editing `UiState`.
#[derive(Debug)]
enum KeyAction {
    None,
    Send(UiCommand),
    ExportReport,
    CopyBranch,
    Quit,
}

fn handle_key(state: &mut UiState, store: &RunStore, k: KeyEvent) -> KeyAction {
    match (k.modifiers, k.code) {
        (_, KeyCode::Esc) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => KeyAction::Quit,
        (_, KeyCode::F(1)) => {
            state.toggle_help();
            KeyAction::None
        }
        (KeyModifiers::CONTROL, KeyCode::Char('r')) => {
            state.info = "Restart requested…".into();
            KeyAction::Send(UiCommand::Restart)
        }
        (KeyModifiers::CONTROL, KeyCode::Char('s')) => KeyAction::ExportReport,
        (KeyModifiers::CONTROL, KeyCode::Char('y')) => KeyAction::CopyBranch,
        _ if state.tab != TAB_DASHBOARD => KeyAction::None,
        (_, KeyCode::Tab) => {
            state.focus_next();
            KeyAction::None
        }
        (_, KeyCode::BackTab) => {
            state.focus_prev();
            KeyAction::None
        }
        (_, KeyCode::Enter) => {
            if store.is_running() {
                state.info = "A run is already in progress".into();
                KeyAction::None
            } else {
                KeyAction::Send(UiCommand::Submit)
            }
        }
        (_, KeyCode::Backspace) => {
            edit_focused(state, store, |value| {
                value.pop();
            });
            KeyAction::None
        }
        (modifiers, KeyCode::Char(c))
            if !modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
        {
            edit_focused(state, store, |value| value.push(c));
            KeyAction::None
        }
        _ => KeyAction::None,
    }
}

fn edit_focused(state: &mut UiState, store: &RunStore, edit: impl FnOnce(&mut String)) {
    if store.is_running() {
        state.info = "The form is locked while a run is in progress".into();
        return;
    }
    let mut value = store.configuration().get(state.focus).to_string();
    edit(&mut value);
    store.set_configuration(state.focus, value);
}

fn apply_event(args: &Cli, store: &RunStore, state: &mut UiState, ev: RunEvent) {
    match ev {
        RunEvent::Info(info) => state.info = info.to_message(),
        RunEvent::Started { run_id } => state.info = format!("Run {run_id} started"),
        RunEvent::TriggerFailed { reason } => {
            state.info = format!("Could not start run: {reason}");
        }
        RunEvent::PollFailed { reason } => {
            state.info = format!("Status poll failed, retrying: {reason}");
        }
        RunEvent::Synced => {}
        RunEvent::Finished { status } => handle_run_finished(args, store, state, status),
    }
}

fn handle_run_finished(args: &Cli, store: &RunStore, state: &mut UiState, status: RunStatus) {
    let processed = orchestrator::process_run_completion(args, store);
    state.info = format!(
        "Run finished: {} (score {})",
        projection::status_label(status),
        projection::format_score(processed.report.display_score)
    );
    if !processed.export_messages.is_empty() {
        state.info = processed.export_messages.join("; ");
    }
}

fn export_current(args: &Cli, store: &RunStore, state: &mut UiState) {
    let exported = std::env::current_dir()
        .context("get current directory")
        .and_then(|dir| export_report(&dir, &args.api_url, store));
    match exported {
        Ok(path) => state.info = format!("Exported JSON: {}", path.display()),
        Err(e) => state.info = format!("JSON export failed: {e:#}"),
    }
}

fn copy_branch(store: &RunStore, state: &mut UiState) {
    let branch = store.read_with(|s| projection::branch_display(s).to_string());
    if branch == projection::BRANCH_PLACEHOLDER {
        state.info = "No branch has been created yet".into();
        return;
    }
    match copy_to_clipboard(&branch) {
        Ok(_) => state.info = format!("✓ Copied to clipboard: {branch}"),
        Err(e) => state.info = format!("Clipboard copy failed: {e:#}"),
    }
}

fn tone_color(tone: StatusTone) -> Color {
    match tone {
        StatusTone::Success => Color::Green,
        StatusTone::Danger => Color::Red,
        StatusTone::Warning => Color::Yellow,
        StatusTone::Muted => Color::Gray,
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState, run: &RunState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![Line::from("Dashboard"), Line::from("Help")])
        .select(state.tab)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("healing-dashboard"),
        )
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        TAB_DASHBOARD => draw_dashboard(chunks[1], f, state, run),
        _ => draw_help(chunks[1], f),
    }
}

fn draw_dashboard(area: Rect, f: &mut ratatui::Frame, state: &UiState, run: &RunState) {
    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)].as_ref())
        .split(main[0]);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(8), // Input form
                Constraint::Length(8), // Mission status
                Constraint::Min(5),    // Score
            ]
            .as_ref(),
        )
        .split(columns[0]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)].as_ref())
        .split(columns[1]);

    draw_form(left[0], f, state, run);
    draw_mission(left[1], f, run);
    draw_score(left[2], f, run);
    draw_fixes(right[0], f, run);
    draw_feed(right[1], f, run);

    let status_line = Line::from(vec![
        Span::styled(
            projection::status_label(run.status),
            Style::default()
                .fg(tone_color(projection::status_tone(run.status)))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::raw(state.info.clone()),
    ]);
    let status = Paragraph::new(vec![status_line])
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, main[1]);
}

fn draw_form(area: Rect, f: &mut ratatui::Frame, state: &UiState, run: &RunState) {
    let locked = run.is_running();
    let mut lines = Vec::new();
    for field in ConfigField::ALL {
        let focused = field == state.focus && !locked;
        let marker = if focused { "> " } else { "  " };
        let value = run.config.get(field);
        let value_span = if value.is_empty() {
            Span::styled(field.placeholder(), Style::default().fg(Color::DarkGray))
        } else {
            Span::raw(value.to_string())
        };
        let label_style = if focused {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::Gray)
        };
        lines.push(Line::from(vec![
            Span::styled(marker, label_style),
            Span::styled(format!("{}: ", field.label()), label_style),
            value_span,
        ]));
    }
    lines.push(Line::from(""));
    let hint = if locked {
        Span::styled("Agent deployed…", Style::default().fg(Color::Yellow))
    } else {
        Span::styled(
            "Enter: run healing agent",
            Style::default().fg(Color::Magenta),
        )
    };
    lines.push(Line::from(vec![Span::raw("  "), hint]));

    let p = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Mission Config"),
    );
    f.render_widget(p, area);
}

fn kv(label: &str, value: Span<'static>) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label}: "), Style::default().fg(Color::Gray)),
        value,
    ])
}

fn draw_mission(area: Rect, f: &mut ratatui::Frame, run: &RunState) {
    let tone = tone_color(projection::status_tone(run.status));
    let elapsed = projection::elapsed_seconds(run, Instant::now());
    let run_id = run
        .run_id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    let lines = vec![
        kv(
            "Status",
            Span::styled(
                projection::status_label(run.status),
                Style::default().fg(tone).add_modifier(Modifier::BOLD),
            ),
        ),
        kv(
            "Repository",
            Span::raw(projection::repository_display(run).to_string()),
        ),
        kv(
            "Branch",
            Span::styled(
                projection::branch_display(run).to_string(),
                Style::default().fg(Color::Cyan),
            ),
        ),
        kv("Time", Span::raw(projection::format_duration(elapsed))),
        kv("Run", Span::raw(run_id)),
        kv("Fixes", Span::raw(run.fixes_applied.len().to_string())),
    ];
    let p = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Mission Status"),
    );
    f.render_widget(p, area);
}

fn draw_score(area: Rect, f: &mut ratatui::Frame, run: &RunState) {
    let block = Block::default().borders(Borders::ALL).title("Score");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)].as_ref())
        .split(inner);

    let score = projection::display_score(run);
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(projection::score_ratio(run))
        .label(format!(
            "{} / {}",
            projection::format_score(score),
            projection::format_score(projection::MAX_SCORE)
        ));
    f.render_widget(gauge, rows[0]);

    if let Some(breakdown) = run.score_breakdown.as_ref() {
        let lines = vec![
            kv(
                "Base",
                Span::raw(projection::format_score(breakdown.base_score)),
            ),
            kv(
                "Speed bonus",
                Span::styled(
                    format!("+{}", projection::format_score(breakdown.speed_bonus)),
                    Style::default().fg(Color::Green),
                ),
            ),
            kv(
                "Efficiency penalty",
                Span::styled(
                    format!("-{}", projection::format_score(breakdown.efficiency_penalty)),
                    Style::default().fg(Color::Red),
                ),
            ),
        ];
        f.render_widget(Paragraph::new(lines), rows[1]);
    }
}

fn fix_status_color(status: &str) -> Color {
    let lower = status.to_ascii_lowercase();
    if lower.contains("fail") {
        Color::Red
    } else if lower.is_empty() {
        Color::Gray
    } else {
        Color::Green
    }
}

fn draw_fixes(area: Rect, f: &mut ratatui::Frame, run: &RunState) {
    let header = Row::new(vec!["File", "Bug Type", "Line", "Commit Message", "Status"])
        .style(Style::default().fg(Color::Gray).add_modifier(Modifier::BOLD));
    let rows: Vec<Row> = run
        .fixes_applied
        .iter()
        .map(|fix| {
            Row::new(vec![
                Cell::from(fix.file.clone()),
                Cell::from(fix.bug_type.clone()),
                Cell::from(fix.line_number.to_string()),
                Cell::from(fix.commit_message.clone()),
                Cell::from(fix.status.clone())
                    .style(Style::default().fg(fix_status_color(&fix.status))),
            ])
        })
        .collect();
    let title = format!("Fixes Applied ({})", run.fixes_applied.len());
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(22),
            Constraint::Length(12),
            Constraint::Length(6),
            Constraint::Min(10),
            Constraint::Length(10),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(table, area);
}

fn log_color(kind: LogKind) -> Color {
    match kind {
        LogKind::Error => Color::Red,
        LogKind::Success => Color::Green,
        LogKind::Info | LogKind::Other => Color::White,
    }
}

fn draw_feed(area: Rect, f: &mut ratatui::Frame, run: &RunState) {
    // Newest entries at the bottom; only what fits is shown.
    let visible = area.height.saturating_sub(2) as usize;
    let skip = run.logs.len().saturating_sub(visible);
    let items: Vec<ListItem> = run
        .logs
        .iter()
        .skip(skip)
        .map(|entry| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("[{}] ", entry.timestamp),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(entry.message.clone(), Style::default().fg(log_color(entry.kind))),
            ]))
        })
        .collect();
    let title = format!(
        "Live Feed · Iteration {} · {}",
        projection::iteration_display(run),
        projection::last_log_message(run)
    );
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(list, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunConfiguration;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn typing_edits_focused_field() {
        let store = RunStore::new();
        let mut state = UiState::default();
        for c in "ab".chars() {
            handle_key(&mut state, &store, key(KeyCode::Char(c)));
        }
        handle_key(&mut state, &store, key(KeyCode::Backspace));
        handle_key(&mut state, &store, key(KeyCode::Tab));
        handle_key(&mut state, &store, KeyEvent::new(KeyCode::Char('T'), KeyModifiers::SHIFT));

        let config = store.configuration();
        assert_eq!(config.repository_url, "a");
        assert_eq!(config.team_name, "T");
    }

    #[test]
    fn form_is_locked_while_running() {
        let store = RunStore::with_configuration(RunConfiguration::new("r", "t", "l"));
        store.start_run();
        let mut state = UiState::default();

        handle_key(&mut state, &store, key(KeyCode::Char('x')));
        assert_eq!(store.configuration().repository_url, "r");
        assert!(state.info.contains("locked"));

        let action = handle_key(&mut state, &store, key(KeyCode::Enter));
        assert!(matches!(action, KeyAction::None));
    }

    #[test]
    fn command_keys_map_to_controller_commands() {
        let store = RunStore::new();
        let mut state = UiState::default();
        assert!(matches!(
            handle_key(&mut state, &store, key(KeyCode::Enter)),
            KeyAction::Send(UiCommand::Submit)
        ));
        assert!(matches!(
            handle_key(&mut state, &store, ctrl('r')),
            KeyAction::Send(UiCommand::Restart)
        ));
        assert!(matches!(
            handle_key(&mut state, &store, ctrl('s')),
            KeyAction::ExportReport
        ));
        assert!(matches!(
            handle_key(&mut state, &store, ctrl('y')),
            KeyAction::CopyBranch
        ));
        assert!(matches!(
            handle_key(&mut state, &store, key(KeyCode::Esc)),
            KeyAction::Quit
        ));
        assert!(matches!(
            handle_key(&mut state, &store, ctrl('c')),
            KeyAction::Quit
        ));
        // Control chords never reach the form.
        assert_eq!(store.configuration(), RunConfiguration::default());
    }

    #[test]
    fn help_tab_swallows_form_keys() {
        let store = RunStore::new();
        let mut state = UiState::default();
        handle_key(&mut state, &store, key(KeyCode::F(1)));
        handle_key(&mut state, &store, key(KeyCode::Char('x')));
        assert!(matches!(
            handle_key(&mut state, &store, key(KeyCode::Enter)),
            KeyAction::None
        ));
        assert!(store.configuration().repository_url.is_empty());
        handle_key(&mut state, &store, key(KeyCode::F(1)));
        assert_eq!(state.tab, TAB_DASHBOARD);
    }

    #[test]
    fn events_update_status_line() {
        use clap::Parser;

        let args = Cli::parse_from(["healing-dashboard"]);
        let store = RunStore::with_configuration(RunConfiguration::new("r", "t", "l"));
        store.start_run();
        let mut state = UiState::default();
        apply_event(
            &args,
            &store,
            &mut state,
            RunEvent::PollFailed {
                reason: "timeout".into(),
            },
        );
        assert!(state.info.contains("retrying"));
        apply_event(
            &args,
            &store,
            &mut state,
            RunEvent::Finished {
                status: RunStatus::Completed,
            },
        );
        assert_eq!(state.info, "Run finished: PASSED (score 100)");
    }

    #[test]
    fn copy_without_branch_reports_placeholder() {
        let store = RunStore::new();
        let mut state = UiState::default();
        copy_branch(&store, &mut state);
        assert_eq!(state.info, "No branch has been created yet");
    }
}
