use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

fn keybind(key: &'static str, pad: usize, action: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(pad)),
        Span::raw(action),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        keybind("Esc", 9, "Quit (also Ctrl-C)"),
        keybind("Tab", 9, "Next form field"),
        keybind("Shift-Tab", 3, "Previous form field"),
        keybind("Enter", 7, "Start a run with the form values"),
        keybind("Ctrl-R", 6, "Restart: stop watching the current run and start over"),
        keybind("Ctrl-S", 6, "Export the current run report as JSON"),
        keybind("Ctrl-Y", 6, "Copy the healing branch name to the clipboard"),
        keybind("F1", 10, "Toggle this help"),
        Line::from(""),
        Line::from("Form:"),
        Line::from("  Type to edit the focused field, Backspace to delete."),
        Line::from("  The form is locked while a run is in progress."),
        Line::from(""),
        Line::from("Status is refreshed from the agent every poll interval (default 2s)."),
        Line::from("Failed polls are retried on the next tick and shown in the status bar."),
    ])
    .wrap(Wrap { trim: false })
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
