use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

fn key(k: &'static str, pad: usize, what: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(k, Style::default().fg(Color::Magenta)),
        Span::raw(format!("{:width$}{}", "", what, width = pad)),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        key("Ctrl-C", 6, "Quit"),
        key("tab", 9, "Next field (EIN → Year → Results)"),
        key("enter", 7, "Submit lookup"),
        key("esc", 9, "Cancel the running lookup"),
        key("F1", 10, "Toggle this help"),
        Line::from(""),
        Line::from("Results (when focused):"),
        key("↑/↓", 9, "Move selection (also j/k)"),
        key("e", 11, "Export results as JSON"),
        key("c", 11, "Export results as CSV"),
        key("y", 11, "Copy exported path to clipboard"),
        key("q", 11, "Quit"),
        Line::from(""),
        Line::from("The collaborator's stderr is shown in the Diagnostics pane."),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
