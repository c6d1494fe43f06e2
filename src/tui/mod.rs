mod export;
mod help;
mod state;

use crate::cli::{build_config, Cli};
use crate::model::RelayEvent;
use crate::orchestrator::{self, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use export::{copy_to_clipboard, export_result_csv, export_result_json};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Tabs},
    Terminal,
};
use state::{Focus, LookupStatus, UiState};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Widest a results column may grow before it is truncated.
const MAX_COLUMN_WIDTH: u16 = 40;

pub async fn run(args: Cli) -> Result<()> {
    // Unbounded channels keep the UI thread from ever blocking on the runtime.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<RelayEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let ui_args = args.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(ui_args, event_rx, cmd_tx));

    let res = orchestrator::run_controller(build_config(&args), event_tx, cmd_rx).await;

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
    mut event_rx: UnboundedReceiver<RelayEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState {
        auditor_ein: args.auditor_ein.clone().unwrap_or_default(),
        audit_year: args.audit_year.clone().unwrap_or_default(),
        ..Default::default()
    };
    if args.submit_on_launch {
        let _ = cmd_tx.send(UiCommand::Submit(state.build_request()));
    }

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            let delivered_current = matches!(
                &ev,
                RelayEvent::Completed { id, .. } if state.current == Some(*id)
            );
            state.apply_event(ev);
            if delivered_current {
                if let Some(c) = state.last_completion.as_ref() {
                    let processed = orchestrator::process_completion(&args, c);
                    if !processed.export_messages.is_empty() {
                        state.info = processed.export_messages.join("; ");
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match on_key(&mut state, k) {
                    Some(UiCommand::Quit) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    Some(cmd) => {
                        let _ = cmd_tx.send(cmd);
                    }
                    None => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

/// Request dispatcher: translate one key press into state edits and at most one command.
fn on_key(state: &mut UiState, k: KeyEvent) -> Option<UiCommand> {
    match (k.modifiers, k.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) => return Some(UiCommand::Quit),
        (_, KeyCode::F(1)) => state.tab = if state.tab == 0 { 1 } else { 0 },
        (_, KeyCode::Tab) => state.focus = state.focus.next(),
        (_, KeyCode::BackTab) => state.focus = state.focus.next().next(),
        (_, KeyCode::Enter) => return Some(UiCommand::Submit(state.build_request())),
        (_, KeyCode::Esc) => {
            if let Some(id) = state.pending_request() {
                state.info = format!("Cancelling request {id}…");
                return Some(UiCommand::Cancel(id));
            }
        }
        (_, KeyCode::Backspace) => {
            if let Some(field) = state.focused_field() {
                field.pop();
            }
        }
        (m, KeyCode::Char(ch))
            if state.focus != Focus::Results
                && !m.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
        {
            if let Some(field) = state.focused_field() {
                field.push(ch);
            }
        }
        (_, KeyCode::Up) | (_, KeyCode::Char('k')) => state.select_prev_row(),
        (_, KeyCode::Down) | (_, KeyCode::Char('j')) => state.select_next_row(),
        (_, KeyCode::Char('q')) => return Some(UiCommand::Quit),
        (_, KeyCode::Char('e')) => {
            if let Some(c) = state.last_completion.as_ref() {
                state.info = match export_result_json(c) {
                    Ok(p) => {
                        state.last_exported_path = Some(p.to_string_lossy().to_string());
                        format!("Exported JSON: {} (press 'y' to copy path)", p.display())
                    }
                    Err(e) => format!("JSON export failed: {e:#}"),
                };
            } else {
                state.info = "No results to export yet.".into();
            }
        }
        (_, KeyCode::Char('c')) => {
            if let Some(c) = state.last_completion.as_ref() {
                state.info = match export_result_csv(c) {
                    Ok(p) => {
                        state.last_exported_path = Some(p.to_string_lossy().to_string());
                        format!("Exported CSV: {} (press 'y' to copy path)", p.display())
                    }
                    Err(e) => format!("CSV export failed: {e:#}"),
                };
            } else {
                state.info = "No results to export yet.".into();
            }
        }
        (_, KeyCode::Char('y')) => {
            state.info = match state.last_exported_path.as_deref() {
                Some(path) => match copy_to_clipboard(path) {
                    Ok(_) => format!("✓ Copied to clipboard: {path}"),
                    Err(e) => format!("Clipboard copy failed: {e:#}"),
                },
                None => "No exported file path to copy. Export a file first (e/c)".into(),
            };
        }
        _ => {}
    }
    None
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![Line::from("Lookup"), Line::from("Help")])
        .select(state.tab)
        .block(Block::default().borders(Borders::ALL).title("fac-lookup"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        0 => draw_lookup(chunks[1], f, state),
        _ => help::draw_help(chunks[1], f),
    }
}

fn focus_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    }
}

fn input_box<'a>(title: &'a str, value: &'a str, focused: bool) -> Paragraph<'a> {
    let text = if focused {
        format!("{value}▏")
    } else {
        value.to_string()
    };
    Paragraph::new(text).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(focus_style(focused)),
    )
}

fn draw_lookup(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3), // Form fields
                Constraint::Length(4), // Status + info
                Constraint::Min(5),    // Results table
                Constraint::Length(8), // Collaborator stderr
            ]
            .as_ref(),
        )
        .split(area);

    let form = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)].as_ref())
        .split(main[0]);
    f.render_widget(
        input_box(
            "Auditor EIN",
            &state.auditor_ein,
            state.focus == Focus::AuditorEin,
        ),
        form[0],
    );
    f.render_widget(
        input_box("Audit year", &state.audit_year, state.focus == Focus::AuditYear),
        form[1],
    );

    let status = Paragraph::new(vec![
        state.status_line(),
        Line::styled(state.info.clone(), Style::default().fg(Color::Gray)),
    ])
    .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, main[1]);

    draw_results(main[2], f, state);

    let visible = (main[3].height as usize).saturating_sub(2);
    let skip = state.diagnostics.len().saturating_sub(visible);
    let diag_lines: Vec<Line> = state
        .diagnostics
        .iter()
        .skip(skip)
        .map(|l| Line::raw(l.as_str()))
        .collect();
    let diagnostics = Paragraph::new(diag_lines)
        .style(Style::default().fg(Color::DarkGray))
        .block(Block::default().borders(Borders::ALL).title("Diagnostics"));
    f.render_widget(diagnostics, main[3]);
}

/// Widest cell per column, capped at `MAX_COLUMN_WIDTH`.
fn column_widths(rows: &[Vec<String>]) -> Vec<u16> {
    let ncols = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![1u16; ncols];
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            let w = cell.chars().count().min(MAX_COLUMN_WIDTH as usize) as u16;
            widths[i] = widths[i].max(w);
        }
    }
    widths
}

fn draw_results(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let focused = state.focus == Focus::Results;
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Results ({})", state.rows.len()))
        .border_style(focus_style(focused));

    if state.rows.is_empty() {
        let placeholder = match &state.status {
            LookupStatus::Idle => Line::styled("No lookup yet", Style::default().fg(Color::Gray)),
            LookupStatus::Pending { .. } => Line::styled(
                "Waiting for collaborator…",
                Style::default().fg(Color::Cyan),
            ),
            LookupStatus::Delivered { .. } => {
                Line::styled("No records returned", Style::default().fg(Color::Gray))
            }
            LookupStatus::Failed { kind, .. } => Line::styled(
                format!("No results: {kind}"),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
        };
        f.render_widget(Paragraph::new(placeholder).block(block), area);
        return;
    }

    let widths = column_widths(&state.rows);
    let rows = state
        .rows
        .iter()
        .map(|r| Row::new(r.iter().map(|c| Cell::from(c.as_str()))));
    let table = Table::new(rows, widths.iter().map(|w| Constraint::Length(*w)))
        .column_spacing(2)
        .block(block)
        .row_highlight_style(Style::default().fg(Color::Black).bg(Color::Yellow));

    let mut table_state = TableState::default();
    if focused {
        table_state.select(Some(state.selected_row));
    }
    f.render_stateful_widget(table, area, &mut table_state);
}
