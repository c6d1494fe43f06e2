//! Text summary builder for CLI output.
//!
//! Formats a delivered completion as human-readable lines for text mode.

use crate::model::Completion;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary: a short header followed by the rows, columns padded to align.
pub(crate) fn build_text_summary(c: &Completion) -> TextSummary {
    let mut lines = Vec::new();
    lines.push(format!(
        "Request {}: auditorEIN={:?} auditYear={:?}",
        c.request.id, c.request.auditor_ein, c.request.audit_year
    ));
    lines.push(format!(
        "Records: {} ({})",
        c.records.len(),
        humantime::format_duration(std::time::Duration::from_millis(
            c.elapsed.as_millis() as u64
        ))
    ));
    if c.degraded {
        lines.push(format!("Warning: {}", degraded_note(c.exit_code)));
    }

    let rows = c.records.rows();
    let ncols = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0usize; ncols];
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }
    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect();
        lines.push(cells.join("  ").trim_end().to_string());
    }

    TextSummary { lines }
}

/// Wording shared by text mode and the TUI for a degraded result.
pub(crate) fn degraded_note(exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("collaborator exited with code {code}; results may be incomplete"),
        None => "collaborator was terminated by a signal; results may be incomplete".into(),
    }
}
