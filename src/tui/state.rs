use crate::model::{Completion, RelayEvent, Request, RequestId, RequestIdGen};
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};
use std::time::Instant;

/// Which widget receives typed characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    AuditorEin,
    AuditYear,
    Results,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::AuditorEin => Focus::AuditYear,
            Focus::AuditYear => Focus::Results,
            Focus::Results => Focus::AuditorEin,
        }
    }
}

/// Outcome of the current request, as shown on the status line.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupStatus {
    Idle,
    Pending {
        id: RequestId,
        pid: Option<u32>,
        since: Instant,
    },
    Delivered {
        id: RequestId,
        count: usize,
        degraded: bool,
        exit_code: Option<i32>,
    },
    Failed {
        id: RequestId,
        kind: &'static str,
        message: String,
    },
}

pub struct UiState {
    pub tab: usize,
    pub focus: Focus,
    pub info: String,

    // Form fields, kept exactly as typed.
    pub auditor_ein: String,
    pub audit_year: String,

    pub ids: RequestIdGen,
    /// Only responses for this request reach the table.
    pub current: Option<RequestId>,
    pub status: LookupStatus,

    pub rows: Vec<Vec<String>>,
    pub selected_row: usize,
    pub last_completion: Option<Completion>,

    pub diagnostics: Vec<String>,
    pub last_exported_path: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: 0,
            focus: Focus::AuditorEin,
            info: String::new(),
            auditor_ein: String::new(),
            audit_year: String::new(),
            ids: RequestIdGen::default(),
            current: None,
            status: LookupStatus::Idle,
            rows: Vec::new(),
            selected_row: 0,
            last_completion: None,
            diagnostics: Vec::new(),
            last_exported_path: None,
        }
    }
}

impl UiState {
    const MAX_DIAGNOSTICS: usize = 200;

    /// Capture both fields into a new request and make it the current one.
    pub fn build_request(&mut self) -> Request {
        let id = self.ids.next_id();
        self.current = Some(id);
        self.status = LookupStatus::Pending {
            id,
            pid: None,
            since: Instant::now(),
        };
        self.info = format!("Request {id} sent");
        Request {
            id,
            auditor_ein: self.auditor_ein.clone(),
            audit_year: self.audit_year.clone(),
        }
    }

    pub fn pending_request(&self) -> Option<RequestId> {
        match self.status {
            LookupStatus::Pending { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn focused_field(&mut self) -> Option<&mut String> {
        match self.focus {
            Focus::AuditorEin => Some(&mut self.auditor_ein),
            Focus::AuditYear => Some(&mut self.audit_year),
            Focus::Results => None,
        }
    }

    fn push_diagnostic(&mut self, line: String) {
        self.diagnostics.push(line);
        if self.diagnostics.len() > Self::MAX_DIAGNOSTICS {
            let excess = self.diagnostics.len() - Self::MAX_DIAGNOSTICS;
            let _ = self.diagnostics.drain(0..excess);
        }
    }

    /// Display path: fold one relay event into the UI state.
    pub fn apply_event(&mut self, ev: RelayEvent) {
        let id = ev.request_id();
        let is_current = self.current == Some(id);
        match ev {
            RelayEvent::Spawned { pid, .. } => {
                if let LookupStatus::Pending {
                    id: pending,
                    pid: slot,
                    ..
                } = &mut self.status
                {
                    if *pending == id {
                        *slot = pid;
                    }
                }
            }
            RelayEvent::Diagnostic { line, .. } => {
                self.push_diagnostic(format!("{id} {line}"));
            }
            RelayEvent::Completed { completion, .. } => {
                if !is_current {
                    self.info = format!("Discarded response for superseded request {id}");
                    return;
                }
                self.rows = completion.records.rows();
                self.selected_row = 0;
                self.status = LookupStatus::Delivered {
                    id,
                    count: self.rows.len(),
                    degraded: completion.degraded,
                    exit_code: completion.exit_code,
                };
                self.info = format!(
                    "Request {id}: {} record(s) in {:.1}s",
                    self.rows.len(),
                    completion.elapsed.as_secs_f64()
                );
                self.last_completion = Some(*completion);
            }
            RelayEvent::Failed { error, .. } => {
                if !is_current {
                    self.info = format!("Superseded request {id} failed: {error}");
                    return;
                }
                // Never leave rows from an earlier request next to an error.
                self.rows.clear();
                self.selected_row = 0;
                self.last_completion = None;
                self.status = LookupStatus::Failed {
                    id,
                    kind: error.kind(),
                    message: error.to_string(),
                };
                self.info = format!("Request {id} failed");
            }
        }
    }

    pub fn select_next_row(&mut self) {
        if self.selected_row + 1 < self.rows.len() {
            self.selected_row += 1;
        }
    }

    pub fn select_prev_row(&mut self) {
        self.selected_row = self.selected_row.saturating_sub(1);
    }

    /// Status line spans: error, warning and empty results must look different.
    pub fn status_line(&self) -> Line<'static> {
        match &self.status {
            LookupStatus::Idle => Line::from(Span::styled(
                "Enter an auditor EIN and audit year, then press Enter",
                Style::default().fg(Color::Gray),
            )),
            LookupStatus::Pending { id, pid, since } => {
                let pid = pid.map(|p| format!(" (pid {p})")).unwrap_or_default();
                Line::from(vec![
                    Span::styled("… ", Style::default().fg(Color::Cyan)),
                    Span::raw(format!(
                        "Request {id} running{pid}, {:.1}s",
                        since.elapsed().as_secs_f64()
                    )),
                    Span::styled("  (Esc to cancel)", Style::default().fg(Color::Gray)),
                ])
            }
            LookupStatus::Delivered {
                count: 0,
                degraded: false,
                ..
            } => Line::from(Span::styled(
                "No records returned",
                Style::default().fg(Color::Gray),
            )),
            LookupStatus::Delivered {
                id,
                count,
                degraded: false,
                ..
            } => Line::from(vec![
                Span::styled(
                    format!("✓ {count} record(s)"),
                    Style::default().fg(Color::Green),
                ),
                Span::styled(format!("  [{id}]"), Style::default().fg(Color::Gray)),
            ]),
            LookupStatus::Delivered {
                id,
                count,
                exit_code,
                ..
            } => Line::from(vec![
                Span::styled("⚠ Degraded: ", Style::default().fg(Color::Yellow)),
                Span::raw(format!(
                    "{count} record(s); {}",
                    crate::text_summary::degraded_note(*exit_code)
                )),
                Span::styled(format!("  [{id}]"), Style::default().fg(Color::Gray)),
            ]),
            LookupStatus::Failed { id, kind, message } => Line::from(vec![
                Span::styled(format!("✗ {kind}: "), Style::default().fg(Color::Red)),
                Span::raw(message.clone()),
                Span::styled(format!("  [{id}]"), Style::default().fg(Color::Gray)),
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ParseError, RelayError};
    use crate::model::ResultSet;
    use serde_json::json;
    use std::time::Duration;

    fn completion(req: &Request, records: serde_json::Value, exit_code: i32) -> Box<Completion> {
        let records: ResultSet = serde_json::from_value(records).expect("records");
        Box::new(Completion {
            request: req.clone(),
            records,
            exit_code: Some(exit_code),
            degraded: exit_code != 0,
            diagnostics: Vec::new(),
            elapsed: Duration::from_millis(250),
            completed_at: "2024-01-01T00:00:00Z".into(),
        })
    }

    fn filled(ein: &str, year: &str) -> UiState {
        UiState {
            auditor_ein: ein.into(),
            audit_year: year.into(),
            ..Default::default()
        }
    }

    #[test]
    fn build_request_takes_fields_verbatim() {
        let mut s = filled(" 12-3456789 ", "2023\t");
        let req = s.build_request();
        assert_eq!(req.auditor_ein, " 12-3456789 ");
        assert_eq!(req.audit_year, "2023\t");
        assert_eq!(s.pending_request(), Some(req.id));
    }

    #[test]
    fn each_submit_gets_a_fresh_id() {
        let mut s = filled("", "2023");
        let a = s.build_request();
        let b = s.build_request();
        assert_ne!(a.id, b.id);
        assert_eq!(s.current, Some(b.id));
    }

    #[test]
    fn completion_renders_one_row_per_record() {
        let mut s = filled("12-3456789", "2023");
        let req = s.build_request();
        s.apply_event(RelayEvent::Completed {
            id: req.id,
            completion: completion(
                &req,
                json!([{"name":"Org A","amount":1000},{"name":"Org B","amount":2000,"city":"X"}]),
                0,
            ),
        });
        assert_eq!(
            s.rows,
            vec![vec!["Org A", "1000"], vec!["Org B", "2000", "X"]]
        );
        assert_matches::assert_matches!(
            s.status,
            LookupStatus::Delivered {
                count: 2,
                degraded: false,
                ..
            }
        );
    }

    #[test]
    fn empty_result_clears_prior_rows() {
        let mut s = filled("", "2023");
        s.rows = vec![vec!["stale".into()]];
        let req = s.build_request();
        s.apply_event(RelayEvent::Completed {
            id: req.id,
            completion: completion(&req, json!([]), 0),
        });
        assert!(s.rows.is_empty());
        assert_eq!(s.status_line().to_string(), "No records returned");
    }

    #[test]
    fn failure_clears_rows_and_shows_error() {
        let mut s = filled("", "2023");
        s.rows = vec![vec!["stale".into()]];
        let req = s.build_request();
        s.apply_event(RelayEvent::Failed {
            id: req.id,
            error: RelayError::Parse(ParseError::Empty),
        });
        assert!(s.rows.is_empty());
        assert!(s.status_line().to_string().starts_with("✗ Parse failure: "));
    }

    #[test]
    fn degraded_result_is_flagged() {
        let mut s = filled("", "2023");
        let req = s.build_request();
        s.apply_event(RelayEvent::Completed {
            id: req.id,
            completion: completion(&req, json!([{"a": 1}]), 1),
        });
        assert_eq!(s.rows.len(), 1);
        assert!(s.status_line().to_string().contains("exited with code 1"));
    }

    #[test]
    fn superseded_response_does_not_touch_the_table() {
        let mut s = filled("", "2023");
        let old = s.build_request();
        let new = s.build_request();
        s.apply_event(RelayEvent::Completed {
            id: old.id,
            completion: completion(&old, json!([{"a": 1}]), 0),
        });
        assert!(s.rows.is_empty());
        assert_eq!(s.pending_request(), Some(new.id));

        s.apply_event(RelayEvent::Failed {
            id: old.id,
            error: RelayError::Cancelled,
        });
        assert_eq!(s.pending_request(), Some(new.id));
    }

    #[test]
    fn spawned_records_pid_for_current_request() {
        let mut s = filled("", "2023");
        let req = s.build_request();
        s.apply_event(RelayEvent::Spawned {
            id: req.id,
            pid: Some(4242),
        });
        assert_matches::assert_matches!(s.status, LookupStatus::Pending { pid: Some(4242), .. });
    }

    #[test]
    fn diagnostics_are_bounded() {
        let mut s = UiState::default();
        for i in 0..(UiState::MAX_DIAGNOSTICS + 5) {
            s.apply_event(RelayEvent::Diagnostic {
                id: RequestId(1),
                line: format!("line {i}"),
            });
        }
        assert_eq!(s.diagnostics.len(), UiState::MAX_DIAGNOSTICS);
        assert_eq!(s.diagnostics[0], "#1 line 5");
    }
}
