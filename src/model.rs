use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Correlation token tying a request to its subprocess and its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out increasing request ids. Owned by whoever builds requests.
#[derive(Debug, Default)]
pub struct RequestIdGen {
    last: u64,
}

impl RequestIdGen {
    pub fn next_id(&mut self) -> RequestId {
        self.last += 1;
        RequestId(self.last)
    }
}

/// One lookup as typed by the user. Fields are carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    #[serde(rename = "auditorEIN")]
    pub auditor_ein: String,
    #[serde(rename = "auditYear")]
    pub audit_year: String,
}

/// How request fields are turned into collaborator arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ArgStyle {
    /// Pass only the audit year, as a single positional argument.
    #[default]
    YearOnly,
    /// Pass `--auditor_ein <ein> --audit_year <year>`, omitting empty fields.
    Flags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub program: PathBuf,
    #[serde(default)]
    pub program_args: Vec<String>,
    #[serde(default)]
    pub arg_style: ArgStyle,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub max_output_bytes: usize,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

pub type Record = serde_json::Map<String, Value>;

/// Ordered records parsed from one collaborator run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet {
    records: Vec<Record>,
}

impl ResultSet {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Render every record as a row of display cells, fields in insertion order.
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.records
            .iter()
            .map(|r| r.values().map(display_value).collect())
            .collect()
    }

    /// Union of field names across all records, in first-seen order.
    pub fn columns(&self) -> Vec<String> {
        let mut cols: Vec<String> = Vec::new();
        for record in &self.records {
            for key in record.keys() {
                if !cols.iter().any(|c| c == key) {
                    cols.push(key.clone());
                }
            }
        }
        cols
    }
}

/// Coerce a JSON value to the text shown in a table cell.
pub fn display_value(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            // 1000.0 reads as 1000, like a spreadsheet would show it
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// A delivered response: the parsed result set plus how the collaborator exited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub request: Request,
    pub records: ResultSet,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Set when the collaborator did not exit cleanly but its output still parsed.
    pub degraded: bool,
    #[serde(default)]
    pub diagnostics: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    #[serde(default)]
    pub completed_at: String,
}

/// Events emitted by the dispatcher and consumed by UI/CLI layers.
#[derive(Debug)]
pub enum RelayEvent {
    Spawned {
        id: RequestId,
        pid: Option<u32>,
    },
    Diagnostic {
        id: RequestId,
        line: String,
    },
    Completed {
        id: RequestId,
        // Boxed to keep the enum small.
        completion: Box<Completion>,
    },
    Failed {
        id: RequestId,
        error: RelayError,
    },
}

impl RelayEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            RelayEvent::Spawned { id, .. }
            | RelayEvent::Diagnostic { id, .. }
            | RelayEvent::Completed { id, .. }
            | RelayEvent::Failed { id, .. } => *id,
        }
    }
}
