//! Post-completion processing.
//!
//! Handles the configured exports after a result set has been delivered.

use crate::cli::Cli;
use crate::model::Completion;
use crate::storage;

/// Result of post-completion processing, ready for presentation layers.
pub(crate) struct ProcessedCompletion {
    pub export_messages: Vec<String>,
}

/// Write `--export-json` / `--export-csv` targets for a delivered completion.
pub(crate) fn process_completion(args: &Cli, completion: &Completion) -> ProcessedCompletion {
    let mut export_messages = Vec::new();
    if let Some(export_path) = args.export_json.as_deref() {
        match storage::export_json(export_path, &completion.records) {
            Ok(_) => export_messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export JSON failed: {e:#}")),
        }
    }
    if let Some(export_path) = args.export_csv.as_deref() {
        match storage::export_csv(export_path, &completion.records) {
            Ok(_) => export_messages.push(format!("Exported CSV: {}", export_path.display())),
            Err(e) => export_messages.push(format!("Export CSV failed: {e:#}")),
        }
    }
    ProcessedCompletion { export_messages }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Request, RequestId};
    use clap::Parser;
    use std::ffi::OsString;
    use std::time::Duration;

    fn completion() -> Completion {
        Completion {
            request: Request {
                id: RequestId(1),
                auditor_ein: "12-3456789".into(),
                audit_year: "2023".into(),
            },
            records: serde_json::from_value(serde_json::json!([
                {"name": "Org A", "amount": 1000},
                {"name": "Org B, Inc.", "amount": 2000}
            ]))
            .expect("records"),
            exit_code: Some(0),
            degraded: false,
            diagnostics: Vec::new(),
            elapsed: Duration::from_millis(10),
            completed_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn writes_both_exports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let json_path = dir.path().join("out/records.json");
        let csv_path = dir.path().join("records.csv");
        let args = Cli::parse_from([
            OsString::from("fac-lookup"),
            "--export-json".into(),
            json_path.clone().into(),
            "--export-csv".into(),
            csv_path.clone().into(),
        ]);

        let processed = process_completion(&args, &completion());

        assert_eq!(
            processed.export_messages,
            vec![
                format!("Exported JSON: {}", json_path.display()),
                format!("Exported CSV: {}", csv_path.display()),
            ]
        );
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).expect("json file"))
                .expect("valid json");
        assert_eq!(json[1]["name"], "Org B, Inc.");
        let csv = std::fs::read_to_string(&csv_path).expect("csv file");
        assert_eq!(csv.lines().next(), Some("name,amount"));
        assert!(csv.contains("\"Org B, Inc.\",2000"));
    }

    #[test]
    fn no_export_flags_means_no_messages() {
        let args = Cli::parse_from(["fac-lookup"]);
        assert!(process_completion(&args, &completion()).export_messages.is_empty());
    }
}
