//! File exports for delivered result sets.

use crate::model::{display_value, ResultSet};
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Write the records as a pretty-printed JSON array.
pub fn export_json(path: &Path, records: &ResultSet) -> Result<()> {
    ensure_parent(path)?;
    let data = serde_json::to_vec_pretty(records).context("serialize records")?;
    fs::write(path, data).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Write the records as CSV: a header of every field seen, then one line per record.
pub fn export_csv(path: &Path, records: &ResultSet) -> Result<()> {
    ensure_parent(path)?;
    let mut f = fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    f.write_all(render_csv(records).as_bytes())
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub(crate) fn render_csv(records: &ResultSet) -> String {
    let columns = records.columns();
    let mut out = String::new();
    push_line(&mut out, columns.iter().map(String::as_str));
    for record in records.records() {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| record.get(c).map(display_value).unwrap_or_default())
            .collect();
        push_line(&mut out, cells.iter().map(String::as_str));
    }
    out
}

fn push_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    let line: Vec<String> = cells.map(csv_escape).collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

fn csv_escape(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(v: serde_json::Value) -> ResultSet {
        serde_json::from_value(v).expect("result set")
    }

    #[test]
    fn csv_fills_missing_fields_and_quotes() {
        let rs = set(json!([
            {"name": "Org A", "amount": 1000},
            {"name": "Smith, Jones \"LLP\"", "note": "two\nlines"}
        ]));
        assert_eq!(
            render_csv(&rs),
            "name,amount,note\n\
             Org A,1000,\n\
             \"Smith, Jones \"\"LLP\"\"\",,\"two\nlines\"\n"
        );
    }

    #[test]
    fn csv_of_empty_set_is_a_blank_header() {
        assert_eq!(render_csv(&ResultSet::default()), "\n");
    }

    #[test]
    fn exports_write_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let rs = set(json!([{"name": "Org A", "amount": 1000}]));

        let json_path = dir.path().join("nested/out.json");
        export_json(&json_path, &rs).expect("json export");
        let back: ResultSet =
            serde_json::from_slice(&fs::read(&json_path).expect("read")).expect("parse");
        assert_eq!(back, rs);

        let csv_path = dir.path().join("out.csv");
        export_csv(&csv_path, &rs).expect("csv export");
        assert_eq!(
            fs::read_to_string(&csv_path).expect("read"),
            "name,amount\nOrg A,1000\n"
        );
    }
}
