use crate::model::Completion;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

// Global clipboard manager channel - initialized once on first use
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

/// Default export filename: year plus completion timestamp, filesystem-safe.
fn default_name(c: &Completion, ext: &str) -> String {
    let year: String = c
        .request
        .audit_year
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .collect();
    let year = if year.is_empty() { "all".into() } else { year };
    format!(
        "fac-lookup-{}-{}.{}",
        year,
        c.completed_at.replace(':', "-").replace('T', "_"),
        ext
    )
}

fn export_path(c: &Completion, ext: &str) -> Result<PathBuf> {
    let current_dir = std::env::current_dir().context("get current directory")?;
    Ok(current_dir.join(default_name(c, ext)))
}

/// Export the records as JSON into the current directory.
/// Returns the absolute path of the exported file.
pub fn export_result_json(c: &Completion) -> Result<PathBuf> {
    let path = export_path(c, "json")?;
    crate::storage::export_json(&path, &c.records)?;
    Ok(path)
}

/// Export the records as CSV into the current directory.
/// Returns the absolute path of the exported file.
pub fn export_result_csv(c: &Completion) -> Result<PathBuf> {
    let path = export_path(c, "csv")?;
    crate::storage::export_csv(&path, &c.records)?;
    Ok(path)
}

/// Initialize the clipboard manager thread if not already initialized.
/// This creates a background thread that processes clipboard operations sequentially,
/// keeping each clipboard instance alive for a sufficient duration.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                if let Ok(mut clipboard) = Clipboard::new() {
                    if clipboard.set_text(&text).is_ok() {
                        // Clipboard managers on Linux read lazily from the owner.
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Copy text to clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}
