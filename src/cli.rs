use crate::model::{ArgStyle, Completion, RelayConfig, RelayEvent, Request, RequestIdGen};
use crate::relay::{ProcessRelay, RelayControl};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Collaborator used when no command is given after `--`.
const DEFAULT_COLLABORATOR: [&str; 2] = ["python3", "facapi.py"];

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "fac-lookup",
    version,
    about = "Look up audit records through an external data script, with optional TUI"
)]
pub struct Cli {
    /// Auditor EIN (pre-fills the form; used as-is in --json/--text mode)
    #[arg(long)]
    pub auditor_ein: Option<String>,

    /// Audit year (pre-fills the form; required in --json/--text mode)
    #[arg(long)]
    pub audit_year: Option<String>,

    /// How request fields are passed to the collaborator
    #[arg(long, value_enum, default_value_t = ArgStyle::YearOnly)]
    pub arg_style: ArgStyle,

    /// Kill the collaborator if it has not exited after this long
    #[arg(long, default_value = "120s")]
    pub timeout: humantime::Duration,

    /// Fail the request once collaborator stdout exceeds this many bytes
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    pub max_output_bytes: usize,

    /// Working directory for the collaborator
    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    /// Print JSON result and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print a text table and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Export every delivered result as JSON to this path
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Export every delivered result as CSV to this path
    #[arg(long)]
    pub export_csv: Option<PathBuf>,

    /// Submit the pre-filled request as soon as the TUI starts
    #[arg(long)]
    pub submit_on_launch: bool,

    /// Append logs to this file (the TUI otherwise logs nowhere)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Collaborator command and its leading arguments (default: python3 facapi.py)
    #[arg(last = true, value_name = "COMMAND")]
    pub collaborator: Vec<String>,
}

impl Cli {
    pub fn is_interactive(&self) -> bool {
        !(self.json || self.text)
    }
}

pub async fn run(args: Cli) -> Result<()> {
    if args.json && args.text {
        return Err(anyhow::anyhow!("--json and --text are mutually exclusive"));
    }

    if args.is_interactive() {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_once(args).await;
        }
    }

    run_once(args).await
}

/// Build a `RelayConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> RelayConfig {
    let mut command: Vec<String> = if args.collaborator.is_empty() {
        DEFAULT_COLLABORATOR.iter().map(|s| s.to_string()).collect()
    } else {
        args.collaborator.clone()
    };
    let program = PathBuf::from(command.remove(0));
    RelayConfig {
        program,
        program_args: command,
        arg_style: args.arg_style,
        timeout: Duration::from(args.timeout),
        max_output_bytes: args.max_output_bytes,
        working_dir: args.working_dir.clone(),
    }
}

/// Without `--log-file`, the stderr log already carries collaborator diagnostics.
fn echo_diagnostics(args: &Cli) -> bool {
    args.text && args.log_file.is_some()
}

/// Run a single lookup from the command-line fields and print the result.
async fn run_once(args: Cli) -> Result<()> {
    let audit_year = args
        .audit_year
        .clone()
        .context("--audit-year is required with --json or --text")?;
    let request = Request {
        id: RequestIdGen::default().next_id(),
        auditor_ein: args.auditor_ein.clone().unwrap_or_default(),
        audit_year,
    };

    let cfg = build_config(&args);
    let (out_tx, out_handle) = spawn_output_writer();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<RelayEvent>();
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<RelayControl>();

    // Ctrl-C kills the collaborator instead of orphaning it.
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_tx.send(RelayControl::Cancel);
        }
    });

    let relay = ProcessRelay::new(cfg);
    let handle = tokio::spawn(relay.run(request, evt_tx, ctrl_rx));

    while let Some(ev) = evt_rx.recv().await {
        if let RelayEvent::Diagnostic { line, .. } = ev {
            if echo_diagnostics(&args) {
                let _ = out_tx.send(OutputLine::Stderr(format!("collaborator: {line}")));
            }
        }
    }

    let outcome = handle.await.context("relay task failed")?;
    interrupt.abort();
    let completion = match outcome {
        Ok(c) => c,
        Err(e) => {
            drop(out_tx);
            let _ = out_handle.await;
            return Err(e).context("lookup failed");
        }
    };

    print_completion(&args, &completion, &out_tx)?;

    let processed = crate::orchestrator::process_completion(&args, &completion);
    for msg in processed.export_messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }

    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}

fn print_completion(
    args: &Cli,
    completion: &Completion,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
) -> Result<()> {
    if completion.degraded {
        let _ = out_tx.send(OutputLine::Stderr(format!(
            "Warning: {}",
            crate::text_summary::degraded_note(completion.exit_code)
        )));
    }
    if args.json {
        let out = serde_json::to_string_pretty(completion)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        let summary = crate::text_summary::build_text_summary(completion);
        for line in summary.lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    Ok(())
}
