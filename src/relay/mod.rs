//! Process relay: one collaborator subprocess per request.
//!
//! Spawns the collaborator, buffers its stdout, forwards stderr as diagnostics,
//! and parses the complete output exactly once after the process exits.

mod buffer;
mod invocation;
mod parse;

use crate::error::RelayError;
use crate::model::{Completion, RelayConfig, RelayEvent, Request, RequestId};
use buffer::OutputBuffer;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Stderr lines retained on the completion.
const MAX_DIAGNOSTIC_LINES: usize = 50;
/// Longer stderr lines are cut here; the rest of the line is discarded.
const MAX_DIAGNOSTIC_LINE_BYTES: usize = 4096;
const TRUNCATED_MARKER: &str = " [truncated]";
/// How long to wait for stderr to close after the process exits.
const STDERR_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub enum RelayControl {
    /// Kill the collaborator and report the request as cancelled.
    Cancel,
}

pub struct ProcessRelay {
    cfg: RelayConfig,
}

impl ProcessRelay {
    pub fn new(cfg: RelayConfig) -> Self {
        Self { cfg }
    }

    pub async fn run(
        self,
        request: Request,
        event_tx: mpsc::UnboundedSender<RelayEvent>,
        mut control_rx: mpsc::UnboundedReceiver<RelayControl>,
    ) -> Result<Completion, RelayError> {
        let id = request.id;
        let started = Instant::now();

        let mut cmd = invocation::build_command(&self.cfg, &request);
        let mut child = cmd.spawn().map_err(|source| RelayError::Spawn {
            program: self.cfg.program.display().to_string(),
            source,
        })?;
        let pid = child.id();
        info!(request = %id, pid = ?pid, year = %request.audit_year, "collaborator started");
        let _ = event_tx.send(RelayEvent::Spawned { id, pid });

        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_diagnostics(id, stderr, event_tx.clone())));
        let stdout = child.stdout.take();
        let mut output = OutputBuffer::with_limit(self.cfg.max_output_bytes);

        let waited = {
            let drive = async {
                if let Some(stdout) = stdout {
                    buffer::drain_into(stdout, &mut output).await?;
                }
                Ok::<_, RelayError>(child.wait().await?)
            };
            tokio::select! {
                res = tokio::time::timeout(self.cfg.timeout, drive) => match res {
                    Ok(r) => r,
                    Err(_) => Err(RelayError::Timeout { timeout: self.cfg.timeout }),
                },
                _ = cancelled(&mut control_rx) => Err(RelayError::Cancelled),
            }
        };

        let status = match waited {
            Ok(status) => status,
            Err(e) => {
                if let Err(kill_err) = child.kill().await {
                    debug!(request = %id, error = %kill_err, "kill after failure");
                }
                if let Some(task) = stderr_task {
                    task.abort();
                }
                warn!(request = %id, error = %e, "relay aborted");
                return Err(e);
            }
        };

        let diagnostics = match stderr_task {
            Some(mut task) => match tokio::time::timeout(STDERR_GRACE, &mut task).await {
                Ok(Ok(lines)) => lines,
                Ok(Err(_)) => Vec::new(),
                Err(_) => {
                    // A grandchild may still hold the pipe.
                    task.abort();
                    debug!(request = %id, "stderr still open after exit; dropping the rest");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let exit_code = status.code();
        info!(request = %id, ?exit_code, bytes = output.len(), "collaborator exited");

        let records = match (status.success(), parse::parse_result_set(output.as_bytes())) {
            (_, Ok(records)) => records,
            (true, Err(cause)) => return Err(RelayError::Parse(cause)),
            (false, Err(cause)) => {
                return Err(RelayError::ExitFailure {
                    status: status.to_string(),
                    exit_code,
                    cause,
                })
            }
        };
        let degraded = !status.success();
        if degraded {
            warn!(request = %id, ?exit_code, records = records.len(), "delivering output of a failed collaborator");
        }

        Ok(Completion {
            request,
            records,
            exit_code,
            degraded,
            diagnostics,
            elapsed: started.elapsed(),
            completed_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
        })
    }
}

/// Resolves on a cancel message; never resolves if the control sender is gone.
async fn cancelled(control_rx: &mut mpsc::UnboundedReceiver<RelayControl>) {
    match control_rx.recv().await {
        Some(RelayControl::Cancel) => {}
        None => futures::future::pending::<()>().await,
    }
}

/// Read one `\n`-terminated line, keeping at most `cap` bytes of it (without
/// the newline) in `buf`.
/// Returns the bytes consumed (0 at EOF) and whether the line was cut.
async fn read_capped_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    cap: usize,
) -> std::io::Result<(usize, bool)> {
    let mut consumed = 0;
    let mut truncated = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            break;
        }
        let (content, used, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i, i + 1, true),
            None => (available.len(), available.len(), false),
        };
        let room = cap.saturating_sub(buf.len());
        if content > room {
            truncated = true;
        }
        buf.extend_from_slice(&available[..content.min(room)]);
        reader.consume(used);
        consumed += used;
        if done {
            break;
        }
    }
    Ok((consumed, truncated))
}

/// Log and forward stderr line by line, keeping a bounded tail.
async fn forward_diagnostics<R: AsyncRead + Unpin>(
    id: RequestId,
    stderr: R,
    event_tx: mpsc::UnboundedSender<RelayEvent>,
) -> Vec<String> {
    let mut reader = BufReader::new(stderr);
    let mut tail = VecDeque::with_capacity(MAX_DIAGNOSTIC_LINES);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        match read_capped_line(&mut reader, &mut raw, MAX_DIAGNOSTIC_LINE_BYTES).await {
            Ok((0, _)) => break,
            Ok((_, truncated)) => {
                let mut line = String::from_utf8_lossy(&raw).trim_end().to_string();
                if line.is_empty() {
                    continue;
                }
                if truncated {
                    line.push_str(TRUNCATED_MARKER);
                }
                warn!(request = %id, "collaborator stderr: {line}");
                if tail.len() == MAX_DIAGNOSTIC_LINES {
                    tail.pop_front();
                }
                tail.push_back(line.clone());
                let _ = event_tx.send(RelayEvent::Diagnostic { id, line });
            }
            Err(e) => {
                debug!(request = %id, error = %e, "stderr read failed");
                break;
            }
        }
    }
    tail.into()
}
