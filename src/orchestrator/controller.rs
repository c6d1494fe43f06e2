//! Request dispatcher.
//!
//! Owns the relay tasks spawned for UI requests and routes every outcome back as an
//! event tagged with the originating request id.

use crate::error::RelayError;
use crate::model::{Completion, RelayConfig, RelayEvent, Request, RequestId};
use crate::relay::{ProcessRelay, RelayControl};
use anyhow::Result;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::collections::HashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Submit(Request),
    Cancel(RequestId),
    Quit,
}

type Finished = (RequestId, Result<Result<Completion, RelayError>, JoinError>);

pub(crate) struct Dispatcher {
    cfg: RelayConfig,
    event_tx: UnboundedSender<RelayEvent>,
    controls: HashMap<RequestId, UnboundedSender<RelayControl>>,
    running: FuturesUnordered<BoxFuture<'static, Finished>>,
}

impl Dispatcher {
    pub(crate) fn new(cfg: RelayConfig, event_tx: UnboundedSender<RelayEvent>) -> Self {
        Self {
            cfg,
            event_tx,
            controls: HashMap::new(),
            running: FuturesUnordered::new(),
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.controls.len()
    }

    /// Start one relay for `request`. A second submit of an in-flight id is ignored.
    pub(crate) fn submit(&mut self, request: Request) {
        let id = request.id;
        if self.controls.contains_key(&id) {
            warn!(request = %id, "request already in flight; ignoring duplicate submit");
            return;
        }
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<RelayControl>();
        let relay = ProcessRelay::new(self.cfg.clone());
        let event_tx = self.event_tx.clone();
        let handle = tokio::spawn(async move { relay.run(request, event_tx, ctrl_rx).await });
        self.controls.insert(id, ctrl_tx);
        self.running.push(async move { (id, handle.await) }.boxed());
        info!(request = %id, in_flight = self.controls.len(), "request dispatched");
    }

    /// Ask the relay for `id` to stop. Returns false if nothing is running under that id.
    pub(crate) fn cancel(&self, id: RequestId) -> bool {
        match self.controls.get(&id) {
            Some(tx) => tx.send(RelayControl::Cancel).is_ok(),
            None => false,
        }
    }

    fn cancel_all(&self) {
        for tx in self.controls.values() {
            let _ = tx.send(RelayControl::Cancel);
        }
    }

    fn finish(&mut self, (id, joined): Finished) {
        self.controls.remove(&id);
        let ev = match joined {
            Ok(Ok(completion)) => RelayEvent::Completed {
                id,
                completion: Box::new(completion),
            },
            Ok(Err(error)) => RelayEvent::Failed { id, error },
            Err(e) => RelayEvent::Failed {
                id,
                error: RelayError::Task(e.to_string()),
            },
        };
        let _ = self.event_tx.send(ev);
    }

    /// Serve UI commands until quit, then cancel and drain whatever is still running.
    pub(crate) async fn run(mut self, mut cmd_rx: UnboundedReceiver<UiCommand>) -> Result<()> {
        let mut quit_pending = false;
        loop {
            tokio::select! {
                cmd = cmd_rx.recv(), if !quit_pending => match cmd {
                    Some(UiCommand::Submit(request)) => self.submit(request),
                    Some(UiCommand::Cancel(id)) => {
                        if !self.cancel(id) {
                            debug!(request = %id, "cancel for a request that is not running");
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        quit_pending = true;
                        if !self.running.is_empty() {
                            info!(in_flight = self.in_flight(), "cancelling in-flight requests");
                            self.cancel_all();
                        }
                    }
                },
                Some(done) = self.running.next(), if !self.running.is_empty() => self.finish(done),
                else => break,
            }
            if quit_pending && self.running.is_empty() {
                break;
            }
        }
        Ok(())
    }
}

/// Build the dispatcher and serve `cmd_rx` until the UI quits.
pub(crate) async fn run_controller(
    cfg: RelayConfig,
    event_tx: UnboundedSender<RelayEvent>,
    cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    Dispatcher::new(cfg, event_tx).run(cmd_rx).await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::model::ArgStyle;
    use assert_matches::assert_matches;
    use std::time::Duration;

    /// Collaborator that echoes its year after sleeping `$1`/10 seconds.
    fn sleepy() -> RelayConfig {
        RelayConfig {
            program: "sh".into(),
            program_args: vec![
                "-c".into(),
                r#"sleep "0.$1"; printf '[{"year":"%s"}]' "$1""#.into(),
                "collaborator".into(),
            ],
            arg_style: ArgStyle::YearOnly,
            timeout: Duration::from_secs(10),
            max_output_bytes: 1024,
            working_dir: None,
        }
    }

    fn req(id: u64, year: &str) -> Request {
        Request {
            id: RequestId(id),
            auditor_ein: String::new(),
            audit_year: year.into(),
        }
    }

    async fn next_terminal(rx: &mut UnboundedReceiver<RelayEvent>) -> RelayEvent {
        loop {
            let ev = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("event in time")
                .expect("channel open");
            if matches!(ev, RelayEvent::Completed { .. } | RelayEvent::Failed { .. }) {
                return ev;
            }
        }
    }

    #[tokio::test]
    async fn overlapping_requests_are_routed_by_id() {
        let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(sleepy(), evt_tx, cmd_rx));

        // The slower request is submitted first and finishes last.
        cmd_tx.send(UiCommand::Submit(req(1, "5"))).expect("send");
        cmd_tx.send(UiCommand::Submit(req(2, "1"))).expect("send");

        let first = next_terminal(&mut evt_rx).await;
        let second = next_terminal(&mut evt_rx).await;
        for ev in [first, second] {
            match ev {
                RelayEvent::Completed { id, completion } => {
                    assert_eq!(completion.request.id, id);
                    let expected = if id == RequestId(1) { "5" } else { "1" };
                    assert_eq!(completion.records.rows(), vec![vec![expected]]);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }

        cmd_tx.send(UiCommand::Quit).expect("send");
        ctl.await.expect("join").expect("controller");
    }

    #[tokio::test]
    async fn cancel_targets_only_the_named_request() {
        let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(sleepy(), evt_tx, cmd_rx));

        cmd_tx.send(UiCommand::Submit(req(1, "9"))).expect("send");
        cmd_tx.send(UiCommand::Submit(req(2, "2"))).expect("send");
        cmd_tx.send(UiCommand::Cancel(RequestId(1))).expect("send");

        let mut outcomes = HashMap::new();
        for _ in 0..2 {
            let ev = next_terminal(&mut evt_rx).await;
            outcomes.insert(ev.request_id(), ev);
        }
        assert_matches!(
            outcomes.remove(&RequestId(1)),
            Some(RelayEvent::Failed {
                error: RelayError::Cancelled,
                ..
            })
        );
        assert_matches!(
            outcomes.remove(&RequestId(2)),
            Some(RelayEvent::Completed { .. })
        );

        drop(cmd_tx);
        ctl.await.expect("join").expect("controller");
    }

    #[tokio::test]
    async fn quit_cancels_and_drains_in_flight_requests() {
        let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = tokio::spawn(run_controller(sleepy(), evt_tx, cmd_rx));

        cmd_tx.send(UiCommand::Submit(req(1, "9"))).expect("send");
        cmd_tx.send(UiCommand::Quit).expect("send");

        tokio::time::timeout(Duration::from_secs(3), ctl)
            .await
            .expect("controller exits promptly")
            .expect("join")
            .expect("controller");
        assert_matches!(
            next_terminal(&mut evt_rx).await,
            RelayEvent::Failed {
                error: RelayError::Cancelled,
                ..
            }
        );
    }

    #[tokio::test]
    async fn spawn_failures_become_failed_events() {
        let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
        let mut cfg = sleepy();
        cfg.program = "/nonexistent/fac-collaborator".into();
        let mut dispatcher = Dispatcher::new(cfg, evt_tx);
        dispatcher.submit(req(4, "1"));
        assert_eq!(dispatcher.in_flight(), 1);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        cmd_tx.send(UiCommand::Quit).expect("send");
        dispatcher.run(cmd_rx).await.expect("run");

        assert_matches!(
            next_terminal(&mut evt_rx).await,
            RelayEvent::Failed {
                id: RequestId(4),
                error: RelayError::Spawn { .. }
            }
        );
    }
}
