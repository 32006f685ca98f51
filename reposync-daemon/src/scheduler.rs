//! Timer-driven reconciliation loop.
//!
//! `Idle -> Running -> Stopped`. Starting runs one pass immediately and then
//! one per interval. Stopping never preempts a pass: the loop exits after the
//! current pass completes. Each remote call is bounded by the transport's
//! request timeout, which bounds how long `stop` can wait.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::DaemonError;
use crate::reconciler::{Reconciler, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

impl SchedulerState {
    fn as_str(self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Running => "running",
            SchedulerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An out-of-band pass requested through the loop.
struct RunJob {
    trigger: &'static str,
    respond_to: oneshot::Sender<RunSummary>,
}

struct Inner {
    state: SchedulerState,
    shutdown: CancellationToken,
    trigger_tx: Option<mpsc::Sender<RunJob>>,
    handle: Option<JoinHandle<()>>,
}

pub struct Scheduler {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    inner: Mutex<Inner>,
}

impl Scheduler {
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
            inner: Mutex::new(Inner {
                state: SchedulerState::Idle,
                shutdown: CancellationToken::new(),
                trigger_tx: None,
                handle: None,
            }),
        }
    }

    pub async fn state(&self) -> SchedulerState {
        self.inner.lock().await.state
    }

    /// Spawn the loop. The first pass starts immediately.
    pub async fn start(&self) -> Result<(), DaemonError> {
        let mut inner = self.inner.lock().await;
        if inner.state != SchedulerState::Idle {
            return Err(DaemonError::SchedulerState(inner.state.as_str()));
        }

        let (trigger_tx, trigger_rx) = mpsc::channel::<RunJob>(16);
        let handle = tokio::spawn(tick_loop(
            self.reconciler.clone(),
            self.interval,
            inner.shutdown.clone(),
            trigger_rx,
        ));

        inner.state = SchedulerState::Running;
        inner.trigger_tx = Some(trigger_tx);
        inner.handle = Some(handle);
        tracing::info!(interval_secs = self.interval.as_secs(), "polling started");
        Ok(())
    }

    /// Stop the loop and wait for the in-flight pass, if any, to finish.
    /// Idempotent.
    pub async fn stop(&self) {
        let handle = {
            let mut inner = self.inner.lock().await;
            inner.state = SchedulerState::Stopped;
            inner.shutdown.cancel();
            inner.trigger_tx = None;
            inner.handle.take()
        };
        let Some(handle) = handle else {
            return;
        };

        if let Err(err) = handle.await {
            tracing::error!(error = %err, "scheduler task join failure");
        }
        tracing::info!("polling stopped");
    }

    /// Run one pass through the loop now and wait for its summary. Queued
    /// behind any pass already in progress.
    pub async fn trigger_now(&self, trigger: &'static str) -> Result<RunSummary, DaemonError> {
        let trigger_tx = {
            let inner = self.inner.lock().await;
            match (&inner.trigger_tx, inner.state) {
                (Some(tx), SchedulerState::Running) => tx.clone(),
                (_, state) => return Err(DaemonError::SchedulerState(state.as_str())),
            }
        };

        let (tx, rx) = oneshot::channel();
        trigger_tx
            .send(RunJob {
                trigger,
                respond_to: tx,
            })
            .await
            .map_err(|_| DaemonError::ChannelClosed("scheduler queue"))?;
        rx.await
            .map_err(|_| DaemonError::ChannelClosed("scheduler response"))
    }

    /// Record a mirror the caller already created, through the same ledger
    /// critical section the loop uses. Does not contact the destination.
    pub async fn add_mirrored_repo(&self, name: &str) -> bool {
        self.reconciler.ledger().mark_mirrored(name).await
    }

    pub async fn count(&self) -> usize {
        self.reconciler.ledger().count().await
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }
}

async fn tick_loop(
    reconciler: Arc<Reconciler>,
    interval: Duration,
    shutdown: CancellationToken,
    mut trigger_rx: mpsc::Receiver<RunJob>,
) {
    // Never fired: a pass always runs to completion.
    let calls = CancellationToken::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // Branch bodies run to completion; shutdown is only observed between passes.
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                reconciler.run_once(&calls, "timer").await;
            }
            Some(job) = trigger_rx.recv() => {
                let summary = reconciler.run_once(&calls, job.trigger).await;
                let _ = job.respond_to.send(summary);
            }
        }
    }
}
