use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::coordinator::MonitorCoordinator;
use super::types::PassOutcome;

/// Default time between automatic passes: twelve hours
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("monitoring scheduler is not running")]
    Stopped,

    #[error("probe pass failed: {0}")]
    PassFailed(String),
}

/// How a caller of [`PassTrigger::trigger_now`] wants to wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Resolve once the pass has finished (or was skipped)
    Wait,
    /// Resolve as soon as the scheduler has taken the request
    Detached,
}

/// Answer to a manual trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerResponse {
    Accepted,
    Finished(PassOutcome),
}

#[derive(Debug, Clone, Copy)]
enum TriggerSource {
    Timer,
    Manual,
}

type PassReply = oneshot::Sender<Result<PassOutcome, String>>;

struct TriggerRequest {
    reply: Option<PassReply>,
}

/// Drives probe passes on a fixed interval
pub struct MonitoringScheduler {
    coordinator: Arc<MonitorCoordinator>,
    interval: Duration,
}

impl MonitoringScheduler {
    /// Create a new monitoring scheduler
    pub fn new(coordinator: Arc<MonitorCoordinator>, interval: Duration) -> Self {
        Self { coordinator, interval }
    }

    /// Spawn the timer loop. The first pass starts immediately.
    pub fn start(self) -> SchedulerHandle {
        let (trigger_tx, trigger_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let automatic_passes = Arc::new(AtomicU64::new(0));

        info!(interval_seconds = self.interval.as_secs(), "Starting monitoring scheduler");

        let task = tokio::spawn(run_loop(
            self.coordinator,
            self.interval,
            trigger_rx,
            shutdown_rx,
            automatic_passes.clone(),
        ));

        SchedulerHandle {
            trigger: PassTrigger { trigger_tx },
            shutdown_tx,
            automatic_passes,
            task,
        }
    }
}

async fn run_loop(
    coordinator: Arc<MonitorCoordinator>,
    period: Duration,
    mut trigger_rx: mpsc::Receiver<TriggerRequest>,
    mut shutdown_rx: watch::Receiver<bool>,
    automatic_passes: Arc<AtomicU64>,
) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut passes = JoinSet::new();

    loop {
        tokio::select! {
            _ = timer.tick() => {
                automatic_passes.fetch_add(1, Ordering::Relaxed);
                passes.spawn(run_pass(coordinator.clone(), TriggerSource::Timer, None));
            }
            Some(request) = trigger_rx.recv() => {
                passes.spawn(run_pass(coordinator.clone(), TriggerSource::Manual, request.reply));
            }
            Some(joined) = passes.join_next(), if !passes.is_empty() => {
                if let Err(e) = joined {
                    error!("Probe pass task panicked: {}", e);
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }

    if !passes.is_empty() {
        info!("Waiting for the in-flight probe pass before stopping");
    }
    while let Some(joined) = passes.join_next().await {
        if let Err(e) = joined {
            error!("Probe pass task panicked: {}", e);
        }
    }
    info!("Monitoring scheduler stopped");
}

async fn run_pass(coordinator: Arc<MonitorCoordinator>, source: TriggerSource, reply: Option<PassReply>) {
    debug!(?source, "Probe pass triggered");

    let result = match coordinator.run_pass().await {
        Ok(outcome) => {
            if outcome == PassOutcome::Skipped {
                debug!(?source, "Probe pass skipped, another one is running");
            }
            Ok(outcome)
        }
        Err(e) => {
            warn!(?source, "Probe pass aborted: {:#}", e);
            Err(format!("{e:#}"))
        }
    };

    if let Some(reply) = reply {
        // the caller may have stopped waiting
        let _ = reply.send(result);
    }
}

/// Cloneable entry point for out-of-band passes
#[derive(Clone)]
pub struct PassTrigger {
    trigger_tx: mpsc::Sender<TriggerRequest>,
}

impl PassTrigger {
    /// Ask for a pass outside the regular cadence.
    ///
    /// Safe at any time; while a pass is running the request resolves to
    /// `PassOutcome::Skipped`. The timer is not affected.
    pub async fn trigger_now(&self, mode: TriggerMode) -> Result<TriggerResponse, SchedulerError> {
        match mode {
            TriggerMode::Detached => {
                self.trigger_tx
                    .send(TriggerRequest { reply: None })
                    .await
                    .map_err(|_| SchedulerError::Stopped)?;
                Ok(TriggerResponse::Accepted)
            }
            TriggerMode::Wait => {
                let (reply_tx, reply_rx) = oneshot::channel();
                self.trigger_tx
                    .send(TriggerRequest { reply: Some(reply_tx) })
                    .await
                    .map_err(|_| SchedulerError::Stopped)?;
                let outcome = reply_rx
                    .await
                    .map_err(|_| SchedulerError::Stopped)?
                    .map_err(SchedulerError::PassFailed)?;
                Ok(TriggerResponse::Finished(outcome))
            }
        }
    }
}

/// Owner of a running scheduler
pub struct SchedulerHandle {
    trigger: PassTrigger,
    shutdown_tx: watch::Sender<bool>,
    automatic_passes: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn trigger(&self) -> PassTrigger {
        self.trigger.clone()
    }

    pub async fn trigger_now(&self, mode: TriggerMode) -> Result<TriggerResponse, SchedulerError> {
        self.trigger.trigger_now(mode).await
    }

    /// Number of passes the timer has fired so far
    pub fn automatic_passes(&self) -> u64 {
        self.automatic_passes.load(Ordering::Relaxed)
    }

    /// Stop the timer and let an in-flight pass finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Monitoring scheduler task failed: {}", e);
        }
    }
}
