use anyhow::{Context, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::prober::Prober;
use super::store::HostStore;
use super::types::{PassOutcome, PassReport};

/// Held for the duration of a pass, releases the in-flight flag on drop
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs probe passes over every registered host, one pass at a time
pub struct MonitorCoordinator {
    store: Arc<dyn HostStore>,
    prober: Arc<dyn Prober>,
    max_concurrent: usize,
    in_flight: AtomicBool,
    completed_passes: AtomicU64,
}

impl MonitorCoordinator {
    pub fn new(store: Arc<dyn HostStore>, prober: Arc<dyn Prober>, max_concurrent: usize) -> Self {
        Self {
            store,
            prober,
            max_concurrent: max_concurrent.max(1),
            in_flight: AtomicBool::new(false),
            completed_passes: AtomicU64::new(0),
        }
    }

    /// Whether a pass is currently running
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn completed_passes(&self) -> u64 {
        self.completed_passes.load(Ordering::Relaxed)
    }

    /// Probe every host once and write the outcomes back.
    ///
    /// Returns `PassOutcome::Skipped` straight away when another pass holds the
    /// guard. Only a failure to enumerate hosts is an error; per-host problems
    /// end up in the report.
    pub async fn run_pass(&self) -> Result<PassOutcome> {
        let Some(_guard) = PassGuard::acquire(&self.in_flight) else {
            debug!("Probe pass already in flight, dropping trigger");
            return Ok(PassOutcome::Skipped);
        };

        let started_at = Utc::now();
        let hosts = self.store.list_hosts().await.context("failed to enumerate hosts")?;
        info!(hosts = hosts.len(), fan_out = self.max_concurrent, "Starting probe pass");

        let mut report = PassReport::new(hosts.len(), started_at);
        let prober = &self.prober;

        let mut probes = stream::iter(hosts)
            .map(|host| async move {
                let outcome = prober.probe(&host.address).await;
                (host, outcome)
            })
            .buffer_unordered(self.max_concurrent);

        while let Some((host, outcome)) = probes.next().await {
            report.record_probe(&outcome);
            debug!(
                host_id = host.id,
                address = %host.address,
                reachable = outcome.reachable,
                hostname = ?outcome.resolved_hostname,
                "Probe finished"
            );

            match self.store.save_outcome(host.id, &outcome).await {
                Ok(true) => report.saved += 1,
                Ok(false) => {
                    debug!(host_id = host.id, "Host gone or newer outcome stored, discarding result");
                    report.discarded += 1;
                }
                Err(e) => {
                    warn!(host_id = host.id, "Failed to save probe outcome: {:#}", e);
                    report.failed += 1;
                }
            }
        }

        report.finished_at = Utc::now();
        self.completed_passes.fetch_add(1, Ordering::Relaxed);
        info!(
            "Probe pass finished: {} hosts, {} reachable, {} saved, {} discarded, {} failed",
            report.hosts, report.reachable, report.saved, report.discarded, report.failed
        );

        Ok(PassOutcome::Completed(report))
    }
}
