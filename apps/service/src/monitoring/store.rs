use anyhow::Result;
use async_trait::async_trait;

use super::types::{HostId, HostTarget, ProbeOutcome};

/// The part of the host store the monitor depends on
#[async_trait]
pub trait HostStore: Send + Sync {
    /// Snapshot of every registered host and its current address
    async fn list_hosts(&self) -> Result<Vec<HostTarget>>;

    /// Persist the latest outcome for a host.
    ///
    /// Returns `Ok(false)` without touching anything when the host no longer
    /// exists or already carries a newer outcome.
    async fn save_outcome(&self, id: HostId, outcome: &ProbeOutcome) -> Result<bool>;
}
