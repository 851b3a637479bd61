use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Primary key of a registered host (the stored row id)
pub type HostId = i64;

/// One entry of a pass snapshot: the address a host had when the pass enumerated it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    pub id: HostId,
    pub address: String,
}

impl HostTarget {
    pub fn new(id: HostId, address: impl Into<String>) -> Self {
        Self { id, address: address.into() }
    }
}

/// Result of probing one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// Whether the echo request got a reply before the deadline
    pub reachable: bool,

    /// Name reported by the platform ping or by reverse DNS
    pub resolved_hostname: Option<String>,

    /// Wall-clock time at which the probe completed
    pub checked_at: DateTime<Utc>,

    /// Round trip of the echo command, only set when reachable
    pub latency_ms: Option<u64>,

    /// Trimmed text reported by the reachability check
    pub output: Option<String>,
}

impl ProbeOutcome {
    /// Outcome for a host that answered
    pub fn reachable(latency_ms: u64, checked_at: DateTime<Utc>) -> Self {
        Self {
            reachable: true,
            resolved_hostname: None,
            checked_at,
            latency_ms: Some(latency_ms),
            output: None,
        }
    }

    /// Outcome for a host that did not answer (or could not be asked)
    pub fn unreachable(checked_at: DateTime<Utc>) -> Self {
        Self { reachable: false, resolved_hostname: None, checked_at, latency_ms: None, output: None }
    }

    pub fn with_hostname(mut self, hostname: Option<String>) -> Self {
        self.resolved_hostname = hostname;
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        let output = output.into();
        self.output = if output.trim().is_empty() { None } else { Some(output.trim().to_string()) };
        self
    }

    /// Short status label used by listings
    pub fn status_label(&self) -> &'static str {
        if self.reachable { "OK" } else { "ERROR" }
    }
}

/// Counters of one completed pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub hosts: usize,
    pub reachable: usize,
    pub unreachable: usize,
    /// Outcomes the store accepted
    pub saved: usize,
    /// Outcomes for hosts deleted (or already newer) by the time of write-back
    pub discarded: usize,
    /// Write-backs that failed with a store error
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PassReport {
    pub(crate) fn new(hosts: usize, started_at: DateTime<Utc>) -> Self {
        Self {
            hosts,
            reachable: 0,
            unreachable: 0,
            saved: 0,
            discarded: 0,
            failed: 0,
            started_at,
            finished_at: started_at,
        }
    }

    pub(crate) fn record_probe(&mut self, outcome: &ProbeOutcome) {
        if outcome.reachable {
            self.reachable += 1;
        } else {
            self.unreachable += 1;
        }
    }
}

/// What happened to a pass request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PassOutcome {
    /// The pass ran to completion
    Completed(PassReport),
    /// Another pass was already in flight, this request was dropped
    Skipped,
}

impl PassOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PassOutcome::Completed(_))
    }

    pub fn report(&self) -> Option<&PassReport> {
        match self {
            PassOutcome::Completed(report) => Some(report),
            PassOutcome::Skipped => None,
        }
    }
}
