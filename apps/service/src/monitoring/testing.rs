//! In-memory fakes shared by the monitoring tests.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::prober::Prober;
use super::store::HostStore;
use super::types::{HostId, HostTarget, ProbeOutcome};

#[derive(Default)]
struct MemoryState {
    hosts: BTreeMap<HostId, String>,
    outcomes: HashMap<HostId, ProbeOutcome>,
    writes: HashMap<HostId, usize>,
    failing_writes: HashSet<HostId>,
    fail_listing: bool,
}

/// Host store kept in a mutex, ids start at 1 in insertion order
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn with_hosts(addresses: &[&str]) -> Self {
        let store = Self::default();
        {
            let mut state = store.state.lock().unwrap();
            for (index, address) in addresses.iter().enumerate() {
                state.hosts.insert(index as HostId + 1, address.to_string());
            }
        }
        store
    }

    pub fn delete(&self, id: HostId) {
        let mut state = self.state.lock().unwrap();
        state.hosts.remove(&id);
        state.outcomes.remove(&id);
    }

    pub fn change_address(&self, id: HostId, address: &str) {
        if let Some(current) = self.state.lock().unwrap().hosts.get_mut(&id) {
            *current = address.to_string();
        }
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state.lock().unwrap().fail_listing = fail;
    }

    pub fn fail_writes_for(&self, id: HostId) {
        self.state.lock().unwrap().failing_writes.insert(id);
    }

    pub fn outcome_for(&self, id: HostId) -> Option<ProbeOutcome> {
        self.state.lock().unwrap().outcomes.get(&id).cloned()
    }

    pub fn writes_for(&self, id: HostId) -> usize {
        self.state.lock().unwrap().writes.get(&id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl HostStore for MemoryStore {
    async fn list_hosts(&self) -> Result<Vec<HostTarget>> {
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(anyhow!("store unavailable"));
        }
        Ok(state.hosts.iter().map(|(id, address)| HostTarget::new(*id, address.clone())).collect())
    }

    async fn save_outcome(&self, id: HostId, outcome: &ProbeOutcome) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.failing_writes.contains(&id) {
            return Err(anyhow!("write failed"));
        }
        if !state.hosts.contains_key(&id) {
            return Ok(false);
        }
        *state.writes.entry(id).or_default() += 1;
        state.outcomes.insert(id, outcome.clone());
        Ok(true)
    }
}

type ProbeHook = Box<dyn Fn(&str) + Send + Sync>;

/// Prober answering from a fixed set of reachable addresses
pub struct RecordingProber {
    reachable: HashSet<String>,
    delay: Duration,
    hook: Option<ProbeHook>,
    probed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingProber {
    pub fn reachable_only(addresses: &[&str]) -> Self {
        Self {
            reachable: addresses.iter().map(|a| a.to_string()).collect(),
            delay: Duration::ZERO,
            hook: None,
            probed: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Run `hook` with the address while the probe is in flight
    pub fn on_probe(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }

    /// Most probes seen in flight at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for RecordingProber {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        self.probed.lock().unwrap().push(address.to_string());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(hook) = &self.hook {
            hook(address);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.reachable.contains(address) {
            ProbeOutcome::reachable(1, Utc::now())
        } else {
            ProbeOutcome::unreachable(Utc::now())
        }
    }
}
