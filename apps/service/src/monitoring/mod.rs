/// Host monitoring engine
///
/// This module is responsible for:
/// - Probing one address (echo request plus hostname resolution)
/// - Running passes over every registered host, one at a time
/// - Scheduling passes on a fixed interval and on demand
pub mod coordinator;
pub mod prober;
pub mod scheduler;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::MonitorCoordinator;
pub use prober::{Prober, prober_for_platform};
pub use scheduler::{MonitoringScheduler, PassTrigger, SchedulerError, SchedulerHandle, TriggerMode, TriggerResponse};
pub use store::HostStore;
pub use types::{HostId, HostTarget, PassOutcome, PassReport, ProbeOutcome};
