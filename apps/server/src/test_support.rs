use std::sync::Arc;
use std::time::Duration;

use actix_web::web::Data;
use async_trait::async_trait;
use chrono::Utc;
use hostwatch_service::config::DatabaseSettings;
use hostwatch_service::database::open_database;
use hostwatch_service::monitoring::{MonitorCoordinator, MonitoringScheduler, ProbeOutcome, Prober, SchedulerHandle};
use tempfile::TempDir;

use crate::state::AppState;

/// Answers for 10.0.0.5 only, after an optional delay
pub struct FakeProber {
    delay: Duration,
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if address == "10.0.0.5" {
            ProbeOutcome::reachable(1, Utc::now()).with_hostname(Some("printer.local".into()))
        } else {
            ProbeOutcome::unreachable(Utc::now())
        }
    }
}

pub struct Fixture {
    pub state: Data<AppState>,
    pub coordinator: Arc<MonitorCoordinator>,
    _scheduler: SchedulerHandle,
    _dir: TempDir,
}

/// A temporary database plus a running scheduler backed by [`FakeProber`]
pub async fn fixture(probe_delay: Duration) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = DatabaseSettings {
        path: dir.path().join("hostwatch.db").to_string_lossy().to_string(),
        pool_size: 4,
    };
    let database = Arc::new(open_database(&settings).await.expect("open database"));
    let coordinator =
        Arc::new(MonitorCoordinator::new(database.clone(), Arc::new(FakeProber { delay: probe_delay }), 4));
    let scheduler = MonitoringScheduler::new(coordinator.clone(), Duration::from_secs(3600)).start();
    let state = Data::new(AppState::new(database, scheduler.trigger()));

    Fixture { state, coordinator, _scheduler: scheduler, _dir: dir }
}

/// Poll `condition` until it holds, failing the test after five seconds
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let polled = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "timed out waiting for {what}");
}

/// Wait until the startup pass has finished
pub async fn wait_for_idle(coordinator: &MonitorCoordinator) {
    wait_until("the startup pass", || coordinator.completed_passes() > 0 && !coordinator.is_running()).await;
}
