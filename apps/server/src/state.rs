use std::sync::Arc;

use hostwatch_service::database::HostRepository;
use hostwatch_service::monitoring::PassTrigger;

/// Shared by every worker
pub struct AppState {
    pub repository: Arc<dyn HostRepository>,
    pub trigger: PassTrigger,
}

impl AppState {
    pub fn new(repository: Arc<dyn HostRepository>, trigger: PassTrigger) -> Self {
        Self { repository, trigger }
    }
}
