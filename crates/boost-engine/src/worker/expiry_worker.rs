use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::run_periodic;
use crate::service::ExpiryCoordinator;

/// 周期关闭到期的 boost
pub struct ExpiryWorker {
    coordinator: Arc<ExpiryCoordinator>,
    period: Duration,
}

impl ExpiryWorker {
    pub fn new(coordinator: Arc<ExpiryCoordinator>, period: Duration) -> Self {
        Self { coordinator, period }
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let coordinator = self.coordinator;
        run_periodic("boost_expiry", self.period, shutdown, || {
            let coordinator = coordinator.clone();
            async move { coordinator.check_for_boosts_to_expire().await }
        })
        .await;
    }
}
