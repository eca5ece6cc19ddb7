use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::run_periodic;
use crate::service::AudienceRefreshService;

/// 周期刷新动态受众
pub struct AudienceWorker {
    service: Arc<AudienceRefreshService>,
    period: Duration,
}

impl AudienceWorker {
    pub fn new(service: Arc<AudienceRefreshService>, period: Duration) -> Self {
        Self { service, period }
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let service = self.service;
        run_periodic("audience_refresh", self.period, shutdown, || {
            let service = service.clone();
            async move { service.refresh_dynamic_audience_boosts().await }
        })
        .await;
    }
}
