use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::run_periodic;
use crate::service::ScheduledSequenceProcessor;

/// 周期评估时间序列条件
pub struct SequenceWorker {
    processor: Arc<ScheduledSequenceProcessor>,
    period: Duration,
}

impl SequenceWorker {
    pub fn new(processor: Arc<ScheduledSequenceProcessor>, period: Duration) -> Self {
        Self { processor, period }
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let processor = self.processor;
        run_periodic("sequence_check", self.period, shutdown, || {
            let processor = processor.clone();
            async move { processor.process_time_based_conditions().await }
        })
        .await;
    }
}
