//! 定时任务
//!
//! 每个 worker 按固定间隔执行一次扫描，单次失败只记录日志，
//! 收到 shutdown 信号后退出循环。

mod audience_worker;
mod expiry_worker;
mod sequence_worker;

use std::future::Future;
use std::time::Duration;

use boost_shared::observability::metrics;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::Result;

pub use audience_worker::AudienceWorker;
pub use expiry_worker::ExpiryWorker;
pub use sequence_worker::SequenceWorker;

/// 周期执行 `task`，直到 shutdown 变为 true
///
/// 返回已执行的轮数
pub(crate) async fn run_periodic<F, Fut, T>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut task: F,
) -> u64
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    T: std::fmt::Debug,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut runs = 0;

    info!(worker = name, period_secs = period.as_secs(), "定时任务已启动");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                runs += 1;
                match task().await {
                    Ok(report) => debug!(worker = name, ?report, "定时任务完成"),
                    Err(e) => error!(worker = name, error = %e, code = e.error_code(), "定时任务失败"),
                }
                metrics::set_worker_last_run(name);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!(worker = name, runs, "定时任务已停止");
    runs
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::BoostError;

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop() {
        let (tx, rx) = watch::channel(false);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let handle = tokio::spawn(run_periodic("test", Duration::from_millis(10), rx, move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                    Err(BoostError::Internal("boom".into()))
                } else {
                    Ok(())
                }
            }
        }));

        tokio::time::sleep(Duration::from_millis(55)).await;
        tx.send(true).unwrap();
        let runs = handle.await.unwrap();

        // 首轮立即执行，失败的轮次之后仍继续
        assert!(runs >= 3);
        assert_eq!(calls.load(Ordering::SeqCst) as u64, runs);
    }
}
