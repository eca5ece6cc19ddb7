//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use std::net::SocketAddr;
use std::sync::OnceLock;

use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;
use crate::error::{InfraError, Result};

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| InfraError::Metrics(e.to_string()))?;

    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册奖励引擎的业务指标描述
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "boost_condition_evaluations_total",
        "Total number of boost condition evaluations"
    );
    metrics::describe_counter!(
        "boost_status_transitions_total",
        "Total number of boost account status transitions"
    );

    metrics::describe_counter!("boost_redemptions_total", "Total number of redemption batches");
    metrics::describe_histogram!(
        "boost_redemption_duration_seconds",
        "Redemption batch duration in seconds"
    );

    metrics::describe_counter!("boost_transfers_total", "Total number of float transfer calls");

    metrics::describe_counter!(
        "boost_processing_runs_total",
        "Total number of event/sweep processing runs"
    );
    metrics::describe_histogram!(
        "boost_processing_duration_seconds",
        "Event/sweep processing duration in seconds"
    );

    metrics::describe_counter!("boost_expiry_accounts_total", "Accounts handled at boost expiry");

    metrics::describe_gauge!(
        "boost_worker_last_run_timestamp",
        "Unix timestamp of the last worker iteration"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录条件评估
#[inline]
pub fn record_condition_evaluation(kind: &str, matched: bool) {
    metrics::counter!(
        "boost_condition_evaluations_total",
        "kind" => kind.to_string(),
        "matched" => matched.to_string()
    )
    .increment(1);
}

/// 记录账户状态变更
#[inline]
pub fn record_status_transition(from: &str, to: &str, accounts: u64) {
    metrics::counter!(
        "boost_status_transitions_total",
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(accounts);
}

/// 记录兑现/撤销批次
#[inline]
pub fn record_redemption(kind: &str, status: &str, duration_secs: f64) {
    metrics::counter!(
        "boost_redemptions_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "boost_redemption_duration_seconds",
        "kind" => kind.to_string()
    )
    .record(duration_secs);
}

/// 记录转账调用
#[inline]
pub fn record_transfer(status: &str) {
    metrics::counter!("boost_transfers_total", "status" => status.to_string()).increment(1);
}

/// 记录一次事件处理或定时扫描
#[inline]
pub fn record_boost_processing(trigger: &str, boosts_triggered: usize, duration_secs: f64) {
    metrics::counter!(
        "boost_processing_runs_total",
        "trigger" => trigger.to_string(),
        "triggered" => (boosts_triggered > 0).to_string()
    )
    .increment(1);

    metrics::histogram!(
        "boost_processing_duration_seconds",
        "trigger" => trigger.to_string()
    )
    .record(duration_secs);
}

/// 记录过期处理结果
#[inline]
pub fn record_expiry(boost_kind: &str, winners: usize, expired: usize) {
    metrics::counter!(
        "boost_expiry_accounts_total",
        "kind" => boost_kind.to_string(),
        "outcome" => "redeemed"
    )
    .increment(winners as u64);

    metrics::counter!(
        "boost_expiry_accounts_total",
        "kind" => boost_kind.to_string(),
        "outcome" => "expired"
    )
    .increment(expired as u64);
}

/// 记录 Worker 最近一次运行时间
#[inline]
pub fn set_worker_last_run(worker: &str) {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();

    metrics::gauge!(
        "boost_worker_last_run_timestamp",
        "worker" => worker.to_string()
    )
    .set(now);
}
