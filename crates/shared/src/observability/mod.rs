//! 可观测性初始化
//!
//! 日志与 Prometheus 指标的统一入口。配置来自 `AppConfig` 的 observability 段，
//! 环境变量覆盖由配置加载统一处理。

pub mod metrics;
pub mod tracing;

use ::tracing::info;

use crate::config::{AppConfig, ObservabilitySection};
use crate::error::Result;

/// 可观测性参数
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// 写入日志和 `service_starts_total` 的服务名
    pub service_name: String,
    pub metrics_port: u16,
    pub metrics_enabled: bool,
    /// EnvFilter 表达式，RUST_LOG 存在时以其为准
    pub log_level: String,
    pub json_logs: bool,
}

impl ObservabilityConfig {
    pub fn new(service_name: impl Into<String>, section: &ObservabilitySection) -> Self {
        Self {
            service_name: service_name.into(),
            metrics_port: section.metrics_port,
            metrics_enabled: section.metrics_enabled,
            log_level: section.log_level.clone(),
            json_logs: section.log_format.eq_ignore_ascii_case("json"),
        }
    }

    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(config.service_name.clone(), &config.observability)
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self::new("boost-engine", &ObservabilitySection::default())
    }
}

/// 持有指标服务器任务，进程退出前保持存活
pub struct ObservabilityGuard {
    _metrics: Option<metrics::MetricsHandle>,
}

impl ObservabilityGuard {
    /// 未启用指标导出时使用
    pub fn empty() -> Self {
        Self { _metrics: None }
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        info!("可观测性组件关闭");
    }
}

/// 先装日志 subscriber，再按配置启动指标导出
///
/// ```ignore
/// let app = boost_shared::config::AppConfig::load("boost-engine")?;
/// let _guard = boost_shared::observability::init(&ObservabilityConfig::from_app_config(&app)).await?;
/// ```
pub async fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    let metrics = if config.metrics_enabled {
        Some(metrics::init(config).await?)
    } else {
        None
    };

    info!(
        service = %config.service_name,
        metrics_enabled = config.metrics_enabled,
        metrics_port = config.metrics_port,
        json_logs = config.json_logs,
        "可观测性初始化完成"
    );
    Ok(ObservabilityGuard { _metrics: metrics })
}
