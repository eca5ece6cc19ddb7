//! 基础设施错误
//!
//! 配置加载、日志初始化、指标导出等启动阶段的错误。业务错误由各业务 crate 自行定义。

use thiserror::Error;

/// 基础设施错误类型
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("配置加载失败: {0}")]
    Config(#[from] config::ConfigError),

    #[error("配置无效: {field} - {message}")]
    InvalidConfig { field: String, message: String },

    #[error("日志初始化失败: {0}")]
    Tracing(String),

    #[error("指标导出初始化失败: {0}")]
    Metrics(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, InfraError>;

impl InfraError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::Tracing(_) => "TRACING_INIT_FAILED",
            Self::Metrics(_) => "METRICS_INIT_FAILED",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 仅 IO 错误（如端口占用）可重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
