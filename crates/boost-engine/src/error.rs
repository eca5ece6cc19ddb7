//! 奖励引擎错误类型
//!
//! 定义条件解析错误、业务错误和协作服务错误。
//! "条件未满足"属于正常结果（空列表），从不通过错误表达。

use thiserror::Error;

/// 条件 DSL 解析错误
///
/// 在加载 boost 时一次性解析条件字符串，格式问题在这里暴露，
/// 不会在评估阶段被静默当作"条件不满足"
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionParseError {
    #[error("条件字符串缺少类型: {0:?}")]
    MissingType(String),

    #[error("未知条件类型: {0}")]
    UnknownType(String),

    #[error("条件 {kind} 缺少参数 #{{...}}")]
    MissingParameter { kind: String },

    #[error("条件 {kind} 参数无效: {value} ({reason})")]
    InvalidParameter {
        kind: String,
        value: String,
        reason: String,
    },
}

/// 金额解析错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("金额格式应为 amount::unit::currency: {0:?}")]
    Format(String),

    #[error("未知金额单位: {0}")]
    Unit(String),

    #[error("金额数值无效: {0}")]
    Amount(String),

    #[error("金额溢出: {0}")]
    Overflow(String),
}

/// 奖励引擎错误类型
#[derive(Debug, Error)]
pub enum BoostError {
    // === 配置/数据错误 ===
    #[error("条件解析失败: {0}")]
    ConditionParse(#[from] ConditionParseError),

    #[error("金额无效: {0}")]
    Money(#[from] MoneyError),

    #[error("无效的状态: {0}")]
    InvalidStatus(String),

    // === 查询错误 ===
    #[error("Boost 不存在: {0}")]
    BoostNotFound(String),

    #[error("账户不存在: user_id={0}")]
    AccountNotFound(String),

    #[error("参数校验失败: {0}")]
    Validation(String),

    // === 资金与协作服务错误 ===
    #[error("转账失败: {0}")]
    TransferFailed(String),

    #[error("持久化失败: {0}")]
    Persistence(String),

    #[error("外部服务错误: {service} - {message}")]
    ExternalService { service: String, message: String },

    #[error("并发冲突: {0}")]
    ConcurrencyConflict(String),

    // === 系统错误 ===
    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, BoostError>;

impl BoostError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConditionParse(_) => "CONDITION_PARSE_ERROR",
            Self::Money(_) => "INVALID_MONEY",
            Self::InvalidStatus(_) => "INVALID_STATUS",
            Self::BoostNotFound(_) => "BOOST_NOT_FOUND",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::TransferFailed(_) => "TRANSFER_FAILED",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 引擎内部从不重试，由调用方（队列/调度器）根据该标记决定是否重投
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_) | Self::ExternalService { .. } | Self::ConcurrencyConflict(_)
        )
    }

    /// 是否为调用方输入错误（未改变任何状态）
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::AccountNotFound(_) | Self::BoostNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            BoostError::TransferFailed("float rejected".into()).error_code(),
            "TRANSFER_FAILED"
        );
        assert_eq!(
            BoostError::from(ConditionParseError::UnknownType("foo".into())).error_code(),
            "CONDITION_PARSE_ERROR"
        );
    }

    #[test]
    fn test_transfer_failure_not_retryable() {
        // 转账被拒绝后不能自动重试，否则可能重复付款
        assert!(!BoostError::TransferFailed("rejected".into()).is_retryable());
        assert!(BoostError::ConcurrencyConflict("boost-1".into()).is_retryable());
        assert!(
            BoostError::ExternalService {
                service: "history".into(),
                message: "timeout".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_client_error() {
        assert!(BoostError::Validation("missing account".into()).is_client_error());
        assert!(!BoostError::Internal("oops".into()).is_client_error());
    }

    #[test]
    fn test_parse_error_display() {
        let err = ConditionParseError::MissingParameter {
            kind: "save_completed_by".into(),
        };
        assert_eq!(err.to_string(), "条件 save_completed_by 缺少参数 #{...}");
    }
}
