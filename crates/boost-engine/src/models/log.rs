//! Boost 日志，只追加不修改

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::LogType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostLog {
    pub log_id: Uuid,
    pub boost_id: String,
    pub account_id: String,
    pub log_type: LogType,
    pub log_context: serde_json::Value,
    pub creation_time: DateTime<Utc>,
}

impl BoostLog {
    pub fn new(
        boost_id: impl Into<String>,
        account_id: impl Into<String>,
        log_type: LogType,
        log_context: serde_json::Value,
    ) -> Self {
        Self {
            log_id: Uuid::now_v7(),
            boost_id: boost_id.into(),
            account_id: account_id.into(),
            log_type,
            log_context,
            creation_time: Utc::now(),
        }
    }

    /// 从日志上下文读取数值字段
    pub fn context_f64(&self, key: &str) -> Option<f64> {
        self.log_context.get(key).and_then(serde_json::Value::as_f64)
    }

    pub fn context_i64(&self, key: &str) -> Option<i64> {
        self.log_context.get(key).and_then(serde_json::Value::as_i64)
    }
}
