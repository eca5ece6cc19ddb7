//! 领域事件模型
//!
//! `DomainEvent` 由入口处构造后不再修改；需要附加的历史记录、评估时间等派生数据
//! 通过 `EnrichedEvent` 一次性组合，沿调用链显式传递。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 储蓄成功事件
pub const SAVING_PAYMENT_SUCCESSFUL: &str = "SAVING_PAYMENT_SUCCESSFUL";
/// 定时序列扫描构造的合成事件
pub const SEQUENCE_CHECK: &str = "SEQUENCE_CHECK";
/// 到期处理构造的合成事件
pub const BOOST_EXPIRED: &str = "BOOST_EXPIRED";
/// 游戏提交事件
pub const USER_GAME_COMPLETION: &str = "USER_GAME_COMPLETION";

/// 好友关系
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friendship {
    pub creation_time_millis: i64,
    #[serde(default)]
    pub user_initiated: bool,
}

/// 游戏成绩条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameScoreEntry {
    pub account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_taps: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_destroyed: Option<f64>,
    pub time_taken_millis: i64,
}

/// 随机抽奖分数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomScoreEntry {
    pub account_id: String,
    pub score: f64,
}

/// 用户历史中的单条事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalEvent {
    pub event_type: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// 事件负载
///
/// 已知字段强类型化，其余字段保留在 `extra` 中原样透传
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    /// `amount::unit::currency`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_save: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_in_millis: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transaction_tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_taps: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_destroyed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_taken_millis: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub account_score_list: Vec<GameScoreEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub random_score_list: Vec<RandomScoreEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub friendship_list: Vec<Friendship>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EventContext {
    /// 交易标签中的 `BOOST::<boostId>`
    pub fn tagged_boost_id(&self) -> Option<&str> {
        self.transaction_tags
            .iter()
            .find(|tag| tag.starts_with("BOOST"))
            .and_then(|tag| tag.split("::").nth(1))
            .filter(|id| !id.is_empty())
    }
}

/// 驱动评估的领域事件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub event_context: EventContext,
}

impl DomainEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_context(mut self, context: EventContext) -> Self {
        self.event_context = context;
        self
    }

    pub fn is_saving_payment(&self) -> bool {
        self.event_type == SAVING_PAYMENT_SUCCESSFUL
    }
}

/// 基础事件 + 派生上下文
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedEvent {
    pub base: DomainEvent,
    /// 按事件类型预取的用户历史，仅时间序列条件使用
    pub event_history: Option<Vec<HistoricalEvent>>,
    /// 评估时刻，时间窗口条件以此为"现在"
    pub evaluated_at: DateTime<Utc>,
}

impl EnrichedEvent {
    pub fn new(base: DomainEvent, evaluated_at: DateTime<Utc>) -> Self {
        Self {
            base,
            event_history: None,
            evaluated_at,
        }
    }

    /// 以当前时间为评估时刻，不带历史
    pub fn now(base: DomainEvent) -> Self {
        Self::new(base, Utc::now())
    }

    /// 附加历史记录
    ///
    /// 事件管道可能先于历史落库到达，若触发事件本身不在历史中则补一条
    pub fn with_history(mut self, mut history: Vec<HistoricalEvent>) -> Self {
        let trigger_type = &self.base.event_type;
        let trigger_at = self.trigger_time();
        let already_present = history
            .iter()
            .any(|e| &e.event_type == trigger_type && e.timestamp == trigger_at);
        if !already_present && trigger_type != SEQUENCE_CHECK {
            history.push(HistoricalEvent {
                event_type: trigger_type.clone(),
                timestamp: trigger_at,
            });
        }
        history.sort_by_key(|e| e.timestamp);
        self.event_history = Some(history);
        self
    }

    /// 不补触发事件，直接使用给定历史（定时扫描用）
    pub fn with_raw_history(mut self, mut history: Vec<HistoricalEvent>) -> Self {
        history.sort_by_key(|e| e.timestamp);
        self.event_history = Some(history);
        self
    }

    /// 触发事件发生时间：事件自带的 timeInMillis，缺省为评估时刻
    pub fn trigger_time(&self) -> DateTime<Utc> {
        self.base
            .event_context
            .time_in_millis
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(self.evaluated_at)
    }

    pub fn event_type(&self) -> &str {
        &self.base.event_type
    }

    pub fn account_id(&self) -> Option<&str> {
        self.base.account_id.as_deref()
    }

    pub fn context(&self) -> &EventContext {
        &self.base.event_context
    }
}

/// 按用户分组的历史记录
pub type UserHistoryMap = HashMap<String, Vec<HistoricalEvent>>;
