//! 服务层数据传输对象
//!
//! 各入口的输入与处理结果，与领域模型解耦

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::clients::TransferResults;
use crate::models::BoostStatus;

/// boost_id -> 有奖池贡献的 account_id 列表
pub type PooledContributionMap = HashMap<String, Vec<String>>;

/// 单个事件的处理结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    /// 本次新建参与记录的 boost 数
    pub boosts_created: usize,
    /// 状态发生变化的 boost 数
    pub boosts_triggered: usize,
    pub updated_boost_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub transfer_results: TransferResults,
}

/// 定时序列扫描汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceSweepReport {
    pub boosts_processed: usize,
    pub boosts_triggered: usize,
    pub accounts_updated: usize,
}

/// 到期处理路径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpiryKind {
    /// 非游戏，或游戏无人参与
    Simple,
    /// 游戏但没有 REDEEMED 条件
    NoRedemptionCondition,
    Tournament,
    RandomAward,
}

impl ExpiryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "SIMPLE",
            Self::NoRedemptionCondition => "NO_REDEMPTION_CONDITION",
            Self::Tournament => "TOURNAMENT",
            Self::RandomAward => "RANDOM_AWARD",
        }
    }
}

/// 单个 boost 的到期处理结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryOutcome {
    pub boost_id: String,
    pub kind: ExpiryKind,
    pub accounts_redeemed: usize,
    pub accounts_expired: usize,
}

/// 到期扫描汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpirySweepReport {
    pub boosts_expired: usize,
    pub accounts_redeemed: usize,
    pub accounts_expired: usize,
    /// 处理失败的 boost，下次扫描不会再返回它们，需要人工跟进
    pub failed_boost_ids: Vec<String>,
}

/// 动态受众刷新汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudienceRefreshReport {
    pub boosts_refreshed: usize,
    pub accounts_added: usize,
}

/// 批处理中单个事件的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "route", content = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventRouteOutcome {
    Processed(ProcessOutcome),
    Expired(ExpiryOutcome),
}

/// 用户提交的游戏结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GameSubmission {
    #[validate(length(min = 1, message = "boostId 不能为空"))]
    pub boost_id: String,
    #[validate(range(min = 0, message = "点击次数不能为负"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_taps: Option<i64>,
    #[validate(range(min = 0.0, max = 100.0, message = "摧毁比例必须在0-100之间"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_destroyed: Option<f64>,
    #[validate(range(min = 0, message = "耗时不能为负"))]
    pub time_taken_millis: i64,
}

/// 游戏提交处理结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameResponseOutcome {
    #[serde(rename_all = "camelCase")]
    Triggered {
        statuses_met: Vec<BoostStatus>,
        /// 兑现时的实际金额
        #[serde(default, skip_serializing_if = "Option::is_none")]
        amount: Option<String>,
    },
    /// 赛事类：成绩已记录，到期时统一排名
    TournamentEntered,
    NoChange,
}
