//! Boost 定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::enums::{BoostAudienceType, BoostFlag, BoostStatus, BoostType, RewardType};
use super::money::{Money, MoneyUnit};
use crate::condition::ConditionKind;
use crate::error::{BoostError, Result};
use crate::status::StatusRuleSet;

/// 随机金额分布
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardDistribution {
    #[default]
    Uniform,
}

/// 奖励参数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RewardParameters {
    #[serde(default)]
    pub reward_type: RewardType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_contribution_per_user: Option<Money>,

    #[validate(range(min = 0.0, max = 1.0, message = "奖池比例必须在0-1之间"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_pool_as_reward: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_bonus_to_pool: Option<Money>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<RewardDistribution>,

    /// 随机金额向下取整到该值的整数倍（HUNDREDTH_CENT）
    #[validate(range(min = 1, message = "取整基数必须为正"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realized_reward_modulo_zero_target: Option<i64>,
}

/// 状态变化时发送的消息模板引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInstructionRef {
    pub status: BoostStatus,
    /// `ALL` 或具体 account_id
    pub account_id: String,
    pub msg_instruction_id: String,
}

impl MessageInstructionRef {
    pub const ALL_ACCOUNTS: &'static str = "ALL";

    pub fn targets_all(&self) -> bool {
        self.account_id == Self::ALL_ACCOUNTS
    }
}

/// 游戏参数，引擎只透传记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameParams {
    pub game_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_condition: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Boost 定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Boost {
    pub boost_id: String,
    pub boost_type: BoostType,
    pub boost_category: String,

    pub boost_amount: i64,
    pub boost_unit: MoneyUnit,
    pub boost_currency: String,

    pub from_float_id: String,
    pub from_bonus_pool_id: String,

    pub boost_start_time: DateTime<Utc>,
    pub boost_end_time: DateTime<Utc>,

    pub status_conditions: StatusRuleSet,

    pub boost_audience_type: BoostAudienceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience_id: Option<String>,
    /// 动态受众新成员加入时的初始状态
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_status: Option<BoostStatus>,

    #[serde(default)]
    pub flags: Vec<BoostFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_parameters: Option<RewardParameters>,
    #[serde(default)]
    pub message_instructions: Vec<MessageInstructionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_params: Option<GameParams>,
}

impl Boost {
    pub fn has_flag(&self, flag: &BoostFlag) -> bool {
        self.flags.contains(flag)
    }

    /// 游戏类 boost，且 REDEEMED 条件按排名决出
    pub fn is_tournament(&self) -> bool {
        self.boost_type == BoostType::Game
            && (self.status_conditions.redeemed_has(ConditionKind::NumberTapsInFirstN)
                || self
                    .status_conditions
                    .redeemed_has(ConditionKind::PercentDestroyedInFirstN))
    }

    /// REDEEMED 条件为随机抽取
    pub fn is_random_award(&self) -> bool {
        self.status_conditions
            .redeemed_has(ConditionKind::RandomlyChosenFirstN)
    }

    pub fn reward_type(&self) -> RewardType {
        self.reward_parameters
            .as_ref()
            .map(|p| p.reward_type)
            .unwrap_or_default()
    }

    pub fn is_pooled(&self) -> bool {
        self.reward_type() == RewardType::Pooled
    }

    /// 一次兑现即作用于全体参与者
    pub fn redeems_all_at_once(&self) -> bool {
        self.has_flag(&BoostFlag::RedeemAllAtOnce)
            && self.boost_audience_type == BoostAudienceType::General
    }

    pub fn boost_money(&self) -> Money {
        Money::new(self.boost_amount, self.boost_unit, self.boost_currency.clone())
    }

    /// 加载后的一致性校验
    pub fn validate_definition(&self) -> Result<()> {
        if self.boost_end_time <= self.boost_start_time {
            return Err(BoostError::Validation(format!(
                "boost {} 结束时间早于开始时间",
                self.boost_id
            )));
        }

        if let Some(params) = &self.reward_parameters {
            params
                .validate()
                .map_err(|e| BoostError::Validation(e.to_string()))?;

            if params.reward_type == RewardType::Pooled && params.pool_contribution_per_user.is_none() {
                return Err(BoostError::Validation(format!(
                    "奖池 boost {} 缺少 poolContributionPerUser",
                    self.boost_id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::condition::Condition;
    use chrono::Duration;

    /// 测试用 boost：仅 REDEEMED 条件
    pub fn boost_with_redeemed(boost_id: &str, boost_type: BoostType, conditions: &[&str]) -> Boost {
        let now = Utc::now();
        Boost {
            boost_id: boost_id.to_string(),
            boost_type,
            boost_category: "TIME_LIMITED".to_string(),
            boost_amount: 100_000,
            boost_unit: MoneyUnit::HundredthCent,
            boost_currency: "ZAR".to_string(),
            from_float_id: "primary_cash".to_string(),
            from_bonus_pool_id: "bonus_pool".to_string(),
            boost_start_time: now - Duration::days(1),
            boost_end_time: now + Duration::days(7),
            status_conditions: StatusRuleSet::new().with(
                BoostStatus::Redeemed,
                conditions.iter().map(|c| Condition::parse(c).unwrap()).collect(),
            ),
            boost_audience_type: BoostAudienceType::General,
            audience_id: None,
            default_status: None,
            flags: Vec::new(),
            reward_parameters: None,
            message_instructions: Vec::new(),
            game_params: None,
        }
    }
}
