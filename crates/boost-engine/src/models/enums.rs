//! Boost 相关枚举类型定义
//!
//! 所有枚举使用 SCREAMING_SNAKE_CASE 进行 JSON 序列化，与上下游服务的字符串标签保持一致

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BoostError;

/// Boost 账户状态
///
/// 声明顺序即推进顺序：CREATED < OFFERED < UNLOCKED < PENDING < REDEEMED，
/// REVOKED/EXPIRED/FAILED 为终止状态，排在所有推进状态之后
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoostStatus {
    #[default]
    Created,
    Offered,
    Unlocked,
    Pending,
    Redeemed,
    Revoked,
    Expired,
    Failed,
}

impl BoostStatus {
    /// 按推进顺序排列的全部状态
    pub const ALL_SORTED: [BoostStatus; 8] = [
        Self::Created,
        Self::Offered,
        Self::Unlocked,
        Self::Pending,
        Self::Redeemed,
        Self::Revoked,
        Self::Expired,
        Self::Failed,
    ];

    /// 仍可推进的状态
    pub const ACTIVE: [BoostStatus; 4] =
        [Self::Created, Self::Offered, Self::Unlocked, Self::Pending];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Offered => "OFFERED",
            Self::Unlocked => "UNLOCKED",
            Self::Pending => "PENDING",
            Self::Redeemed => "REDEEMED",
            Self::Revoked => "REVOKED",
            Self::Expired => "EXPIRED",
            Self::Failed => "FAILED",
        }
    }

    /// 在推进顺序中的位置，数值越大越"靠后"
    pub fn rank(&self) -> usize {
        *self as usize
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    /// 终止状态：成功兑现或任一关闭状态
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for BoostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoostStatus {
    type Err = BoostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL_SORTED
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| BoostError::InvalidStatus(s.to_string()))
    }
}

/// Boost 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoostType {
    Simple,
    Game,
    Social,
    Withdrawal,
    Referral,
}

impl BoostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "SIMPLE",
            Self::Game => "GAME",
            Self::Social => "SOCIAL",
            Self::Withdrawal => "WITHDRAWAL",
            Self::Referral => "REFERRAL",
        }
    }
}

impl fmt::Display for BoostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 受众类型，决定谁可以参与
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoostAudienceType {
    General,
    Individual,
    EventDriven,
}

/// 行为标记
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoostFlag {
    /// 一次兑现即对所有参与账户生效，并关闭 boost
    RedeemAllAtOnce,
    /// 与提现相关，状态变化需要通知用户
    WithdrawalRelated,
    FriendTournament,
    AllowRepeatPlay,
    /// 引擎不关心的其它标记
    #[serde(other)]
    Other,
}

/// Boost 日志类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogType {
    StatusChange,
    GameResponse,
    GameOutcome,
    BoostPoolContribution,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusChange => "STATUS_CHANGE",
            Self::GameResponse => "GAME_RESPONSE",
            Self::GameOutcome => "GAME_OUTCOME",
            Self::BoostPoolContribution => "BOOST_POOL_CONTRIBUTION",
        }
    }
}

/// 奖励金额计算方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardType {
    /// 固定金额 boost_amount
    #[default]
    Simple,
    /// 按参与人数的奖池计算
    Pooled,
    /// 随机金额，不超过 boost_amount
    Random,
}

/// 转账交易类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    BoostRedemption,
    BoostReversal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serde_roundtrip() {
        let json = serde_json::to_string(&BoostStatus::Redeemed).unwrap();
        assert_eq!(json, "\"REDEEMED\"");
        let parsed: BoostStatus = serde_json::from_str("\"PENDING\"").unwrap();
        assert_eq!(parsed, BoostStatus::Pending);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("OFFERED".parse::<BoostStatus>().unwrap(), BoostStatus::Offered);
        let err = "CANCELLED".parse::<BoostStatus>().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATUS");
    }

    #[test]
    fn test_active_and_terminal() {
        assert!(BoostStatus::Pending.is_active());
        assert!(BoostStatus::Redeemed.is_terminal());
        assert!(BoostStatus::Expired.is_terminal());
        assert!(BoostStatus::Created < BoostStatus::Redeemed);
        assert!(BoostStatus::Redeemed.rank() < BoostStatus::Revoked.rank());
    }

    #[test]
    fn test_unknown_flag_tolerated() {
        let flags: Vec<BoostFlag> =
            serde_json::from_str(r#"["REDEEM_ALL_AT_ONCE", "SOME_UI_HINT"]"#).unwrap();
        assert_eq!(flags, vec![BoostFlag::RedeemAllAtOnce, BoostFlag::Other]);
    }
}
