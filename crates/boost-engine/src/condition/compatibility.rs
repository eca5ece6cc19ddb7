//! 事件类型 / 条件类型兼容表
//!
//! 每种事件只允许满足表中列出的条件类型，避免一个领域的事件负载被另一个领域的条件误读。
//! `event_occurs` 对所有事件开放，但 BOOST_* / MESSAGE_* 事件除外：
//! boost/消息发布本身不能再触发 `event_occurs` 类 boost。

use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use super::parser::ConditionKind;
use crate::models::event::{BOOST_EXPIRED, SEQUENCE_CHECK, USER_GAME_COMPLETION};

/// 不允许触发 `event_occurs` 的事件前缀
const SELF_TRIGGER_PREFIXES: [&str; 2] = ["BOOST", "MESSAGE"];

/// 事件-条件兼容表
#[derive(Debug, Clone, Default)]
pub struct EventConditionMatrix {
    allowed: HashMap<String, BTreeSet<ConditionKind>>,
}

impl EventConditionMatrix {
    /// 空表：除 `event_occurs` 外任何条件都不会被满足
    pub fn empty() -> Self {
        Self::default()
    }

    /// 内置默认表
    pub fn standard() -> Self {
        use ConditionKind::*;

        let friend_conditions = [FriendsAddedSince, TotalNumberFriends];

        Self::empty()
            .allow(
                "SAVING_PAYMENT_SUCCESSFUL",
                [
                    SaveEventGreaterThan,
                    SaveCompletedBy,
                    FirstSaveBy,
                    FirstSaveAbove,
                    BalanceBelow,
                ],
            )
            .allow("WITHDRAWAL_EVENT_CONFIRMED", [WithdrawalBefore, BalanceBelow])
            .allow(
                USER_GAME_COMPLETION,
                [NumberTapsGreaterThan, PercentDestroyedAbove],
            )
            .allow(
                BOOST_EXPIRED,
                [
                    NumberTapsInFirstN,
                    PercentDestroyedInFirstN,
                    RandomlyChosenFirstN,
                ],
            )
            .allow("FRIEND_REQUEST_TARGET_ACCEPTED", friend_conditions)
            .allow("FRIEND_REQUEST_INITIATOR_ACCEPTED", friend_conditions)
            .allow(SEQUENCE_CHECK, [EventDoesFollow, EventDoesNotFollow])
    }

    /// 为事件类型追加允许的条件类型
    pub fn allow(
        mut self,
        event_type: impl Into<String>,
        kinds: impl IntoIterator<Item = ConditionKind>,
    ) -> Self {
        self.allowed
            .entry(event_type.into())
            .or_default()
            .extend(kinds);
        self
    }

    /// 在默认表上叠加部署配置（事件类型 -> 条件类型名）
    ///
    /// 无法识别的条件类型名记录告警后忽略
    pub fn with_overrides(mut self, overrides: &HashMap<String, Vec<String>>) -> Self {
        for (event_type, kinds) in overrides {
            let parsed: Vec<ConditionKind> = kinds
                .iter()
                .filter_map(|name| match name.parse::<ConditionKind>() {
                    Ok(kind) => Some(kind),
                    Err(e) => {
                        warn!(event_type = %event_type, condition = %name, error = %e, "忽略未知的兼容表配置");
                        None
                    }
                })
                .collect();
            self = self.allow(event_type.clone(), parsed);
        }
        self
    }

    /// 该事件类型能否参与评估此类条件
    pub fn permits(&self, event_type: &str, kind: ConditionKind) -> bool {
        if kind == ConditionKind::EventOccurs {
            return !SELF_TRIGGER_PREFIXES
                .iter()
                .any(|prefix| event_type.starts_with(prefix));
        }

        self.allowed
            .get(event_type)
            .is_some_and(|kinds| kinds.contains(&kind))
    }
}
