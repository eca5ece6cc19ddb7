//! 状态规则集与状态排序
//!
//! [`StatusRuleSet`] 保存 boost 的 目标状态 -> 条件列表 映射，
//! 反序列化时即完成全部条件解析，配置错误在加载阶段暴露。

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::{Condition, ConditionKind, SequenceSpec};
use crate::error::BoostError;
use crate::models::BoostStatus;

/// 目标状态 -> 有序条件列表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HashMap<String, Vec<String>>", into = "HashMap<String, Vec<String>>")]
pub struct StatusRuleSet {
    rules: BTreeMap<BoostStatus, Vec<Condition>>,
}

impl StatusRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为某状态追加条件
    pub fn with(mut self, status: BoostStatus, conditions: Vec<Condition>) -> Self {
        self.rules.entry(status).or_default().extend(conditions);
        self
    }

    /// 从条件字符串构造，任何一条无法解析即失败
    pub fn parse<S: AsRef<str>>(raw: &[(BoostStatus, Vec<S>)]) -> Result<Self, BoostError> {
        let mut rules = BTreeMap::new();
        for (status, conditions) in raw {
            let parsed = conditions
                .iter()
                .map(|c| Condition::parse(c.as_ref()))
                .collect::<Result<Vec<_>, _>>()?;
            rules.insert(*status, parsed);
        }
        Ok(Self { rules })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BoostStatus, &Vec<Condition>)> {
        self.rules.iter()
    }

    pub fn statuses(&self) -> impl Iterator<Item = BoostStatus> + '_ {
        self.rules.keys().copied()
    }

    pub fn conditions_for(&self, status: BoostStatus) -> &[Condition] {
        self.rules.get(&status).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn contains(&self, status: BoostStatus) -> bool {
        self.rules.contains_key(&status)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn all_conditions(&self) -> impl Iterator<Item = &Condition> {
        self.rules.values().flatten()
    }

    /// 是否包含时间序列条件
    pub fn has_time_based_conditions(&self) -> bool {
        self.all_conditions().any(|c| c.kind().is_sequence())
    }

    /// 序列条件引用的全部事件类型（去重，保持出现顺序）
    pub fn sequence_event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for spec in self.all_conditions().filter_map(Condition::sequence) {
            for event_type in [&spec.first_event, &spec.second_event] {
                if !types.contains(event_type) {
                    types.push(event_type.clone());
                }
            }
        }
        types
    }

    /// 序列条件中最长的时间窗口
    pub fn max_sequence_window(&self) -> Option<Duration> {
        self.all_conditions()
            .filter_map(Condition::sequence)
            .filter_map(SequenceSpec::window)
            .max()
    }

    /// 最早可能有首事件计入的时刻：now 减去最长窗口，越界时取可表示的最早时刻
    pub fn earliest_sequence_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.max_sequence_window()
            .map(|window| now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC))
    }

    /// REDEEMED 条件中是否包含某类条件
    pub fn redeemed_has(&self, kind: ConditionKind) -> bool {
        self.conditions_for(BoostStatus::Redeemed)
            .iter()
            .any(|c| c.kind() == kind)
    }
}

impl<'a> IntoIterator for &'a StatusRuleSet {
    type Item = (&'a BoostStatus, &'a Vec<Condition>);
    type IntoIter = std::collections::btree_map::Iter<'a, BoostStatus, Vec<Condition>>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

impl TryFrom<HashMap<String, Vec<String>>> for StatusRuleSet {
    type Error = BoostError;

    fn try_from(raw: HashMap<String, Vec<String>>) -> Result<Self, Self::Error> {
        let mut rules = BTreeMap::new();
        for (status, conditions) in raw {
            let status: BoostStatus = status.parse()?;
            let parsed = conditions
                .iter()
                .map(|c| Condition::parse(c))
                .collect::<Result<Vec<_>, _>>()?;
            rules.insert(status, parsed);
        }
        Ok(Self { rules })
    }
}

impl From<StatusRuleSet> for HashMap<String, Vec<String>> {
    fn from(rule_set: StatusRuleSet) -> Self {
        rule_set
            .rules
            .into_iter()
            .map(|(status, conditions)| {
                (
                    status.as_str().to_string(),
                    conditions.iter().map(ToString::to_string).collect(),
                )
            })
            .collect()
    }
}

/// 状态排序：越靠后的状态排越前
///
/// FAILED > EXPIRED > REVOKED > REDEEMED > PENDING > UNLOCKED > OFFERED > CREATED，
/// 同一批同时满足 REDEEMED 与 REVOKED 时取 REVOKED
pub fn status_sorter(a: &BoostStatus, b: &BoostStatus) -> Ordering {
    b.rank().cmp(&a.rank())
}

/// 同时满足的状态中最靠后的一个
pub fn extract_highest_status(statuses_met: &[BoostStatus]) -> Option<BoostStatus> {
    let mut sorted = statuses_met.to_vec();
    sorted.sort_by(status_sorter);
    sorted.first().copied()
}
