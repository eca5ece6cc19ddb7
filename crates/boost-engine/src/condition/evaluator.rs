//! 条件评估器
//!
//! 纯函数式评估：给定 [`EnrichedEvent`] 与已解析的 [`Condition`]，不做任何 I/O。
//! 兼容表通过构造参数注入，便于按部署调整和单独测试。

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use boost_shared::observability::metrics;
use tracing::{debug, warn};

use super::compatibility::EventConditionMatrix;
use super::parser::{Condition, ConditionKind, FriendshipConstraint};
use super::sequence;
use crate::models::{Boost, BoostStatus, EnrichedEvent, GameScoreEntry, Money};

/// 条件评估器
#[derive(Debug, Clone)]
pub struct ConditionEvaluator {
    matrix: Arc<EventConditionMatrix>,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(EventConditionMatrix::standard()))
    }
}

impl ConditionEvaluator {
    pub fn new(matrix: Arc<EventConditionMatrix>) -> Self {
        Self { matrix }
    }

    pub fn matrix(&self) -> &EventConditionMatrix {
        &self.matrix
    }

    /// 评估单个条件
    pub fn test_condition(&self, event: &EnrichedEvent, condition: &Condition) -> bool {
        let kind = condition.kind();
        if !self.passes_gate(event, kind) {
            debug!(event_type = %event.event_type(), condition = %kind, "条件类型与事件类型不兼容");
            return false;
        }

        let matched = evaluate(event, condition);
        debug!(event_type = %event.event_type(), condition = %condition, matched, "条件评估");
        metrics::record_condition_evaluation(kind.as_str(), matched);
        matched
    }

    /// 兼容入口：直接评估条件字符串，解析失败记录错误并返回 false
    pub fn test_condition_str(&self, event: &EnrichedEvent, raw: &str) -> bool {
        match Condition::parse(raw) {
            Ok(condition) => self.test_condition(event, &condition),
            Err(e) => {
                warn!(condition = %raw, error = %e, "条件解析失败，按不满足处理");
                false
            }
        }
    }

    /// 同一状态下的全部条件均满足；空列表视为不满足
    pub fn test_conditions_for_status(&self, event: &EnrichedEvent, conditions: &[Condition]) -> bool {
        !conditions.is_empty() && conditions.iter().all(|c| self.test_condition(event, c))
    }

    /// 返回条件全部满足的状态列表（按推进顺序）
    pub fn extract_status_changes_met(&self, event: &EnrichedEvent, boost: &Boost) -> Vec<BoostStatus> {
        boost
            .status_conditions
            .iter()
            .filter(|(_, conditions)| self.test_conditions_for_status(event, conditions))
            .map(|(status, _)| *status)
            .collect()
    }

    fn passes_gate(&self, event: &EnrichedEvent, kind: ConditionKind) -> bool {
        // 携带历史的事件已经为序列条件专门准备过数据
        if kind.is_sequence() && event.event_history.is_some() {
            return true;
        }
        self.matrix.permits(event.event_type(), kind)
    }
}

fn parse_context_money(value: Option<&String>) -> Option<Money> {
    value.and_then(|raw| Money::parse(raw).ok())
}

fn at_least(value: Option<&String>, threshold: &Money) -> bool {
    parse_context_money(value)
        .is_some_and(|amount| amount.in_hundredth_cents() >= threshold.in_hundredth_cents())
}

fn evaluate(event: &EnrichedEvent, condition: &Condition) -> bool {
    let context = event.context();
    let account_id = event.account_id();

    match condition {
        Condition::SaveEventGreaterThan(threshold) => {
            let saved = parse_context_money(context.saved_amount.as_ref());
            saved.is_some_and(|amount| {
                amount.same_currency(threshold)
                    && amount.in_hundredth_cents() >= threshold.in_hundredth_cents()
            })
        }
        Condition::SaveCompletedBy(expected) => account_id == Some(expected.as_str()),
        Condition::FirstSaveBy(expected) => {
            account_id == Some(expected.as_str()) && context.first_save.unwrap_or(false)
        }
        Condition::FirstSaveAbove(threshold) => {
            context.first_save.unwrap_or(false)
                && context.save_count == Some(1)
                && at_least(context.saved_amount.as_ref(), threshold)
        }
        Condition::BalanceBelow(threshold) => parse_context_money(context.new_balance.as_ref())
            .is_some_and(|balance| balance.in_hundredth_cents() < threshold.in_hundredth_cents()),
        Condition::WithdrawalBefore(threshold) => {
            let has_withdrawal = parse_context_money(context.withdrawal_amount.as_ref())
                .is_some_and(|amount| amount.amount > 0);
            let settled_before = context
                .time_in_millis
                .is_some_and(|millis| millis < threshold.timestamp_millis());
            has_withdrawal && settled_before
        }
        Condition::NumberTapsGreaterThan {
            threshold,
            max_time_millis,
        } => {
            context.number_taps.is_some_and(|taps| taps >= *threshold)
                && context
                    .time_taken_millis
                    .is_some_and(|taken| taken <= *max_time_millis)
        }
        Condition::PercentDestroyedAbove {
            threshold,
            max_time_millis,
        } => {
            context.percent_destroyed.is_some_and(|pct| pct >= *threshold)
                && context
                    .time_taken_millis
                    .is_some_and(|taken| taken <= *max_time_millis)
        }
        Condition::NumberTapsInFirstN {
            top_n,
            max_time_millis,
        } => account_id.is_some_and(|id| {
            top_ranked(&context.account_score_list, *top_n, *max_time_millis, |e| {
                e.number_taps.map(|t| t as f64)
            })
            .contains(id)
        }),
        Condition::PercentDestroyedInFirstN {
            top_n,
            max_time_millis,
        } => account_id.is_some_and(|id| {
            top_ranked(&context.account_score_list, *top_n, *max_time_millis, |e| {
                e.percent_destroyed
            })
            .contains(id)
        }),
        Condition::RandomlyChosenFirstN { top_n } => account_id.is_some_and(|id| {
            let mut scores: Vec<_> = context.random_score_list.iter().collect();
            scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
            first_distinct(scores.into_iter().map(|s| s.account_id.as_str()), *top_n).contains(id)
        }),
        Condition::FriendsAddedSince { count, since } => {
            let since_millis = since.timestamp_millis();
            context
                .friendship_list
                .iter()
                .filter(|f| f.creation_time_millis > since_millis)
                .count()
                >= *count
        }
        Condition::TotalNumberFriends { count, constraint } => {
            let eligible = context
                .friendship_list
                .iter()
                .filter(|f| match constraint {
                    FriendshipConstraint::Either => true,
                    FriendshipConstraint::Initiated => f.user_initiated,
                })
                .count();
            eligible >= *count
        }
        Condition::EventOccurs(event_type) => event.event_type() == event_type,
        Condition::EventDoesFollow(spec) => event
            .event_history
            .as_deref()
            .is_some_and(|history| sequence::event_does_follow(history, spec)),
        Condition::EventDoesNotFollow(spec) => event
            .event_history
            .as_deref()
            .is_some_and(|history| sequence::event_does_not_follow(history, spec, event.evaluated_at)),
    }
}

/// 限时内成绩降序排名（稳定排序，同分保持原顺序），取前 N 个不同账户
fn top_ranked<'a, F>(
    entries: &'a [GameScoreEntry],
    top_n: usize,
    max_time_millis: i64,
    score: F,
) -> HashSet<&'a str>
where
    F: Fn(&GameScoreEntry) -> Option<f64>,
{
    let mut within_time: Vec<(&'a str, f64)> = entries
        .iter()
        .filter(|e| e.time_taken_millis <= max_time_millis)
        .filter_map(|e| score(e).filter(|s| *s > 0.0).map(|s| (e.account_id.as_str(), s)))
        .collect();

    within_time.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    first_distinct(within_time.into_iter().map(|(id, _)| id), top_n)
}

fn first_distinct<'a>(ids: impl Iterator<Item = &'a str>, top_n: usize) -> HashSet<&'a str> {
    let mut selected = HashSet::new();
    for id in ids {
        if selected.len() >= top_n {
            break;
        }
        selected.insert(id);
    }
    selected
}
