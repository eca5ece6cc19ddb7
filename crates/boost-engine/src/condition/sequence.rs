//! 时间序列条件评估
//!
//! 基于预取的用户历史判断两个事件的先后关系。窗口为 (t, t + window]，t 为首事件时间。

use chrono::{DateTime, Utc};

use super::parser::SequenceSpec;
use crate::models::HistoricalEvent;

fn first_event_times<'a>(
    history: &'a [HistoricalEvent],
    spec: &'a SequenceSpec,
) -> impl Iterator<Item = DateTime<Utc>> + 'a {
    history
        .iter()
        .filter(move |e| e.event_type == spec.first_event)
        .map(|e| e.timestamp)
}

/// 窗口结束时刻，越界时为 None（窗口不会结束）
fn window_end(spec: &SequenceSpec, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
    spec.window().and_then(|window| start.checked_add_signed(window))
}

fn second_in_window(history: &[HistoricalEvent], spec: &SequenceSpec, start: DateTime<Utc>) -> bool {
    let end = window_end(spec, start);
    history.iter().any(|e| {
        e.event_type == spec.second_event
            && e.timestamp > start
            && end.is_none_or(|end| e.timestamp <= end)
    })
}

/// 存在某个首事件，其后窗口内发生了次事件
pub fn event_does_follow(history: &[HistoricalEvent], spec: &SequenceSpec) -> bool {
    first_event_times(history, spec).any(|start| second_in_window(history, spec, start))
}

/// 存在某个首事件，其窗口在 `now` 之前已结束，且窗口内没有发生次事件
pub fn event_does_not_follow(
    history: &[HistoricalEvent],
    spec: &SequenceSpec,
    now: DateTime<Utc>,
) -> bool {
    first_event_times(history, spec)
        .filter(|start| window_end(spec, *start).is_some_and(|end| end <= now))
        .any(|start| !second_in_window(history, spec, start))
}
