//! 条件 DSL 解析
//!
//! 语法固定为 `<conditionType> #{<param>}`，参数内部以 `::` 分隔。
//! boost 加载时一次性解析为 [`Condition`]，之后评估不再做字符串处理。

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConditionParseError;
use crate::models::Money;

static PARAMETER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\{(.*)\}").unwrap());

/// 条件类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConditionKind {
    #[serde(rename = "save_event_greater_than")]
    SaveEventGreaterThan,
    #[serde(rename = "save_completed_by")]
    SaveCompletedBy,
    #[serde(rename = "first_save_by")]
    FirstSaveBy,
    #[serde(rename = "first_save_above")]
    FirstSaveAbove,
    #[serde(rename = "balance_below")]
    BalanceBelow,
    #[serde(rename = "withdrawal_before")]
    WithdrawalBefore,
    #[serde(rename = "number_taps_greater_than")]
    NumberTapsGreaterThan,
    #[serde(rename = "number_taps_in_first_N")]
    NumberTapsInFirstN,
    #[serde(rename = "percent_destroyed_above")]
    PercentDestroyedAbove,
    #[serde(rename = "percent_destroyed_in_first_N")]
    PercentDestroyedInFirstN,
    #[serde(rename = "randomly_chosen_first_N")]
    RandomlyChosenFirstN,
    #[serde(rename = "friends_added_since")]
    FriendsAddedSince,
    #[serde(rename = "total_number_friends")]
    TotalNumberFriends,
    #[serde(rename = "event_occurs")]
    EventOccurs,
    #[serde(rename = "event_does_follow")]
    EventDoesFollow,
    #[serde(rename = "event_does_not_follow")]
    EventDoesNotFollow,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 16] = [
        Self::SaveEventGreaterThan,
        Self::SaveCompletedBy,
        Self::FirstSaveBy,
        Self::FirstSaveAbove,
        Self::BalanceBelow,
        Self::WithdrawalBefore,
        Self::NumberTapsGreaterThan,
        Self::NumberTapsInFirstN,
        Self::PercentDestroyedAbove,
        Self::PercentDestroyedInFirstN,
        Self::RandomlyChosenFirstN,
        Self::FriendsAddedSince,
        Self::TotalNumberFriends,
        Self::EventOccurs,
        Self::EventDoesFollow,
        Self::EventDoesNotFollow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SaveEventGreaterThan => "save_event_greater_than",
            Self::SaveCompletedBy => "save_completed_by",
            Self::FirstSaveBy => "first_save_by",
            Self::FirstSaveAbove => "first_save_above",
            Self::BalanceBelow => "balance_below",
            Self::WithdrawalBefore => "withdrawal_before",
            Self::NumberTapsGreaterThan => "number_taps_greater_than",
            Self::NumberTapsInFirstN => "number_taps_in_first_N",
            Self::PercentDestroyedAbove => "percent_destroyed_above",
            Self::PercentDestroyedInFirstN => "percent_destroyed_in_first_N",
            Self::RandomlyChosenFirstN => "randomly_chosen_first_N",
            Self::FriendsAddedSince => "friends_added_since",
            Self::TotalNumberFriends => "total_number_friends",
            Self::EventOccurs => "event_occurs",
            Self::EventDoesFollow => "event_does_follow",
            Self::EventDoesNotFollow => "event_does_not_follow",
        }
    }

    /// 依赖两个事件先后关系的条件
    pub fn is_sequence(&self) -> bool {
        matches!(self, Self::EventDoesFollow | Self::EventDoesNotFollow)
    }

    /// 需要全部参赛者成绩才能判定的排名条件
    pub fn is_ranking(&self) -> bool {
        matches!(
            self,
            Self::NumberTapsInFirstN | Self::PercentDestroyedInFirstN | Self::RandomlyChosenFirstN
        )
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConditionKind {
    type Err = ConditionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| ConditionParseError::UnknownType(s.to_string()))
    }
}

/// 好友数量统计口径
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendshipConstraint {
    /// 任意一方发起
    Either,
    /// 仅本人发起
    Initiated,
}

impl FriendshipConstraint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Either => "EITHER",
            Self::Initiated => "INITIATED",
        }
    }
}

/// 时间窗口单位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seconds => "SECONDS",
            Self::Minutes => "MINUTES",
            Self::Hours => "HOURS",
            Self::Days => "DAYS",
            Self::Weeks => "WEEKS",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "SECONDS" | "SECOND" => Some(Self::Seconds),
            "MINUTES" | "MINUTE" => Some(Self::Minutes),
            "HOURS" | "HOUR" => Some(Self::Hours),
            "DAYS" | "DAY" => Some(Self::Days),
            "WEEKS" | "WEEK" => Some(Self::Weeks),
            _ => None,
        }
    }
}

/// 时间序列条件参数：first 发生后 amount 个 unit 内（是否）发生 second
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSpec {
    pub first_event: String,
    pub second_event: String,
    pub amount: i64,
    pub unit: TimeUnit,
}

impl SequenceSpec {
    /// 窗口长度，超出 `Duration` 表示范围时为 None
    pub fn window(&self) -> Option<Duration> {
        match self.unit {
            TimeUnit::Seconds => Duration::try_seconds(self.amount),
            TimeUnit::Minutes => Duration::try_minutes(self.amount),
            TimeUnit::Hours => Duration::try_hours(self.amount),
            TimeUnit::Days => Duration::try_days(self.amount),
            TimeUnit::Weeks => Duration::try_weeks(self.amount),
        }
    }
}

/// 解析后的条件
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    SaveEventGreaterThan(Money),
    SaveCompletedBy(String),
    FirstSaveBy(String),
    FirstSaveAbove(Money),
    BalanceBelow(Money),
    WithdrawalBefore(DateTime<Utc>),
    NumberTapsGreaterThan { threshold: i64, max_time_millis: i64 },
    NumberTapsInFirstN { top_n: usize, max_time_millis: i64 },
    PercentDestroyedAbove { threshold: f64, max_time_millis: i64 },
    PercentDestroyedInFirstN { top_n: usize, max_time_millis: i64 },
    RandomlyChosenFirstN { top_n: usize },
    FriendsAddedSince { count: usize, since: DateTime<Utc> },
    TotalNumberFriends { count: usize, constraint: FriendshipConstraint },
    EventOccurs(String),
    EventDoesFollow(SequenceSpec),
    EventDoesNotFollow(SequenceSpec),
}

impl Condition {
    pub fn kind(&self) -> ConditionKind {
        match self {
            Self::SaveEventGreaterThan(_) => ConditionKind::SaveEventGreaterThan,
            Self::SaveCompletedBy(_) => ConditionKind::SaveCompletedBy,
            Self::FirstSaveBy(_) => ConditionKind::FirstSaveBy,
            Self::FirstSaveAbove(_) => ConditionKind::FirstSaveAbove,
            Self::BalanceBelow(_) => ConditionKind::BalanceBelow,
            Self::WithdrawalBefore(_) => ConditionKind::WithdrawalBefore,
            Self::NumberTapsGreaterThan { .. } => ConditionKind::NumberTapsGreaterThan,
            Self::NumberTapsInFirstN { .. } => ConditionKind::NumberTapsInFirstN,
            Self::PercentDestroyedAbove { .. } => ConditionKind::PercentDestroyedAbove,
            Self::PercentDestroyedInFirstN { .. } => ConditionKind::PercentDestroyedInFirstN,
            Self::RandomlyChosenFirstN { .. } => ConditionKind::RandomlyChosenFirstN,
            Self::FriendsAddedSince { .. } => ConditionKind::FriendsAddedSince,
            Self::TotalNumberFriends { .. } => ConditionKind::TotalNumberFriends,
            Self::EventOccurs(_) => ConditionKind::EventOccurs,
            Self::EventDoesFollow(_) => ConditionKind::EventDoesFollow,
            Self::EventDoesNotFollow(_) => ConditionKind::EventDoesNotFollow,
        }
    }

    /// 时间序列条件的参数
    pub fn sequence(&self) -> Option<&SequenceSpec> {
        match self {
            Self::EventDoesFollow(spec) | Self::EventDoesNotFollow(spec) => Some(spec),
            _ => None,
        }
    }

    /// 解析单个条件字符串
    pub fn parse(raw: &str) -> Result<Self, ConditionParseError> {
        let raw = raw.trim();
        let kind_str = raw.split_whitespace().next().unwrap_or_default();
        if kind_str.is_empty() {
            return Err(ConditionParseError::MissingType(raw.to_string()));
        }
        let kind: ConditionKind = kind_str.parse()?;

        let param = PARAMETER_PATTERN
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| ConditionParseError::MissingParameter {
                kind: kind.as_str().to_string(),
            })?;

        let p = ParamReader::new(kind, param);

        let condition = match kind {
            ConditionKind::SaveEventGreaterThan => Self::SaveEventGreaterThan(p.money()?),
            ConditionKind::SaveCompletedBy => Self::SaveCompletedBy(p.non_empty()?),
            ConditionKind::FirstSaveBy => Self::FirstSaveBy(p.non_empty()?),
            ConditionKind::FirstSaveAbove => Self::FirstSaveAbove(p.money()?),
            ConditionKind::BalanceBelow => Self::BalanceBelow(p.money()?),
            ConditionKind::WithdrawalBefore => {
                let [millis] = p.parts::<1>()?;
                Self::WithdrawalBefore(p.instant(millis)?)
            }
            ConditionKind::NumberTapsGreaterThan => {
                let [threshold, max_time] = p.parts::<2>()?;
                Self::NumberTapsGreaterThan {
                    threshold: p.int(threshold)?,
                    max_time_millis: p.int(max_time)?,
                }
            }
            ConditionKind::NumberTapsInFirstN => {
                let [top_n, max_time] = p.parts::<2>()?;
                Self::NumberTapsInFirstN {
                    top_n: p.count(top_n)?,
                    max_time_millis: p.int(max_time)?,
                }
            }
            ConditionKind::PercentDestroyedAbove => {
                let [threshold, max_time] = p.parts::<2>()?;
                Self::PercentDestroyedAbove {
                    threshold: p.float(threshold)?,
                    max_time_millis: p.int(max_time)?,
                }
            }
            ConditionKind::PercentDestroyedInFirstN => {
                let [top_n, max_time] = p.parts::<2>()?;
                Self::PercentDestroyedInFirstN {
                    top_n: p.count(top_n)?,
                    max_time_millis: p.int(max_time)?,
                }
            }
            ConditionKind::RandomlyChosenFirstN => {
                let [top_n] = p.parts::<1>()?;
                Self::RandomlyChosenFirstN {
                    top_n: p.count(top_n)?,
                }
            }
            ConditionKind::FriendsAddedSince => {
                let [count, since] = p.parts::<2>()?;
                Self::FriendsAddedSince {
                    count: p.count(count)?,
                    since: p.instant(since)?,
                }
            }
            ConditionKind::TotalNumberFriends => {
                let [count, constraint] = p.parts::<2>()?;
                let constraint = match constraint {
                    "EITHER" => FriendshipConstraint::Either,
                    "INITIATED" => FriendshipConstraint::Initiated,
                    other => return Err(p.invalid(other, "应为 EITHER 或 INITIATED")),
                };
                Self::TotalNumberFriends {
                    count: p.count(count)?,
                    constraint,
                }
            }
            ConditionKind::EventOccurs => Self::EventOccurs(p.non_empty()?),
            ConditionKind::EventDoesFollow => Self::EventDoesFollow(p.sequence()?),
            ConditionKind::EventDoesNotFollow => Self::EventDoesNotFollow(p.sequence()?),
        };

        Ok(condition)
    }
}

impl FromStr for Condition {
    type Err = ConditionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// 还原为规范的条件字符串
impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        let param = match self {
            Self::SaveEventGreaterThan(m) | Self::FirstSaveAbove(m) | Self::BalanceBelow(m) => {
                m.to_string()
            }
            Self::SaveCompletedBy(v) | Self::FirstSaveBy(v) | Self::EventOccurs(v) => v.clone(),
            Self::WithdrawalBefore(at) => at.timestamp_millis().to_string(),
            Self::NumberTapsGreaterThan {
                threshold,
                max_time_millis,
            } => format!("{threshold}::{max_time_millis}"),
            Self::PercentDestroyedAbove {
                threshold,
                max_time_millis,
            } => format!("{threshold}::{max_time_millis}"),
            Self::NumberTapsInFirstN {
                top_n,
                max_time_millis,
            }
            | Self::PercentDestroyedInFirstN {
                top_n,
                max_time_millis,
            } => format!("{top_n}::{max_time_millis}"),
            Self::RandomlyChosenFirstN { top_n } => top_n.to_string(),
            Self::FriendsAddedSince { count, since } => {
                format!("{count}::{}", since.timestamp_millis())
            }
            Self::TotalNumberFriends { count, constraint } => {
                format!("{count}::{}", constraint.as_str())
            }
            Self::EventDoesFollow(spec) | Self::EventDoesNotFollow(spec) => format!(
                "{}::{}::{}::{}",
                spec.first_event,
                spec.second_event,
                spec.amount,
                spec.unit.as_str()
            ),
        };
        write!(f, "{kind} #{{{param}}}")
    }
}

/// 参数读取辅助，统一生成带上下文的错误
struct ParamReader<'a> {
    kind: ConditionKind,
    raw: &'a str,
}

impl<'a> ParamReader<'a> {
    fn new(kind: ConditionKind, raw: &'a str) -> Self {
        Self { kind, raw }
    }

    fn invalid(&self, value: &str, reason: &str) -> ConditionParseError {
        ConditionParseError::InvalidParameter {
            kind: self.kind.as_str().to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    fn parts<const N: usize>(&self) -> Result<[&'a str; N], ConditionParseError> {
        let parts: Vec<&'a str> = self.raw.split("::").map(str::trim).collect();
        parts
            .try_into()
            .map_err(|_: Vec<&str>| self.invalid(self.raw, &format!("应包含 {N} 段 :: 分隔的参数")))
    }

    fn non_empty(&self) -> Result<String, ConditionParseError> {
        let value = self.raw.trim();
        if value.is_empty() {
            return Err(self.invalid(value, "参数不能为空"));
        }
        Ok(value.to_string())
    }

    fn money(&self) -> Result<Money, ConditionParseError> {
        Money::parse(self.raw.trim()).map_err(|e| self.invalid(self.raw, &e.to_string()))
    }

    fn int(&self, value: &str) -> Result<i64, ConditionParseError> {
        value
            .parse::<i64>()
            .map_err(|_| self.invalid(value, "应为整数"))
    }

    fn count(&self, value: &str) -> Result<usize, ConditionParseError> {
        value
            .parse::<usize>()
            .map_err(|_| self.invalid(value, "应为非负整数"))
    }

    fn float(&self, value: &str) -> Result<f64, ConditionParseError> {
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.invalid(value, "应为数值"))
    }

    fn instant(&self, value: &str) -> Result<DateTime<Utc>, ConditionParseError> {
        let millis = self.int(value)?;
        DateTime::from_timestamp_millis(millis).ok_or_else(|| self.invalid(value, "时间戳越界"))
    }

    fn sequence(&self) -> Result<SequenceSpec, ConditionParseError> {
        let [first_event, second_event, amount, unit] = self.parts::<4>()?;
        if first_event.is_empty() || second_event.is_empty() {
            return Err(self.invalid(self.raw, "事件类型不能为空"));
        }
        let amount = self.int(amount)?;
        if amount <= 0 {
            return Err(self.invalid(&amount.to_string(), "时间窗口必须为正数"));
        }
        let unit = TimeUnit::parse(unit).ok_or_else(|| self.invalid(unit, "未知时间单位"))?;

        let spec = SequenceSpec {
            first_event: first_event.to_string(),
            second_event: second_event.to_string(),
            amount,
            unit,
        };
        if spec.window().is_none() {
            return Err(self.invalid(&amount.to_string(), "时间窗口超出范围"));
        }
        Ok(spec)
    }
}
