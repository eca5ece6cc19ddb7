//! 账户参与记录与受影响账户映射

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::enums::{BoostStatus, LogType};
use super::event::HistoricalEvent;

/// Boost 与账户的参与记录，每个 (boost_id, account_id) 至多一条
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostAccountJoin {
    pub boost_id: String,
    pub account_id: String,
    pub user_id: String,
    pub boost_status: BoostStatus,
    pub active: bool,
}

/// 账户所属用户与当前（变更前）状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUserInfo {
    pub user_id: String,
    pub boost_status: BoostStatus,
}

/// account_id -> 用户信息
pub type AccountUserMap = BTreeMap<String, AccountUserInfo>;

/// boost_id -> 受影响账户
pub type AffectedAccounts = HashMap<String, AccountUserMap>;

/// 查询 boost 参与账户的条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountFilter {
    pub boost_ids: Vec<String>,
    /// None 表示不限账户
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_ids: Option<Vec<String>>,
    pub statuses: Vec<BoostStatus>,
}

impl AccountFilter {
    /// 指定 boost 下所有未终止的账户
    pub fn active_for_boost(boost_id: &str) -> Self {
        Self {
            boost_ids: vec![boost_id.to_string()],
            account_ids: None,
            statuses: BoostStatus::ACTIVE.to_vec(),
        }
    }

    pub fn restrict_to(mut self, account_ids: Vec<String>) -> Self {
        self.account_ids = Some(account_ids);
        self
    }
}

/// 按 boost 分组的账户查询结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostAccounts {
    pub boost_id: String,
    pub account_user_map: AccountUserMap,
}

/// 查询账户当前已参与 boost 的条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostFilter {
    pub account_ids: Vec<String>,
    pub statuses: Vec<BoostStatus>,
    pub active_only: bool,
    /// 仅返回预算未用尽的 boost
    pub under_budget_only: bool,
}

impl BoostFilter {
    /// 账户上仍可推进、且预算未用尽的 boost
    pub fn open_for_account(account_id: &str) -> Self {
        Self {
            account_ids: vec![account_id.to_string()],
            statuses: BoostStatus::ACTIVE.to_vec(),
            active_only: true,
            under_budget_only: true,
        }
    }
}

/// 状态变更日志上下文
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeContext {
    /// 单一旧状态，或账户间不一致时为 MIXED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_status: Option<String>,
    pub new_status: BoostStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost_amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_amount: Option<String>,
    /// EVENT / SCHEDULED / USER / EXPIRY
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_params: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_history: Option<Vec<HistoricalEvent>>,
}

impl StatusChangeContext {
    pub fn new(new_status: BoostStatus) -> Self {
        Self {
            new_status,
            ..Default::default()
        }
    }
}

/// 一批账户状态更新指令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInstruction {
    pub boost_id: String,
    pub account_ids: Vec<String>,
    pub new_status: BoostStatus,
    /// false 时 boost 本身随之关闭
    pub still_active: bool,
    pub log_type: LogType,
    pub log_context: StatusChangeContext,
}

impl UpdateInstruction {
    pub fn status_change(
        boost_id: impl Into<String>,
        account_ids: Vec<String>,
        log_context: StatusChangeContext,
    ) -> Self {
        Self {
            boost_id: boost_id.into(),
            account_ids,
            new_status: log_context.new_status,
            still_active: true,
            log_type: LogType::StatusChange,
            log_context,
        }
    }
}

/// 汇总旧状态：全部相同返回该状态，否则 MIXED
pub fn summarize_prior_status(accounts: &AccountUserMap) -> Option<String> {
    let mut statuses = accounts.values().map(|info| info.boost_status);
    let first = statuses.next()?;
    if statuses.all(|s| s == first) {
        Some(first.as_str().to_string())
    } else {
        Some("MIXED".to_string())
    }
}
