//! 资金划转服务客户端
//!
//! 一次调用提交所有 boost 的划转指令，任一指令失败整批视为失败。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use super::http::JsonHttpClient;
use crate::error::{BoostError, Result};
use crate::models::{Boost, MoneyUnit, TransactionType};

pub const BONUS_POOL: &str = "BONUS_POOL";
pub const END_USER_ACCOUNT: &str = "END_USER_ACCOUNT";
pub const SETTLED: &str = "SETTLED";

// ---------------------------------------------------------------------------
// 指令与结果
// ---------------------------------------------------------------------------

/// 划转收款方
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub recipient_id: String,
    /// 撤销时为负数
    pub amount: i64,
    pub recipient_type: String,
}

impl Recipient {
    pub fn account(account_id: impl Into<String>, amount: i64) -> Self {
        Self {
            recipient_id: account_id.into(),
            amount,
            recipient_type: END_USER_ACCOUNT.to_string(),
        }
    }
}

/// 单个 boost 的划转指令
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferInstruction {
    pub float_id: String,
    pub from_id: String,
    pub from_type: String,
    pub currency: String,
    pub unit: MoneyUnit,
    /// boost_id，结果按此键返回
    pub identifier: String,
    pub related_entity_type: TransactionType,
    pub alloc_type: TransactionType,
    pub alloc_state: String,
    pub transaction_type: TransactionType,
    pub settlement_status: String,
    pub recipients: Vec<Recipient>,
}

impl TransferInstruction {
    /// 从 boost 的奖金池划出
    pub fn from_bonus_pool(
        boost: &Boost,
        transaction_type: TransactionType,
        currency: &str,
        unit: MoneyUnit,
        recipients: Vec<Recipient>,
    ) -> Self {
        Self {
            float_id: boost.from_float_id.clone(),
            from_id: boost.from_bonus_pool_id.clone(),
            from_type: BONUS_POOL.to_string(),
            currency: currency.to_string(),
            unit,
            identifier: boost.boost_id.clone(),
            related_entity_type: transaction_type,
            alloc_type: transaction_type,
            alloc_state: SETTLED.to_string(),
            transaction_type,
            settlement_status: SETTLED.to_string(),
            recipients,
        }
    }

    pub fn total_amount(&self) -> i64 {
        self.recipients.iter().map(|r| r.amount).sum()
    }
}

/// 单个 identifier 的划转结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub result: String,
    #[serde(default)]
    pub float_tx_ids: Vec<String>,
    #[serde(default)]
    pub account_tx_ids: Vec<String>,
    /// 实际划转金额（奖池类由调用方回填）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost_amount: Option<i64>,
}

impl TransferResult {
    pub const SUCCESS: &'static str = "SUCCESS";

    pub fn is_success(&self) -> bool {
        self.result == Self::SUCCESS
    }
}

/// boost_id -> 划转结果
pub type TransferResults = HashMap<String, TransferResult>;

#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    instructions: &'a [TransferInstruction],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferResponse {
    status_code: u16,
    #[serde(default)]
    body: TransferResults,
    #[serde(default)]
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Trait 抽象
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TransferClient: Send + Sync {
    /// 成功时返回按 identifier 分组的结果；被拒绝时返回 TransferFailed
    async fn transfer(&self, instructions: &[TransferInstruction]) -> Result<TransferResults>;
}

// ---------------------------------------------------------------------------
// HTTP 实现
// ---------------------------------------------------------------------------

pub struct HttpTransferClient {
    http: JsonHttpClient,
}

impl HttpTransferClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: JsonHttpClient::new("transfer", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl TransferClient for HttpTransferClient {
    #[instrument(skip(self, instructions), fields(count = instructions.len()))]
    async fn transfer(&self, instructions: &[TransferInstruction]) -> Result<TransferResults> {
        let response: TransferResponse = self
            .http
            .post_json("/transfers", &TransferRequest { instructions })
            .await?;

        if response.status_code != 200 {
            let reason = response.message.unwrap_or_default();
            warn!(status_code = response.status_code, reason = %reason, "资金划转被拒绝");
            return Err(BoostError::TransferFailed(format!(
                "status_code={} {reason}",
                response.status_code
            )));
        }

        if let Some((identifier, failed)) = response.body.iter().find(|(_, r)| !r.is_success()) {
            warn!(identifier = %identifier, result = %failed.result, "资金划转部分失败");
            return Err(BoostError::TransferFailed(format!(
                "identifier={identifier} result={}",
                failed.result
            )));
        }

        info!(identifiers = response.body.len(), "资金划转完成");
        Ok(response.body)
    }
}
