//! 兑现 / 撤销协调
//!
//! 资金划转成功之前不会产生任何消息、事件或状态记录。
//! 划转成功后的通知失败只记录错误，不再回传给调用方：
//! 资金已经移动，调用方此时必须继续写入状态，否则重投会造成重复划转。
//!
//! ## 流程
//!
//! 1. 奖池类 boost：先把贡献从参与账户划回奖池，再计算并持久化最终金额
//! 2. 生成全部划转指令，一次批量提交
//! 3. 按 REDEEMED 消息模板发送用户消息
//! 4. 逐账户发布 BOOST_REDEEMED / BOOST_REVOKED

use std::sync::Arc;
use std::time::Instant;

use boost_shared::observability::metrics;
use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use super::dto::PooledContributionMap;
use super::reward::RewardCalculator;
use crate::clients::{
    Collaborators, MessageInstruction, PublishOptions, Recipient, TransferInstruction,
    TransferResults,
};
use crate::error::{BoostError, Result};
use crate::models::{
    AccountUserMap, AffectedAccounts, Boost, BoostStatus, EnrichedEvent, Money, TransactionType,
};
use crate::repository::Repositories;

pub const BOOST_REDEEMED: &str = "BOOST_REDEEMED";
pub const BOOST_REVOKED: &str = "BOOST_REVOKED";

/// 一次兑现 / 撤销请求
pub struct RedemptionRequest<'a> {
    pub redemption_boosts: &'a [Boost],
    pub revocation_boosts: &'a [Boost],
    pub affected_accounts: &'a AffectedAccounts,
    pub pooled_contributions: &'a PooledContributionMap,
    pub event: &'a EnrichedEvent,
}

/// 待提交的单个 boost 划转
struct PreparedTransfer<'a> {
    boost: &'a Boost,
    /// 本次每个账户的金额（boost 单位，撤销为负）
    amount: i64,
    revoke: bool,
    accounts: &'a AccountUserMap,
}

impl PreparedTransfer<'_> {
    fn money(&self) -> Money {
        Money::new(self.amount, self.boost.boost_unit, self.boost.boost_currency.clone())
    }
}

pub struct RedemptionCoordinator {
    repos: Repositories,
    clients: Collaborators,
    rewards: Arc<RewardCalculator>,
}

impl RedemptionCoordinator {
    pub fn new(repos: Repositories, clients: Collaborators, rewards: Arc<RewardCalculator>) -> Self {
        Self {
            repos,
            clients,
            rewards,
        }
    }

    /// 兑现与撤销
    ///
    /// 返回 boost_id -> 划转结果，`boost_amount` 字段回填为本次实际金额
    #[instrument(
        skip(self, request),
        fields(
            redeem = request.redemption_boosts.len(),
            revoke = request.revocation_boosts.len(),
            event_type = %request.event.event_type()
        )
    )]
    pub async fn redeem_or_revoke_boosts(&self, request: RedemptionRequest<'_>) -> Result<TransferResults> {
        let start = Instant::now();

        let mut prepared = Vec::new();
        for boost in request.redemption_boosts {
            if let Some(transfer) = self.prepare_redemption(boost, &request).await? {
                prepared.push(transfer);
            }
        }
        for boost in request.revocation_boosts {
            let Some(accounts) = non_empty_accounts(request.affected_accounts, boost) else {
                continue;
            };
            prepared.push(PreparedTransfer {
                boost,
                amount: -boost.boost_amount,
                revoke: true,
                accounts,
            });
        }

        if prepared.is_empty() {
            info!("没有需要划转的账户");
            return Ok(TransferResults::new());
        }

        let instructions: Vec<TransferInstruction> = prepared.iter().map(build_instruction).collect();
        let mut results = match self.clients.transfer.transfer(&instructions).await {
            Ok(results) => results,
            Err(e) => {
                error!(error = %e, "资金划转失败，放弃本批兑现");
                metrics::record_transfer("failed");
                for transfer in &prepared {
                    metrics::record_redemption(kind_label(transfer.revoke), "failed", start.elapsed().as_secs_f64());
                }
                return Err(match e {
                    BoostError::TransferFailed(_) => e,
                    other => BoostError::TransferFailed(other.to_string()),
                });
            }
        };
        metrics::record_transfer("success");

        for transfer in &prepared {
            results
                .entry(transfer.boost.boost_id.clone())
                .or_default()
                .boost_amount = Some(transfer.amount);
        }

        self.send_redemption_messages(&prepared).await;
        self.publish_outcomes(&prepared, &results, request.event).await;

        for transfer in &prepared {
            metrics::record_redemption(kind_label(transfer.revoke), "success", start.elapsed().as_secs_f64());
        }
        info!(boosts = prepared.len(), "兑现/撤销完成");

        Ok(results)
    }

    async fn prepare_redemption<'a>(
        &self,
        boost: &'a Boost,
        request: &RedemptionRequest<'a>,
    ) -> Result<Option<PreparedTransfer<'a>>> {
        let Some(accounts) = non_empty_accounts(request.affected_accounts, boost) else {
            return Ok(None);
        };

        let mut pool_size = 0;
        if boost.is_pooled() {
            let contributors = request
                .pooled_contributions
                .get(&boost.boost_id)
                .filter(|ids| !ids.is_empty())
                .ok_or_else(|| {
                    BoostError::Validation(format!("奖池 boost {} 没有贡献账户", boost.boost_id))
                })?;
            pool_size = contributors.len();
            self.collect_pool_contributions(boost, contributors).await?;
        }

        let amount = self.rewards.calculate(boost, pool_size)?;
        if boost.is_pooled() && amount != boost.boost_amount {
            self.repos
                .boosts
                .update_boost_amount(&boost.boost_id, boost.boost_amount, amount)
                .await?;
            info!(boost_id = %boost.boost_id, old = boost.boost_amount, new = amount, "奖池金额已确定");
        }

        Ok(Some(PreparedTransfer {
            boost,
            amount,
            revoke: false,
            accounts,
        }))
    }

    /// 把每个贡献者的奖池份额划回奖池
    async fn collect_pool_contributions(&self, boost: &Boost, contributors: &[String]) -> Result<()> {
        let Some(contribution) = boost
            .reward_parameters
            .as_ref()
            .and_then(|p| p.pool_contribution_per_user.as_ref())
        else {
            return Err(BoostError::Validation(format!(
                "奖池 boost {} 缺少 poolContributionPerUser",
                boost.boost_id
            )));
        };

        let recipients = contributors
            .iter()
            .map(|account_id| Recipient::account(account_id.clone(), -contribution.amount))
            .collect();
        let instruction = TransferInstruction::from_bonus_pool(
            boost,
            TransactionType::BoostReversal,
            &contribution.currency,
            contribution.unit,
            recipients,
        );

        self.clients.transfer.transfer(&[instruction]).await.map_err(|e| {
            metrics::record_transfer("failed");
            warn!(boost_id = %boost.boost_id, error = %e, "奖池贡献划转失败");
            match e {
                BoostError::TransferFailed(_) => e,
                other => BoostError::TransferFailed(other.to_string()),
            }
        })?;
        metrics::record_transfer("success");
        info!(boost_id = %boost.boost_id, contributors = contributors.len(), "奖池贡献已归集");
        Ok(())
    }

    async fn send_redemption_messages(&self, prepared: &[PreparedTransfer<'_>]) {
        let instructions: Vec<MessageInstruction> = prepared
            .iter()
            .filter(|t| !t.revoke)
            .flat_map(|t| assemble_messages(t.boost, t.accounts, &t.money(), BoostStatus::Redeemed))
            .collect();

        if instructions.is_empty() {
            return;
        }
        if let Err(e) = self.clients.messenger.send_messages(&instructions).await {
            error!(error = %e, count = instructions.len(), "兑现消息发送失败");
        }
    }

    async fn publish_outcomes(
        &self,
        prepared: &[PreparedTransfer<'_>],
        results: &TransferResults,
        event: &EnrichedEvent,
    ) {
        let update_time = Utc::now().timestamp_millis();
        let mut publishes = Vec::new();

        for transfer in prepared {
            let event_type = if transfer.revoke { BOOST_REVOKED } else { BOOST_REDEEMED };
            let initiator = event
                .account_id()
                .and_then(|id| transfer.accounts.get(id))
                .map(|info| info.user_id.clone());

            for (account_id, info) in transfer.accounts {
                let context = json!({
                    "accountId": account_id,
                    "boostId": transfer.boost.boost_id,
                    "boostType": transfer.boost.boost_type,
                    "boostCategory": transfer.boost.boost_category,
                    "boostUpdateTimeMillis": update_time,
                    "boostAmount": transfer.money().to_string(),
                    "transferResults": results.get(&transfer.boost.boost_id),
                    "triggeringEventContext": event.context(),
                });
                let options = PublishOptions {
                    context,
                    initiator: initiator.clone(),
                };
                let publisher = self.clients.publisher.clone();
                let user_id = info.user_id.clone();
                publishes.push(async move {
                    if let Err(e) = publisher.publish_user_event(&user_id, event_type, options).await {
                        error!(user_id = %user_id, event_type, error = %e, "兑现事件发布失败");
                    }
                });
            }
        }

        join_all(publishes).await;
    }
}

fn kind_label(revoke: bool) -> &'static str {
    if revoke { "revoke" } else { "redeem" }
}

fn non_empty_accounts<'a>(affected: &'a AffectedAccounts, boost: &Boost) -> Option<&'a AccountUserMap> {
    let accounts = affected.get(&boost.boost_id).filter(|m| !m.is_empty());
    if accounts.is_none() {
        warn!(boost_id = %boost.boost_id, "boost 没有受影响账户，跳过划转");
    }
    accounts
}

fn build_instruction(transfer: &PreparedTransfer<'_>) -> TransferInstruction {
    let transaction_type = if transfer.revoke {
        TransactionType::BoostReversal
    } else {
        TransactionType::BoostRedemption
    };
    let recipients = transfer
        .accounts
        .keys()
        .map(|account_id| Recipient::account(account_id.clone(), transfer.amount))
        .collect();

    TransferInstruction::from_bonus_pool(
        transfer.boost,
        transaction_type,
        &transfer.boost.boost_currency,
        transfer.boost.boost_unit,
        recipients,
    )
}

/// 按状态组装消息：ALL 发给全部受影响用户，指定账户只发给该用户，未匹配的账户不发
pub(crate) fn assemble_messages(
    boost: &Boost,
    accounts: &AccountUserMap,
    amount: &Money,
    status: BoostStatus,
) -> Vec<MessageInstruction> {
    let parameters = json!({ "boostAmount": amount.format_whole_currency() });

    boost
        .message_instructions
        .iter()
        .filter(|entry| entry.status == status)
        .flat_map(|entry| {
            let targets: Vec<&str> = if entry.targets_all() {
                accounts.values().map(|info| info.user_id.as_str()).collect()
            } else if let Some(info) = accounts.get(&entry.account_id) {
                vec![info.user_id.as_str()]
            } else {
                warn!(boost_id = %boost.boost_id, target = %entry.account_id, "消息目标账户不在受影响账户中");
                Vec::new()
            };

            targets
                .into_iter()
                .map(|user_id| MessageInstruction {
                    instruction_id: entry.msg_instruction_id.clone(),
                    destination_user_id: user_id.to_string(),
                    parameters: parameters.clone(),
                    trigger_balance_fetch: true,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}
