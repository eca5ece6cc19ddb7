//! 定时评估时间序列条件
//!
//! 序列条件（`event_does_follow` / `event_does_not_follow`）无法只靠单个事件触发，
//! 由定时任务为进行中账户拉取历史后统一评估。

use std::collections::HashMap;
use std::sync::Arc;

use boost_shared::observability::metrics;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument};

use super::dto::SequenceSweepReport;
use super::event_processor::fetch_pooled_contributions;
use super::redemption::{RedemptionCoordinator, RedemptionRequest};
use crate::clients::{Collaborators, HistoryQuery, TransferResults};
use crate::condition::ConditionEvaluator;
use crate::error::Result;
use crate::models::{
    AccountFilter, AccountUserMap, AffectedAccounts, Boost, BoostStatus, DomainEvent,
    EnrichedEvent, HistoricalEvent, SEQUENCE_CHECK, StatusChangeContext, UpdateInstruction,
};
use crate::repository::Repositories;
use crate::status::extract_highest_status;

/// 单个账户的评估结果
struct AccountStatusChange {
    account_id: String,
    old_status: BoostStatus,
    new_status: BoostStatus,
    history: Vec<HistoricalEvent>,
}

pub struct ScheduledSequenceProcessor {
    repos: Repositories,
    clients: Collaborators,
    evaluator: Arc<ConditionEvaluator>,
    redemption: Arc<RedemptionCoordinator>,
}

impl ScheduledSequenceProcessor {
    pub fn new(
        repos: Repositories,
        clients: Collaborators,
        evaluator: Arc<ConditionEvaluator>,
        redemption: Arc<RedemptionCoordinator>,
    ) -> Self {
        Self {
            repos,
            clients,
            evaluator,
            redemption,
        }
    }

    /// 扫描所有含序列条件的进行中 boost
    #[instrument(skip(self))]
    pub async fn process_time_based_conditions(&self) -> Result<SequenceSweepReport> {
        let boosts: Vec<Boost> = self
            .repos
            .boosts
            .fetch_active_standard_boosts()
            .await?
            .into_iter()
            .filter(|b| b.status_conditions.has_time_based_conditions() && !b.is_tournament())
            .collect();
        if boosts.is_empty() {
            debug!("没有含序列条件的进行中 boost");
            return Ok(SequenceSweepReport::default());
        }

        let filter = AccountFilter {
            boost_ids: boosts.iter().map(|b| b.boost_id.clone()).collect(),
            account_ids: None,
            statuses: BoostStatus::ACTIVE.to_vec(),
        };
        let open_accounts: HashMap<String, AccountUserMap> = self
            .repos
            .accounts
            .find_accounts_for_boost(&filter)
            .await?
            .into_iter()
            .map(|b| (b.boost_id, b.account_user_map))
            .collect();

        let now = Utc::now();
        let mut report = SequenceSweepReport {
            boosts_processed: boosts.len(),
            ..Default::default()
        };
        for boost in &boosts {
            let Some(accounts) = open_accounts.get(&boost.boost_id).filter(|m| !m.is_empty()) else {
                continue;
            };
            match self.process_boost(boost, accounts, now).await {
                Ok(0) => {}
                Ok(updated) => {
                    report.boosts_triggered += 1;
                    report.accounts_updated += updated;
                }
                Err(e) => {
                    error!(boost_id = %boost.boost_id, error = %e, code = e.error_code(), "序列条件处理失败");
                }
            }
        }

        info!(
            boosts_processed = report.boosts_processed,
            boosts_triggered = report.boosts_triggered,
            accounts_updated = report.accounts_updated,
            "序列条件扫描完成"
        );
        Ok(report)
    }

    /// 返回状态发生变化的账户数
    #[instrument(skip(self, boost, accounts), fields(boost_id = %boost.boost_id))]
    async fn process_boost(
        &self,
        boost: &Boost,
        accounts: &AccountUserMap,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let earliest = boost.status_conditions.earliest_sequence_start(now);
        if let Some(earliest) = earliest.filter(|e| boost.boost_start_time > *e) {
            debug!(start = %boost.boost_start_time, earliest = %earliest, "boost 开始时间过近，跳过");
            return Ok(0);
        }

        let mut user_ids: Vec<String> = accounts.values().map(|info| info.user_id.clone()).collect();
        user_ids.sort();
        user_ids.dedup();
        let query = HistoryQuery {
            user_ids,
            event_types: boost.status_conditions.sequence_event_types(),
            start_date: boost.boost_start_time,
        };
        let histories = self.clients.history.fetch_user_history(&query).await?;

        let changes: Vec<AccountStatusChange> = accounts
            .iter()
            .filter_map(|(account_id, info)| {
                let history = histories.get(&info.user_id).cloned().unwrap_or_default();
                let event = EnrichedEvent::new(
                    DomainEvent::new(SEQUENCE_CHECK)
                        .with_account(account_id.as_str())
                        .with_user(info.user_id.as_str()),
                    now,
                )
                .with_raw_history(history);
                let statuses_met = self.evaluator.extract_status_changes_met(&event, boost);
                let new_status = extract_highest_status(&statuses_met)?;
                (new_status.rank() > info.boost_status.rank()).then(|| AccountStatusChange {
                    account_id: account_id.clone(),
                    old_status: info.boost_status,
                    new_status,
                    history: event.event_history.unwrap_or_default(),
                })
            })
            .collect();

        if changes.is_empty() {
            debug!("没有账户满足序列条件");
            return Ok(0);
        }

        let redeeming: AccountUserMap = changes
            .iter()
            .filter(|c| c.new_status == BoostStatus::Redeemed)
            .filter_map(|c| accounts.get_key_value(&c.account_id))
            .map(|(id, info)| (id.clone(), info.clone()))
            .collect();
        let transfer_results = if redeeming.is_empty() {
            TransferResults::new()
        } else {
            self.redeem(boost, redeeming, now).await?
        };

        let instructions: Vec<UpdateInstruction> = changes
            .into_iter()
            .map(|change| {
                let mut context = StatusChangeContext::new(change.new_status);
                context.old_status = Some(change.old_status.as_str().to_string());
                context.process_type = Some("SCHEDULED".into());
                context.event_history = Some(change.history);
                if change.new_status == BoostStatus::Redeemed {
                    context.boost_amount = transfer_results
                        .get(&boost.boost_id)
                        .and_then(|r| r.boost_amount)
                        .or(Some(boost.boost_amount));
                }
                UpdateInstruction::status_change(boost.boost_id.clone(), vec![change.account_id], context)
            })
            .collect();
        self.repos
            .accounts
            .update_boost_account_status(&instructions)
            .await?;
        for instruction in &instructions {
            metrics::record_status_transition(
                instruction.log_context.old_status.as_deref().unwrap_or("NONE"),
                instruction.new_status.as_str(),
                1,
            );
        }

        if !transfer_results.is_empty() {
            let redeemed = self
                .repos
                .boosts
                .update_boost_amount_redeemed(std::slice::from_ref(&boost.boost_id))
                .await;
            if let Err(e) = redeemed {
                error!(error = %e, "兑现计数更新失败");
            }
        }

        info!(accounts_updated = instructions.len(), "序列条件触发状态变更");
        Ok(instructions.len())
    }

    /// 所有达到 REDEEMED 的账户共用一个合成事件兑现
    async fn redeem(
        &self,
        boost: &Boost,
        accounts: AccountUserMap,
        now: DateTime<Utc>,
    ) -> Result<TransferResults> {
        let event = EnrichedEvent::new(DomainEvent::new(SEQUENCE_CHECK), now);
        let affected: AffectedAccounts = HashMap::from([(boost.boost_id.clone(), accounts)]);
        let redemption_boosts = std::slice::from_ref(boost);
        let pooled_contributions = fetch_pooled_contributions(&self.repos, redemption_boosts).await?;
        self.redemption
            .redeem_or_revoke_boosts(RedemptionRequest {
                redemption_boosts,
                revocation_boosts: &[],
                affected_accounts: &affected,
                pooled_contributions: &pooled_contributions,
                event: &event,
            })
            .await
    }
}
