//! 事件驱动的 boost 状态推进
//!
//! ## 处理流程
//!
//! 1. 解析账户 -> 2. 新建 boost 参与记录 -> 3. 评估已参与 boost 的状态条件
//!    -> 4. 奖池贡献记录 -> 5. 受影响账户 -> 6. 兑现/撤销（先于状态写入）
//!    -> 7. 批量写入状态 -> 8. 兑现计数与提现类通知
//!
//! 同一事件重投时，已处于终止状态或状态不低于目标状态的账户会被剔除，
//! 不会重复划转。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use boost_shared::observability::metrics;
use futures::future::join_all;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use super::dto::{PooledContributionMap, ProcessOutcome};
use super::redemption::{RedemptionCoordinator, RedemptionRequest};
use crate::clients::{Collaborators, HistoryQuery, PublishOptions, TransferResults};
use crate::condition::{ConditionEvaluator, ConditionKind};
use crate::error::{BoostError, Result};
use crate::models::{
    AccountFilter, AccountUserMap, AffectedAccounts, Boost, BoostFilter, BoostFlag, BoostLog,
    BoostStatus, DomainEvent, EnrichedEvent, LogType, StatusChangeContext, UpdateInstruction,
    summarize_prior_status,
};
use crate::repository::Repositories;
use crate::status::extract_highest_status;

/// 触发状态变化的 boost
struct TriggeredBoost {
    boost: Boost,
    statuses_met: Vec<BoostStatus>,
    highest: BoostStatus,
    /// 带历史的事件，仅含序列条件的 boost 使用
    enriched: Option<EnrichedEvent>,
}

pub struct BoostEventProcessor {
    repos: Repositories,
    clients: Collaborators,
    evaluator: Arc<ConditionEvaluator>,
    redemption: Arc<RedemptionCoordinator>,
}

impl BoostEventProcessor {
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

    /// 处理单个领域事件
    #[instrument(skip(self, event), fields(event_type = %event.event_type))]
    pub async fn process_event(&self, event: DomainEvent) -> Result<ProcessOutcome> {
        let start = Instant::now();

        if event.event_type.trim().is_empty() {
            return Err(BoostError::Validation("eventType 不能为空".into()));
        }
        let event = self.resolve_account(event).await?;
        let account_id = event.account_id.clone().unwrap_or_default();
        let enriched = EnrichedEvent::now(event);

        let created = self.create_boosts_triggered_by_event(&enriched, &account_id).await?;
        let mut outcome = self.process_existing_boosts(&enriched, &account_id, &created).await?;
        outcome.boosts_created = created.len();

        metrics::record_boost_processing(
            enriched.event_type(),
            outcome.boosts_triggered,
            start.elapsed().as_secs_f64(),
        );
        info!(
            account_id = %account_id,
            boosts_created = outcome.boosts_created,
            boosts_triggered = outcome.boosts_triggered,
            "事件处理完成"
        );
        Ok(outcome)
    }

    async fn resolve_account(&self, event: DomainEvent) -> Result<DomainEvent> {
        if event.account_id.is_some() {
            return Ok(event);
        }
        let Some(user_id) = event.user_id.clone() else {
            return Err(BoostError::Validation("事件必须至少包含 userId 或 accountId".into()));
        };

        let account_id = self
            .repos
            .accounts
            .get_account_id_for_user(&user_id)
            .await?
            .ok_or_else(|| BoostError::AccountNotFound(user_id.clone()))?;
        debug!(user_id = %user_id, account_id = %account_id, "已解析账户");
        Ok(event.with_account(account_id))
    }

    async fn resolve_user_id(&self, event: &EnrichedEvent, account_id: &str) -> Result<Option<String>> {
        if let Some(user_id) = &event.base.user_id {
            return Ok(Some(user_id.clone()));
        }
        let users = self
            .repos
            .accounts
            .find_user_ids_for_accounts(&[account_id.to_string()])
            .await?;
        Ok(users.get(account_id).cloned())
    }

    // -----------------------------------------------------------------------
    // 新建参与记录
    // -----------------------------------------------------------------------

    /// 以 event_occurs 开头的非 REDEEMED 状态条件命中时，为账户创建 CREATED 参与记录
    async fn create_boosts_triggered_by_event(
        &self,
        event: &EnrichedEvent,
        account_id: &str,
    ) -> Result<Vec<String>> {
        let candidates = self
            .repos
            .boosts
            .fetch_uncreated_active_boosts_for_account(account_id)
            .await?;

        let to_create: Vec<&Boost> = candidates
            .iter()
            .filter(|boost| self.should_create_boost(event, boost))
            .collect();
        if to_create.is_empty() {
            debug!(candidates = candidates.len(), "没有需要新建的 boost");
            return Ok(Vec::new());
        }

        let boost_ids: Vec<String> = to_create.iter().map(|b| b.boost_id.clone()).collect();
        self.repos
            .accounts
            .insert_boost_account_joins(&boost_ids, &[account_id.to_string()], BoostStatus::Created)
            .await?;
        info!(account_id, boost_ids = ?boost_ids, "已新建 boost 参与记录");

        if let Some(user_id) = self.resolve_user_id(event, account_id).await? {
            for boost in &to_create {
                let event_type = format!("BOOST_CREATED_{}", boost.boost_type);
                let options = PublishOptions::with_context(json!({
                    "boostId": boost.boost_id,
                    "boostType": boost.boost_type,
                    "boostCategory": boost.boost_category,
                    "triggeringEventType": event.event_type(),
                }));
                if let Err(e) = self.clients.publisher.publish_user_event(&user_id, &event_type, options).await {
                    warn!(boost_id = %boost.boost_id, error = %e, "boost 创建事件发布失败");
                }
            }
        }

        Ok(boost_ids)
    }

    fn should_create_boost(&self, event: &EnrichedEvent, boost: &Boost) -> bool {
        boost
            .status_conditions
            .iter()
            .filter(|(status, _)| **status != BoostStatus::Redeemed && status.is_active())
            .filter_map(|(_, conditions)| conditions.first())
            .filter(|condition| condition.kind() == ConditionKind::EventOccurs)
            .any(|condition| self.evaluator.test_condition(event, condition))
    }

    // -----------------------------------------------------------------------
    // 已参与 boost
    // -----------------------------------------------------------------------

    async fn process_existing_boosts(
        &self,
        event: &EnrichedEvent,
        account_id: &str,
        created_now: &[String],
    ) -> Result<ProcessOutcome> {
        let open_boosts: Vec<Boost> = self
            .repos
            .boosts
            .find_boosts(&BoostFilter::open_for_account(account_id))
            .await?
            .into_iter()
            .filter(|b| !created_now.contains(&b.boost_id))
            .filter(is_well_formed)
            .collect();

        if open_boosts.is_empty() {
            debug!(account_id, "账户没有进行中的 boost");
            return Ok(ProcessOutcome::default());
        }

        let history_event = self.enrich_with_history(event, account_id, &open_boosts).await?;

        let triggered: Vec<TriggeredBoost> = open_boosts
            .into_iter()
            .filter_map(|boost| {
                let enriched = boost
                    .status_conditions
                    .has_time_based_conditions()
                    .then(|| history_event.clone())
                    .flatten();
                let statuses_met = self
                    .evaluator
                    .extract_status_changes_met(enriched.as_ref().unwrap_or(event), &boost);
                let highest = extract_highest_status(&statuses_met)?;
                Some(TriggeredBoost {
                    boost,
                    statuses_met,
                    highest,
                    enriched,
                })
            })
            .collect();

        if triggered.is_empty() {
            debug!(account_id, "boost 条件均未满足");
            return Ok(ProcessOutcome::default());
        }

        if event.base.is_saving_payment() {
            self.check_and_mark_save_for_pool(event, account_id, &triggered).await?;
        }

        let affected = self.extract_affected_accounts(account_id, &triggered).await;
        let triggered: Vec<TriggeredBoost> = triggered
            .into_iter()
            .filter(|t| affected.get(&t.boost.boost_id).is_some_and(|m| !m.is_empty()))
            .collect();
        if triggered.is_empty() {
            info!(account_id, "受影响账户均已处于目标状态或终止状态，跳过");
            return Ok(ProcessOutcome::default());
        }

        let transfer_results = self.redeem_or_revoke(event, &triggered, &affected).await?;

        let instructions: Vec<UpdateInstruction> = triggered
            .iter()
            .map(|t| build_update_instruction(t, &affected, &transfer_results, event))
            .collect();
        self.repos
            .accounts
            .update_boost_account_status(&instructions)
            .await?;
        for instruction in &instructions {
            metrics::record_status_transition(
                instruction.log_context.old_status.as_deref().unwrap_or("NONE"),
                instruction.new_status.as_str(),
                instruction.account_ids.len() as u64,
            );
        }

        self.after_status_update(&triggered, &affected, &transfer_results).await;

        Ok(ProcessOutcome {
            boosts_created: 0,
            boosts_triggered: triggered.len(),
            updated_boost_ids: instructions.iter().map(|i| i.boost_id.clone()).collect(),
            transfer_results,
        })
    }

    /// 为含序列条件的 boost 预取一次用户历史
    async fn enrich_with_history(
        &self,
        event: &EnrichedEvent,
        account_id: &str,
        boosts: &[Boost],
    ) -> Result<Option<EnrichedEvent>> {
        let sequence_boosts: Vec<&Boost> = boosts
            .iter()
            .filter(|b| b.status_conditions.has_time_based_conditions())
            .collect();
        if sequence_boosts.is_empty() {
            return Ok(None);
        }

        let mut event_types: Vec<String> = Vec::new();
        for boost in &sequence_boosts {
            for event_type in boost.status_conditions.sequence_event_types() {
                if !event_types.contains(&event_type) {
                    event_types.push(event_type);
                }
            }
        }
        let start_date = sequence_boosts
            .iter()
            .map(|b| b.boost_start_time)
            .min()
            .unwrap_or(event.evaluated_at);

        let Some(user_id) = self.resolve_user_id(event, account_id).await? else {
            warn!(account_id, "无法解析用户，序列条件按无历史处理");
            return Ok(None);
        };

        let query = HistoryQuery {
            user_ids: vec![user_id.clone()],
            event_types,
            start_date,
        };
        let mut history = self.clients.history.fetch_user_history(&query).await?;
        let events = history.remove(&user_id).unwrap_or_default();
        debug!(user_id = %user_id, events = events.len(), "已获取用户历史");

        Ok(Some(event.clone().with_history(events)))
    }

    /// 交易标签 `BOOST::<id>` 指向本次触发的奖池 boost 时记录一次贡献
    async fn check_and_mark_save_for_pool(
        &self,
        event: &EnrichedEvent,
        account_id: &str,
        triggered: &[TriggeredBoost],
    ) -> Result<()> {
        let Some(tagged_id) = event.context().tagged_boost_id() else {
            return Ok(());
        };
        let is_pooled_trigger = triggered
            .iter()
            .any(|t| t.boost.is_pooled() && t.boost.boost_id == tagged_id);
        if !is_pooled_trigger {
            debug!(tagged_id, "交易标签不对应本次触发的奖池 boost");
            return Ok(());
        }

        let log = BoostLog::new(
            tagged_id,
            account_id,
            LogType::BoostPoolContribution,
            serde_json::to_value(&event.base)?,
        );
        self.repos.logs.insert_boost_account_logs(&[log]).await?;
        info!(boost_id = tagged_id, account_id, "已记录奖池贡献");
        Ok(())
    }

    /// 受影响账户：全员兑现的通用 boost 取所有参与账户，其余只取发起账户
    ///
    /// 单个 boost 查询失败按空结果处理；已处于终止状态或不低于目标状态的账户被剔除
    async fn extract_affected_accounts(
        &self,
        account_id: &str,
        triggered: &[TriggeredBoost],
    ) -> AffectedAccounts {
        let lookups = triggered.iter().map(|t| {
            let mut filter = AccountFilter::active_for_boost(&t.boost.boost_id);
            if !t.boost.redeems_all_at_once() {
                filter = filter.restrict_to(vec![account_id.to_string()]);
            }
            let accounts = self.repos.accounts.clone();
            let boost_id = t.boost.boost_id.clone();
            async move {
                match accounts.find_accounts_for_boost(&filter).await {
                    Ok(found) => found
                        .into_iter()
                        .find(|b| b.boost_id == boost_id)
                        .map(|b| b.account_user_map)
                        .unwrap_or_default(),
                    Err(e) => {
                        error!(boost_id = %boost_id, error = %e, "受影响账户查询失败");
                        AccountUserMap::new()
                    }
                }
            }
        });
        let maps = join_all(lookups).await;

        triggered
            .iter()
            .zip(maps)
            .map(|(t, map)| {
                let before = map.len();
                let eligible: AccountUserMap = map
                    .into_iter()
                    .filter(|(_, info)| {
                        info.boost_status.is_active() && info.boost_status.rank() < t.highest.rank()
                    })
                    .collect();
                if eligible.len() < before {
                    debug!(
                        boost_id = %t.boost.boost_id,
                        skipped = before - eligible.len(),
                        "跳过已推进的账户"
                    );
                }
                (t.boost.boost_id.clone(), eligible)
            })
            .collect()
    }

    async fn redeem_or_revoke(
        &self,
        event: &EnrichedEvent,
        triggered: &[TriggeredBoost],
        affected: &AffectedAccounts,
    ) -> Result<TransferResults> {
        let redemption_boosts: Vec<Boost> = triggered
            .iter()
            .filter(|t| t.highest == BoostStatus::Redeemed)
            .map(|t| t.boost.clone())
            .collect();
        let revocation_boosts: Vec<Boost> = triggered
            .iter()
            .filter(|t| t.highest == BoostStatus::Revoked)
            .map(|t| t.boost.clone())
            .collect();

        if redemption_boosts.is_empty() && revocation_boosts.is_empty() {
            return Ok(TransferResults::new());
        }

        let pooled_contributions = self.fetch_pooled_contributions(&redemption_boosts).await?;
        self.redemption
            .redeem_or_revoke_boosts(RedemptionRequest {
                redemption_boosts: &redemption_boosts,
                revocation_boosts: &revocation_boosts,
                affected_accounts: affected,
                pooled_contributions: &pooled_contributions,
                event,
            })
            .await
    }

    async fn fetch_pooled_contributions(&self, boosts: &[Boost]) -> Result<PooledContributionMap> {
        fetch_pooled_contributions(&self.repos, boosts).await
    }

    /// 状态写入成功后的附带操作，失败只记录
    async fn after_status_update(
        &self,
        triggered: &[TriggeredBoost],
        affected: &AffectedAccounts,
        transfer_results: &TransferResults,
    ) {
        if !transfer_results.is_empty() {
            let boost_ids: Vec<String> = triggered
                .iter()
                .filter(|t| matches!(t.highest, BoostStatus::Redeemed | BoostStatus::Revoked))
                .map(|t| t.boost.boost_id.clone())
                .collect();
            if let Err(e) = self.repos.boosts.update_boost_amount_redeemed(&boost_ids).await {
                error!(boost_ids = ?boost_ids, error = %e, "兑现计数更新失败");
            }
        }

        for t in triggered.iter().filter(|t| t.boost.has_flag(&BoostFlag::WithdrawalRelated)) {
            let Some(accounts) = affected.get(&t.boost.boost_id) else {
                continue;
            };
            let event_type = format!("WITHDRAWAL_BOOST_{}", t.highest);
            for info in accounts.values() {
                let options = PublishOptions::with_context(json!({
                    "boostId": t.boost.boost_id,
                    "newStatus": t.highest,
                    "statusesMet": t.statuses_met,
                }));
                if let Err(e) = self
                    .clients
                    .publisher
                    .publish_user_event(&info.user_id, &event_type, options)
                    .await
                {
                    warn!(user_id = %info.user_id, event_type = %event_type, error = %e, "提现 boost 通知发布失败");
                }
            }
        }
    }
}

/// 奖池类 boost 的贡献账户
pub(crate) async fn fetch_pooled_contributions(
    repos: &Repositories,
    boosts: &[Boost],
) -> Result<PooledContributionMap> {
    let mut contributions: PooledContributionMap = HashMap::new();
    for boost in boosts.iter().filter(|b| b.is_pooled()) {
        let account_ids = repos
            .logs
            .find_accounts_for_pooled_reward(&boost.boost_id, LogType::BoostPoolContribution)
            .await?;
        contributions.insert(boost.boost_id.clone(), account_ids);
    }
    Ok(contributions)
}

/// 定义不一致的 boost 不参与本次事件
fn is_well_formed(boost: &Boost) -> bool {
    match boost.validate_definition() {
        Ok(()) => true,
        Err(e) => {
            warn!(boost_id = %boost.boost_id, error = %e, "boost 定义无效，已跳过");
            false
        }
    }
}

fn build_update_instruction(
    triggered: &TriggeredBoost,
    affected: &AffectedAccounts,
    transfer_results: &TransferResults,
    event: &EnrichedEvent,
) -> UpdateInstruction {
    let boost = &triggered.boost;
    let accounts = affected.get(&boost.boost_id);

    let mut context = StatusChangeContext::new(triggered.highest);
    context.old_status = accounts.and_then(summarize_prior_status);
    context.boost_amount = Some(
        transfer_results
            .get(&boost.boost_id)
            .and_then(|r| r.boost_amount)
            .unwrap_or(boost.boost_amount),
    );
    context.transaction_id = event.context().transaction_id.clone();
    context.saved_amount = event.context().saved_amount.clone();
    context.process_type = Some("EVENT".into());
    context.event_history = triggered
        .enriched
        .as_ref()
        .and_then(|e| e.event_history.clone());

    let mut instruction = UpdateInstruction::status_change(
        boost.boost_id.clone(),
        accounts.map(|m| m.keys().cloned().collect()).unwrap_or_default(),
        context,
    );
    instruction.still_active =
        !(triggered.highest == BoostStatus::Redeemed && boost.has_flag(&BoostFlag::RedeemAllAtOnce));
    instruction
}
