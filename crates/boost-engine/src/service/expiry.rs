//! Boost 到期处理
//!
//! 按 boost 形态分三条路径：
//! - 非游戏或无人参与：所有未终止账户置为 EXPIRED
//! - 赛事：用全部成绩构造 BOOST_EXPIRED 合成事件评估 REDEEMED 条件，胜者兑现，其余过期
//! - 随机抽奖：为候选账户生成随机分数后同样评估，胜者兑现，其余过期
//!
//! 胜者的兑现先于任何状态写入。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use boost_shared::observability::metrics;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use super::dto::{ExpiryKind, ExpiryOutcome, ExpirySweepReport};
use super::event_processor::fetch_pooled_contributions;
use super::redemption::{RedemptionCoordinator, RedemptionRequest};
use super::reward::RewardCalculator;
use crate::clients::{Collaborators, PublishOptions};
use crate::condition::ConditionEvaluator;
use crate::error::{BoostError, Result};
use crate::models::{
    AccountFilter, AccountUserMap, AffectedAccounts, BOOST_EXPIRED, Boost, BoostLog, BoostStatus,
    BoostType, DomainEvent, EnrichedEvent, EventContext, GameScoreEntry, LogType,
    StatusChangeContext, UpdateInstruction, summarize_prior_status,
};
use crate::repository::Repositories;

pub const BOOST_TOURNAMENT_WON: &str = "BOOST_TOURNAMENT_WON";

/// 成绩类型，由第一条游戏日志的形态决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreType {
    Number,
    Percent,
}

/// 单个账户的赛事结果，写入 GAME_OUTCOME 日志
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRanking {
    pub account_score: f64,
    pub score_type: ScoreType,
    /// 1 起始，同分同名次
    pub ranking: usize,
    pub top_score: f64,
}

fn log_score(log: &BoostLog) -> Option<f64> {
    log.context_f64("numberTaps")
        .filter(|s| *s != 0.0)
        .or_else(|| log.context_f64("percentDestroyed"))
}

/// 按账户取最好成绩并排名
///
/// 名次为该成绩在降序成绩列表中首次出现的位置，同分账户名次相同
pub fn sort_and_rank_best_scores(
    logs: &[BoostLog],
    account_ids: &[String],
) -> HashMap<String, GameRanking> {
    let Some(first) = logs.first() else {
        return HashMap::new();
    };
    let score_type = if first.context_i64("numberTaps").is_some() {
        ScoreType::Number
    } else {
        ScoreType::Percent
    };

    let mut best: HashMap<&str, f64> = HashMap::new();
    for log in logs {
        let Some(score) = log_score(log) else {
            continue;
        };
        best.entry(log.account_id.as_str())
            .and_modify(|current| {
                if *current < score {
                    *current = score;
                }
            })
            .or_insert(score);
    }

    let mut sorted: Vec<f64> = best.values().copied().collect();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let top_score = sorted.first().copied().unwrap_or_default();

    account_ids
        .iter()
        .filter_map(|account_id| {
            let score = *best.get(account_id.as_str())?;
            let ranking = sorted.iter().position(|s| *s == score).unwrap_or(0) + 1;
            Some((
                account_id.clone(),
                GameRanking {
                    account_score: score,
                    score_type,
                    ranking,
                    top_score,
                },
            ))
        })
        .collect()
}

/// 游戏日志转为成绩条目
fn score_entries(logs: &[BoostLog]) -> Vec<GameScoreEntry> {
    logs.iter()
        .map(|log| GameScoreEntry {
            account_id: log.account_id.clone(),
            number_taps: log.context_i64("numberTaps"),
            percent_destroyed: log.context_f64("percentDestroyed"),
            time_taken_millis: log.context_i64("timeTakenMillis").unwrap_or(i64::MAX),
        })
        .collect()
}

fn dedup_accounts(logs: &[BoostLog]) -> Vec<String> {
    let mut seen = HashSet::new();
    logs.iter()
        .filter(|log| seen.insert(log.account_id.as_str()))
        .map(|log| log.account_id.clone())
        .collect()
}

pub struct ExpiryCoordinator {
    repos: Repositories,
    clients: Collaborators,
    evaluator: Arc<ConditionEvaluator>,
    redemption: Arc<RedemptionCoordinator>,
    rewards: Arc<RewardCalculator>,
}

impl ExpiryCoordinator {
    pub fn new(
        repos: Repositories,
        clients: Collaborators,
        evaluator: Arc<ConditionEvaluator>,
        redemption: Arc<RedemptionCoordinator>,
        rewards: Arc<RewardCalculator>,
    ) -> Self {
        Self {
            repos,
            clients,
            evaluator,
            redemption,
            rewards,
        }
    }

    /// 关闭已过结束时间的 boost 并逐个做到期处理
    ///
    /// 单个 boost 失败不影响其它 boost
    #[instrument(skip(self))]
    pub async fn check_for_boosts_to_expire(&self) -> Result<ExpirySweepReport> {
        let boost_ids = self.repos.boosts.expire_boosts().await?;
        if boost_ids.is_empty() {
            debug!("没有需要到期处理的 boost");
            return Ok(ExpirySweepReport::default());
        }

        let mut report = ExpirySweepReport::default();
        for boost_id in boost_ids {
            match self.handle_expired_boost(&boost_id).await {
                Ok(outcome) => {
                    report.boosts_expired += 1;
                    report.accounts_redeemed += outcome.accounts_redeemed;
                    report.accounts_expired += outcome.accounts_expired;
                }
                Err(e) => {
                    error!(boost_id = %boost_id, error = %e, code = e.error_code(), "boost 到期处理失败");
                    report.failed_boost_ids.push(boost_id);
                }
            }
        }

        info!(
            boosts_expired = report.boosts_expired,
            accounts_redeemed = report.accounts_redeemed,
            accounts_expired = report.accounts_expired,
            failed = report.failed_boost_ids.len(),
            "到期扫描完成"
        );
        Ok(report)
    }

    /// 单个 boost 的到期处理
    #[instrument(skip(self))]
    pub async fn handle_expired_boost(&self, boost_id: &str) -> Result<ExpiryOutcome> {
        let (boost, game_logs) = tokio::try_join!(
            self.repos.boosts.fetch_boost(boost_id),
            self.repos.logs.find_logs_for_boost(boost_id, LogType::GameResponse),
        )?;
        let boost = boost.ok_or_else(|| BoostError::BoostNotFound(boost_id.to_string()))?;

        let is_game = boost.boost_type == BoostType::Game && !game_logs.is_empty();
        let outcome = if !is_game && !boost.is_random_award() {
            let expired = self.expire_accounts_for_boost(boost_id, None).await?;
            self.outcome(boost_id, ExpiryKind::Simple, 0, expired)
        } else if !boost.status_conditions.contains(BoostStatus::Redeemed) {
            let expired = self.expire_accounts_for_boost(boost_id, None).await?;
            self.outcome(boost_id, ExpiryKind::NoRedemptionCondition, 0, expired)
        } else if boost.is_random_award() {
            self.handle_random_award(&boost).await?
        } else {
            self.handle_tournament(&boost, &game_logs).await?
        };

        metrics::record_expiry(
            outcome.kind.as_str(),
            outcome.accounts_redeemed,
            outcome.accounts_expired,
        );
        Ok(outcome)
    }

    fn outcome(&self, boost_id: &str, kind: ExpiryKind, redeemed: usize, expired: usize) -> ExpiryOutcome {
        info!(boost_id, ?kind, redeemed, expired, "boost 到期处理完成");
        ExpiryOutcome {
            boost_id: boost_id.to_string(),
            kind,
            accounts_redeemed: redeemed,
            accounts_expired: expired,
        }
    }

    async fn handle_tournament(&self, boost: &Boost, game_logs: &[BoostLog]) -> Result<ExpiryOutcome> {
        let responders = dedup_accounts(game_logs);
        let context = EventContext {
            account_score_list: score_entries(game_logs),
            ..Default::default()
        };
        let winners = self.select_winners(boost, &responders, &context);
        debug!(boost_id = %boost.boost_id, responders = responders.len(), winners = ?winners, "赛事结果");

        let redeemed = if winners.is_empty() {
            0
        } else {
            self.handle_tournament_winners(boost, &winners).await?
        };
        let expired = self.expire_remaining(&boost.boost_id, &winners).await?;

        let rankings = sort_and_rank_best_scores(game_logs, &responders);
        let outcome_logs = responders
            .iter()
            .map(|account_id| {
                let context = rankings
                    .get(account_id)
                    .map(serde_json::to_value)
                    .transpose()?
                    .unwrap_or_else(|| json!({}));
                Ok(BoostLog::new(
                    boost.boost_id.clone(),
                    account_id.clone(),
                    LogType::GameOutcome,
                    context,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        self.repos.logs.insert_boost_account_logs(&outcome_logs).await?;

        Ok(self.outcome(&boost.boost_id, ExpiryKind::Tournament, redeemed, expired))
    }

    async fn handle_random_award(&self, boost: &Boost) -> Result<ExpiryOutcome> {
        let filter = AccountFilter {
            boost_ids: vec![boost.boost_id.clone()],
            account_ids: None,
            statuses: vec![BoostStatus::Pending],
        };
        let candidates: Vec<String> = self
            .repos
            .accounts
            .find_accounts_for_boost(&filter)
            .await?
            .into_iter()
            .flat_map(|b| b.account_user_map.into_keys())
            .collect();

        let context = EventContext {
            random_score_list: self.rewards.random_scores(&candidates),
            ..Default::default()
        };
        let winners = self.select_winners(boost, &candidates, &context);
        info!(boost_id = %boost.boost_id, candidates = candidates.len(), winners = winners.len(), "随机抽奖结果");

        let redeemed = if winners.is_empty() {
            0
        } else {
            self.handle_tournament_winners(boost, &winners).await?
        };
        let expired = self.expire_remaining(&boost.boost_id, &winners).await?;

        Ok(self.outcome(&boost.boost_id, ExpiryKind::RandomAward, redeemed, expired))
    }

    /// 用共享成绩上下文对每个候选账户评估 REDEEMED 条件
    fn select_winners(&self, boost: &Boost, candidates: &[String], context: &EventContext) -> Vec<String> {
        let conditions = boost.status_conditions.conditions_for(BoostStatus::Redeemed);
        candidates
            .iter()
            .filter(|account_id| {
                let event = EnrichedEvent::now(
                    DomainEvent::new(BOOST_EXPIRED)
                        .with_account(account_id.as_str())
                        .with_context(context.clone()),
                );
                self.evaluator.test_conditions_for_status(&event, conditions)
            })
            .cloned()
            .collect()
    }

    /// 胜者兑现并置为 REDEEMED，返回兑现账户数
    async fn handle_tournament_winners(&self, boost: &Boost, winners: &[String]) -> Result<usize> {
        let filter = AccountFilter::active_for_boost(&boost.boost_id).restrict_to(winners.to_vec());
        let accounts: AccountUserMap = self
            .repos
            .accounts
            .find_accounts_for_boost(&filter)
            .await?
            .into_iter()
            .find(|b| b.boost_id == boost.boost_id)
            .map(|b| b.account_user_map)
            .unwrap_or_default();
        if accounts.is_empty() {
            warn!(boost_id = %boost.boost_id, "胜者均已不在进行中状态");
            return Ok(0);
        }

        let mut event = DomainEvent::new(BOOST_TOURNAMENT_WON);
        event
            .event_context
            .extra
            .insert("boostId".into(), json!(boost.boost_id));
        let event = EnrichedEvent::now(event);

        let affected: AffectedAccounts = HashMap::from([(boost.boost_id.clone(), accounts.clone())]);
        let redemption_boosts = std::slice::from_ref(boost);
        let pooled_contributions = fetch_pooled_contributions(&self.repos, redemption_boosts).await?;
        let results = self
            .redemption
            .redeem_or_revoke_boosts(RedemptionRequest {
                redemption_boosts,
                revocation_boosts: &[],
                affected_accounts: &affected,
                pooled_contributions: &pooled_contributions,
                event: &event,
            })
            .await?;

        let mut context = StatusChangeContext::new(BoostStatus::Redeemed);
        context.old_status = summarize_prior_status(&accounts);
        context.boost_amount = Some(
            results
                .get(&boost.boost_id)
                .and_then(|r| r.boost_amount)
                .unwrap_or(boost.boost_amount),
        );
        context.process_type = Some("EXPIRY".into());
        let account_ids: Vec<String> = accounts.keys().cloned().collect();
        let instruction = UpdateInstruction::status_change(boost.boost_id.clone(), account_ids.clone(), context);
        self.repos
            .accounts
            .update_boost_account_status(&[instruction])
            .await?;
        metrics::record_status_transition("ACTIVE", BoostStatus::Redeemed.as_str(), account_ids.len() as u64);

        if let Err(e) = self
            .repos
            .boosts
            .update_boost_amount_redeemed(std::slice::from_ref(&boost.boost_id))
            .await
        {
            error!(boost_id = %boost.boost_id, error = %e, "兑现计数更新失败");
        }

        let user_ids: Vec<String> = accounts.values().map(|info| info.user_id.clone()).collect();
        let options = PublishOptions::with_context(json!({ "boostId": boost.boost_id }));
        if let Err(e) = self
            .clients
            .publisher
            .publish_multi_user_event(&user_ids, BOOST_TOURNAMENT_WON, options)
            .await
        {
            warn!(boost_id = %boost.boost_id, error = %e, "赛事获胜事件发布失败");
        }

        Ok(account_ids.len())
    }

    /// 胜者以外的所有未终止账户置为 EXPIRED
    async fn expire_remaining(&self, boost_id: &str, winners: &[String]) -> Result<usize> {
        let all: Vec<String> = self
            .repos
            .accounts
            .find_accounts_for_boost(&AccountFilter::active_for_boost(boost_id))
            .await?
            .into_iter()
            .flat_map(|b| b.account_user_map.into_keys())
            .filter(|account_id| !winners.contains(account_id))
            .collect();
        self.expire_accounts_for_boost(boost_id, Some(all)).await
    }

    /// `account_ids` 为 None 时作用于全部未终止账户
    async fn expire_accounts_for_boost(
        &self,
        boost_id: &str,
        account_ids: Option<Vec<String>>,
    ) -> Result<usize> {
        let mut filter = AccountFilter::active_for_boost(boost_id);
        if let Some(ids) = account_ids {
            if ids.is_empty() {
                return Ok(0);
            }
            filter = filter.restrict_to(ids);
        }

        let accounts: AccountUserMap = self
            .repos
            .accounts
            .find_accounts_for_boost(&filter)
            .await?
            .into_iter()
            .flat_map(|b| b.account_user_map)
            .collect();
        if accounts.is_empty() {
            return Ok(0);
        }

        let mut context = StatusChangeContext::new(BoostStatus::Expired);
        context.old_status = summarize_prior_status(&accounts);
        context.process_type = Some("EXPIRY".into());
        let mut instruction =
            UpdateInstruction::status_change(boost_id, accounts.keys().cloned().collect(), context);
        instruction.still_active = false;
        self.repos
            .accounts
            .update_boost_account_status(&[instruction])
            .await?;
        metrics::record_status_transition("ACTIVE", BoostStatus::Expired.as_str(), accounts.len() as u64);

        let mut user_ids: Vec<String> = accounts.values().map(|info| info.user_id.clone()).collect();
        user_ids.sort();
        user_ids.dedup();
        let options = PublishOptions::with_context(json!({ "boostId": boost_id }));
        if let Err(e) = self
            .clients
            .publisher
            .publish_multi_user_event(&user_ids, BOOST_EXPIRED, options)
            .await
        {
            warn!(boost_id, error = %e, "boost 过期事件发布失败");
        }

        Ok(accounts.len())
    }
}
