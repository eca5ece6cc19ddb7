//! 用户游戏结果提交

use std::collections::HashMap;
use std::sync::Arc;

use boost_shared::observability::metrics;
use serde_json::json;
use tracing::{error, info, instrument};
use validator::Validate;

use super::dto::{GameResponseOutcome, GameSubmission};
use super::event_processor::fetch_pooled_contributions;
use super::redemption::{RedemptionCoordinator, RedemptionRequest};
use crate::condition::ConditionEvaluator;
use crate::error::{BoostError, Result};
use crate::models::{
    AccountUserInfo, AccountUserMap, AffectedAccounts, BoostLog, BoostStatus, BoostType,
    DomainEvent, EnrichedEvent, EventContext, LogType, Money, StatusChangeContext,
    USER_GAME_COMPLETION, UpdateInstruction,
};
use crate::repository::Repositories;
use crate::status::extract_highest_status;

/// 仍可提交游戏结果的状态
const SUBMITTABLE_STATUSES: [BoostStatus; 3] =
    [BoostStatus::Created, BoostStatus::Offered, BoostStatus::Unlocked];

pub struct GameResponseService {
    repos: Repositories,
    evaluator: Arc<ConditionEvaluator>,
    redemption: Arc<RedemptionCoordinator>,
}

impl GameResponseService {
    pub fn new(
        repos: Repositories,
        evaluator: Arc<ConditionEvaluator>,
        redemption: Arc<RedemptionCoordinator>,
    ) -> Self {
        Self {
            repos,
            evaluator,
            redemption,
        }
    }

    /// 处理一次游戏提交
    ///
    /// 满足 REDEEMED 时先完成划转再写状态；没有任何状态满足时，赛事返回
    /// `TournamentEntered`，其余返回 `NoChange`
    #[instrument(skip(self, submission), fields(boost_id = %submission.boost_id))]
    pub async fn process_user_game_response(
        &self,
        user_id: &str,
        submission: GameSubmission,
    ) -> Result<GameResponseOutcome> {
        submission
            .validate()
            .map_err(|e| BoostError::Validation(e.to_string()))?;

        let (boost, account_id) = tokio::try_join!(
            self.repos.boosts.fetch_boost(&submission.boost_id),
            self.repos.accounts.get_account_id_for_user(user_id),
        )?;
        let boost = boost.ok_or_else(|| BoostError::BoostNotFound(submission.boost_id.clone()))?;
        boost.validate_definition()?;
        let account_id = account_id.ok_or_else(|| BoostError::AccountNotFound(user_id.to_string()))?;

        let current_status = self
            .repos
            .accounts
            .fetch_current_boost_status(&boost.boost_id, &account_id)
            .await?
            .ok_or_else(|| {
                BoostError::Validation(format!("账户 {account_id} 未参与 boost {}", boost.boost_id))
            })?;
        if !SUBMITTABLE_STATUSES.contains(&current_status) {
            return Err(BoostError::Validation(format!(
                "boost 当前状态 {current_status} 不允许提交游戏结果"
            )));
        }

        let context = EventContext {
            number_taps: submission.number_taps,
            percent_destroyed: submission.percent_destroyed,
            time_taken_millis: Some(submission.time_taken_millis),
            ..Default::default()
        };
        let event = EnrichedEvent::now(
            DomainEvent::new(USER_GAME_COMPLETION)
                .with_account(account_id.as_str())
                .with_user(user_id)
                .with_context(context),
        );
        let statuses_met = self.evaluator.extract_status_changes_met(&event, &boost);

        if boost.boost_type == BoostType::Game {
            self.record_game_result(&boost.boost_id, &account_id, &submission).await?;
        }

        let Some(highest) = extract_highest_status(&statuses_met) else {
            return Ok(if boost.is_tournament() {
                info!(account_id = %account_id, "赛事成绩已记录");
                GameResponseOutcome::TournamentEntered
            } else {
                GameResponseOutcome::NoChange
            });
        };

        let mut boost_amount = boost.boost_amount;
        // 同时满足撤销条件时以 REVOKED 为准，不发奖励
        let redeemed = highest == BoostStatus::Redeemed;
        if redeemed {
            let accounts = AccountUserMap::from([(
                account_id.clone(),
                AccountUserInfo {
                    user_id: user_id.to_string(),
                    boost_status: current_status,
                },
            )]);
            let affected: AffectedAccounts = HashMap::from([(boost.boost_id.clone(), accounts)]);
            let redemption_boosts = std::slice::from_ref(&boost);
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
            if let Some(amount) = results.get(&boost.boost_id).and_then(|r| r.boost_amount) {
                boost_amount = amount;
            }
        }

        let mut log_context = StatusChangeContext::new(highest);
        log_context.old_status = Some(current_status.as_str().to_string());
        log_context.boost_amount = Some(boost_amount);
        log_context.process_type = Some("USER".into());
        log_context.submitted_params = Some(serde_json::to_value(&submission)?);
        let instruction =
            UpdateInstruction::status_change(boost.boost_id.clone(), vec![account_id.clone()], log_context);
        self.repos
            .accounts
            .update_boost_account_status(&[instruction])
            .await?;
        metrics::record_status_transition(current_status.as_str(), highest.as_str(), 1);

        let mut amount = None;
        if redeemed {
            if let Err(e) = self
                .repos
                .boosts
                .update_boost_amount_redeemed(std::slice::from_ref(&boost.boost_id))
                .await
            {
                error!(boost_id = %boost.boost_id, error = %e, "兑现计数更新失败");
            }
            amount = Some(Money::new(boost_amount, boost.boost_unit, boost.boost_currency.clone()).to_string());
        }

        info!(account_id = %account_id, new_status = %highest, "游戏提交触发状态变更");
        Ok(GameResponseOutcome::Triggered {
            statuses_met,
            amount,
        })
    }

    async fn record_game_result(
        &self,
        boost_id: &str,
        account_id: &str,
        submission: &GameSubmission,
    ) -> Result<()> {
        let mut context = json!({ "timeTakenMillis": submission.time_taken_millis });
        if let Some(taps) = submission.number_taps {
            context["numberTaps"] = json!(taps);
        }
        if let Some(percent) = submission.percent_destroyed {
            context["percentDestroyed"] = json!(percent);
        }
        let log = BoostLog::new(boost_id, account_id, LogType::GameResponse, context);
        self.repos.logs.insert_boost_account_logs(&[log]).await
    }
}
