//! 引擎装配
//!
//! 按配置组装兼容表、奖励计算器和各个服务，对外提供统一入口。

use std::sync::Arc;

use boost_shared::config::EngineConfig;
use futures::future::join_all;
use tracing::{info, instrument};

use super::audience_refresh::AudienceRefreshService;
use super::dto::{
    AudienceRefreshReport, EventRouteOutcome, ExpirySweepReport, GameResponseOutcome,
    GameSubmission, SequenceSweepReport,
};
use super::event_processor::BoostEventProcessor;
use super::expiry::ExpiryCoordinator;
use super::game_response::GameResponseService;
use super::redemption::RedemptionCoordinator;
use super::reward::RewardCalculator;
use super::sequence_processor::ScheduledSequenceProcessor;
use crate::clients::Collaborators;
use crate::condition::{ConditionEvaluator, EventConditionMatrix};
use crate::error::Result;
use crate::models::{BOOST_EXPIRED, DomainEvent};
use crate::repository::Repositories;

/// 奖励引擎
///
/// 所有服务共享同一个评估器与奖励计算器
#[derive(Clone)]
pub struct BoostEngine {
    events: Arc<BoostEventProcessor>,
    expiry: Arc<ExpiryCoordinator>,
    sequences: Arc<ScheduledSequenceProcessor>,
    audiences: Arc<AudienceRefreshService>,
    games: Arc<GameResponseService>,
}

impl BoostEngine {
    pub fn new(repos: Repositories, clients: Collaborators, config: &EngineConfig) -> Self {
        let matrix = EventConditionMatrix::standard().with_overrides(&config.condition_matrix_overrides);
        let evaluator = Arc::new(ConditionEvaluator::new(Arc::new(matrix)));
        let rewards = Arc::new(RewardCalculator::new(config.random_seed));
        let redemption = Arc::new(RedemptionCoordinator::new(
            repos.clone(),
            clients.clone(),
            rewards.clone(),
        ));

        info!(seeded = config.random_seed.is_some(), "奖励引擎已初始化");

        Self {
            events: Arc::new(BoostEventProcessor::new(
                repos.clone(),
                clients.clone(),
                evaluator.clone(),
                redemption.clone(),
            )),
            expiry: Arc::new(ExpiryCoordinator::new(
                repos.clone(),
                clients.clone(),
                evaluator.clone(),
                redemption.clone(),
                rewards,
            )),
            sequences: Arc::new(ScheduledSequenceProcessor::new(
                repos.clone(),
                clients.clone(),
                evaluator.clone(),
                redemption.clone(),
            )),
            audiences: Arc::new(AudienceRefreshService::new(repos.clone(), clients)),
            games: Arc::new(GameResponseService::new(repos, evaluator, redemption)),
        }
    }

    /// 处理一批事件
    ///
    /// 带 boostId 的 BOOST_EXPIRED 事件转入到期处理，其余走事件处理。
    /// 每个事件都会执行完毕，之后返回第一个错误，由上游重投整批
    #[instrument(skip(self, events), fields(batch_size = events.len()))]
    pub async fn process_batch(&self, events: Vec<DomainEvent>) -> Result<Vec<EventRouteOutcome>> {
        join_all(events.into_iter().map(|event| self.process_event(event)))
            .await
            .into_iter()
            .collect()
    }

    pub async fn process_event(&self, event: DomainEvent) -> Result<EventRouteOutcome> {
        match expired_boost_id(&event) {
            Some(boost_id) => self
                .expiry
                .handle_expired_boost(&boost_id)
                .await
                .map(EventRouteOutcome::Expired),
            None => self
                .events
                .process_event(event)
                .await
                .map(EventRouteOutcome::Processed),
        }
    }

    pub async fn check_for_boosts_to_expire(&self) -> Result<ExpirySweepReport> {
        self.expiry.check_for_boosts_to_expire().await
    }

    pub async fn process_time_based_conditions(&self) -> Result<SequenceSweepReport> {
        self.sequences.process_time_based_conditions().await
    }

    pub async fn refresh_dynamic_audience_boosts(&self) -> Result<AudienceRefreshReport> {
        self.audiences.refresh_dynamic_audience_boosts().await
    }

    pub async fn process_user_game_response(
        &self,
        user_id: &str,
        submission: GameSubmission,
    ) -> Result<GameResponseOutcome> {
        self.games.process_user_game_response(user_id, submission).await
    }

    pub fn expiry(&self) -> Arc<ExpiryCoordinator> {
        self.expiry.clone()
    }

    pub fn sequences(&self) -> Arc<ScheduledSequenceProcessor> {
        self.sequences.clone()
    }

    pub fn audiences(&self) -> Arc<AudienceRefreshService> {
        self.audiences.clone()
    }
}

fn expired_boost_id(event: &DomainEvent) -> Option<String> {
    if event.event_type != BOOST_EXPIRED {
        return None;
    }
    event
        .event_context
        .extra
        .get("boostId")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}
