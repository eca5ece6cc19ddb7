//! 服务层
//!
//! - [`BoostEventProcessor`]：事件驱动的状态推进
//! - [`RedemptionCoordinator`]：兑现 / 撤销划转
//! - [`ExpiryCoordinator`]：到期处理与赛事结算
//! - [`ScheduledSequenceProcessor`]：定时评估序列条件
//! - [`AudienceRefreshService`]：动态受众刷新
//! - [`GameResponseService`]：游戏结果提交
//!
//! [`BoostEngine`] 负责装配以上服务。

mod audience_refresh;
pub mod dto;
mod engine;
mod event_processor;
mod expiry;
mod game_response;
mod redemption;
mod reward;
mod sequence_processor;

pub use audience_refresh::AudienceRefreshService;
pub use dto::*;
pub use engine::BoostEngine;
pub use event_processor::BoostEventProcessor;
pub use expiry::{
    BOOST_TOURNAMENT_WON, ExpiryCoordinator, GameRanking, ScoreType, sort_and_rank_best_scores,
};
pub use game_response::GameResponseService;
pub use redemption::{BOOST_REDEEMED, BOOST_REVOKED, RedemptionCoordinator, RedemptionRequest};
pub use reward::RewardCalculator;
pub use sequence_processor::ScheduledSequenceProcessor;
