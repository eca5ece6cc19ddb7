//! 仓储 Trait 定义
//!
//! 存储实现不在本 crate 内，服务层只依赖这里的抽象。
//! 同一 boost 的多账户状态更新由存储层保证单次原子写入。

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    AccountFilter, Boost, BoostAccounts, BoostFilter, BoostLog, BoostStatus, LogType,
    UpdateInstruction,
};

/// Boost 定义仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BoostRepositoryTrait: Send + Sync {
    async fn find_boosts(&self, filter: &BoostFilter) -> Result<Vec<Boost>>;
    async fn fetch_boost(&self, boost_id: &str) -> Result<Option<Boost>>;

    /// 活跃、事件驱动、尚未与该账户建立参与记录的 boost
    async fn fetch_uncreated_active_boosts_for_account(&self, account_id: &str) -> Result<Vec<Boost>>;
    /// 活跃的非赛事 boost
    async fn fetch_active_standard_boosts(&self) -> Result<Vec<Boost>>;
    async fn fetch_boosts_with_dynamic_audiences(&self) -> Result<Vec<Boost>>;

    async fn update_boost_amount_redeemed(&self, boost_ids: &[String]) -> Result<()>;

    /// 乐观并发更新：存储中的当前金额不等于 `expected_current` 时返回 ConcurrencyConflict
    async fn update_boost_amount(
        &self,
        boost_id: &str,
        expected_current: i64,
        new_amount: i64,
    ) -> Result<()>;

    /// 关闭已过结束时间的 boost，返回其 id
    async fn expire_boosts(&self) -> Result<Vec<String>>;
}

/// 账户参与记录仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BoostAccountRepositoryTrait: Send + Sync {
    async fn insert_boost_account_joins(
        &self,
        boost_ids: &[String],
        account_ids: &[String],
        status: BoostStatus,
    ) -> Result<()>;

    async fn find_accounts_for_boost(&self, filter: &AccountFilter) -> Result<Vec<BoostAccounts>>;

    /// 批量写入状态更新，同时追加对应日志
    async fn update_boost_account_status(&self, instructions: &[UpdateInstruction]) -> Result<()>;

    async fn fetch_current_boost_status(
        &self,
        boost_id: &str,
        account_id: &str,
    ) -> Result<Option<BoostStatus>>;

    async fn get_account_id_for_user(&self, user_id: &str) -> Result<Option<String>>;

    /// account_id -> user_id
    async fn find_user_ids_for_accounts(
        &self,
        account_ids: &[String],
    ) -> Result<HashMap<String, String>>;

    /// 受众中尚未加入该 boost 的账户
    async fn fetch_new_audience_members(
        &self,
        boost_id: &str,
        audience_id: &str,
    ) -> Result<Vec<String>>;
}

/// Boost 日志仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BoostLogRepositoryTrait: Send + Sync {
    async fn insert_boost_account_logs(&self, logs: &[BoostLog]) -> Result<()>;
    async fn find_logs_for_boost(&self, boost_id: &str, log_type: LogType) -> Result<Vec<BoostLog>>;

    /// 有奖池贡献记录的账户
    async fn find_accounts_for_pooled_reward(
        &self,
        boost_id: &str,
        log_type: LogType,
    ) -> Result<Vec<String>>;
}
