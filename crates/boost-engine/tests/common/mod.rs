//! 集成测试公共设施
//!
//! 仓储与协作服务的内存实现，记录所有调用便于断言

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use boost_engine::clients::{
    AudienceClient, Collaborators, EventPublisher, HistoryQuery, MessageClient,
    MessageInstruction, PublishOptions, TransferClient, TransferInstruction, TransferResult,
    TransferResults, UserHistoryClient,
};
use boost_engine::models::{
    AccountFilter, AccountUserInfo, Boost, BoostAccountJoin, BoostAccounts, BoostAudienceType,
    BoostFilter, BoostLog, BoostStatus, BoostType, HistoricalEvent, LogType, MoneyUnit,
    UpdateInstruction, UserHistoryMap,
};
use boost_engine::repository::{
    BoostAccountRepositoryTrait, BoostLogRepositoryTrait, BoostRepositoryTrait, Repositories,
};
use boost_engine::status::StatusRuleSet;
use boost_engine::{BoostEngine, BoostError, Result};
use boost_shared::config::EngineConfig;
use chrono::{Duration, Utc};
use parking_lot::Mutex;

// ==================== 测试数据 ====================

/// 以 HUNDREDTH_CENT 计价的 10 ZAR boost，从昨天到明天有效
pub fn boost(boost_id: &str, boost_type: BoostType, rules: &[(BoostStatus, &[&str])]) -> Boost {
    let rules: Vec<(BoostStatus, Vec<&str>)> = rules
        .iter()
        .map(|(status, conditions)| (*status, conditions.to_vec()))
        .collect();
    let now = Utc::now();

    Boost {
        boost_id: boost_id.to_string(),
        boost_type,
        boost_category: "TIME_LIMITED".to_string(),
        boost_amount: 100_000,
        boost_unit: MoneyUnit::HundredthCent,
        boost_currency: "ZAR".to_string(),
        from_float_id: "primary_cash".to_string(),
        from_bonus_pool_id: "bonus_pool".to_string(),
        boost_start_time: now - Duration::days(1),
        boost_end_time: now + Duration::days(1),
        status_conditions: StatusRuleSet::parse(&rules).expect("测试条件应可解析"),
        boost_audience_type: BoostAudienceType::Individual,
        audience_id: None,
        default_status: None,
        flags: Vec::new(),
        reward_parameters: None,
        message_instructions: Vec::new(),
        game_params: None,
    }
}

pub fn game_log(boost_id: &str, account_id: &str, taps: i64, millis: i64) -> BoostLog {
    BoostLog::new(
        boost_id,
        account_id,
        LogType::GameResponse,
        serde_json::json!({ "numberTaps": taps, "timeTakenMillis": millis }),
    )
}

// ==================== 仓储 ====================

/// 内存存储，同时实现三个仓储接口
#[derive(Default)]
pub struct MockBoostStore {
    boosts: Mutex<HashMap<String, Boost>>,
    joins: Mutex<Vec<BoostAccountJoin>>,
    logs: Mutex<Vec<BoostLog>>,
    /// account_id -> user_id
    owners: Mutex<HashMap<String, String>>,
    audiences: Mutex<HashMap<String, Vec<String>>>,
    expired: Mutex<Vec<String>>,
    redeemed_counts: Mutex<HashMap<String, u32>>,
    status_updates: Mutex<Vec<UpdateInstruction>>,
    amount_updates: Mutex<Vec<(String, i64, i64)>>,
}

impl MockBoostStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_boost(&self, boost: Boost) {
        self.boosts.lock().insert(boost.boost_id.clone(), boost);
    }

    pub fn add_account(&self, account_id: &str, user_id: &str) {
        self.owners
            .lock()
            .insert(account_id.to_string(), user_id.to_string());
    }

    pub fn join(&self, boost_id: &str, account_id: &str, status: BoostStatus) {
        let user_id = self.owners.lock().get(account_id).cloned().unwrap_or_default();
        self.joins.lock().push(BoostAccountJoin {
            boost_id: boost_id.to_string(),
            account_id: account_id.to_string(),
            user_id,
            boost_status: status,
            active: true,
        });
    }

    pub fn add_log(&self, log: BoostLog) {
        self.logs.lock().push(log);
    }

    pub fn set_audience(&self, audience_id: &str, account_ids: &[&str]) {
        self.audiences.lock().insert(
            audience_id.to_string(),
            account_ids.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// 下一次 expire_boosts 返回的 boost
    pub fn mark_expired(&self, boost_id: &str) {
        self.expired.lock().push(boost_id.to_string());
    }

    pub fn status_of(&self, boost_id: &str, account_id: &str) -> Option<BoostStatus> {
        self.joins
            .lock()
            .iter()
            .find(|j| j.boost_id == boost_id && j.account_id == account_id)
            .map(|j| j.boost_status)
    }

    pub fn status_updates(&self) -> Vec<UpdateInstruction> {
        self.status_updates.lock().clone()
    }

    pub fn logs_of(&self, boost_id: &str, log_type: LogType) -> Vec<BoostLog> {
        self.logs
            .lock()
            .iter()
            .filter(|l| l.boost_id == boost_id && l.log_type == log_type)
            .cloned()
            .collect()
    }

    pub fn redeemed_count(&self, boost_id: &str) -> u32 {
        self.redeemed_counts.lock().get(boost_id).copied().unwrap_or(0)
    }

    pub fn boost_amount(&self, boost_id: &str) -> Option<i64> {
        self.boosts.lock().get(boost_id).map(|b| b.boost_amount)
    }

    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories::new(self.clone(), self.clone(), self.clone())
    }
}

#[async_trait]
impl BoostRepositoryTrait for MockBoostStore {
    async fn find_boosts(&self, filter: &BoostFilter) -> Result<Vec<Boost>> {
        let joins = self.joins.lock();
        let boosts = self.boosts.lock();
        let mut ids: Vec<&String> = joins
            .iter()
            .filter(|j| filter.account_ids.contains(&j.account_id))
            .filter(|j| filter.statuses.is_empty() || filter.statuses.contains(&j.boost_status))
            .filter(|j| !filter.active_only || j.active)
            .map(|j| &j.boost_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids.into_iter().filter_map(|id| boosts.get(id).cloned()).collect())
    }

    async fn fetch_boost(&self, boost_id: &str) -> Result<Option<Boost>> {
        Ok(self.boosts.lock().get(boost_id).cloned())
    }

    async fn fetch_uncreated_active_boosts_for_account(&self, account_id: &str) -> Result<Vec<Boost>> {
        let joins = self.joins.lock();
        Ok(self
            .boosts
            .lock()
            .values()
            .filter(|b| b.boost_audience_type == BoostAudienceType::EventDriven)
            .filter(|b| {
                !joins
                    .iter()
                    .any(|j| j.boost_id == b.boost_id && j.account_id == account_id)
            })
            .cloned()
            .collect())
    }

    async fn fetch_active_standard_boosts(&self) -> Result<Vec<Boost>> {
        Ok(self
            .boosts
            .lock()
            .values()
            .filter(|b| !b.is_tournament())
            .cloned()
            .collect())
    }

    async fn fetch_boosts_with_dynamic_audiences(&self) -> Result<Vec<Boost>> {
        let audiences = self.audiences.lock();
        Ok(self
            .boosts
            .lock()
            .values()
            .filter(|b| b.audience_id.as_ref().is_some_and(|a| audiences.contains_key(a)))
            .cloned()
            .collect())
    }

    async fn update_boost_amount_redeemed(&self, boost_ids: &[String]) -> Result<()> {
        let mut counts = self.redeemed_counts.lock();
        for boost_id in boost_ids {
            *counts.entry(boost_id.clone()).or_default() += 1;
        }
        Ok(())
    }

    async fn update_boost_amount(
        &self,
        boost_id: &str,
        expected_current: i64,
        new_amount: i64,
    ) -> Result<()> {
        let mut boosts = self.boosts.lock();
        let boost = boosts
            .get_mut(boost_id)
            .ok_or_else(|| BoostError::BoostNotFound(boost_id.to_string()))?;
        if boost.boost_amount != expected_current {
            return Err(BoostError::ConcurrencyConflict(boost_id.to_string()));
        }
        boost.boost_amount = new_amount;
        self.amount_updates
            .lock()
            .push((boost_id.to_string(), expected_current, new_amount));
        Ok(())
    }

    async fn expire_boosts(&self) -> Result<Vec<String>> {
        Ok(std::mem::take(&mut *self.expired.lock()))
    }
}

#[async_trait]
impl BoostAccountRepositoryTrait for MockBoostStore {
    async fn insert_boost_account_joins(
        &self,
        boost_ids: &[String],
        account_ids: &[String],
        status: BoostStatus,
    ) -> Result<()> {
        for boost_id in boost_ids {
            for account_id in account_ids {
                self.join(boost_id, account_id, status);
            }
        }
        Ok(())
    }

    async fn find_accounts_for_boost(&self, filter: &AccountFilter) -> Result<Vec<BoostAccounts>> {
        let joins = self.joins.lock();
        Ok(filter
            .boost_ids
            .iter()
            .map(|boost_id| BoostAccounts {
                boost_id: boost_id.clone(),
                account_user_map: joins
                    .iter()
                    .filter(|j| &j.boost_id == boost_id)
                    .filter(|j| filter.statuses.is_empty() || filter.statuses.contains(&j.boost_status))
                    .filter(|j| {
                        filter
                            .account_ids
                            .as_ref()
                            .is_none_or(|ids| ids.contains(&j.account_id))
                    })
                    .map(|j| {
                        let info = AccountUserInfo {
                            user_id: j.user_id.clone(),
                            boost_status: j.boost_status,
                        };
                        (j.account_id.clone(), info)
                    })
                    .collect(),
            })
            .collect())
    }

    async fn update_boost_account_status(&self, instructions: &[UpdateInstruction]) -> Result<()> {
        let mut joins = self.joins.lock();
        for instruction in instructions {
            for join in joins.iter_mut().filter(|j| {
                j.boost_id == instruction.boost_id && instruction.account_ids.contains(&j.account_id)
            }) {
                join.boost_status = instruction.new_status;
                join.active = !join.boost_status.is_terminal();
            }
        }
        self.status_updates.lock().extend_from_slice(instructions);
        Ok(())
    }

    async fn fetch_current_boost_status(
        &self,
        boost_id: &str,
        account_id: &str,
    ) -> Result<Option<BoostStatus>> {
        Ok(self.status_of(boost_id, account_id))
    }

    async fn get_account_id_for_user(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self
            .owners
            .lock()
            .iter()
            .find(|(_, owner)| owner.as_str() == user_id)
            .map(|(account_id, _)| account_id.clone()))
    }

    async fn find_user_ids_for_accounts(
        &self,
        account_ids: &[String],
    ) -> Result<HashMap<String, String>> {
        let owners = self.owners.lock();
        Ok(account_ids
            .iter()
            .filter_map(|id| owners.get(id).map(|user| (id.clone(), user.clone())))
            .collect())
    }

    async fn fetch_new_audience_members(
        &self,
        boost_id: &str,
        audience_id: &str,
    ) -> Result<Vec<String>> {
        let members = self.audiences.lock().get(audience_id).cloned().unwrap_or_default();
        let joins = self.joins.lock();
        Ok(members
            .into_iter()
            .filter(|account_id| {
                !joins
                    .iter()
                    .any(|j| j.boost_id == boost_id && &j.account_id == account_id)
            })
            .collect())
    }
}

#[async_trait]
impl BoostLogRepositoryTrait for MockBoostStore {
    async fn insert_boost_account_logs(&self, logs: &[BoostLog]) -> Result<()> {
        self.logs.lock().extend_from_slice(logs);
        Ok(())
    }

    async fn find_logs_for_boost(&self, boost_id: &str, log_type: LogType) -> Result<Vec<BoostLog>> {
        Ok(self.logs_of(boost_id, log_type))
    }

    async fn find_accounts_for_pooled_reward(
        &self,
        boost_id: &str,
        log_type: LogType,
    ) -> Result<Vec<String>> {
        let mut accounts: Vec<String> = self
            .logs_of(boost_id, log_type)
            .into_iter()
            .map(|l| l.account_id)
            .collect();
        accounts.sort();
        accounts.dedup();
        Ok(accounts)
    }
}

// ==================== 协作服务 ====================

#[derive(Default)]
pub struct MockTransferClient {
    calls: Mutex<Vec<Vec<TransferInstruction>>>,
    reject: AtomicBool,
    delay_ms: AtomicU64,
}

impl MockTransferClient {
    pub fn reject_all(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }

    /// 每次转账在记录调用后等待一段时间再返回
    pub fn set_delay(&self, delay: std::time::Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Vec<TransferInstruction>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TransferClient for MockTransferClient {
    async fn transfer(&self, instructions: &[TransferInstruction]) -> Result<TransferResults> {
        self.calls.lock().push(instructions.to_vec());
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(BoostError::TransferFailed("余额不足".into()));
        }
        Ok(instructions
            .iter()
            .map(|instruction| {
                let result = TransferResult {
                    result: TransferResult::SUCCESS.to_string(),
                    float_tx_ids: vec![format!("float-tx-{}", instruction.identifier)],
                    account_tx_ids: instruction
                        .recipients
                        .iter()
                        .map(|r| format!("acc-tx-{}", r.recipient_id))
                        .collect(),
                    boost_amount: None,
                };
                (instruction.identifier.clone(), result)
            })
            .collect())
    }
}

/// 发布记录：(用户, 事件类型, 选项)
pub type Published = (Vec<String>, String, PublishOptions);

#[derive(Default)]
pub struct MockPublisher {
    published: Mutex<Vec<Published>>,
}

impl MockPublisher {
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.published.lock().iter().map(|(_, t, _)| t.clone()).collect()
    }

    pub fn users_for(&self, event_type: &str) -> Vec<String> {
        let mut users: Vec<String> = self
            .published
            .lock()
            .iter()
            .filter(|(_, t, _)| t == event_type)
            .flat_map(|(users, _, _)| users.clone())
            .collect();
        users.sort();
        users
    }
}

#[async_trait]
impl EventPublisher for MockPublisher {
    async fn publish_user_event(
        &self,
        user_id: &str,
        event_type: &str,
        options: PublishOptions,
    ) -> Result<()> {
        self.published
            .lock()
            .push((vec![user_id.to_string()], event_type.to_string(), options));
        Ok(())
    }

    async fn publish_multi_user_event(
        &self,
        user_ids: &[String],
        event_type: &str,
        options: PublishOptions,
    ) -> Result<()> {
        self.published
            .lock()
            .push((user_ids.to_vec(), event_type.to_string(), options));
        Ok(())
    }
}

#[derive(Default)]
pub struct MockMessenger {
    sent: Mutex<Vec<MessageInstruction>>,
}

impl MockMessenger {
    pub fn sent(&self) -> Vec<MessageInstruction> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MessageClient for MockMessenger {
    async fn send_messages(&self, instructions: &[MessageInstruction]) -> Result<()> {
        self.sent.lock().extend_from_slice(instructions);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockHistory {
    history: Mutex<UserHistoryMap>,
    queries: Mutex<Vec<HistoryQuery>>,
}

impl MockHistory {
    pub fn set(&self, user_id: &str, events: Vec<HistoricalEvent>) {
        self.history.lock().insert(user_id.to_string(), events);
    }

    pub fn queries(&self) -> Vec<HistoryQuery> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl UserHistoryClient for MockHistory {
    async fn fetch_user_history(&self, query: &HistoryQuery) -> Result<UserHistoryMap> {
        self.queries.lock().push(query.clone());
        let history = self.history.lock();
        Ok(query
            .user_ids
            .iter()
            .map(|user_id| {
                let events: Vec<HistoricalEvent> = history
                    .get(user_id)
                    .into_iter()
                    .flatten()
                    .filter(|e| query.event_types.contains(&e.event_type))
                    .cloned()
                    .collect();
                (user_id.clone(), events)
            })
            .collect())
    }
}

#[derive(Default)]
pub struct MockAudience {
    refreshed: Mutex<Vec<String>>,
}

impl MockAudience {
    pub fn refreshed(&self) -> Vec<String> {
        self.refreshed.lock().clone()
    }
}

#[async_trait]
impl AudienceClient for MockAudience {
    async fn refresh(&self, audience_id: &str) -> Result<()> {
        self.refreshed.lock().push(audience_id.to_string());
        Ok(())
    }
}

// ==================== 组装 ====================

pub struct TestEnv {
    pub store: Arc<MockBoostStore>,
    pub transfer: Arc<MockTransferClient>,
    pub publisher: Arc<MockPublisher>,
    pub messenger: Arc<MockMessenger>,
    pub history: Arc<MockHistory>,
    pub audience: Arc<MockAudience>,
    pub engine: BoostEngine,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(EngineConfig {
            random_seed: Some(7),
            ..Default::default()
        })
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = MockBoostStore::new();
        let transfer = Arc::new(MockTransferClient::default());
        let publisher = Arc::new(MockPublisher::default());
        let messenger = Arc::new(MockMessenger::default());
        let history = Arc::new(MockHistory::default());
        let audience = Arc::new(MockAudience::default());

        let clients = Collaborators {
            transfer: transfer.clone(),
            publisher: publisher.clone(),
            messenger: messenger.clone(),
            history: history.clone(),
            audience: audience.clone(),
        };
        let engine = BoostEngine::new(store.repositories(), clients, &config);

        Self {
            store,
            transfer,
            publisher,
            messenger,
            history,
            audience,
            engine,
        }
    }
}
