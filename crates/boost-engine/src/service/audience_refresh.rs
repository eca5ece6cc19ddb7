//! 动态受众刷新
//!
//! 受众服务重新计算成员后，为新加入的账户创建参与记录、发送对应状态的消息并发布事件。

use tracing::{debug, error, info, instrument, warn};

use super::dto::AudienceRefreshReport;
use super::redemption::assemble_messages;
use crate::clients::{Collaborators, PublishOptions};
use crate::error::Result;
use crate::models::{AccountUserInfo, AccountUserMap, Boost, BoostStatus};
use crate::repository::Repositories;

/// 新成员会依次经历的状态：从 CREATED 到默认状态
fn statuses_up_to(status: BoostStatus) -> Vec<BoostStatus> {
    BoostStatus::ACTIVE
        .into_iter()
        .filter(|s| s.rank() <= status.rank())
        .collect()
}

pub struct AudienceRefreshService {
    repos: Repositories,
    clients: Collaborators,
}

impl AudienceRefreshService {
    pub fn new(repos: Repositories, clients: Collaborators) -> Self {
        Self { repos, clients }
    }

    #[instrument(skip(self))]
    pub async fn refresh_dynamic_audience_boosts(&self) -> Result<AudienceRefreshReport> {
        let boosts = self.repos.boosts.fetch_boosts_with_dynamic_audiences().await?;
        if boosts.is_empty() {
            debug!("没有动态受众 boost");
            return Ok(AudienceRefreshReport::default());
        }

        let mut report = AudienceRefreshReport::default();
        for boost in &boosts {
            match self.refresh_boost(boost).await {
                Ok(added) => {
                    report.boosts_refreshed += 1;
                    report.accounts_added += added;
                }
                Err(e) => {
                    error!(boost_id = %boost.boost_id, error = %e, code = e.error_code(), "动态受众刷新失败");
                }
            }
        }

        info!(
            boosts_refreshed = report.boosts_refreshed,
            accounts_added = report.accounts_added,
            "动态受众刷新完成"
        );
        Ok(report)
    }

    /// 返回新加入的账户数
    #[instrument(skip(self, boost), fields(boost_id = %boost.boost_id))]
    async fn refresh_boost(&self, boost: &Boost) -> Result<usize> {
        let Some(audience_id) = boost.audience_id.as_deref() else {
            warn!("动态受众 boost 缺少 audienceId");
            return Ok(0);
        };

        self.clients.audience.refresh(audience_id).await?;
        let new_accounts = self
            .repos
            .accounts
            .fetch_new_audience_members(&boost.boost_id, audience_id)
            .await?;
        if new_accounts.is_empty() {
            debug!(audience_id, "受众没有新成员");
            return Ok(0);
        }

        let status = boost.default_status.unwrap_or(BoostStatus::Offered);
        self.repos
            .accounts
            .insert_boost_account_joins(std::slice::from_ref(&boost.boost_id), &new_accounts, status)
            .await?;
        info!(accounts = new_accounts.len(), status = %status, "新成员已加入 boost");

        let user_ids = self.repos.accounts.find_user_ids_for_accounts(&new_accounts).await?;
        let accounts: AccountUserMap = user_ids
            .iter()
            .map(|(account_id, user_id)| {
                let info = AccountUserInfo {
                    user_id: user_id.clone(),
                    boost_status: status,
                };
                (account_id.clone(), info)
            })
            .collect();

        let messages = assemble_messages(boost, &accounts, &boost.boost_money(), status);
        if !messages.is_empty() {
            if let Err(e) = self.clients.messenger.send_messages(&messages).await {
                warn!(error = %e, count = messages.len(), "新成员消息发送失败");
            }
        }

        let mut recipients: Vec<String> = user_ids.into_values().collect();
        recipients.sort();
        recipients.dedup();
        let context = serde_json::json!({
            "boostId": boost.boost_id,
            "boostType": boost.boost_type,
            "boostCategory": boost.boost_category,
            "boostStartTime": boost.boost_start_time.timestamp_millis(),
            "boostEndTime": boost.boost_end_time.timestamp_millis(),
            "statusConditions": boost.status_conditions,
            "rewardParameters": boost.reward_parameters,
        });
        for prior in statuses_up_to(status) {
            let event_type = format!("BOOST_{}_{}", prior, boost.boost_type);
            let options = PublishOptions::with_context(context.clone());
            if let Err(e) = self
                .clients
                .publisher
                .publish_multi_user_event(&recipients, &event_type, options)
                .await
            {
                warn!(event_type = %event_type, error = %e, "受众事件发布失败");
            }
        }

        Ok(new_accounts.len())
    }
}
