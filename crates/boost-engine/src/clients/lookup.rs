//! 用户历史与受众服务客户端

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::http::JsonHttpClient;
use crate::error::Result;
use crate::models::UserHistoryMap;

// ---------------------------------------------------------------------------
// 用户历史
// ---------------------------------------------------------------------------

/// 历史查询条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub user_ids: Vec<String>,
    pub event_types: Vec<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_date: DateTime<Utc>,
}

#[async_trait]
pub trait UserHistoryClient: Send + Sync {
    /// 返回 user_id -> 按时间排序的事件列表
    async fn fetch_user_history(&self, query: &HistoryQuery) -> Result<UserHistoryMap>;
}

pub struct HttpUserHistoryClient {
    http: JsonHttpClient,
}

impl HttpUserHistoryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: JsonHttpClient::new("history", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl UserHistoryClient for HttpUserHistoryClient {
    #[instrument(skip(self, query), fields(users = query.user_ids.len()))]
    async fn fetch_user_history(&self, query: &HistoryQuery) -> Result<UserHistoryMap> {
        let mut history: UserHistoryMap = self.http.post_json("/history/query", query).await?;
        for events in history.values_mut() {
            events.sort_by_key(|e| e.timestamp);
        }
        Ok(history)
    }
}

// ---------------------------------------------------------------------------
// 受众
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AudienceClient: Send + Sync {
    /// 重新计算动态受众成员
    async fn refresh(&self, audience_id: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    audience_id: &'a str,
}

pub struct HttpAudienceClient {
    http: JsonHttpClient,
}

impl HttpAudienceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: JsonHttpClient::new("audience", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl AudienceClient for HttpAudienceClient {
    #[instrument(skip(self))]
    async fn refresh(&self, audience_id: &str) -> Result<()> {
        self.http
            .post_no_content("/audiences/refresh", &RefreshRequest { audience_id })
            .await
    }
}
