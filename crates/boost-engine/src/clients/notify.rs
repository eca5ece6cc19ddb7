//! 用户事件发布与消息发送客户端

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::http::JsonHttpClient;
use crate::error::Result;

// ---------------------------------------------------------------------------
// 事件发布
// ---------------------------------------------------------------------------

/// 发布选项
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOptions {
    pub context: serde_json::Value,
    /// 触发该事件的用户（例如兑现所有人的那次储蓄的发起者）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initiator: Option<String>,
}

impl PublishOptions {
    pub fn with_context(context: serde_json::Value) -> Self {
        Self {
            context,
            initiator: None,
        }
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_user_event(
        &self,
        user_id: &str,
        event_type: &str,
        options: PublishOptions,
    ) -> Result<()>;

    async fn publish_multi_user_event(
        &self,
        user_ids: &[String],
        event_type: &str,
        options: PublishOptions,
    ) -> Result<()>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishRequest<'a> {
    user_ids: &'a [String],
    event_type: &'a str,
    #[serde(flatten)]
    options: &'a PublishOptions,
}

pub struct HttpEventPublisher {
    http: JsonHttpClient,
}

impl HttpEventPublisher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: JsonHttpClient::new("publisher", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    async fn publish_user_event(
        &self,
        user_id: &str,
        event_type: &str,
        options: PublishOptions,
    ) -> Result<()> {
        self.publish_multi_user_event(&[user_id.to_string()], event_type, options)
            .await
    }

    #[instrument(skip(self, user_ids, options), fields(users = user_ids.len()))]
    async fn publish_multi_user_event(
        &self,
        user_ids: &[String],
        event_type: &str,
        options: PublishOptions,
    ) -> Result<()> {
        let request = PublishRequest {
            user_ids,
            event_type,
            options: &options,
        };
        self.http.post_no_content("/events", &request).await?;
        debug!(event_type, "用户事件已发布");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 消息发送
// ---------------------------------------------------------------------------

/// 单条用户消息指令
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInstruction {
    pub instruction_id: String,
    pub destination_user_id: String,
    pub parameters: serde_json::Value,
    pub trigger_balance_fetch: bool,
}

#[async_trait]
pub trait MessageClient: Send + Sync {
    async fn send_messages(&self, instructions: &[MessageInstruction]) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    instructions: &'a [MessageInstruction],
}

pub struct HttpMessageClient {
    http: JsonHttpClient,
}

impl HttpMessageClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: JsonHttpClient::new("messaging", base_url, timeout)?,
        })
    }
}

#[async_trait]
impl MessageClient for HttpMessageClient {
    #[instrument(skip(self, instructions), fields(count = instructions.len()))]
    async fn send_messages(&self, instructions: &[MessageInstruction]) -> Result<()> {
        if instructions.is_empty() {
            return Ok(());
        }
        self.http
            .post_no_content("/messages", &MessageRequest { instructions })
            .await
    }
}
