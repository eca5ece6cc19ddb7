//! 协作服务客户端
//!
//! 每个协作服务一个 trait，服务层通过 [`Collaborators`] 持有 trait object；
//! 生产环境使用基于 reqwest 的 HTTP 实现。

mod http;
mod lookup;
mod notify;
mod transfer;

use std::sync::Arc;
use std::time::Duration;

use boost_shared::config::ServicesConfig;

pub use http::JsonHttpClient;
pub use lookup::{
    AudienceClient, HistoryQuery, HttpAudienceClient, HttpUserHistoryClient, UserHistoryClient,
};
pub use notify::{
    EventPublisher, HttpEventPublisher, HttpMessageClient, MessageClient, MessageInstruction,
    PublishOptions,
};
pub use transfer::{
    HttpTransferClient, Recipient, TransferClient, TransferInstruction, TransferResult,
    TransferResults,
};

use crate::error::Result;

/// 全部协作服务
#[derive(Clone)]
pub struct Collaborators {
    pub transfer: Arc<dyn TransferClient>,
    pub publisher: Arc<dyn EventPublisher>,
    pub messenger: Arc<dyn MessageClient>,
    pub history: Arc<dyn UserHistoryClient>,
    pub audience: Arc<dyn AudienceClient>,
}

impl Collaborators {
    /// 按配置创建 HTTP 客户端
    pub fn from_config(config: &ServicesConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        Ok(Self {
            transfer: Arc::new(HttpTransferClient::new(&config.transfer_url, timeout)?),
            publisher: Arc::new(HttpEventPublisher::new(&config.publisher_url, timeout)?),
            messenger: Arc::new(HttpMessageClient::new(&config.messaging_url, timeout)?),
            history: Arc::new(HttpUserHistoryClient::new(&config.history_url, timeout)?),
            audience: Arc::new(HttpAudienceClient::new(&config.audience_url, timeout)?),
        })
    }
}
