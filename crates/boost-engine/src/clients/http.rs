//! reqwest JSON 调用封装
//!
//! 所有协作服务都是 `POST <base_url><path>` + JSON 请求体，
//! 非 2xx 响应统一转换为 [`BoostError::ExternalService`]。

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{BoostError, Result};

#[derive(Debug, Clone)]
pub struct JsonHttpClient {
    client: reqwest::Client,
    base_url: String,
    service: &'static str,
}

impl JsonHttpClient {
    pub fn new(service: &'static str, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| external(service, format!("创建 HTTP 客户端失败: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = self.url(path);
        debug!(service = self.service, url = %url, "调用协作服务");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| external(self.service, format!("请求失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(service = self.service, url = %url, status = %status, body = %text, "协作服务返回错误");
            return Err(external(self.service, format!("HTTP {status}: {text}")));
        }

        Ok(response)
    }

    /// 发送请求并解析 JSON 响应
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(path, body)
            .await?
            .json::<R>()
            .await
            .map_err(|e| external(self.service, format!("响应解析失败: {e}")))
    }

    /// 发送请求，忽略响应体
    pub async fn post_no_content<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.send(path, body).await.map(|_| ())
    }
}

fn external(service: &str, message: String) -> BoostError {
    BoostError::ExternalService {
        service: service.to_string(),
        message,
    }
}
