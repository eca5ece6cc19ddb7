//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use std::collections::HashMap;
use std::path::Path;

use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
use serde::Deserialize;

use crate::error::{InfraError, Result};

/// 服务配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// 可观测性配置（配置文件部分）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilitySection {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_port: u16,
}

impl Default for ObservabilitySection {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_port: 9090,
        }
    }
}

/// 外部协作服务地址
///
/// 转账、事件发布、消息、用户历史、人群服务都通过 HTTP JSON 调用
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub transfer_url: String,
    pub publisher_url: String,
    pub messaging_url: String,
    pub history_url: String,
    pub audience_url: String,
    pub request_timeout_ms: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            transfer_url: "http://localhost:8101".to_string(),
            publisher_url: "http://localhost:8102".to_string(),
            messaging_url: "http://localhost:8103".to_string(),
            history_url: "http://localhost:8104".to_string(),
            audience_url: "http://localhost:8105".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// 奖励引擎配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 过期扫描间隔（秒）
    pub expiry_poll_interval_seconds: u64,
    /// 时间序列条件扫描间隔（秒）
    pub sequence_poll_interval_seconds: u64,
    /// 动态人群刷新间隔（秒）
    pub audience_refresh_interval_seconds: u64,
    /// 事件类型 -> 额外允许的条件类型，在内置兼容表基础上追加
    pub condition_matrix_overrides: HashMap<String, Vec<String>>,
    /// 随机奖励的种子，设置后抽取结果可复现
    pub random_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            expiry_poll_interval_seconds: 300,
            sequence_poll_interval_seconds: 3600,
            audience_refresh_interval_seconds: 86_400,
            condition_matrix_overrides: HashMap::new(),
            random_seed: None,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub server: ServerConfig,
    pub observability: ObservabilitySection,
    pub services: ServicesConfig,
    pub engine: EngineConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（BOOST_ 前缀，层级用双下划线，如 BOOST_ENGINE__RANDOM_SEED -> engine.random_seed）
    pub fn load(service_name: &str) -> Result<Self> {
        let env = std::env::var("BOOST_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Self::base_builder(service_name, &env)?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("BOOST")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::build(builder)
    }

    fn base_builder(service_name: &str, env: &str) -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置取值
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            (
                "engine.expiry_poll_interval_seconds",
                self.engine.expiry_poll_interval_seconds,
            ),
            (
                "engine.sequence_poll_interval_seconds",
                self.engine.sequence_poll_interval_seconds,
            ),
            (
                "engine.audience_refresh_interval_seconds",
                self.engine.audience_refresh_interval_seconds,
            ),
            (
                "services.request_timeout_ms",
                self.services.request_timeout_ms,
            ),
        ];

        for (field, value) in intervals {
            if value == 0 {
                return Err(InfraError::InvalidConfig {
                    field: field.to_string(),
                    message: "必须大于 0".to_string(),
                });
            }
        }

        Ok(())
    }

    /// 获取服务地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn load_from_toml(toml: &str) -> Result<AppConfig> {
        let builder = AppConfig::base_builder("boost-engine", "test")?
            .add_source(File::from_str(toml, FileFormat::Toml));
        AppConfig::build(builder)
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.engine.expiry_poll_interval_seconds, 300);
        assert!(config.engine.random_seed.is_none());
    }

    #[test]
    fn test_load_layers_file_over_defaults() {
        let config = load_from_toml(
            r#"
            [engine]
            random_seed = 42
            sequence_poll_interval_seconds = 60

            [engine.condition_matrix_overrides]
            SAVING_PAYMENT_SUCCESSFUL = ["balance_below"]

            [services]
            transfer_url = "http://float-transfer:9000"
            "#,
        )
        .unwrap();

        assert_eq!(config.service_name, "boost-engine");
        assert_eq!(config.environment, "test");
        assert_eq!(config.engine.random_seed, Some(42));
        assert_eq!(config.engine.sequence_poll_interval_seconds, 60);
        // 未出现的字段保持默认值
        assert_eq!(config.engine.expiry_poll_interval_seconds, 300);
        assert_eq!(
            config.engine.condition_matrix_overrides["SAVING_PAYMENT_SUCCESSFUL"],
            vec!["balance_below".to_string()]
        );
        assert_eq!(config.services.transfer_url, "http://float-transfer:9000");
        assert_eq!(config.services.request_timeout_ms, 10_000);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = load_from_toml(
            r#"
            [engine]
            expiry_poll_interval_seconds = 0
            "#,
        )
        .unwrap_err();

        assert_eq!(err.code(), "INVALID_CONFIG");
        assert!(err.to_string().contains("expiry_poll_interval_seconds"));
    }

    #[test]
    fn test_server_addr() {
        let config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            ..Default::default()
        };
        assert_eq!(config.server_addr(), "127.0.0.1:3000");
        assert!(!config.is_production());
    }
}
