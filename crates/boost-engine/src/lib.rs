//! Boost 条件与状态引擎
//!
//! 根据领域事件推进用户在各个 boost 上的状态，并在满足兑现条件时发起资金划转。
//!
//! ## 模块
//!
//! - `condition`: 条件 DSL 解析、事件兼容表与评估
//! - `status`: 状态推进顺序与状态规则集
//! - `models`: boost、事件、金额等领域模型
//! - `repository`: 持久化接口
//! - `clients`: 转账、事件发布、消息、历史、受众服务客户端
//! - `service`: 事件处理、兑现、到期、序列扫描等编排逻辑
//! - `worker`: 定时任务

pub mod clients;
pub mod condition;
pub mod error;
pub mod models;
pub mod repository;
pub mod service;
pub mod status;
pub mod worker;

pub use error::{BoostError, Result};
pub use service::BoostEngine;
