//! 共享库
//!
//! 包含奖励引擎各进程共用的配置加载、基础设施错误和可观测性初始化代码。

pub mod config;
pub mod error;
pub mod observability;
