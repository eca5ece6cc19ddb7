//! 仓储层
//!
//! 只定义接口。服务通过 [`Repositories`] 持有 trait object，
//! 测试时注入 mockall 生成的 mock 或内存实现。

mod traits;

use std::sync::Arc;

pub use traits::*;

/// 服务层使用的全部仓储
#[derive(Clone)]
pub struct Repositories {
    pub boosts: Arc<dyn BoostRepositoryTrait>,
    pub accounts: Arc<dyn BoostAccountRepositoryTrait>,
    pub logs: Arc<dyn BoostLogRepositoryTrait>,
}

impl Repositories {
    pub fn new(
        boosts: Arc<dyn BoostRepositoryTrait>,
        accounts: Arc<dyn BoostAccountRepositoryTrait>,
        logs: Arc<dyn BoostLogRepositoryTrait>,
    ) -> Self {
        Self {
            boosts,
            accounts,
            logs,
        }
    }
}
