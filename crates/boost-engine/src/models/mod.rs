//! 领域模型

pub mod account;
pub mod boost;
pub mod enums;
pub mod event;
pub mod log;
pub mod money;

pub use account::*;
pub use boost::{Boost, GameParams, MessageInstructionRef, RewardDistribution, RewardParameters};
pub use enums::*;
pub use event::*;
pub use log::BoostLog;
pub use money::{Money, MoneyUnit};
