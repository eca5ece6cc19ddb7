//! 条件 DSL
//!
//! 条件字符串格式为 `<类型> #{<参数>}`，参数内部以 `::` 分隔。
//! 字符串在 boost 加载时一次性解析为 [`Condition`]，评估阶段只处理强类型数据。

mod compatibility;
mod evaluator;
mod parser;
pub mod sequence;

pub use compatibility::EventConditionMatrix;
pub use evaluator::ConditionEvaluator;
pub use parser::{Condition, ConditionKind, FriendshipConstraint, SequenceSpec, TimeUnit};
