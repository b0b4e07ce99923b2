//! 编排调度
//!
//! 每个请求在本地执行组合中能执行的前缀，遇到远程调用时把剩余部分转发给下游主机。

pub mod context;
pub mod interpreter;
pub mod plan;

pub use context::ServerContext;
pub use interpreter::ChoreographyInterpreter;
pub use plan::{plan_step, RefuseReason, StepPlan};
