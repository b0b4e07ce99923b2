//! 编排领域模型：组合、执行窗口、操作寻址、状态表，以及外部协作者接口

pub mod address;
pub mod bound;
pub mod codec;
pub mod composition;
pub mod ports;
pub mod state;

pub use address::OperationTarget;
pub use bound::ExecutionBound;
pub use codec::TextCompositionCodec;
pub use composition::{
    CompositionDomain, InputValue, LiteralParam, Operation, OperationInvocation,
    SequentialComposition, VariableParam,
};
pub use ports::*;
pub use state::{tags, InstanceKey, ServiceHandle, StateEntry, StateTable, TaggedValue, WireState};

pub use choreo_core::{ChoreoError, ChoreoResult};
