use async_trait::async_trait;
use choreo_core::ChoreoResult;

use crate::{bound::ExecutionBound, composition::SequentialComposition, state::WireState};

/// 把组合的剩余部分交给下游主机
///
/// 调用是同步阻塞语义：直到下游返回或连接失败才结束，没有超时和重试。
#[async_trait]
pub trait OutboundCaller: Send + Sync {
    async fn invoke(
        &self,
        address: &str,
        composition: &SequentialComposition,
        bound: ExecutionBound,
        state: WireState,
    ) -> ChoreoResult<WireState>;
}
