use choreo_core::ChoreoResult;

use crate::composition::SequentialComposition;

/// 组合的文本编解码接口
pub trait CompositionCodec: Send + Sync {
    fn parse(&self, text: &str) -> ChoreoResult<SequentialComposition>;
    fn render(&self, composition: &SequentialComposition) -> String;
}
