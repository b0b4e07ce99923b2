#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use choreo_core::{ChoreoError, ChoreoResult, ClassesConfiguration};
use choreo_dispatcher::{ChoreographyInterpreter, ServerContext};
use choreo_domain::{
    CompositionCodec, DurableStore, ExecutionBound, OutboundCaller, SequentialComposition, TaggedValue,
    TextCompositionCodec, WireState,
};
use choreo_infrastructure::InMemoryStore;
use choreo_worker::{builtin_catalog, SemanticTypeMarshaller, ServiceRegistry};

pub const H1: &str = "h1";
pub const H2: &str = "h2";

pub const CLASSES: &str = r#"
["demo.Counter".methods.add]
["demo.Counter".methods.get]
["demo.Counter".methods.reset]

["demo.Accumulator".methods.push]
["demo.Accumulator".methods.sum]
["demo.Accumulator".methods.mean]

["demo.Calculator".methods.scale]
["demo.Calculator".methods.describe]
["demo.Calculator".methods.normalize]
result_map = { out = "return", normalized = "i1" }

["demo.Scaler"]
wrapper = "demo.ScalerWrapper"
["demo.Scaler".methods.apply]
["demo.Scaler".methods.factor]
["demo.Scaler".methods.describe]
"#;

pub fn classes() -> ClassesConfiguration {
    toml::from_str(CLASSES).unwrap()
}

/// 只配置了 Counter 的主机
pub fn counter_only_classes() -> ClassesConfiguration {
    toml::from_str(
        r#"
        ["demo.Counter".methods.add]
        ["demo.Counter".methods.get]
        "#,
    )
    .unwrap()
}

pub fn parse(text: &str) -> SequentialComposition {
    TextCompositionCodec::new().parse(text).unwrap()
}

pub fn wire(entries: &[(&str, TaggedValue)]) -> WireState {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

pub fn vector(values: &[f64]) -> TaggedValue {
    TaggedValue::new("Vector", serde_json::json!(values))
}

pub fn registry(classes: ClassesConfiguration, store: Arc<dyn DurableStore>) -> Arc<ServiceRegistry> {
    Arc::new(
        ServiceRegistry::new(
            Arc::new(classes),
            Arc::new(builtin_catalog()),
            Arc::new(SemanticTypeMarshaller::with_builtin_types()),
            store,
        )
        .unwrap(),
    )
}

pub fn interpreter(
    host: &str,
    classes: ClassesConfiguration,
    store: Arc<dyn DurableStore>,
    outbound: Arc<dyn OutboundCaller>,
) -> Arc<ChoreographyInterpreter> {
    Arc::new(ChoreographyInterpreter::new(
        ServerContext::new(vec![host.to_string()]).unwrap(),
        registry(classes, store),
        outbound,
    ))
}

/// 在内存中模拟 `h1`，转发被记录下来并返回预设的状态
pub fn local_interpreter(store: InMemoryStore, outbound: Arc<RecordingCaller>) -> Arc<ChoreographyInterpreter> {
    interpreter(H1, classes(), Arc::new(store), outbound)
}

/// 一次转发的记录
#[derive(Debug, Clone)]
pub struct ForwardCall {
    pub address: String,
    pub bound: ExecutionBound,
    pub state: WireState,
    pub composition_len: usize,
}

/// 记录转发请求，按预设返回下游状态
#[derive(Default)]
pub struct RecordingCaller {
    calls: Mutex<Vec<ForwardCall>>,
    reply: Mutex<WireState>,
    fail: bool,
}

impl RecordingCaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replying(reply: WireState) -> Self {
        Self {
            reply: Mutex::new(reply),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<ForwardCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutboundCaller for RecordingCaller {
    async fn invoke(
        &self,
        address: &str,
        composition: &SequentialComposition,
        bound: ExecutionBound,
        state: WireState,
    ) -> ChoreoResult<WireState> {
        self.calls.lock().unwrap().push(ForwardCall {
            address: address.to_string(),
            bound,
            state,
            composition_len: composition.len(),
        });
        if self.fail {
            return Err(ChoreoError::Transport(format!("{address}: connection refused")));
        }
        Ok(self.reply.lock().unwrap().clone())
    }
}

/// 进程内路由：按地址把转发交给另一个解释器
///
/// 组合先渲染成文本再解析，和经过 HTTP 时一样。
#[derive(Default)]
pub struct LoopbackCaller {
    hosts: RwLock<HashMap<String, Arc<ChoreographyInterpreter>>>,
    forwarded: Mutex<Vec<String>>,
}

impl LoopbackCaller {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attach(&self, address: &str, interpreter: Arc<ChoreographyInterpreter>) {
        self.hosts.write().unwrap().insert(address.to_string(), interpreter);
    }

    pub fn forwarded(&self) -> Vec<String> {
        self.forwarded.lock().unwrap().clone()
    }
}

#[async_trait]
impl OutboundCaller for LoopbackCaller {
    async fn invoke(
        &self,
        address: &str,
        composition: &SequentialComposition,
        bound: ExecutionBound,
        state: WireState,
    ) -> ChoreoResult<WireState> {
        let target = self.hosts.read().unwrap().get(address).cloned();
        let target = target.ok_or_else(|| ChoreoError::Transport(format!("{address}: 无法连接")))?;
        self.forwarded.lock().unwrap().push(address.to_string());

        let codec = TextCompositionCodec::new();
        let composition = codec.parse(&codec.render(composition))?;
        target.execute(&composition, Some(bound), state).await
    }
}
