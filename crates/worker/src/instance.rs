//! 服务实例与包装器

use std::fmt;
use std::sync::Arc;

use choreo_core::{ChoreoError, ChoreoResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::descriptor::{signature_matches, ClassDescriptor, ConstructorDescriptor, ServiceState};
use crate::marshalling::SemanticTypeMarshaller;
use crate::values::{NativeType, NativeValue};

/// 解析出的方法：名字、形参以及实际执行位置
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMethod {
    pub name: String,
    pub params: Vec<NativeType>,
    target: MethodTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MethodTarget {
    Own(usize),
    Delegate(usize),
}

/// 可被解释器调用的服务对象
pub trait Invocable: Send + Sync {
    /// 配置中的类名（包装器返回被包装类的名字）
    fn class_name(&self) -> &str;

    fn resolve_method(
        &self,
        name: &str,
        supplied: &[String],
        marshaller: &SemanticTypeMarshaller,
    ) -> Option<ResolvedMethod>;

    fn invoke(&mut self, method: &ResolvedMethod, args: &mut [NativeValue]) -> ChoreoResult<NativeValue>;

    /// 序列化当前状态，不可持久化时返回 `None`
    fn snapshot(&self) -> Option<ChoreoResult<Vec<u8>>>;
}

/// 普通服务实例：类描述 + 本地状态
pub struct ServiceInstance {
    class: Arc<ClassDescriptor>,
    state: ServiceState,
}

impl ServiceInstance {
    pub fn construct(
        class: Arc<ClassDescriptor>,
        constructor: &ConstructorDescriptor,
        args: &mut [NativeValue],
    ) -> ChoreoResult<Self> {
        let state = constructor.construct(args)?;
        Ok(Self { class, state })
    }

    pub fn restore(class: Arc<ClassDescriptor>, bytes: &[u8]) -> ChoreoResult<Self> {
        let state = class.restore(bytes)?;
        Ok(Self { class, state })
    }

    pub fn state<T: 'static>(&self) -> Option<&T> {
        self.state.downcast_ref::<T>()
    }

    fn invoke_index(&mut self, index: usize, args: &mut [NativeValue]) -> ChoreoResult<NativeValue> {
        let method = self
            .class
            .method(index)
            .ok_or_else(|| ChoreoError::Internal(format!("类 {} 没有第 {index} 个方法", self.class.name())))?;
        method.invoke(self.state.as_mut(), args)
    }
}

impl fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("class", &self.class.name())
            .finish_non_exhaustive()
    }
}

impl Invocable for ServiceInstance {
    fn class_name(&self) -> &str {
        self.class.name()
    }

    fn resolve_method(
        &self,
        name: &str,
        supplied: &[String],
        marshaller: &SemanticTypeMarshaller,
    ) -> Option<ResolvedMethod> {
        let index = self.class.resolve_method(name, supplied, marshaller)?;
        let method = self.class.method(index)?;
        Some(ResolvedMethod {
            name: method.name().to_string(),
            params: method.params().to_vec(),
            target: MethodTarget::Own(index),
        })
    }

    fn invoke(&mut self, method: &ResolvedMethod, args: &mut [NativeValue]) -> ChoreoResult<NativeValue> {
        match method.target {
            MethodTarget::Own(index) => self.invoke_index(index, args),
            MethodTarget::Delegate(_) => Err(ChoreoError::Internal(format!(
                "方法 {} 属于包装器，不能直接在 {} 上调用",
                method.name,
                self.class.name()
            ))),
        }
    }

    fn snapshot(&self) -> Option<ChoreoResult<Vec<u8>>> {
        self.class.save(self.state.as_ref())
    }
}

type OverrideFn = Arc<dyn Fn(&mut ServiceInstance, &mut [NativeValue]) -> ChoreoResult<NativeValue> + Send + Sync>;
type PrepareFn = Arc<dyn Fn(&mut [NativeValue]) + Send + Sync>;

struct WrapperMethod {
    name: String,
    params: Vec<NativeType>,
    invoke: OverrideFn,
}

/// 包装器：覆盖或新增方法，其余调用转交给被包装的实例
pub struct WrapperDescriptor {
    name: String,
    methods: Vec<WrapperMethod>,
    prepare: Option<PrepareFn>,
}

impl WrapperDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            prepare: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 方法体拿到的是被包装的实例
    pub fn method<F>(mut self, name: &str, params: Vec<NativeType>, invoke: F) -> Self
    where
        F: Fn(&mut ServiceInstance, &mut [NativeValue]) -> ChoreoResult<NativeValue> + Send + Sync + 'static,
    {
        self.methods.push(WrapperMethod {
            name: name.to_string(),
            params,
            invoke: Arc::new(invoke),
        });
        self
    }

    /// 在构造被包装实例之前调整构造参数
    pub fn prepare<F>(mut self, prepare: F) -> Self
    where
        F: Fn(&mut [NativeValue]) + Send + Sync + 'static,
    {
        self.prepare = Some(Arc::new(prepare));
        self
    }
}

impl fmt::Debug for WrapperDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<&str> = self.methods.iter().map(|m| m.name.as_str()).collect();
        f.debug_struct("WrapperDescriptor")
            .field("name", &self.name)
            .field("methods", &methods)
            .finish_non_exhaustive()
    }
}

/// 包装后实例的持久化格式
#[derive(Debug, Serialize, Deserialize)]
struct WrappedSnapshot {
    wrapper: String,
    delegate: Value,
}

/// 包装后的实例
pub struct WrappedService {
    wrapper: Arc<WrapperDescriptor>,
    delegate: ServiceInstance,
}

impl WrappedService {
    /// 由选中的构造器与参数构建被包装实例
    pub fn build(
        wrapper: Arc<WrapperDescriptor>,
        class: Arc<ClassDescriptor>,
        constructor: &ConstructorDescriptor,
        args: &mut [NativeValue],
    ) -> ChoreoResult<Self> {
        if let Some(prepare) = &wrapper.prepare {
            prepare(args);
        }
        let delegate = ServiceInstance::construct(class, constructor, args)?;
        Ok(Self { wrapper, delegate })
    }

    pub fn restore(wrapper: Arc<WrapperDescriptor>, class: Arc<ClassDescriptor>, bytes: &[u8]) -> ChoreoResult<Self> {
        let snapshot: WrappedSnapshot =
            serde_json::from_slice(bytes).map_err(|e| ChoreoError::Persistence(e.to_string()))?;
        if snapshot.wrapper != wrapper.name {
            return Err(ChoreoError::Persistence(format!(
                "持久化的包装器 {} 与配置的 {} 不一致",
                snapshot.wrapper, wrapper.name
            )));
        }
        let delegate_bytes =
            serde_json::to_vec(&snapshot.delegate).map_err(|e| ChoreoError::Persistence(e.to_string()))?;
        let delegate = ServiceInstance::restore(class, &delegate_bytes)?;
        Ok(Self { wrapper, delegate })
    }

    pub fn delegate(&self) -> &ServiceInstance {
        &self.delegate
    }
}

impl fmt::Debug for WrappedService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedService")
            .field("wrapper", &self.wrapper.name)
            .field("delegate", &self.delegate)
            .finish()
    }
}

impl Invocable for WrappedService {
    fn class_name(&self) -> &str {
        self.delegate.class_name()
    }

    /// 先查包装器自己的方法，再查被包装的类
    fn resolve_method(
        &self,
        name: &str,
        supplied: &[String],
        marshaller: &SemanticTypeMarshaller,
    ) -> Option<ResolvedMethod> {
        let own = self
            .wrapper
            .methods
            .iter()
            .position(|m| m.name == name && signature_matches(&m.params, supplied, marshaller));
        if let Some(index) = own {
            let method = &self.wrapper.methods[index];
            return Some(ResolvedMethod {
                name: method.name.clone(),
                params: method.params.clone(),
                target: MethodTarget::Own(index),
            });
        }
        let delegated = self.delegate.resolve_method(name, supplied, marshaller)?;
        match delegated.target {
            MethodTarget::Own(index) => Some(ResolvedMethod {
                target: MethodTarget::Delegate(index),
                ..delegated
            }),
            MethodTarget::Delegate(_) => None,
        }
    }

    fn invoke(&mut self, method: &ResolvedMethod, args: &mut [NativeValue]) -> ChoreoResult<NativeValue> {
        match method.target {
            MethodTarget::Own(index) => {
                let overridden = self
                    .wrapper
                    .methods
                    .get(index)
                    .ok_or_else(|| ChoreoError::Internal(format!("包装器 {} 没有第 {index} 个方法", self.wrapper.name)))?;
                let arity = overridden.params.len().min(args.len());
                (overridden.invoke)(&mut self.delegate, &mut args[..arity])
            }
            MethodTarget::Delegate(index) => self.delegate.invoke_index(index, args),
        }
    }

    fn snapshot(&self) -> Option<ChoreoResult<Vec<u8>>> {
        let bytes = match self.delegate.snapshot()? {
            Ok(bytes) => bytes,
            Err(e) => return Some(Err(e)),
        };
        let result = serde_json::from_slice::<Value>(&bytes)
            .and_then(|delegate| {
                serde_json::to_vec(&WrappedSnapshot {
                    wrapper: self.wrapper.name.clone(),
                    delegate,
                })
            })
            .map_err(|e| ChoreoError::Persistence(e.to_string()));
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Label(String);

    fn label_class() -> Arc<ClassDescriptor> {
        Arc::new(
            ClassDescriptor::builder::<Label>("test.Label")
                .constructor(vec![NativeType::Str], |args| Ok(Label(args[0].as_str()?.to_string())))
                .method("text", vec![], |label, _| Ok(NativeValue::Str(label.0.clone())))
                .method("set", vec![NativeType::Str], |label, args| {
                    label.0 = args[0].as_str()?.to_string();
                    Ok(NativeValue::Null)
                })
                .persist_with_serde()
                .build(),
        )
    }

    fn shouting_wrapper() -> Arc<WrapperDescriptor> {
        Arc::new(
            WrapperDescriptor::new("test.Shouting")
                .prepare(|args| {
                    if let Some(NativeValue::Str(text)) = args.first_mut() {
                        *text = text.trim().to_string();
                    }
                })
                .method("text", vec![], |delegate, _| {
                    let label = delegate
                        .state::<Label>()
                        .ok_or_else(|| ChoreoError::invocation("状态类型不符"))?;
                    Ok(NativeValue::Str(label.0.to_uppercase()))
                }),
        )
    }

    fn build_wrapped(text: &str) -> WrappedService {
        let class = label_class();
        let marshaller = SemanticTypeMarshaller::new();
        let ctor = class.resolve_constructor(&["String".to_string()], &marshaller).unwrap();
        let mut args = vec![NativeValue::Str(text.to_string())];
        WrappedService::build(shouting_wrapper(), class.clone(), ctor, &mut args).unwrap()
    }

    #[test]
    fn test_wrapper_overrides_then_delegates() {
        let marshaller = SemanticTypeMarshaller::new();
        let mut wrapped = build_wrapped("  hi  ");

        let text = wrapped.resolve_method("text", &[], &marshaller).unwrap();
        assert_eq!(wrapped.invoke(&text, &mut []).unwrap(), NativeValue::Str("HI".into()));

        let set = wrapped
            .resolve_method("set", &["String".to_string()], &marshaller)
            .unwrap();
        wrapped.invoke(&set, &mut [NativeValue::Str("yo".into())]).unwrap();
        assert_eq!(wrapped.invoke(&text, &mut []).unwrap(), NativeValue::Str("YO".into()));
        assert_eq!(wrapped.class_name(), "test.Label");
    }

    #[test]
    fn test_wrapped_snapshot_round_trip() {
        let wrapped = build_wrapped("abc");
        let bytes = wrapped.snapshot().unwrap().unwrap();

        let restored = WrappedService::restore(shouting_wrapper(), label_class(), &bytes).unwrap();
        assert_eq!(restored.delegate().state::<Label>().unwrap().0, "abc");

        let other = Arc::new(WrapperDescriptor::new("test.Other"));
        assert!(WrappedService::restore(other, label_class(), &bytes).is_err());
    }
}
