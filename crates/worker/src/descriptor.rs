//! 可调用类的描述表：构造器、方法以及持久化方式
//!
//! 重载解析是线性扫描，按声明顺序取第一个匹配项。

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use choreo_core::{ChoreoError, ChoreoResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::marshalling::SemanticTypeMarshaller;
use crate::values::{NativeType, NativeValue};

/// 服务实例的本地状态
pub type ServiceState = Box<dyn Any + Send + Sync>;

type ConstructFn = Arc<dyn Fn(&mut [NativeValue]) -> ChoreoResult<ServiceState> + Send + Sync>;
type MethodFn =
    Arc<dyn Fn(&mut (dyn Any + Send + Sync), &mut [NativeValue]) -> ChoreoResult<NativeValue> + Send + Sync>;
type SaveFn = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> ChoreoResult<Vec<u8>> + Send + Sync>;
type RestoreFn = Arc<dyn Fn(&[u8]) -> ChoreoResult<ServiceState> + Send + Sync>;

/// 参数列表是否接受给定的（已提升的）线上标签
///
/// 形参个数不能超过实参个数；基础类型要求标签与类型名完全一致，
/// 复杂类型交给编组器判断。
pub fn signature_matches(params: &[NativeType], supplied: &[String], marshaller: &SemanticTypeMarshaller) -> bool {
    if params.len() > supplied.len() {
        return false;
    }
    params.iter().zip(supplied).all(|(param, tag)| {
        if param.is_primitive() {
            param.name() == tag
        } else {
            marshaller.is_compatible(tag, param)
        }
    })
}

pub struct ConstructorDescriptor {
    params: Vec<NativeType>,
    construct: ConstructFn,
}

impl ConstructorDescriptor {
    pub fn params(&self) -> &[NativeType] {
        &self.params
    }

    pub fn construct(&self, args: &mut [NativeValue]) -> ChoreoResult<ServiceState> {
        let arity = self.params.len().min(args.len());
        (self.construct)(&mut args[..arity])
    }
}

impl fmt::Debug for ConstructorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDescriptor")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

pub struct MethodDescriptor {
    name: String,
    params: Vec<NativeType>,
    invoke: MethodFn,
}

impl MethodDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[NativeType] {
        &self.params
    }

    /// 只把声明个数的实参交给方法，多余的实参保持不变
    pub fn invoke(&self, state: &mut (dyn Any + Send + Sync), args: &mut [NativeValue]) -> ChoreoResult<NativeValue> {
        let arity = self.params.len().min(args.len());
        (self.invoke)(state, &mut args[..arity])
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

struct Persistence {
    save: SaveFn,
    restore: RestoreFn,
}

/// 一个可调用类
pub struct ClassDescriptor {
    name: String,
    constructors: Vec<ConstructorDescriptor>,
    methods: Vec<MethodDescriptor>,
    persistence: Option<Persistence>,
}

impl ClassDescriptor {
    pub fn builder<T: Any + Send + Sync>(name: impl Into<String>) -> ClassBuilder<T> {
        ClassBuilder {
            descriptor: ClassDescriptor {
                name: name.into(),
                constructors: Vec::new(),
                methods: Vec::new(),
                persistence: None,
            },
            _state: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constructors(&self) -> &[ConstructorDescriptor] {
        &self.constructors
    }

    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    pub fn method(&self, index: usize) -> Option<&MethodDescriptor> {
        self.methods.get(index)
    }

    pub fn is_persistable(&self) -> bool {
        self.persistence.is_some()
    }

    pub fn resolve_constructor(
        &self,
        supplied: &[String],
        marshaller: &SemanticTypeMarshaller,
    ) -> Option<&ConstructorDescriptor> {
        self.constructors
            .iter()
            .find(|ctor| signature_matches(&ctor.params, supplied, marshaller))
    }

    /// 返回匹配方法在声明表中的下标
    pub fn resolve_method(&self, name: &str, supplied: &[String], marshaller: &SemanticTypeMarshaller) -> Option<usize> {
        self.methods
            .iter()
            .position(|m| m.name == name && signature_matches(&m.params, supplied, marshaller))
    }

    /// 不可持久化时返回 `None`
    pub fn save(&self, state: &(dyn Any + Send + Sync)) -> Option<ChoreoResult<Vec<u8>>> {
        self.persistence.as_ref().map(|p| (p.save)(state))
    }

    pub fn restore(&self, bytes: &[u8]) -> ChoreoResult<ServiceState> {
        match &self.persistence {
            Some(p) => (p.restore)(bytes),
            None => Err(ChoreoError::Persistence(format!("类 {} 不支持持久化", self.name))),
        }
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("constructors", &self.constructors)
            .field("methods", &self.methods)
            .field("persistable", &self.is_persistable())
            .finish()
    }
}

/// 以具体状态类型 `T` 声明类
pub struct ClassBuilder<T> {
    descriptor: ClassDescriptor,
    _state: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> ClassBuilder<T> {
    pub fn constructor<F>(mut self, params: Vec<NativeType>, construct: F) -> Self
    where
        F: Fn(&mut [NativeValue]) -> ChoreoResult<T> + Send + Sync + 'static,
    {
        self.descriptor.constructors.push(ConstructorDescriptor {
            params,
            construct: Arc::new(move |args: &mut [NativeValue]| -> ChoreoResult<ServiceState> {
                Ok(Box::new(construct(args)?))
            }),
        });
        self
    }

    pub fn method<F>(mut self, name: &str, params: Vec<NativeType>, invoke: F) -> Self
    where
        F: Fn(&mut T, &mut [NativeValue]) -> ChoreoResult<NativeValue> + Send + Sync + 'static,
    {
        let class = self.descriptor.name.clone();
        self.descriptor.methods.push(MethodDescriptor {
            name: name.to_string(),
            params,
            invoke: Arc::new(move |state: &mut (dyn Any + Send + Sync), args: &mut [NativeValue]| {
                let state = state
                    .downcast_mut::<T>()
                    .ok_or_else(|| ChoreoError::Internal(format!("类 {class} 的实例状态类型不符")))?;
                invoke(state, args)
            }),
        });
        self
    }

    pub fn build(self) -> ClassDescriptor {
        self.descriptor
    }
}

impl<T: Any + Send + Sync + Serialize + DeserializeOwned> ClassBuilder<T> {
    /// 实例状态以 JSON 持久化
    pub fn persist_with_serde(mut self) -> Self {
        let class = self.descriptor.name.clone();
        self.descriptor.persistence = Some(Persistence {
            save: Arc::new(move |state: &(dyn Any + Send + Sync)| {
                let state = state
                    .downcast_ref::<T>()
                    .ok_or_else(|| ChoreoError::Internal(format!("类 {class} 的实例状态类型不符")))?;
                serde_json::to_vec(state).map_err(|e| ChoreoError::Persistence(e.to_string()))
            }),
            restore: Arc::new(|bytes: &[u8]| -> ChoreoResult<ServiceState> {
                let state: T = serde_json::from_slice(bytes).map_err(|e| ChoreoError::Persistence(e.to_string()))?;
                Ok(Box::new(state))
            }),
        });
        self
    }
}
