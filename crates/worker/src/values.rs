//! 服务方法可见的本地值与本地类型

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use choreo_core::{ChoreoError, ChoreoResult};

/// 本地类型：基础类型直接对应线上标签，复杂类型按名字在类型层级中登记
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NativeType {
    Int,
    Double,
    Bool,
    Str,
    Object(String),
}

impl NativeType {
    pub fn object(name: impl Into<String>) -> Self {
        NativeType::Object(name.into())
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, NativeType::Object(_))
    }

    /// 基础类型的名字与类型提升后的精确标签一致
    pub fn name(&self) -> &str {
        match self {
            NativeType::Int => "Int",
            NativeType::Double => "Double",
            NativeType::Bool => "Boolean",
            NativeType::Str => "String",
            NativeType::Object(name) => name,
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 复杂类型的值，类型名用于查找序列化器
#[derive(Clone)]
pub struct ObjectValue {
    type_name: String,
    value: Arc<dyn Any + Send + Sync>,
}

impl ObjectValue {
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<String>, value: T) -> Self {
        Self {
            type_name: type_name.into(),
            value: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectValue")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// 服务方法的参数与返回值
#[derive(Debug, Clone)]
pub enum NativeValue {
    Null,
    Int(i64),
    Double(f64),
    Bool(bool),
    Str(String),
    Object(ObjectValue),
}

impl NativeValue {
    pub fn object<T: Any + Send + Sync>(type_name: impl Into<String>, value: T) -> Self {
        NativeValue::Object(ObjectValue::new(type_name, value))
    }

    /// 值的运行时类型，`Null` 没有类型
    pub fn native_type(&self) -> Option<NativeType> {
        match self {
            NativeValue::Null => None,
            NativeValue::Int(_) => Some(NativeType::Int),
            NativeValue::Double(_) => Some(NativeType::Double),
            NativeValue::Bool(_) => Some(NativeType::Bool),
            NativeValue::Str(_) => Some(NativeType::Str),
            NativeValue::Object(object) => Some(NativeType::object(object.type_name())),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, NativeValue::Null)
    }

    pub fn as_int(&self) -> ChoreoResult<i64> {
        match self {
            NativeValue::Int(v) => Ok(*v),
            other => Err(unexpected("Int", other)),
        }
    }

    /// 整数可以按浮点数读取
    pub fn as_double(&self) -> ChoreoResult<f64> {
        match self {
            NativeValue::Double(v) => Ok(*v),
            NativeValue::Int(v) => Ok(*v as f64),
            other => Err(unexpected("Double", other)),
        }
    }

    pub fn as_bool(&self) -> ChoreoResult<bool> {
        match self {
            NativeValue::Bool(v) => Ok(*v),
            other => Err(unexpected("Boolean", other)),
        }
    }

    pub fn as_str(&self) -> ChoreoResult<&str> {
        match self {
            NativeValue::Str(v) => Ok(v),
            other => Err(unexpected("String", other)),
        }
    }

    pub fn as_object<T: Any>(&self) -> ChoreoResult<&T> {
        match self {
            NativeValue::Object(object) => object
                .downcast_ref::<T>()
                .ok_or_else(|| unexpected(std::any::type_name::<T>(), self)),
            other => Err(unexpected(std::any::type_name::<T>(), other)),
        }
    }
}

impl PartialEq for NativeValue {
    /// 复杂值只在指向同一份数据时相等
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NativeValue::Null, NativeValue::Null) => true,
            (NativeValue::Int(a), NativeValue::Int(b)) => a == b,
            (NativeValue::Double(a), NativeValue::Double(b)) => a == b,
            (NativeValue::Bool(a), NativeValue::Bool(b)) => a == b,
            (NativeValue::Str(a), NativeValue::Str(b)) => a == b,
            (NativeValue::Object(a), NativeValue::Object(b)) => {
                a.type_name == b.type_name && Arc::ptr_eq(&a.value, &b.value)
            }
            _ => false,
        }
    }
}

fn unexpected(expected: &str, actual: &NativeValue) -> ChoreoError {
    let actual = actual
        .native_type()
        .map(|t| t.to_string())
        .unwrap_or_else(|| "Null".to_string());
    ChoreoError::invocation(format!("参数类型错误: 期望 {expected}, 实际为 {actual}"))
}
