//! 语义类型编组：本地值 <-> 带标签的线上值

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use choreo_core::{ChoreoError, ChoreoResult};
use choreo_domain::{tags, TaggedValue};
use serde_json::Value;
use tracing::debug;

use crate::values::{NativeType, NativeValue};

/// 复杂类型的序列化器，绑定一个语义标签和一个本地类型
pub trait SemanticSerializer: Send + Sync {
    fn semantic_type(&self) -> &str;

    fn native_type(&self) -> &NativeType;

    fn serialize(&self, value: &NativeValue) -> ChoreoResult<Value>;

    /// `target` 是调用方期望的本地类型，它是绑定类型本身或其祖先
    fn deserialize(&self, data: &Value, target: &NativeType) -> ChoreoResult<NativeValue>;
}

/// 复杂类型的继承层级
#[derive(Debug, Default, Clone)]
pub struct TypeHierarchy {
    parents: HashMap<String, Vec<String>>,
}

impl TypeHierarchy {
    pub fn declare(&mut self, name: impl Into<String>, supertypes: &[&str]) {
        let entry = self.parents.entry(name.into()).or_default();
        for supertype in supertypes {
            if !entry.iter().any(|s| s == supertype) {
                entry.push(supertype.to_string());
            }
        }
        for supertype in supertypes {
            self.parents.entry(supertype.to_string()).or_default();
        }
    }

    /// `from` 的值能否当作 `to` 使用
    pub fn is_assignable(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        let mut seen = HashSet::new();
        let mut pending = vec![from];
        while let Some(current) = pending.pop() {
            if !seen.insert(current) {
                continue;
            }
            for parent in self.parents.get(current).into_iter().flatten() {
                if parent == to {
                    return true;
                }
                pending.push(parent);
            }
        }
        false
    }

    /// 到根类型的最长距离，越深越具体
    pub fn depth(&self, name: &str) -> usize {
        self.depth_guarded(name, &mut HashSet::new())
    }

    fn depth_guarded<'a>(&'a self, name: &'a str, visiting: &mut HashSet<&'a str>) -> usize {
        if !visiting.insert(name) {
            return 0;
        }
        let depth = self
            .parents
            .get(name)
            .into_iter()
            .flatten()
            .map(|parent| 1 + self.depth_guarded(parent, visiting))
            .max()
            .unwrap_or(0);
        visiting.remove(name);
        depth
    }
}

/// 语义类型编组器，进程内共享
#[derive(Default, Clone)]
pub struct SemanticTypeMarshaller {
    hierarchy: TypeHierarchy,
    serializers: Vec<Arc<dyn SemanticSerializer>>,
}

impl SemanticTypeMarshaller {
    /// 只支持基础类型
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置 `Sequence` 与其子类型 `Vector`
    pub fn with_builtin_types() -> Self {
        let mut marshaller = Self::new();
        marshaller.declare_type(SEQUENCE, &[]);
        marshaller.declare_type(VECTOR, &[SEQUENCE]);
        marshaller.register(Arc::new(NumberListSerializer::new(SEQUENCE)));
        marshaller.register(Arc::new(NumberListSerializer::new(VECTOR)));
        marshaller
    }

    pub fn declare_type(&mut self, name: &str, supertypes: &[&str]) {
        self.hierarchy.declare(name, supertypes);
    }

    pub fn register(&mut self, serializer: Arc<dyn SemanticSerializer>) {
        debug!(
            "注册序列化器: {} <-> {}",
            serializer.semantic_type(),
            serializer.native_type()
        );
        self.serializers.push(serializer);
    }

    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    /// 类型提升：数字细分为 `Int`/`Double`，字符串与布尔值取本地类型名，其余标签不变
    pub fn promote(&self, value: &TaggedValue) -> String {
        match (value.semantic_type.as_str(), &value.data) {
            (tags::NUMBER, Value::Number(n)) if n.is_i64() => NativeType::Int.name().to_string(),
            (tags::NUMBER, Value::Number(_)) => NativeType::Double.name().to_string(),
            (tags::STRING, _) => NativeType::Str.name().to_string(),
            (tags::BOOLEAN, _) => NativeType::Bool.name().to_string(),
            (other, _) => other.to_string(),
        }
    }

    /// 本地值转为线上值；复杂类型选用绑定类型最具体的序列化器
    pub fn to_semantic(&self, value: &NativeValue) -> ChoreoResult<TaggedValue> {
        match value {
            NativeValue::Null => Ok(TaggedValue::null()),
            NativeValue::Int(v) => Ok(TaggedValue::number(*v)),
            NativeValue::Double(v) => Ok(TaggedValue::double(*v)),
            NativeValue::Bool(v) => Ok(TaggedValue::boolean(*v)),
            NativeValue::Str(v) => Ok(TaggedValue::string(v.clone())),
            NativeValue::Object(object) => {
                let mut best: Option<(&Arc<dyn SemanticSerializer>, usize)> = None;
                for serializer in &self.serializers {
                    let bound = serializer.native_type().name();
                    if !self.hierarchy.is_assignable(object.type_name(), bound) {
                        continue;
                    }
                    let depth = self.hierarchy.depth(bound);
                    if best.map_or(true, |(_, d)| depth > d) {
                        best = Some((serializer, depth));
                    }
                }
                let (serializer, _) = best.ok_or_else(|| ChoreoError::TypeConversion {
                    semantic_type: object.type_name().to_string(),
                    target: "语义类型".to_string(),
                })?;
                let data = serializer.serialize(value)?;
                Ok(TaggedValue::new(serializer.semantic_type(), data))
            }
        }
    }

    /// 线上值按目标本地类型还原
    pub fn from_semantic(&self, value: &TaggedValue, target: &NativeType) -> ChoreoResult<NativeValue> {
        if value.semantic_type == tags::NULL || value.data.is_null() {
            return Ok(NativeValue::Null);
        }
        let converted = match target {
            NativeType::Int => value.data.as_i64().map(NativeValue::Int),
            NativeType::Double => value.data.as_f64().map(NativeValue::Double),
            NativeType::Bool => value.data.as_bool().map(NativeValue::Bool),
            NativeType::Str => value.data.as_str().map(|s| NativeValue::Str(s.to_string())),
            NativeType::Object(_) => {
                return match self.serializer_for(&value.semantic_type, target) {
                    Some(serializer) => serializer.deserialize(&value.data, target),
                    None => Err(conversion_error(value, target)),
                };
            }
        };
        converted.ok_or_else(|| conversion_error(value, target))
    }

    /// 线上标签能否转换为目标本地类型
    pub fn is_compatible(&self, semantic_type: &str, target: &NativeType) -> bool {
        match target {
            NativeType::Int => matches!(semantic_type, "Int" | tags::NUMBER),
            NativeType::Double => matches!(semantic_type, "Double" | tags::NUMBER),
            NativeType::Bool => semantic_type == tags::BOOLEAN,
            NativeType::Str => semantic_type == tags::STRING,
            NativeType::Object(_) => self.serializer_for(semantic_type, target).is_some(),
        }
    }

    fn serializer_for(&self, semantic_type: &str, target: &NativeType) -> Option<&Arc<dyn SemanticSerializer>> {
        self.serializers.iter().find(|serializer| {
            serializer.semantic_type() == semantic_type
                && self
                    .hierarchy
                    .is_assignable(serializer.native_type().name(), target.name())
        })
    }
}

fn conversion_error(value: &TaggedValue, target: &NativeType) -> ChoreoError {
    ChoreoError::TypeConversion {
        semantic_type: value.semantic_type.clone(),
        target: target.to_string(),
    }
}

pub const SEQUENCE: &str = "Sequence";
pub const VECTOR: &str = "Vector";

/// 数值列表，本地表示为 `Vec<f64>`，线上表示为 JSON 数组
pub struct NumberListSerializer {
    native: NativeType,
}

impl NumberListSerializer {
    pub fn new(type_name: &str) -> Self {
        Self {
            native: NativeType::object(type_name),
        }
    }
}

impl SemanticSerializer for NumberListSerializer {
    fn semantic_type(&self) -> &str {
        self.native.name()
    }

    fn native_type(&self) -> &NativeType {
        &self.native
    }

    fn serialize(&self, value: &NativeValue) -> ChoreoResult<Value> {
        let items = value.as_object::<Vec<f64>>()?;
        Ok(serde_json::to_value(items)?)
    }

    fn deserialize(&self, data: &Value, _target: &NativeType) -> ChoreoResult<NativeValue> {
        let items: Vec<f64> = serde_json::from_value(data.clone()).map_err(|_| ChoreoError::TypeConversion {
            semantic_type: self.semantic_type().to_string(),
            target: self.native.to_string(),
        })?;
        Ok(NativeValue::object(self.native.name(), items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(marshaller: &SemanticTypeMarshaller, value: NativeValue, target: NativeType) -> NativeValue {
        let tagged = marshaller.to_semantic(&value).unwrap();
        marshaller.from_semantic(&tagged, &target).unwrap()
    }

    #[test]
    fn test_primitive_round_trip() {
        let marshaller = SemanticTypeMarshaller::new();
        assert_eq!(round_trip(&marshaller, NativeValue::Int(-7), NativeType::Int), NativeValue::Int(-7));
        assert_eq!(
            round_trip(&marshaller, NativeValue::Double(2.0), NativeType::Double),
            NativeValue::Double(2.0)
        );
        assert_eq!(
            round_trip(&marshaller, NativeValue::Str("héllo".into()), NativeType::Str),
            NativeValue::Str("héllo".into())
        );
        assert_eq!(
            round_trip(&marshaller, NativeValue::Bool(true), NativeType::Bool),
            NativeValue::Bool(true)
        );
    }

    #[test]
    fn test_vector_round_trip_uses_most_specific_serializer() {
        let marshaller = SemanticTypeMarshaller::with_builtin_types();
        let vector = NativeValue::object(VECTOR, vec![1.0_f64, -2.5]);

        let tagged = marshaller.to_semantic(&vector).unwrap();
        assert_eq!(tagged.semantic_type, VECTOR);
        assert_eq!(tagged.data, json!([1.0, -2.5]));

        let back = marshaller.from_semantic(&tagged, &NativeType::object(VECTOR)).unwrap();
        assert_eq!(back.as_object::<Vec<f64>>().unwrap(), &vec![1.0, -2.5]);
    }

    #[test]
    fn test_promotion() {
        let marshaller = SemanticTypeMarshaller::new();
        assert_eq!(marshaller.promote(&TaggedValue::number(3)), "Int");
        assert_eq!(marshaller.promote(&TaggedValue::double(3.5)), "Double");
        assert_eq!(marshaller.promote(&TaggedValue::string("x")), "String");
        assert_eq!(marshaller.promote(&TaggedValue::boolean(false)), "Boolean");
        assert_eq!(marshaller.promote(&TaggedValue::new(VECTOR, json!([]))), VECTOR);
    }

    #[test]
    fn test_compatibility_follows_hierarchy() {
        let marshaller = SemanticTypeMarshaller::with_builtin_types();
        assert!(marshaller.is_compatible(VECTOR, &NativeType::object(SEQUENCE)));
        assert!(!marshaller.is_compatible(SEQUENCE, &NativeType::object(VECTOR)));
        assert!(marshaller.is_compatible(tags::NUMBER, &NativeType::Double));
        assert!(!marshaller.is_compatible(tags::STRING, &NativeType::Int));
        assert!(!marshaller.is_compatible("Matrix", &NativeType::object("Matrix")));
    }

    #[test]
    fn test_conversion_failures() {
        let marshaller = SemanticTypeMarshaller::with_builtin_types();
        let err = marshaller
            .from_semantic(&TaggedValue::string("abc"), &NativeType::Int)
            .unwrap_err();
        assert!(matches!(err, ChoreoError::TypeConversion { .. }));

        let err = marshaller
            .from_semantic(&TaggedValue::new(VECTOR, json!("not a list")), &NativeType::object(VECTOR))
            .unwrap_err();
        assert!(matches!(err, ChoreoError::TypeConversion { .. }));

        let unknown = NativeValue::object("Matrix", 1_u8);
        assert!(marshaller.to_semantic(&unknown).is_err());
    }

    #[test]
    fn test_null_converts_to_null() {
        let marshaller = SemanticTypeMarshaller::new();
        let value = marshaller.from_semantic(&TaggedValue::null(), &NativeType::Int).unwrap();
        assert!(value.is_null());
    }

    #[test]
    fn test_depth() {
        let mut hierarchy = TypeHierarchy::default();
        hierarchy.declare("B", &["A"]);
        hierarchy.declare("C", &["B"]);
        assert_eq!(hierarchy.depth("A"), 0);
        assert_eq!(hierarchy.depth("C"), 2);
        assert!(hierarchy.is_assignable("C", "A"));
        assert!(!hierarchy.is_assignable("A", "C"));
    }
}
