//! 状态表与线上传输的带标签值

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// 内置的线上语义类型标签
pub mod tags {
    pub const NUMBER: &str = "Number";
    pub const STRING: &str = "String";
    pub const BOOLEAN: &str = "Boolean";
    pub const NULL: &str = "Null";
    pub const SERVICE_HANDLE: &str = "ServiceHandle";
}

/// 语义类型标签 + 可在线上传输的数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedValue {
    #[serde(rename = "type")]
    pub semantic_type: String,
    pub data: Value,
}

impl TaggedValue {
    pub fn new(semantic_type: impl Into<String>, data: Value) -> Self {
        Self {
            semantic_type: semantic_type.into(),
            data,
        }
    }

    pub fn number(value: impl Into<serde_json::Number>) -> Self {
        Self::new(tags::NUMBER, Value::Number(value.into()))
    }

    /// 非有限浮点数无法表示为 JSON 数字，退化为 Null
    pub fn double(value: f64) -> Self {
        match serde_json::Number::from_f64(value) {
            Some(number) => Self::new(tags::NUMBER, Value::Number(number)),
            None => Self::null(),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(tags::STRING, Value::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(tags::BOOLEAN, Value::Bool(value))
    }

    pub fn null() -> Self {
        Self::new(tags::NULL, Value::Null)
    }

    pub fn is_service_handle(&self) -> bool {
        self.semantic_type == tags::SERVICE_HANDLE
    }
}

/// 进程内服务实例的引用键，由服务注册表持有实例本身
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceKey(Uuid);

impl InstanceKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 服务句柄：持久身份 `(class, id)` 加上进程内实例引用
///
/// `id` 为 `None` 表示实例无法持久化，只存在于当前进程。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    pub host: String,
    pub class: String,
    pub id: Option<String>,
    pub instance: InstanceKey,
}

impl ServiceHandle {
    pub fn is_durable(&self) -> bool {
        self.id.is_some()
    }

    /// `host/Class/id`，不可持久化时 id 写作 `none`
    pub fn address(&self) -> String {
        format!(
            "{}/{}/{}",
            self.host,
            self.class,
            self.id.as_deref().unwrap_or("none")
        )
    }

    pub fn to_tagged(&self) -> TaggedValue {
        TaggedValue::new(
            tags::SERVICE_HANDLE,
            json!({
                "host": self.host,
                "class": self.class,
                "id": self.id,
            }),
        )
    }
}

/// 状态表中的一项
#[derive(Debug, Clone, PartialEq)]
pub enum StateEntry {
    /// 普通数据，可以原样转发
    Data(TaggedValue),
    /// 本进程内的服务引用，只能在本地使用
    Service(ServiceHandle),
}

/// 线上传输的状态：变量名 -> 带标签值
pub type WireState = BTreeMap<String, TaggedValue>;

/// 单个请求的状态表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateTable {
    entries: HashMap<String, StateEntry>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由调用方提供的关键字参数构造初始状态
    pub fn from_wire(wire: WireState) -> Self {
        Self {
            entries: wire
                .into_iter()
                .map(|(name, value)| (name, StateEntry::Data(value)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&StateEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn insert_data(&mut self, name: impl Into<String>, value: TaggedValue) {
        self.entries.insert(name.into(), StateEntry::Data(value));
    }

    pub fn insert_service(&mut self, name: impl Into<String>, handle: ServiceHandle) {
        self.entries.insert(name.into(), StateEntry::Service(handle));
    }

    pub fn remove(&mut self, name: &str) -> Option<StateEntry> {
        self.entries.remove(name)
    }

    /// 状态变量中持有的本地服务句柄
    pub fn service(&self, name: &str) -> Option<&ServiceHandle> {
        match self.entries.get(name) {
            Some(StateEntry::Service(handle)) => Some(handle),
            _ => None,
        }
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceHandle> {
        self.entries.values().filter_map(|entry| match entry {
            StateEntry::Service(handle) => Some(handle),
            StateEntry::Data(_) => None,
        })
    }

    /// 可以转发给下游主机的普通数据（不含服务引用）
    pub fn plain_data(&self) -> WireState {
        self.entries
            .iter()
            .filter_map(|(name, entry)| match entry {
                StateEntry::Data(value) => Some((name.clone(), value.clone())),
                StateEntry::Service(_) => None,
            })
            .collect()
    }

    /// 把下游返回的状态合并进来，同名项以下游为准
    pub fn splice(&mut self, wire: WireState) {
        for (name, value) in wire {
            self.entries.insert(name, StateEntry::Data(value));
        }
    }

    /// 全部状态的线上形式，服务句柄以 `ServiceHandle` 标签序列化
    pub fn to_wire(&self) -> WireState {
        self.entries
            .iter()
            .map(|(name, entry)| {
                let value = match entry {
                    StateEntry::Data(value) => value.clone(),
                    StateEntry::Service(handle) => handle.to_tagged(),
                };
                (name.clone(), value)
            })
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
