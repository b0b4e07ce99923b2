use std::fmt;

use async_trait::async_trait;
use choreo_core::ChoreoResult;

/// 持久化键 `(class, id)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreKey {
    pub class: String,
    pub id: String,
}

impl StoreKey {
    pub fn new(class: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.class, self.id)
    }
}

/// 服务实例状态的持久化存储
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn write(&self, key: &StoreKey, bytes: Vec<u8>) -> ChoreoResult<()>;

    /// 不存在时返回 `Ok(None)`
    async fn read(&self, key: &StoreKey) -> ChoreoResult<Option<Vec<u8>>>;

    async fn delete(&self, key: &StoreKey) -> ChoreoResult<bool>;
}
