use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use choreo_core::ChoreoResult;
use choreo_domain::{DurableStore, StoreKey};
use tokio::sync::RwLock;
use tracing::debug;

/// 内存存储，克隆后共享同一份数据
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    entries: Arc<RwLock<HashMap<StoreKey, Vec<u8>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 复制当前全部内容到一个独立的新存储
    pub async fn fork(&self) -> Self {
        let entries = self.entries.read().await.clone();
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    pub async fn keys(&self) -> Vec<StoreKey> {
        let mut keys: Vec<StoreKey> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn write(&self, key: &StoreKey, bytes: Vec<u8>) -> ChoreoResult<()> {
        debug!("写入 {key} ({} 字节)", bytes.len());
        self.entries.write().await.insert(key.clone(), bytes);
        Ok(())
    }

    async fn read(&self, key: &StoreKey) -> ChoreoResult<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &StoreKey) -> ChoreoResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}
