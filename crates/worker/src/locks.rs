//! 按 (class, id) 加锁，串行化同一实例上的 load -> invoke -> save

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use choreo_domain::StoreKey;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<StoreKey, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 等待并持有 `key` 的锁，释放守卫即解锁
    pub async fn lock(&self, key: &StoreKey) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // 没有人持有或等待的条目可以回收
            locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            locks.entry(key.clone()).or_default().clone()
        };
        mutex.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialised() {
        let locks = Arc::new(KeyedLocks::new());
        let key = StoreKey::new("demo.Counter", "1");

        let guard = locks.lock(&key).await;
        let waiter = {
            let locks = locks.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&key).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock(&StoreKey::new("demo.Counter", "1")).await;
        let _b = locks.lock(&StoreKey::new("demo.Counter", "2")).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_released_entries_are_pruned() {
        let locks = KeyedLocks::new();
        drop(locks.lock(&StoreKey::new("demo.Counter", "1")).await);
        let _b = locks.lock(&StoreKey::new("demo.Counter", "2")).await;
        assert_eq!(locks.len(), 1);
    }
}
