//! 服务实例状态的持久化存储
//!
//! - **file_store**: 每个实例一个文件，路径为 `<root>/<class>/<id>`
//! - **memory_store**: 进程内存储，用于测试与 `backend = "memory"`

pub mod file_store;
pub mod memory_store;

use std::sync::Arc;

use choreo_core::{StorageBackend, StorageConfig};
use choreo_domain::DurableStore;
use tracing::info;

pub use file_store::FileStore;
pub use memory_store::InMemoryStore;

/// 按配置创建存储后端
pub fn create_store(config: &StorageConfig) -> Arc<dyn DurableStore> {
    match config.backend {
        StorageBackend::File => {
            info!("使用文件存储: {}", config.root_dir);
            Arc::new(FileStore::new(&config.root_dir))
        }
        StorageBackend::Memory => {
            info!("使用内存存储, 进程退出后实例状态丢失");
            Arc::new(InMemoryStore::new())
        }
    }
}
