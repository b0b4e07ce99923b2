use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use choreo_core::{ChoreoError, ChoreoResult};
use choreo_domain::{DurableStore, StoreKey};
use tokio::fs;
use tracing::debug;

/// 文件存储，每个实例一个文件
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `class` 与 `id` 都只能是单个路径分量
    fn path_for(&self, key: &StoreKey) -> ChoreoResult<PathBuf> {
        for component in [&key.class, &key.id] {
            let invalid = component.is_empty()
                || component == "."
                || component == ".."
                || component.contains(['/', '\\', '\0']);
            if invalid {
                return Err(ChoreoError::Persistence(format!("非法的存储键: {key}")));
            }
        }
        Ok(self.root.join(&key.class).join(&key.id))
    }
}

#[async_trait]
impl DurableStore for FileStore {
    /// 先写临时文件再重命名，读者不会看到写了一半的内容
    async fn write(&self, key: &StoreKey, bytes: Vec<u8>) -> ChoreoResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ChoreoError::Persistence(format!("创建目录 {} 失败: {e}", parent.display())))?;
        }
        let tmp = path.with_file_name(format!("{}.tmp", key.id));
        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| ChoreoError::Persistence(format!("写入 {} 失败: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| ChoreoError::Persistence(format!("重命名到 {} 失败: {e}", path.display())))?;
        debug!("已写入 {} ({} 字节)", path.display(), bytes.len());
        Ok(())
    }

    async fn read(&self, key: &StoreKey) -> ChoreoResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ChoreoError::Persistence(format!("读取 {} 失败: {e}", path.display()))),
        }
    }

    async fn delete(&self, key: &StoreKey) -> ChoreoResult<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ChoreoError::Persistence(format!("删除 {} 失败: {e}", path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_layout_is_root_class_id() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let key = StoreKey::new("demo.Counter", "abc");

        store.write(&key, b"{\"value\":3}".to_vec()).await.unwrap();

        let on_disk = std::fs::read(dir.path().join("demo.Counter").join("abc")).unwrap();
        assert_eq!(on_disk, b"{\"value\":3}");
        assert!(!dir.path().join("demo.Counter").join("abc.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_entries() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let key = StoreKey::new("demo.Counter", "missing");

        assert_eq!(store.read(&key).await.unwrap(), None);
        assert!(!store.delete(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        let key = StoreKey::new("demo.Counter", "1");

        store.write(&key, b"1".to_vec()).await.unwrap();
        store.write(&key, b"2".to_vec()).await.unwrap();
        assert_eq!(store.read(&key).await.unwrap(), Some(b"2".to_vec()));

        assert!(store.delete(&key).await.unwrap());
        assert_eq!(store.read(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        for key in [
            StoreKey::new("..", "x"),
            StoreKey::new("demo.Counter", "../../etc"),
            StoreKey::new("demo.Counter", ""),
        ] {
            let err = store.write(&key, b"x".to_vec()).await.unwrap_err();
            assert!(matches!(err, ChoreoError::Persistence(_)));
        }
    }
}
