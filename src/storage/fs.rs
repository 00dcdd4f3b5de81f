use std::path::{Path, PathBuf};

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::fs;

use super::KeyValueStore;
use crate::core::error::Result;

/// 文件名中保留的字符，其余一律百分号编码
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// 基于目录的键值存储：每个键对应一个 JSON 文件
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut name = utf8_percent_encode(key, KEY_ENCODE_SET).to_string();
        if name.starts_with('.') {
            name.replace_range(..1, "%2E");
        }
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl KeyValueStore for FsStore {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 先写临时文件再重命名，中途崩溃不会留下半截记录
    async fn set_raw(&self, key: &str, value: Vec<u8>) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &value).await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_keys_with_path_separators_flat() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("chapters"));

        store.set_raw("n1_12/p2", b"{}".to_vec()).await.unwrap();
        store.set_raw("..", b"[]".to_vec()).await.unwrap();

        assert_eq!(store.get_raw("n1_12/p2").await.unwrap().unwrap(), b"{}");
        assert_eq!(store.get_raw("..").await.unwrap().unwrap(), b"[]");
        assert!(store.get_raw("n1_12").await.unwrap().is_none());

        let files = std::fs::read_dir(store.dir()).unwrap().count();
        assert_eq!(files, 2);

        store.delete("n1_12/p2").await.unwrap();
        store.delete("n1_12/p2").await.unwrap();
        assert!(store.get_raw("n1_12/p2").await.unwrap().is_none());
    }
}
