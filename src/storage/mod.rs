//! 持久化层 (Key-Value Persistence)
//!
//! 键值存储是外部协作方；这里定义其契约，并提供文件系统与内存两种实现。

mod fs;
mod lock;
mod memory;
mod repository;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::error::Result;

pub use self::fs::FsStore;
pub use self::lock::StorageLock;
pub use self::memory::MemoryStore;
pub use self::repository::Repository;

/// 原始键值存储契约
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set_raw(&self, key: &str, value: Vec<u8>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// 读取并反序列化 JSON 值
pub async fn read_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get_raw(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// 序列化并写入 JSON 值
pub async fn write_json<T: Serialize + Sync>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    store.set_raw(key, bytes).await
}
