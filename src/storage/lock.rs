use std::fs::{self, File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::{Result, SpiderError};

/// 存储目录的独占锁
///
/// 同一存储目录同时只允许一个运行实例写入断点。锁由操作系统持有，进程退出即释放。
#[derive(Debug)]
pub struct StorageLock {
    file: File,
    path: PathBuf,
}

impl StorageLock {
    pub fn acquire(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let path = root.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        match file.try_lock() {
            Ok(()) => {
                debug!(path = %path.display(), "已获取存储锁");
                Ok(Self { file, path })
            }
            Err(TryLockError::WouldBlock) => Err(SpiderError::Locked(format!(
                "{} is held by another run",
                path.display()
            ))),
            Err(TryLockError::Error(e)) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StorageLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_is_rejected_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let first = StorageLock::acquire(dir.path()).unwrap();
        assert!(first.path().ends_with(".lock"));

        let err = StorageLock::acquire(dir.path()).unwrap_err();
        assert!(matches!(err, SpiderError::Locked(_)));

        drop(first);
        StorageLock::acquire(dir.path()).unwrap();
    }
}
