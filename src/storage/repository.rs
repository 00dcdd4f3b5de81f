use std::path::Path;
use std::sync::Arc;

use super::{FsStore, KeyValueStore, MemoryStore, read_json, write_json};
use crate::core::checkpoint::RuntimeCheckpoint;
use crate::core::error::Result;
use crate::core::metrics::Statistic;
use crate::core::model::{ChapterPart, NovelIndex};

const CHECKPOINT_KEY: &str = "runtime";
const STATISTIC_KEY: &str = "statistic";

/// 类型化存储门面
///
/// - `novels`：以 novelId 为键的小说索引
/// - `chapters`：以 `novelId_chapterPartId` 为键的章节分片
/// - `runtime`：单槽断点记录与运行统计
#[derive(Clone)]
pub struct Repository {
    novels: Arc<dyn KeyValueStore>,
    chapters: Arc<dyn KeyValueStore>,
    runtime: Arc<dyn KeyValueStore>,
}

impl Repository {
    pub fn new(
        novels: Arc<dyn KeyValueStore>,
        chapters: Arc<dyn KeyValueStore>,
        runtime: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            novels,
            chapters,
            runtime,
        }
    }

    /// 打开 `<root>/key_value_stores/{novels,chapters,runtime}`
    pub fn open(root: impl AsRef<Path>) -> Self {
        let base = root.as_ref().join("key_value_stores");
        Self::new(
            Arc::new(FsStore::new(base.join("novels"))),
            Arc::new(FsStore::new(base.join("chapters"))),
            Arc::new(FsStore::new(base.join("runtime"))),
        )
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryStore::new()),
        )
    }

    pub fn chapter_key(novel_id: &str, chapter_part_id: &str) -> String {
        format!("{}_{}", novel_id, chapter_part_id)
    }

    pub async fn novel_index(&self, novel_id: &str) -> Result<Option<NovelIndex>> {
        read_json(self.novels.as_ref(), novel_id).await
    }

    pub async fn save_novel_index(&self, index: &NovelIndex) -> Result<()> {
        write_json(self.novels.as_ref(), &index.novel_id, index).await
    }

    pub async fn chapter_part(&self, novel_id: &str, chapter_part_id: &str) -> Result<Option<ChapterPart>> {
        read_json(self.chapters.as_ref(), &Self::chapter_key(novel_id, chapter_part_id)).await
    }

    pub async fn save_chapter_part(&self, part: &ChapterPart) -> Result<()> {
        let key = Self::chapter_key(&part.novel_id, &part.chapter_part_id);
        write_json(self.chapters.as_ref(), &key, part).await
    }

    pub async fn delete_chapter_part(&self, novel_id: &str, chapter_part_id: &str) -> Result<()> {
        self.chapters
            .delete(&Self::chapter_key(novel_id, chapter_part_id))
            .await
    }

    pub async fn load_checkpoint(&self) -> Result<Option<RuntimeCheckpoint>> {
        read_json(self.runtime.as_ref(), CHECKPOINT_KEY).await
    }

    pub async fn save_checkpoint(&self, checkpoint: &RuntimeCheckpoint) -> Result<()> {
        write_json(self.runtime.as_ref(), CHECKPOINT_KEY, checkpoint).await
    }

    pub async fn load_statistic(&self) -> Result<Option<Statistic>> {
        read_json(self.runtime.as_ref(), STATISTIC_KEY).await
    }

    pub async fn save_statistic(&self, statistic: &Statistic) -> Result<()> {
        write_json(self.runtime.as_ref(), STATISTIC_KEY, statistic).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ChapterEntry;

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::open(dir.path());

        let mut index = NovelIndex::new("n1");
        index.set_page(1, vec![ChapterEntry::new("1", "One")]);
        repo.save_novel_index(&index).await.unwrap();

        let part = ChapterPart {
            novel_id: "n1".into(),
            chapter_part_id: "n1".into(),
            chapter_title: "One".into(),
            content: "body".into(),
        };
        repo.save_chapter_part(&part).await.unwrap();

        assert_eq!(repo.novel_index("n1").await.unwrap().unwrap(), index);
        assert_eq!(repo.chapter_part("n1", "n1").await.unwrap().unwrap(), part);
        assert!(repo.chapter_part("n1", "2").await.unwrap().is_none());
        assert!(repo.load_checkpoint().await.unwrap().is_none());

        repo.delete_chapter_part("n1", "n1").await.unwrap();
        assert!(repo.chapter_part("n1", "n1").await.unwrap().is_none());
    }
}
