//! 组装引擎 (Composition Engine)
//!
//! 按索引顺序把已存储的章节分片拼成一个纯文本文档。每次都从头重建；
//! 只有完整成功的一轮才会替换目标文件，失败时上一轮的文件保持不变。

use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::core::config::CompiledSite;
use crate::core::error::{Result, SpiderError};
use crate::core::event::{EventSender, SpiderEvent};
use crate::core::model::{ChapterEntry, NovelIndex, PartInfo};
use crate::storage::Repository;
use crate::utils::{remove_file_if_exists, sanitize_filename};

pub struct Composer<'a> {
    site: &'a CompiledSite,
    repo: &'a Repository,
    output_dir: PathBuf,
    events: Option<&'a EventSender>,
}

impl<'a> Composer<'a> {
    pub fn new(site: &'a CompiledSite, repo: &'a Repository, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            site,
            repo,
            output_dir: output_dir.into(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: Option<&'a EventSender>) -> Self {
        self.events = events;
        self
    }

    /// 组装整本小说，返回最终文档路径
    pub async fn compose(&self, novel_id: &str) -> Result<PathBuf> {
        let index = self
            .repo
            .novel_index(novel_id)
            .await?
            .ok_or_else(|| SpiderError::missing_page(novel_id, 1, format!("novel '{}' not found", novel_id)))?;
        let Some(max_page) = index.max_page() else {
            return Err(SpiderError::missing_page(novel_id, 1, "pageChapterMap is empty"));
        };

        fs::create_dir_all(&self.output_dir).await?;
        let working = self.output_dir.join(format!("{}.txt.part", novel_id));
        remove_file_if_exists(&working).await?;

        self.emit(SpiderEvent::Composing {
            novel_id: novel_id.to_string(),
            chapters: index.chapter_count(),
        });
        info!(novel_id, pages = max_page, chapters = index.chapter_count(), "开始组装");

        if let Err(e) = self.write_document(&index, max_page, &working).await {
            if let Err(cleanup) = remove_file_if_exists(&working).await {
                warn!(path = %working.display(), error = %cleanup, "清理临时文件失败");
            }
            return Err(e);
        }

        let path = self.commit(&index, &working).await?;
        info!(novel_id, path = %path.display(), "组装完成");
        self.emit(SpiderEvent::Composed {
            path: path.display().to_string(),
        });
        Ok(path)
    }

    async fn write_document(&self, index: &NovelIndex, max_page: u32, working: &Path) -> Result<()> {
        let novel_id = index.novel_id.as_str();
        let total = index.chapter_count();
        let mut out = BufWriter::new(File::create(working).await?);
        let mut written = 0;

        for page_num in 1..=max_page {
            let chapters = index
                .chapters(page_num)
                .filter(|chapters| !chapters.is_empty())
                .ok_or_else(|| {
                    SpiderError::missing_page(novel_id, page_num, format!("page #{} has no chapter list", page_num))
                })?;

            for chapter in chapters {
                self.write_chapter(&mut out, index, page_num, chapter).await?;
                written += 1;
                self.emit(SpiderEvent::ComposeProgress {
                    current: written,
                    total,
                    title: chapter.chapter_title.clone(),
                });
            }
        }

        out.flush().await?;
        out.into_inner().sync_all().await?;
        Ok(())
    }

    async fn write_chapter(
        &self,
        out: &mut BufWriter<File>,
        index: &NovelIndex,
        page_num: u32,
        chapter: &ChapterEntry,
    ) -> Result<()> {
        let head = self.load_part(index, page_num, &chapter.chapter_id, 1).await?;
        let max_part = head.max_part;
        let compose = &self.site.compose;

        out.write_all(chapter.chapter_title.as_bytes()).await?;
        out.write_all(compose.chapter_title_suffix.as_bytes()).await?;

        let mut info = head;
        for position in 1..=max_part {
            if position > 1 {
                info = self.load_part(index, page_num, &chapter.chapter_id, position).await?;
                if (info.part, info.max_part) != (position, max_part) {
                    debug!(
                        chapter_id = %chapter.chapter_id,
                        position,
                        part = info.part,
                        max_part = info.max_part,
                        "分页标记与位置不一致"
                    );
                }
            }
            out.write_all(info.content.as_bytes()).await?;
            let terminator = if position == max_part {
                &compose.chapter_suffix
            } else {
                &compose.chapter_part_suffix
            };
            out.write_all(terminator.as_bytes()).await?;
        }
        Ok(())
    }

    /// 读取并解析一个分片；任何缺失都是带身份信息的 `MissingChapter`
    async fn load_part(&self, index: &NovelIndex, page_num: u32, chapter_id: &str, part: u32) -> Result<PartInfo> {
        let novel_id = index.novel_id.as_str();
        let chapter_part_id = self.site.identity.resolve(novel_id, chapter_id, part)?;
        let missing = |message: &str| SpiderError::missing_chapter(novel_id, page_num, &chapter_part_id, message);

        let stored = self
            .repo
            .chapter_part(novel_id, &chapter_part_id)
            .await?
            .ok_or_else(|| missing("chapter part not found"))?;
        if stored.chapter_title.is_empty() {
            return Err(missing("chapter title is empty"));
        }
        if stored.content.is_empty() {
            return Err(missing("chapter content is empty"));
        }

        self.site
            .part_detector
            .parse(&index.novel_name, &stored.chapter_title, &stored.content)?
            .ok_or_else(|| missing("content does not match part_info_regex"))
    }

    /// `<id>.txt.part` -> `<id>.txt`，名称已知时再移动为 `<小说名>.txt`
    async fn commit(&self, index: &NovelIndex, working: &Path) -> Result<PathBuf> {
        let by_id = self.output_dir.join(format!("{}.txt", index.novel_id));
        fs::rename(working, &by_id).await?;

        let name = index.display_name().map(sanitize_filename).unwrap_or_default();
        if name.is_empty() || name == index.novel_id {
            return Ok(by_id);
        }

        let by_name = self.output_dir.join(format!("{}.txt", name));
        fs::rename(&by_id, &by_name).await?;
        Ok(by_name)
    }

    fn emit(&self, event: SpiderEvent) {
        if let Some(sender) = self.events {
            sender.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::tests::sample_site;
    use crate::core::model::ChapterPart;

    struct Fixture {
        site: CompiledSite,
        repo: Repository,
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                site: CompiledSite::compile(&sample_site()).unwrap(),
                repo: Repository::in_memory(),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn composer(&self) -> Composer<'_> {
            Composer::new(&self.site, &self.repo, self.dir.path())
        }

        /// `(页号, 章节 ID, 标题)`
        async fn index(&self, name: &str, chapters: &[(u32, &str, &str)]) {
            let mut index = NovelIndex::new("abc");
            index.novel_name = name.into();
            for (page_num, id, title) in chapters {
                index
                    .page_chapter_map
                    .entry(*page_num)
                    .or_default()
                    .push(ChapterEntry::new(*id, *title));
            }
            self.repo.save_novel_index(&index).await.unwrap();
        }

        async fn part(&self, id: &str, content: &str) {
            self.repo
                .save_chapter_part(&ChapterPart {
                    novel_id: "abc".into(),
                    chapter_part_id: id.into(),
                    chapter_title: format!("stored {}", id),
                    content: content.into(),
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn chapters_follow_index_order() {
        let fx = Fixture::new();
        fx.index("书", &[(1, "1", "A"), (1, "2", "B"), (2, "3", "C")]).await;
        fx.part("1", "(第1/1页)a").await;
        fx.part("2", "(第1/1页)b").await;
        fx.part("3", "(第1/1页)c").await;

        let path = fx.composer().compose("abc").await.unwrap();
        assert_eq!(path, fx.dir.path().join("书.txt"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "A\na\n\nB\nb\n\nC\nc\n\n");
        assert!(!fx.dir.path().join("abc.txt").exists());
        assert!(!fx.dir.path().join("abc.txt.part").exists());
    }

    #[tokio::test]
    async fn merges_parts_and_strips_markers() {
        let fx = Fixture::new();
        fx.index("", &[(1, "1", "Ch1")]).await;
        fx.part("1", "(第1/2页)\nbody1").await;
        fx.part("1_2", "(第2/2页)\nbody2").await;

        let path = fx.composer().compose("abc").await.unwrap();
        assert_eq!(path, fx.dir.path().join("abc.txt"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Ch1\nbody1\nbody2\n\n");
    }

    #[tokio::test]
    async fn compose_is_idempotent() {
        let fx = Fixture::new();
        fx.index("书", &[(1, "1", "Ch1")]).await;
        fx.part("1", "(第1/2页)\nbody1").await;
        fx.part("1_2", "(第2/2页)\nbody2").await;

        let first = std::fs::read(fx.composer().compose("abc").await.unwrap()).unwrap();
        let second = std::fs::read(fx.composer().compose("abc").await.unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn page_gap_is_missing_page() {
        let fx = Fixture::new();
        fx.index("书", &[(1, "1", "A"), (3, "3", "C")]).await;
        fx.part("1", "(第1/1页)a").await;
        fx.part("3", "(第1/1页)c").await;

        let err = fx.composer().compose("abc").await.unwrap_err();
        assert!(matches!(err, SpiderError::MissingPage { page_num: 2, .. }));
        assert_eq!(err.missing_page_num(), Some(("abc", 2)));
    }

    #[tokio::test]
    async fn absent_novel_or_empty_map_is_missing_first_page() {
        let fx = Fixture::new();
        let err = fx.composer().compose("abc").await.unwrap_err();
        assert_eq!(err.missing_page_num(), Some(("abc", 1)));

        fx.index("书", &[]).await;
        let err = fx.composer().compose("abc").await.unwrap_err();
        assert_eq!(err.missing_page_num(), Some(("abc", 1)));
    }

    #[tokio::test]
    async fn missing_part_keeps_previous_document() {
        let fx = Fixture::new();
        fx.index("书", &[(1, "1", "Ch1"), (2, "2", "Ch2")]).await;
        fx.part("1", "(第1/1页)one").await;
        fx.part("2", "(第1/2页)\ntwo").await;
        fx.part("2_2", "(第2/2页)\nmore").await;
        let path = fx.composer().compose("abc").await.unwrap();
        let before = std::fs::read(&path).unwrap();

        fx.repo.delete_chapter_part("abc", "2_2").await.unwrap();
        let err = fx.composer().compose("abc").await.unwrap_err();
        match err {
            SpiderError::MissingChapter {
                page_num,
                ref chapter_part_id,
                ..
            } => {
                assert_eq!(page_num, 2);
                assert_eq!(chapter_part_id, "2_2");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert!(!fx.dir.path().join("abc.txt.part").exists());
    }

    #[tokio::test]
    async fn unparseable_content_is_missing_chapter() {
        let fx = Fixture::new();
        fx.index("书", &[(1, "1", "A")]).await;
        fx.part("1", "no marker").await;

        let err = fx.composer().compose("abc").await.unwrap_err();
        assert!(matches!(err, SpiderError::MissingChapter { .. }));
    }
}
