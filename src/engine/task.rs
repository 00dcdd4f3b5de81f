//! 任务单元定义
//!
//! 两类请求：章节列表页 (`list`) 与章节页 (`chapter`)。处理结果决定后续入队动作。

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::core::checkpoint::Checkpoint;
use crate::core::config::CompiledSite;
use crate::core::error::{Result, SpiderError};
use crate::core::event::SpiderEvent;
use crate::core::model::{ChapterEntry, ChapterPart, NovelIndex};
use crate::core::template::{Bindings, Placeholder, capture_number};
use crate::network::PageReader;
use crate::utils::to_absolute_url;

use super::context::NovelContext;

/// 任务执行结果
#[derive(Debug)]
pub enum TaskResult {
    /// 任务完成，无后续动作
    Completed,
    /// 任务完成，产生新任务（排到队尾）
    Spawn(Vec<Task>),
    /// 同一章节的下一页，插到队首
    Continue(Task),
    /// 页面被忽略
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    List { url: String },
    Chapter { url: String },
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::List { url } => write!(f, "列表页 ({})", url),
            Task::Chapter { url } => write!(f, "章节页 ({})", url),
        }
    }
}

impl Task {
    pub fn list(url: impl Into<String>) -> Self {
        Task::List { url: url.into() }
    }

    pub fn chapter(url: impl Into<String>) -> Self {
        Task::Chapter { url: url.into() }
    }

    pub fn url(&self) -> &str {
        match self {
            Task::List { url } | Task::Chapter { url } => url,
        }
    }

    /// 处理已加载的页面
    pub async fn run(
        self,
        page: &dyn PageReader,
        ctx: &NovelContext,
        checkpoint: &mut Checkpoint,
    ) -> Result<TaskResult> {
        match self {
            Task::List { url } => Self::handle_list(url, page, ctx, checkpoint).await,
            Task::Chapter { url } => Self::handle_chapter(url, page, ctx).await,
        }
    }

    async fn handle_list(
        url: String,
        page: &dyn PageReader,
        ctx: &NovelContext,
        checkpoint: &mut Checkpoint,
    ) -> Result<TaskResult> {
        info!(url = %url, "列表页");

        let mut page_num = checkpoint.last_page_num();
        let mut novel_id = ctx.novel_id().to_string();
        if let (Some(regex), Some(pattern)) = (&ctx.list_regex, &ctx.site.list_pattern)
            && pattern.has_group("pageNum")
            && let Some(caps) = regex.captures(&url)
        {
            if let Some(id) = caps.name("novelId") {
                novel_id = id.as_str().to_string();
            }
            page_num = capture_number(&caps, "pageNum").transpose()?.unwrap_or(1);
        }

        if novel_id != ctx.novel_id() {
            error!(url = %url, novel_id = ctx.novel_id(), "不是需要爬取的小说列表页");
            return Ok(TaskResult::Skipped);
        }
        if !checkpoint.advance_page(page_num).await? {
            debug!(page_num, last_page_num = checkpoint.last_page_num(), "旧列表页，忽略");
            return Ok(TaskResult::Skipped);
        }

        let selectors = &ctx.site.selectors;
        let novel_name = page
            .text(&selectors.novel_name_of_list)
            .await?
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| SpiderError::Parse(format!("novel name not found at {}", url)))?;

        let oracle = ctx.oracle();
        let mut chapters = Vec::new();
        let mut chapter_tasks = Vec::new();
        for link in page.elements(&selectors.chapter_url_of_list).await? {
            let Some(chapter_url) = link
                .href
                .as_deref()
                .and_then(|href| to_absolute_url(page.url(), href))
            else {
                continue;
            };
            let Some(chapter_id) = ctx
                .chapter_regex
                .captures(&chapter_url)
                .and_then(|caps| caps.name("chapterId").map(|m| m.as_str().to_string()))
            else {
                continue;
            };

            let decision = oracle.should_fetch(&novel_id, &novel_name, &chapter_id).await?;
            if decision.fetch {
                debug!(chapter_id = %chapter_id, reason = %decision.reason, "章节入队");
                chapter_tasks.push(Task::chapter(ctx.chapter_url(&chapter_id, chapter_url)?));
            } else {
                debug!(chapter_id = %chapter_id, "章节已经存在于存储中，跳过");
            }
            chapters.push(ChapterEntry::new(chapter_id, link.text));
        }

        if chapters.is_empty() {
            warn!(url = %url, page_num, "列表页未解析到任何章节");
        }
        info!(page_num, chapters = chapters.len(), queued = chapter_tasks.len(), "章节列表已索引");

        ctx.emit(SpiderEvent::PageIndexed {
            novel_name: novel_name.clone(),
            page_num,
            chapters: chapters.len(),
            queued: chapter_tasks.len(),
        });

        let mut index = ctx
            .repo
            .novel_index(&novel_id)
            .await?
            .unwrap_or_else(|| NovelIndex::new(novel_id.as_str()));
        index.novel_name = novel_name;
        index.set_page(page_num, chapters);
        ctx.repo.save_novel_index(&index).await?;

        let mut spawned = Vec::new();
        if ctx.disable_chapter_crawl {
            info!("章节抓取已关闭 (spider.disable_chapter_crawl)");
        } else {
            spawned.extend(chapter_tasks);
        }

        let end_page_num = ctx.novel.end_page_num;
        if end_page_num == 0 || page_num < end_page_num {
            for link in page.elements(&selectors.next_page_url_of_list).await? {
                if let Some(next) = link.href.and_then(|href| to_absolute_url(page.url(), &href)) {
                    spawned.push(Task::list(next));
                }
            }
        }

        Ok(TaskResult::Spawn(spawned))
    }

    async fn handle_chapter(url: String, page: &dyn PageReader, ctx: &NovelContext) -> Result<TaskResult> {
        if ctx.disable_chapter_crawl {
            return Ok(TaskResult::Skipped);
        }

        let Some(caps) = ctx.chapter_regex.captures(&url) else {
            warn!(url = %url, "章节 URL 不匹配 chapter_id_and_part_regex");
            return Ok(TaskResult::Skipped);
        };
        let Some(chapter_id) = caps.name("chapterId").map(|m| m.as_str().to_string()) else {
            return Ok(TaskResult::Skipped);
        };
        let part = capture_number(&caps, "part").transpose()?.unwrap_or(1);

        let novel_id = ctx.novel_id();
        let chapter_part_id = ctx.site.identity.resolve(novel_id, &chapter_id, part)?;

        let selectors = &ctx.site.selectors;
        let chapter_title = page
            .text(&selectors.title_of_chapter)
            .await?
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty())
            .ok_or_else(|| SpiderError::Parse(format!("chapter title not found at {}", url)))?;
        let raw_content = page
            .text(&selectors.content_of_chapter)
            .await?
            .ok_or_else(|| SpiderError::Parse(format!("chapter content not found at {}", url)))?;

        let novel_name = ctx
            .repo
            .novel_index(novel_id)
            .await?
            .map(|index| index.novel_name)
            .unwrap_or_default();
        let content = clean_content(&ctx.site, &novel_name, &chapter_title, raw_content)?;

        let record = ChapterPart {
            novel_id: novel_id.to_string(),
            chapter_part_id: chapter_part_id.clone(),
            chapter_title: chapter_title.clone(),
            content,
        };
        ctx.repo.save_chapter_part(&record).await?;
        info!(chapter_part_id = %chapter_part_id, "已保存 {}", chapter_title);
        ctx.emit(SpiderEvent::ChapterSaved {
            title: chapter_title,
            chapter_part_id,
        });

        if let Some(href) = page.attribute(&selectors.next_page_url_of_chapter, "href").await?
            && let Some(next) = to_absolute_url(page.url(), &href)
        {
            return Ok(TaskResult::Continue(Task::chapter(next)));
        }
        Ok(TaskResult::Completed)
    }
}

/// 逐条应用正文清理正则（全局替换），再去掉首尾空白
fn clean_content(site: &CompiledSite, novel_name: &str, chapter_title: &str, content: String) -> Result<String> {
    let bindings = Bindings::new()
        .with(Placeholder::NovelName, novel_name)
        .with(Placeholder::ChapterTitle, chapter_title);

    let mut content = content;
    for pattern in &site.cleanup_patterns {
        let regex = pattern.compile(&bindings)?;
        content = regex.replace_all(&content, "").into_owned();
    }
    Ok(content.trim().to_string())
}
