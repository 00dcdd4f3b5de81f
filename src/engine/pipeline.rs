//! 爬虫引擎调度器
//!
//! 按目录顺序逐本处理小说：开始 -> 抓取 -> 组装 -> 提交。
//! 断点是唯一的游标，所有状态迁移都经由 [`Checkpoint`] 落盘。

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::checkpoint::{Checkpoint, CrawlStatus};
use crate::core::config::{AppConfig, CompiledSite, NovelEntry};
use crate::core::error::{Result, SpiderError};
use crate::core::event::{EventSender, SpiderEvent};
use crate::core::metrics::{Statistic, now_millis, progress};
use crate::network::{PageFetcher, PageReader};
use crate::storage::Repository;

use super::compose::Composer;
use super::context::NovelContext;
use super::frontier::Frontier;
use super::task::{Task, TaskResult};

/// 爬虫引擎
pub struct ScrapeEngine {
    config: Arc<AppConfig>,
    site: Arc<CompiledSite>,
    repo: Repository,
    fetcher: Arc<dyn PageFetcher>,
    events: Option<EventSender>,
    shutdown: CancellationToken,
    output_dir: PathBuf,
}

impl ScrapeEngine {
    pub fn new(
        config: Arc<AppConfig>,
        site: Arc<CompiledSite>,
        repo: Repository,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        let output_dir = config.output_dir();
        Self {
            config,
            site,
            repo,
            fetcher,
            events: None,
            shutdown: CancellationToken::new(),
            output_dir,
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// 清空断点，下次运行从第一本小说开始
    pub async fn reset(&self) -> Result<()> {
        let mut checkpoint = Checkpoint::load(self.repo.clone(), now_millis()).await?;
        checkpoint.reset().await?;
        info!("断点已重置");
        Ok(())
    }

    /// 执行抓取流程，返回本次组装出的文档路径
    pub async fn run(&self) -> Result<Vec<PathBuf>> {
        let novels = &self.config.novels;
        if novels.is_empty() {
            return Err(SpiderError::configuration("novels not found"));
        }

        let run_id = now_millis();
        let mut checkpoint = Checkpoint::load(self.repo.clone(), run_id).await?;
        let mut statistic = Statistic::start(run_id, novels.len(), checkpoint.novel_index());
        let mut outputs = Vec::new();

        if checkpoint.novel_index() >= novels.len() {
            info!(novel_index = checkpoint.novel_index(), "目录中的小说均已完成，如需重新开始请使用 --reset");
        }

        while let Some(novel) = novels.get(checkpoint.novel_index()) {
            match self.process_novel(novel, &mut checkpoint, &mut statistic).await {
                Ok(path) => outputs.push(path),
                Err(e) => {
                    self.fail_novel(novel, &e, &mut checkpoint, &mut statistic).await;
                    return Err(e);
                }
            }
        }

        info!(run_id, novels = outputs.len(), "全部小说处理完成");
        self.emit(SpiderEvent::TaskCompleted);
        Ok(outputs)
    }

    async fn process_novel(
        &self,
        novel: &NovelEntry,
        checkpoint: &mut Checkpoint,
        statistic: &mut Statistic,
    ) -> Result<PathBuf> {
        let novel_id = novel.novel_id.as_str();
        checkpoint.begin_novel().await?;

        statistic.progress = progress(checkpoint.novel_index(), self.config.novels.len());
        statistic.novel_name = self
            .repo
            .novel_index(novel_id)
            .await?
            .map(|index| index.novel_name)
            .unwrap_or_default();
        self.record(statistic, checkpoint).await;

        info!(
            novel_id,
            progress = %statistic.progress,
            page_num = checkpoint.last_page_num(),
            "开始处理小说"
        );
        self.emit(SpiderEvent::NovelStarted {
            novel_id: novel_id.to_string(),
            progress: statistic.progress.clone(),
        });

        let ctx = NovelContext::new(
            self.site.clone(),
            self.repo.clone(),
            novel.clone(),
            &self.config.spider,
            self.events.clone(),
        )?;
        self.crawl(&ctx, checkpoint, statistic).await?;

        checkpoint.begin_compose().await?;
        if let Some(index) = self.repo.novel_index(novel_id).await? {
            statistic.novel_name = index.novel_name;
        }
        self.record(statistic, checkpoint).await;

        let path = Composer::new(&self.site, &self.repo, &self.output_dir)
            .with_events(self.events.as_ref())
            .compose(novel_id)
            .await?;

        checkpoint.commit_novel().await?;
        self.record(statistic, checkpoint).await;
        Ok(path)
    }

    /// 从断点页开始抓取；请求失败只记录并丢弃，章节视为“尚不可用”
    async fn crawl(&self, ctx: &NovelContext, checkpoint: &mut Checkpoint, statistic: &mut Statistic) -> Result<()> {
        let mut frontier = Frontier::new();
        frontier.push_back(Task::list(ctx.list_url(checkpoint.last_page_num())?));

        while let Some(task) = frontier.pop() {
            let page = match self.fetch(task.url()).await {
                Ok(page) => page,
                Err(SpiderError::Cancelled) => return Err(SpiderError::Cancelled),
                Err(e) => {
                    self.request_failed(&task, &e, statistic);
                    continue;
                }
            };
            statistic.requests_finished += 1;

            let is_list = matches!(task, Task::List { .. });
            let label = task.to_string();
            match task.run(page.as_ref(), ctx, checkpoint).await {
                Ok(TaskResult::Spawn(tasks)) => {
                    for task in tasks {
                        if !frontier.push_back(task) {
                            debug!("重复请求已忽略");
                        }
                    }
                }
                Ok(TaskResult::Continue(task)) => {
                    frontier.push_front(task);
                }
                Ok(TaskResult::Completed | TaskResult::Skipped) => {}
                Err(e @ (SpiderError::Parse(_) | SpiderError::Fetch { .. })) => {
                    warn!(task = %label, error = %e, "页面处理失败");
                    statistic.requests_failed += 1;
                    self.emit(SpiderEvent::RequestFailed {
                        url: page.url().to_string(),
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }

            if is_list {
                self.record(statistic, checkpoint).await;
            }
        }

        info!(
            novel_id = ctx.novel_id(),
            last_page_num = checkpoint.last_page_num(),
            finished = statistic.requests_finished,
            failed = statistic.requests_failed,
            "抓取阶段结束"
        );
        Ok(())
    }

    async fn fetch(&self, url: &str) -> Result<Box<dyn PageReader>> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(SpiderError::Cancelled),
            page = self.fetcher.fetch(url) => page,
        }
    }

    fn request_failed(&self, task: &Task, err: &SpiderError, statistic: &mut Statistic) {
        warn!(task = %task, error = %err, "请求在重试后仍失败，丢弃");
        statistic.requests_failed += 1;
        self.emit(SpiderEvent::RequestFailed {
            url: task.url().to_string(),
            error: err.to_string(),
        });
    }

    /// 断点修复后记录 `error` 状态；修复本身失败只记日志，原错误照常上抛
    async fn fail_novel(
        &self,
        novel: &NovelEntry,
        err: &SpiderError,
        checkpoint: &mut Checkpoint,
        statistic: &mut Statistic,
    ) {
        match err {
            SpiderError::MissingChapter {
                novel_id,
                page_num,
                chapter_part_id,
                message,
            } => error!(
                novel_id = %novel_id,
                page_num = *page_num,
                chapter_part_id = %chapter_part_id,
                message = %message,
                "组装失败：章节缺失"
            ),
            SpiderError::MissingPage {
                novel_id,
                page_num,
                message,
            } => error!(
                novel_id = %novel_id,
                page_num = *page_num,
                message = %message,
                "组装失败：列表页缺失"
            ),
            other => error!(novel_id = %novel.novel_id, error = %other, "小说处理失败"),
        }

        if let Err(e) = checkpoint.fail(&novel.novel_id, err).await {
            error!(error = %e, "断点写入失败");
        }
        self.record(statistic, checkpoint).await;
        self.emit(SpiderEvent::TaskFailed { error: err.to_string() });
    }

    /// 统计随断点一同更新；写入失败不影响主流程
    async fn record(&self, statistic: &mut Statistic, checkpoint: &Checkpoint) {
        statistic.status = checkpoint.status();
        statistic.page_num = checkpoint.last_page_num();
        if statistic.status == CrawlStatus::Stopped {
            statistic.progress = progress(checkpoint.novel_index(), self.config.novels.len());
        }
        if let Err(e) = self.repo.save_statistic(statistic).await {
            warn!(error = %e, "统计写入失败");
        }
    }

    fn emit(&self, event: SpiderEvent) {
        if let Some(ref sender) = self.events {
            sender.emit(event);
        }
    }
}
