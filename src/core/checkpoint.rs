//! 断点状态机 (Crawl Checkpoint)
//!
//! `crawling -> composing -> stopped`，任意状态可进入 `error`。
//! 断点值由 [`Checkpoint`] 独占持有，每次状态迁移都经由同一个持久化调用落盘。

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, info, warn};

use crate::core::error::{Result, SpiderError};
use crate::storage::Repository;

/// 运行状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CrawlStatus {
    Crawling,
    Composing,
    #[default]
    Stopped,
    Error,
}

impl CrawlStatus {
    /// 指标中的状态码
    pub fn code(self) -> i32 {
        match self {
            CrawlStatus::Error => -1,
            CrawlStatus::Stopped => 0,
            CrawlStatus::Crawling => 1,
            CrawlStatus::Composing => 2,
        }
    }
}

/// 持久化的断点记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeCheckpoint {
    #[serde(default)]
    pub crawler_run_id: Option<u64>,
    #[serde(default)]
    pub novel_index: usize,
    #[serde(default = "first_page")]
    pub last_page_num: u32,
    #[serde(default)]
    pub status: CrawlStatus,
}

fn first_page() -> u32 {
    1
}

impl Default for RuntimeCheckpoint {
    fn default() -> Self {
        Self {
            crawler_run_id: None,
            novel_index: 0,
            last_page_num: 1,
            status: CrawlStatus::Stopped,
        }
    }
}

/// 断点的唯一写入者
pub struct Checkpoint {
    state: RuntimeCheckpoint,
    repo: Repository,
}

impl Checkpoint {
    /// 读取上次运行留下的断点；不存在时从第一本小说第一页开始
    pub async fn load(repo: Repository, run_id: u64) -> Result<Self> {
        let mut state = repo.load_checkpoint().await?.unwrap_or_default();
        if state.last_page_num == 0 {
            state.last_page_num = 1;
        }
        debug!(
            novel_index = state.novel_index,
            last_page_num = state.last_page_num,
            status = %state.status,
            "断点已加载"
        );
        state.crawler_run_id = Some(run_id);
        Ok(Self { state, repo })
    }

    pub fn state(&self) -> &RuntimeCheckpoint {
        &self.state
    }

    pub fn novel_index(&self) -> usize {
        self.state.novel_index
    }

    pub fn last_page_num(&self) -> u32 {
        self.state.last_page_num
    }

    pub fn status(&self) -> CrawlStatus {
        self.state.status
    }

    /// 开始处理当前小说；在任何网络活动之前落盘
    pub async fn begin_novel(&mut self) -> Result<()> {
        self.state.status = CrawlStatus::Crawling;
        self.persist().await
    }

    /// 列表页到达时推进页码
    ///
    /// 仅当页码不小于当前断点值时推进并返回 `true`；重复访问旧页返回 `false`。
    pub async fn advance_page(&mut self, page_num: u32) -> Result<bool> {
        if page_num < self.state.last_page_num {
            return Ok(false);
        }
        self.state.last_page_num = page_num;
        self.persist().await?;
        Ok(true)
    }

    pub async fn begin_compose(&mut self) -> Result<()> {
        self.state.status = CrawlStatus::Composing;
        self.persist().await
    }

    /// 提交点：当前小说完成
    pub async fn commit_novel(&mut self) -> Result<()> {
        self.state.novel_index += 1;
        self.state.last_page_num = 1;
        self.state.status = CrawlStatus::Stopped;
        self.persist().await?;
        info!(novel_index = self.state.novel_index, "断点已提交");
        Ok(())
    }

    /// 记录不可恢复的失败
    ///
    /// 当前小说的结构化缺失错误会先把页码回退到出错页，下次运行从缺口处重新抓取。
    pub async fn fail(&mut self, active_novel_id: &str, err: &SpiderError) -> Result<()> {
        if let Some((novel_id, page_num)) = err.missing_page_num()
            && novel_id == active_novel_id
        {
            warn!(
                novel_id,
                page_num,
                from = self.state.last_page_num,
                "断点回退至缺失页"
            );
            self.state.last_page_num = page_num.max(1);
        }
        self.state.status = CrawlStatus::Error;
        self.persist().await
    }

    /// 清空断点，从第一本小说重新开始
    pub async fn reset(&mut self) -> Result<()> {
        let run_id = self.state.crawler_run_id;
        self.state = RuntimeCheckpoint {
            crawler_run_id: run_id,
            ..Default::default()
        };
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        self.repo.save_checkpoint(&self.state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fresh() -> (Checkpoint, Repository) {
        let repo = Repository::in_memory();
        (Checkpoint::load(repo.clone(), 7).await.unwrap(), repo)
    }

    #[tokio::test]
    async fn begin_persists_before_work() {
        let (mut cp, repo) = fresh().await;
        cp.begin_novel().await.unwrap();

        let saved = repo.load_checkpoint().await.unwrap().unwrap();
        assert_eq!(saved.status, CrawlStatus::Crawling);
        assert_eq!(saved.crawler_run_id, Some(7));
        assert_eq!(saved.last_page_num, 1);
    }

    #[tokio::test]
    async fn page_advance_is_monotonic() {
        let (mut cp, repo) = fresh().await;
        cp.begin_novel().await.unwrap();

        assert!(cp.advance_page(1).await.unwrap());
        assert!(cp.advance_page(3).await.unwrap());
        assert!(!cp.advance_page(2).await.unwrap());
        assert!(cp.advance_page(3).await.unwrap());
        assert_eq!(repo.load_checkpoint().await.unwrap().unwrap().last_page_num, 3);
    }

    #[tokio::test]
    async fn commit_moves_to_next_novel() {
        let (mut cp, repo) = fresh().await;
        cp.begin_novel().await.unwrap();
        cp.advance_page(4).await.unwrap();
        cp.begin_compose().await.unwrap();
        assert_eq!(cp.status(), CrawlStatus::Composing);
        cp.commit_novel().await.unwrap();

        let saved = repo.load_checkpoint().await.unwrap().unwrap();
        assert_eq!(saved.novel_index, 1);
        assert_eq!(saved.last_page_num, 1);
        assert_eq!(saved.status, CrawlStatus::Stopped);
    }

    #[tokio::test]
    async fn missing_page_rewinds_before_error() {
        let (mut cp, repo) = fresh().await;
        cp.begin_novel().await.unwrap();
        cp.advance_page(3).await.unwrap();

        let err = SpiderError::missing_page("n1", 2, "gap");
        cp.fail("n1", &err).await.unwrap();

        let saved = repo.load_checkpoint().await.unwrap().unwrap();
        assert_eq!(saved.last_page_num, 2);
        assert_eq!(saved.status, CrawlStatus::Error);
    }

    #[tokio::test]
    async fn foreign_or_unstructured_failure_keeps_page() {
        let (mut cp, _) = fresh().await;
        cp.advance_page(5).await.unwrap();

        cp.fail("n1", &SpiderError::missing_page("other", 2, "gap")).await.unwrap();
        assert_eq!(cp.last_page_num(), 5);

        cp.fail("n1", &SpiderError::Parse("boom".into())).await.unwrap();
        assert_eq!(cp.last_page_num(), 5);
        assert_eq!(cp.status(), CrawlStatus::Error);
    }

    #[tokio::test]
    async fn resumes_from_persisted_state() {
        let repo = Repository::in_memory();
        {
            let mut cp = Checkpoint::load(repo.clone(), 1).await.unwrap();
            cp.begin_novel().await.unwrap();
            cp.advance_page(6).await.unwrap();
        }
        let cp = Checkpoint::load(repo, 2).await.unwrap();
        assert_eq!(cp.last_page_num(), 6);
        assert_eq!(cp.status(), CrawlStatus::Crawling);
        assert_eq!(cp.state().crawler_run_id, Some(2));
    }

    #[test]
    fn status_text_and_codes() {
        assert_eq!(CrawlStatus::Composing.to_string(), "composing");
        assert_eq!("error".parse::<CrawlStatus>().unwrap(), CrawlStatus::Error);
        assert_eq!(CrawlStatus::Error.code(), -1);
        assert_eq!(CrawlStatus::Crawling.code(), 1);
    }
}
