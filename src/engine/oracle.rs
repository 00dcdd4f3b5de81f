//! 去重判定 (Dedup/Skip Oracle)
//!
//! 判断一个章节是否需要（重新）抓取。判定只会从第 1 页整体重抓，
//! 因为重抓会重新得到 `maxPart`，它可能已经变化。

use std::fmt;

use tracing::{debug, warn};

use crate::core::config::CompiledSite;
use crate::core::error::Result;
use crate::core::model::ChapterPart;
use crate::storage::Repository;

/// 判定原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchReason {
    Forced,
    Missing,
    Incomplete,
    /// 已存储正文不符合分页检测格式
    Unparseable,
    /// 第 N 页缺失或不完整
    PartMissing(u32),
    Complete,
}

impl fmt::Display for FetchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forced => write!(f, "forced"),
            Self::Missing => write!(f, "missing"),
            Self::Incomplete => write!(f, "incomplete"),
            Self::Unparseable => write!(f, "unparseable"),
            Self::PartMissing(part) => write!(f, "part {} missing", part),
            Self::Complete => write!(f, "complete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchDecision {
    pub fetch: bool,
    pub reason: FetchReason,
}

impl FetchDecision {
    fn fetch(reason: FetchReason) -> Self {
        Self { fetch: true, reason }
    }

    fn skip() -> Self {
        Self {
            fetch: false,
            reason: FetchReason::Complete,
        }
    }
}

pub struct DedupOracle<'a> {
    site: &'a CompiledSite,
    repo: &'a Repository,
    force: bool,
}

impl<'a> DedupOracle<'a> {
    pub fn new(site: &'a CompiledSite, repo: &'a Repository, force: bool) -> Self {
        Self { site, repo, force }
    }

    /// 数据缺失只意味着“需要抓取”；只有键模板与数据不匹配的配置错误会返回 `Err`
    pub async fn should_fetch(&self, novel_id: &str, novel_name: &str, chapter_id: &str) -> Result<FetchDecision> {
        if self.force {
            return Ok(FetchDecision::fetch(FetchReason::Forced));
        }

        let head_id = self.site.identity.resolve(novel_id, chapter_id, 1)?;
        let Some(head) = self.load(novel_id, &head_id).await else {
            return Ok(FetchDecision::fetch(FetchReason::Missing));
        };
        if !head.is_complete_head() {
            return Ok(FetchDecision::fetch(FetchReason::Incomplete));
        }

        let Some(info) = self
            .site
            .part_detector
            .parse(novel_name, &head.chapter_title, &head.content)?
        else {
            return Ok(FetchDecision::fetch(FetchReason::Unparseable));
        };
        if info.max_part <= 1 {
            return Ok(FetchDecision::skip());
        }

        for part in 2..=info.max_part {
            let part_id = self.site.identity.resolve(novel_id, chapter_id, part)?;
            let complete = self
                .load(novel_id, &part_id)
                .await
                .is_some_and(|stored| stored.is_well_formed());
            if !complete {
                debug!(novel_id, chapter_id, part, "分页缺失，整章重抓");
                return Ok(FetchDecision::fetch(FetchReason::PartMissing(part)));
            }
        }
        Ok(FetchDecision::skip())
    }

    /// 读取失败按缺失处理
    async fn load(&self, novel_id: &str, chapter_part_id: &str) -> Option<ChapterPart> {
        match self.repo.chapter_part(novel_id, chapter_part_id).await {
            Ok(part) => part,
            Err(e) => {
                warn!(novel_id, chapter_part_id, error = %e, "读取章节分片失败，按缺失处理");
                None
            }
        }
    }
}
