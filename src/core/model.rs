//! 领域模型
//!
//! 持久化记录沿用驼峰字段名，与既有存储数据保持兼容。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 章节目录项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterEntry {
    pub chapter_id: String,
    pub chapter_title: String,
}

impl ChapterEntry {
    pub fn new(chapter_id: impl Into<String>, chapter_title: impl Into<String>) -> Self {
        Self {
            chapter_id: chapter_id.into(),
            chapter_title: chapter_title.into(),
        }
    }
}

/// 小说索引：按列表页号记录章节顺序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NovelIndex {
    pub novel_id: String,
    #[serde(default)]
    pub novel_name: String,
    #[serde(default)]
    pub page_chapter_map: BTreeMap<u32, Vec<ChapterEntry>>,
}

impl NovelIndex {
    pub fn new(novel_id: impl Into<String>) -> Self {
        Self {
            novel_id: novel_id.into(),
            ..Default::default()
        }
    }

    /// 一次写入整页章节列表
    pub fn set_page(&mut self, page_num: u32, chapters: Vec<ChapterEntry>) {
        self.page_chapter_map.insert(page_num, chapters);
    }

    pub fn chapters(&self, page_num: u32) -> Option<&[ChapterEntry]> {
        self.page_chapter_map.get(&page_num).map(Vec::as_slice)
    }

    pub fn max_page(&self) -> Option<u32> {
        self.page_chapter_map.keys().next_back().copied()
    }

    pub fn chapter_count(&self) -> usize {
        self.page_chapter_map.values().map(Vec::len).sum()
    }

    pub fn display_name(&self) -> Option<&str> {
        Some(self.novel_name.trim()).filter(|name| !name.is_empty())
    }
}

/// 已抓取的章节分片
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterPart {
    #[serde(default)]
    pub novel_id: String,
    #[serde(default)]
    pub chapter_part_id: String,
    #[serde(default)]
    pub chapter_title: String,
    #[serde(default)]
    pub content: String,
}

impl ChapterPart {
    /// 标题与正文齐全
    pub fn is_well_formed(&self) -> bool {
        !self.chapter_title.is_empty() && !self.content.is_empty()
    }

    /// 首页分片还要求身份字段齐全
    pub fn is_complete_head(&self) -> bool {
        self.is_well_formed() && !self.novel_id.is_empty() && !self.chapter_part_id.is_empty()
    }
}

/// 分页信息（不持久化）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartInfo {
    pub part: u32,
    pub max_part: u32,
    pub content: String,
}

impl PartInfo {
    pub fn single(content: &str) -> Self {
        Self {
            part: 1,
            max_part: 1,
            content: content.to_string(),
        }
    }
}
