//! 分页信息解析 (Part-Info Parser)
//!
//! 判断一段抓取到的章节正文是否为第 k/n 页，并按需移除检测到的分页标记。
//! 只应作用于原始抓取分片，已组装的文档不再包含标记。

use crate::core::error::{Result, SpiderError};
use crate::core::model::PartInfo;
use crate::core::template::{Bindings, PatternTemplate, Placeholder, capture_number};

#[derive(Debug, Clone)]
pub struct PartDetector {
    pattern: Option<PatternTemplate>,
    strip: bool,
}

impl PartDetector {
    pub fn new(pattern: Option<&str>, strip: bool) -> Result<Self> {
        let pattern = pattern
            .filter(|source| !source.is_empty())
            .map(|source| PatternTemplate::parse(source, &[]))
            .transpose()?;

        if let Some(p) = pattern.as_ref().and_then(|pattern| {
            pattern
                .template()
                .placeholders()
                .find(|p| !matches!(p, Placeholder::NovelName | Placeholder::ChapterTitle))
                .cloned()
        }) {
            return Err(SpiderError::configuration(format!(
                "part_info_regex does not support placeholder {}",
                p
            )));
        }

        Ok(Self { pattern, strip })
    }

    /// 未配置检测正则时所有章节都视为单页
    pub fn disabled() -> Self {
        Self {
            pattern: None,
            strip: false,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.pattern.is_some()
    }

    /// 解析分页信息
    ///
    /// 返回 `Ok(None)` 表示正文不符合检测格式，调用方应视为抓取/解析失败而非“无分页”。
    pub fn parse(&self, novel_name: &str, chapter_title: &str, content: &str) -> Result<Option<PartInfo>> {
        let Some(pattern) = &self.pattern else {
            return Ok(Some(PartInfo::single(content)));
        };

        let regex = pattern.compile(
            &Bindings::new()
                .with(Placeholder::NovelName, novel_name)
                .with(Placeholder::ChapterTitle, chapter_title),
        )?;
        let Some(caps) = regex.captures(content) else {
            return Ok(None);
        };

        let part = match capture_number(&caps, "part") {
            Some(Ok(part)) => part,
            Some(Err(_)) => return Ok(None),
            None => 1,
        };
        let max_part = match capture_number(&caps, "maxPart") {
            Some(Ok(max_part)) => max_part,
            Some(Err(_)) => return Ok(None),
            None => part,
        };
        if part == 0 || part > max_part {
            return Ok(None);
        }

        let content = if self.strip {
            let marker = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            content.replacen(marker, "", 1)
        } else {
            content.to_string()
        };

        Ok(Some(PartInfo {
            part,
            max_part,
            content,
        }))
    }
}
