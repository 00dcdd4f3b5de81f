//! 错误处理体系 (Error Handling System)
//!
//! 定义配置错误、组装阶段的结构化缺失错误以及全局 Result 别名。

use thiserror::Error;

/// 全局错误定义 (Spider Domain Errors)
#[derive(Error, Debug)]
pub enum SpiderError {
    /// 配置文件加载/反序列化失败
    #[error("Configuration load error: {0}")]
    Config(#[from] config::ConfigError),

    /// 模板、选择器或正则缺失/不一致，致命且不重试
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 组装时某页的章节索引缺失
    #[error("Missing page #{page_num} of novel '{novel_id}': {message}")]
    MissingPage {
        novel_id: String,
        page_num: u32,
        message: String,
    },

    /// 组装时某章节分片缺失或无法解析
    #[error("Missing chapter part '{chapter_part_id}' on page #{page_num} of novel '{novel_id}': {message}")]
    MissingChapter {
        novel_id: String,
        page_num: u32,
        chapter_part_id: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {0}")]
    Parse(String),

    /// 存储目录已被其他运行实例占用
    #[error("Storage locked: {0}")]
    Locked(String),

    #[error("Run cancelled")]
    Cancelled,
}

/// 全局 Result 别名
pub type Result<T> = std::result::Result<T, SpiderError>;

impl SpiderError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SpiderError::Configuration(message.into())
    }

    pub fn missing_page(novel_id: &str, page_num: u32, message: impl Into<String>) -> Self {
        SpiderError::MissingPage {
            novel_id: novel_id.to_string(),
            page_num,
            message: message.into(),
        }
    }

    pub fn missing_chapter(
        novel_id: &str,
        page_num: u32,
        chapter_part_id: &str,
        message: impl Into<String>,
    ) -> Self {
        SpiderError::MissingChapter {
            novel_id: novel_id.to_string(),
            page_num,
            chapter_part_id: chapter_part_id.to_string(),
            message: message.into(),
        }
    }

    /// 提取结构化缺失错误的公共身份字段 (novel_id, page_num)
    ///
    /// `MissingChapter` 共享 `MissingPage` 的身份字段，断点修复按同一规则回退。
    pub fn missing_page_num(&self) -> Option<(&str, u32)> {
        match self {
            SpiderError::MissingPage {
                novel_id, page_num, ..
            }
            | SpiderError::MissingChapter {
                novel_id, page_num, ..
            } => Some((novel_id.as_str(), *page_num)),
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, SpiderError::Configuration(_) | SpiderError::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_chapter_shares_page_identity() {
        let err = SpiderError::missing_chapter("n1", 3, "c9", "content missing");
        assert_eq!(err.missing_page_num(), Some(("n1", 3)));

        let err = SpiderError::missing_page("n1", 2, "empty");
        assert_eq!(err.missing_page_num(), Some(("n1", 2)));

        assert!(SpiderError::Parse("x".into()).missing_page_num().is_none());
    }
}
