//! 小说章节爬虫与组装器
//!
//! 按配置模板抓取章节列表页与章节页，把分片存入键值存储，
//! 再按列表顺序组装为每本小说一个的纯文本文档。支持断点续传。

pub mod core;
pub mod engine;
pub mod network;
pub mod storage;
pub mod ui;
pub mod utils;

pub use crate::core::config::AppConfig;
pub use crate::core::error::{Result, SpiderError};
pub use crate::engine::ScrapeEngine;
