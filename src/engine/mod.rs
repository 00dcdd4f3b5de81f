//! 抓取与组装引擎

mod compose;
mod context;
mod frontier;
mod oracle;
mod pipeline;
mod task;

pub use compose::Composer;
pub use context::NovelContext;
pub use frontier::Frontier;
pub use oracle::{DedupOracle, FetchDecision, FetchReason};
pub use pipeline::ScrapeEngine;
pub use task::{Task, TaskResult};
