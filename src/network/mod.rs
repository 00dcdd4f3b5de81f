//! 抓取协作端 (Fetching Collaborator)

mod fetcher;
mod page;

pub use fetcher::{HttpFetcher, PageFetcher};
pub use page::{HtmlPage, LinkElement, PageReader};
