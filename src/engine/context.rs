//! 小说运行时上下文 (Novel Context)
//!
//! 一本小说从抓取到组装期间共享的只读数据：编译后的站点、已绑定的正则、存储门面与事件句柄。

use std::borrow::Cow;
use std::sync::Arc;

use regex::Regex;

use crate::core::config::{CompiledSite, NovelEntry, SpiderConfig};
use crate::core::error::Result;
use crate::core::event::{EventSender, SpiderEvent};
use crate::core::template::{Bindings, Placeholder};
use crate::storage::Repository;

use super::oracle::DedupOracle;

pub struct NovelContext {
    pub site: Arc<CompiledSite>,
    pub repo: Repository,
    pub novel: NovelEntry,
    /// `${baseUrl}` / `${novelId}` / `${otherPathN}` 已绑定
    bindings: Bindings,
    pub list_regex: Option<Regex>,
    pub chapter_regex: Regex,
    pub force_refetch: bool,
    pub disable_chapter_crawl: bool,
    pub events: Option<EventSender>,
}

impl NovelContext {
    pub fn new(
        site: Arc<CompiledSite>,
        repo: Repository,
        novel: NovelEntry,
        spider: &SpiderConfig,
        events: Option<EventSender>,
    ) -> Result<Self> {
        site.check_novel(&novel)?;

        let bindings = Bindings::new()
            .with(Placeholder::BaseUrl, site.base_url.clone())
            .with(Placeholder::NovelId, novel.novel_id.clone())
            .with_other_paths(&novel.other_paths);

        let list_regex = site
            .list_pattern
            .as_ref()
            .map(|pattern| pattern.compile(&bindings).map(Cow::into_owned))
            .transpose()?;
        let chapter_regex = site.chapter_pattern.compile(&bindings)?.into_owned();

        Ok(Self {
            site,
            repo,
            novel,
            bindings,
            list_regex,
            chapter_regex,
            force_refetch: spider.force_refetch,
            disable_chapter_crawl: spider.disable_chapter_crawl,
            events,
        })
    }

    pub fn novel_id(&self) -> &str {
        &self.novel.novel_id
    }

    /// 第 `page_num` 页章节列表的 URL
    pub fn list_url(&self, page_num: u32) -> Result<String> {
        let mut bindings = self.bindings.clone();
        bindings.set(Placeholder::PageNum, page_num.to_string());
        self.site.chapter_list_url.render(&bindings)
    }

    /// 配置了章节 URL 模板时按模板生成，否则沿用列表页中的链接
    pub fn chapter_url(&self, chapter_id: &str, discovered: String) -> Result<String> {
        match &self.site.chapter_url {
            Some(template) => {
                let mut bindings = self.bindings.clone();
                bindings.set(Placeholder::ChapterId, chapter_id);
                template.render(&bindings)
            }
            None => Ok(discovered),
        }
    }

    pub fn oracle(&self) -> DedupOracle<'_> {
        DedupOracle::new(&self.site, &self.repo, self.force_refetch)
    }

    pub fn emit(&self, event: SpiderEvent) {
        if let Some(ref sender) = self.events {
            sender.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::tests::sample_site;

    fn context(site: crate::core::config::SiteConfig) -> NovelContext {
        let site = Arc::new(CompiledSite::compile(&site).unwrap());
        NovelContext::new(
            site,
            Repository::in_memory(),
            NovelEntry::builder().novel_id("abc").build(),
            &SpiderConfig::default(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn renders_list_and_chapter_urls() {
        let mut site = sample_site();
        site.chapter_url_template = Some("${baseUrl}/read/${novelId}/${chapterId}".into());
        let ctx = context(site);

        assert_eq!(ctx.list_url(3).unwrap(), "https://novel.example/abc/page3.html");
        assert_eq!(
            ctx.chapter_url("12", "ignored".into()).unwrap(),
            "https://novel.example/read/abc/12"
        );
    }

    #[test]
    fn chapter_regex_is_bound_to_novel() {
        let ctx = context(sample_site());
        assert!(ctx.chapter_regex.is_match("https://novel.example/abc/12_2.html"));
        assert!(!ctx.chapter_regex.is_match("https://novel.example/xyz/12.html"));
        assert_eq!(
            ctx.chapter_url("12", "https://novel.example/abc/12.html".into()).unwrap(),
            "https://novel.example/abc/12.html"
        );
    }
}
