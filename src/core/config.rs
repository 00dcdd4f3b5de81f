//! 配置管理系统 (Configuration Management)
//!
//! 负责 `config.toml` 的反序列化及其层级结构映射，支持环境变量覆盖与默认值回退机制。
//! 站点模板在 [`AppConfig::compile`] 中一次性校验并编译为 [`CompiledSite`]。

use std::path::{Path, PathBuf};

use bon::Builder;
use config::{Config, Environment, File};
use scraper::Selector;
use serde::Deserialize;

use crate::core::error::{Result, SpiderError};
use crate::core::identity::PartIdentity;
use crate::core::part_info::PartDetector;
use crate::core::template::{PatternTemplate, Placeholder, Template};

/// 当前支持的配置格式版本
pub const CONFIG_VERSION: u32 = 1;

/// 全局应用配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct AppConfig {
    /// 配置格式版本
    #[serde(default = "default_version")]
    #[builder(default = CONFIG_VERSION)]
    pub version: u32,

    /// 持久化目录基准路径
    #[serde(default = "default_storage_path")]
    #[builder(into, default = default_storage_path())]
    pub storage_path: String,

    /// 爬虫调度参数
    #[serde(default)]
    #[builder(default)]
    pub spider: SpiderConfig,

    /// 目标站点模板与选择器
    pub site: SiteConfig,

    /// 待处理小说目录（按顺序逐本处理）
    #[serde(default)]
    #[builder(default)]
    pub novels: Vec<NovelEntry>,
}

/// 调度参数
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct SpiderConfig {
    #[serde(default = "default_user_agent")]
    #[builder(into, default = default_user_agent())]
    pub user_agent: String,
    /// 单个请求的重试阈值
    #[serde(default = "default_retry_count")]
    #[builder(default = default_retry_count())]
    pub retry_count: u32,
    /// 同域请求间隔 (ms)
    #[serde(default = "default_request_delay_ms")]
    #[builder(default = default_request_delay_ms())]
    pub request_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    #[builder(default = default_timeout_secs())]
    pub timeout_secs: u64,
    /// 忽略已存储的章节，强制重新抓取
    #[serde(default)]
    #[builder(default)]
    pub force_refetch: bool,
    /// 只抓取列表页，不抓取章节页
    #[serde(default)]
    #[builder(default)]
    pub disable_chapter_crawl: bool,
}

/// 站点配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct SiteConfig {
    #[builder(into)]
    pub base_url: String,
    /// 章节列表页 URL 模板，例如 `${baseUrl}/${novelId}/page${pageNum}.html`
    #[builder(into)]
    pub chapter_list_url_template: String,
    /// 章节页 URL 模板；配置后入队的章节 URL 由模板生成
    #[builder(into)]
    pub chapter_url_template: Option<String>,
    /// 从列表页 URL 提取 `novelId` / `pageNum`
    #[builder(into)]
    pub novel_id_and_page_num_regex: Option<String>,
    /// 从章节页 URL 提取 `chapterId` (必需) / `part`
    #[builder(into)]
    pub chapter_id_and_part_regex: String,
    #[serde(default = "default_chapter_part_id_template")]
    #[builder(into, default = default_chapter_part_id_template())]
    pub chapter_part_id_template: String,
    /// 按分页序号 (1-based) 取用的 `${partPath}` 模板
    pub part_path_templates: Option<Vec<String>>,
    pub selectors: SelectorConfig,
    /// 正文清理正则（全局替换为空）
    #[serde(default)]
    #[builder(default)]
    pub removed_content_regexes: Vec<String>,
    /// 分页标记检测正则，可声明 `part` / `maxPart` 命名组
    #[builder(into)]
    pub part_info_regex: Option<String>,
    /// 组装时移除检测到的分页标记
    #[serde(default)]
    #[builder(default)]
    pub strip_part_info: bool,
    #[serde(default)]
    #[builder(default)]
    pub compose: ComposeConfig,
}

/// DOM 选择器（交由渲染端解析）
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct SelectorConfig {
    #[builder(into)]
    pub novel_name_of_list: String,
    #[builder(into)]
    pub chapter_url_of_list: String,
    #[builder(into)]
    pub next_page_url_of_list: String,
    #[builder(into)]
    pub title_of_chapter: String,
    #[builder(into)]
    pub content_of_chapter: String,
    #[builder(into)]
    pub next_page_url_of_chapter: String,
}

/// 组装分隔符
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct ComposeConfig {
    /// 章节标题之后
    #[serde(default = "default_chapter_title_suffix")]
    #[builder(into, default = default_chapter_title_suffix())]
    pub chapter_title_suffix: String,
    /// 章节末尾
    #[serde(default = "default_chapter_suffix")]
    #[builder(into, default = default_chapter_suffix())]
    pub chapter_suffix: String,
    /// 同一章节的分页之间
    #[serde(default = "default_chapter_part_suffix")]
    #[builder(into, default = default_chapter_part_suffix())]
    pub chapter_part_suffix: String,
}

/// 小说目录项
#[derive(Debug, Deserialize, Builder, Clone, PartialEq, Eq)]
pub struct NovelEntry {
    #[builder(into)]
    pub novel_id: String,
    /// 绑定到 `${otherPathN}`
    #[serde(default)]
    #[builder(default)]
    pub other_paths: Vec<String>,
    /// 列表页上限，0 表示不限
    #[serde(default)]
    #[builder(default)]
    pub end_page_num: u32,
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            retry_count: default_retry_count(),
            request_delay_ms: default_request_delay_ms(),
            timeout_secs: default_timeout_secs(),
            force_refetch: false,
            disable_chapter_crawl: false,
        }
    }
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            chapter_title_suffix: default_chapter_title_suffix(),
            chapter_suffix: default_chapter_suffix(),
            chapter_part_suffix: default_chapter_part_suffix(),
        }
    }
}

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_storage_path() -> String {
    "storage".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}
fn default_retry_count() -> u32 {
    10
}
fn default_request_delay_ms() -> u64 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_chapter_part_id_template() -> String {
    "${chapterId}".to_string()
}
fn default_chapter_title_suffix() -> String {
    "\n\n".to_string()
}
fn default_chapter_suffix() -> String {
    "\n\n\n".to_string()
}
fn default_chapter_part_suffix() -> String {
    "\n".to_string()
}

impl AppConfig {
    /// 从文件系统中加载并解析配置，`NOVEL__` 前缀的环境变量可覆盖任意字段
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config_path = path.as_ref();
        let builder = Config::builder();

        let builder = if config_path.exists() {
            builder.add_source(File::from(config_path))
        } else {
            builder
        };

        let settings = builder
            .add_source(Environment::with_prefix("NOVEL").separator("__"))
            .build()
            .map_err(SpiderError::Config)?;
        settings.try_deserialize().map_err(SpiderError::Config)
    }

    /// 组装文档的输出目录 `<storage>/novels`
    pub fn output_dir(&self) -> PathBuf {
        Path::new(&self.storage_path).join("novels")
    }

    /// 校验并编译站点模板，任何缺失或不一致都立即失败
    pub fn compile(&self) -> Result<CompiledSite> {
        if self.version != CONFIG_VERSION {
            return Err(SpiderError::configuration(format!(
                "unsupported config version {} (expected {})",
                self.version, CONFIG_VERSION
            )));
        }
        let site = CompiledSite::compile(&self.site)?;
        for novel in &self.novels {
            site.check_novel(novel)?;
        }
        Ok(site)
    }
}

/// 已校验、已编译的站点配置
#[derive(Debug, Clone)]
pub struct CompiledSite {
    pub base_url: String,
    pub chapter_list_url: Template,
    pub chapter_url: Option<Template>,
    pub list_pattern: Option<PatternTemplate>,
    pub chapter_pattern: PatternTemplate,
    pub identity: PartIdentity,
    pub part_detector: PartDetector,
    pub cleanup_patterns: Vec<PatternTemplate>,
    pub selectors: SelectorConfig,
    pub compose: ComposeConfig,
}

impl CompiledSite {
    pub fn compile(site: &SiteConfig) -> Result<Self> {
        require("site.base_url", &site.base_url)?;
        require("site.chapter_list_url_template", &site.chapter_list_url_template)?;
        require("site.chapter_id_and_part_regex", &site.chapter_id_and_part_regex)?;

        let s = &site.selectors;
        for (field, selector) in [
            ("selectors.novel_name_of_list", &s.novel_name_of_list),
            ("selectors.chapter_url_of_list", &s.chapter_url_of_list),
            ("selectors.next_page_url_of_list", &s.next_page_url_of_list),
            ("selectors.title_of_chapter", &s.title_of_chapter),
            ("selectors.content_of_chapter", &s.content_of_chapter),
            ("selectors.next_page_url_of_chapter", &s.next_page_url_of_chapter),
        ] {
            require(field, selector)?;
            Selector::parse(selector).map_err(|e| {
                SpiderError::configuration(format!("{} is not a valid selector '{}': {}", field, selector, e))
            })?;
        }

        let url_scope = |p: &Placeholder| {
            matches!(
                p,
                Placeholder::BaseUrl | Placeholder::NovelId | Placeholder::PageNum | Placeholder::OtherPath(_)
            )
        };

        let chapter_list_url = Template::parse(&site.chapter_list_url_template)?;
        allow_only("site.chapter_list_url_template", &chapter_list_url, url_scope)?;

        let chapter_url = site
            .chapter_url_template
            .as_deref()
            .map(|source| {
                let template = Template::parse(source)?;
                allow_only("site.chapter_url_template", &template, |p| {
                    url_scope(p) || matches!(p, Placeholder::ChapterId)
                })?;
                Ok::<_, SpiderError>(template)
            })
            .transpose()?;

        let list_pattern = site
            .novel_id_and_page_num_regex
            .as_deref()
            .filter(|source| !source.is_empty())
            .map(|source| {
                let pattern = PatternTemplate::parse(source, &[])?;
                allow_only("site.novel_id_and_page_num_regex", pattern.template(), |p| {
                    matches!(p, Placeholder::BaseUrl | Placeholder::OtherPath(_))
                })?;
                Ok::<_, SpiderError>(pattern)
            })
            .transpose()?;

        let chapter_pattern = PatternTemplate::parse(&site.chapter_id_and_part_regex, &["chapterId"])?;
        allow_only("site.chapter_id_and_part_regex", chapter_pattern.template(), |p| {
            matches!(p, Placeholder::BaseUrl | Placeholder::NovelId | Placeholder::OtherPath(_))
        })?;

        let identity = PartIdentity::new(
            &site.chapter_part_id_template,
            site.part_path_templates.as_deref(),
        )?;
        let part_detector = PartDetector::new(site.part_info_regex.as_deref(), site.strip_part_info)?;

        let cleanup_patterns = site
            .removed_content_regexes
            .iter()
            .map(|source| {
                let pattern = PatternTemplate::parse(source, &[])?;
                allow_only("site.removed_content_regexes", pattern.template(), |p| {
                    matches!(p, Placeholder::NovelName | Placeholder::ChapterTitle)
                })?;
                Ok(pattern)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            base_url: site.base_url.trim_end_matches('/').to_string(),
            chapter_list_url,
            chapter_url,
            list_pattern,
            chapter_pattern,
            identity,
            part_detector,
            cleanup_patterns,
            selectors: site.selectors.clone(),
            compose: site.compose.clone(),
        })
    }

    /// 校验目录项能满足模板中引用的 `${otherPathN}`
    pub fn check_novel(&self, novel: &NovelEntry) -> Result<()> {
        require("novels.novel_id", &novel.novel_id)?;
        let templates = [
            Some(&self.chapter_list_url),
            self.chapter_url.as_ref(),
            self.list_pattern.as_ref().map(PatternTemplate::template),
            Some(self.chapter_pattern.template()),
        ];
        for template in templates.into_iter().flatten() {
            for placeholder in template.placeholders() {
                if let Placeholder::OtherPath(index) = placeholder
                    && *index >= novel.other_paths.len()
                {
                    return Err(SpiderError::configuration(format!(
                        "novel '{}' has {} other_paths but template {} references {}",
                        novel.novel_id,
                        novel.other_paths.len(),
                        template.source(),
                        placeholder
                    )));
                }
            }
        }
        Ok(())
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SpiderError::configuration(format!("{} not found", field)));
    }
    Ok(())
}

fn allow_only(field: &str, template: &Template, allowed: impl Fn(&Placeholder) -> bool) -> Result<()> {
    match template.placeholders().find(|p| !allowed(*p)) {
        Some(p) => Err(SpiderError::configuration(format!(
            "{} does not support placeholder {}",
            field, p
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_site() -> SiteConfig {
        SiteConfig::builder()
            .base_url("https://novel.example")
            .chapter_list_url_template("${baseUrl}/${novelId}/page${pageNum}.html")
            .novel_id_and_page_num_regex(r"${baseUrl}/(?<novelId>\w+)/page(?<pageNum>\d+)\.html")
            .chapter_id_and_part_regex(r"${baseUrl}/${novelId}/(?<chapterId>\d+)(_(?<part>\d+))?\.html")
            .chapter_part_id_template("${chapterId}${partPath}")
            .part_path_templates(vec!["".to_string(), "_${part}".to_string(), "_${part}".to_string()])
            .selectors(
                SelectorConfig::builder()
                    .novel_name_of_list("h1.name")
                    .chapter_url_of_list("ul.list a")
                    .next_page_url_of_list("a.next")
                    .title_of_chapter("h1.title")
                    .content_of_chapter("div#content")
                    .next_page_url_of_chapter("a.next-part")
                    .build(),
            )
            .part_info_regex(r"\(第(?<part>\d+)/(?<maxPart>\d+)页\)\n?")
            .strip_part_info(true)
            .compose(
                ComposeConfig::builder()
                    .chapter_title_suffix("\n")
                    .chapter_suffix("\n\n")
                    .chapter_part_suffix("\n")
                    .build(),
            )
            .build()
    }

    #[test]
    fn compiles_sample_site() {
        let config = AppConfig::builder()
            .site(sample_site())
            .novels(vec![NovelEntry::builder().novel_id("abc").build()])
            .build();
        let site = config.compile().unwrap();
        assert!(site.list_pattern.as_ref().unwrap().has_group("pageNum"));
        assert!(site.part_detector.is_configured());
    }

    #[test]
    fn missing_chapter_group_fails_fast() {
        let mut site = sample_site();
        site.chapter_id_and_part_regex = r"${baseUrl}/(?<id>\d+)\.html".into();
        let err = CompiledSite::compile(&site).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn empty_selector_fails_fast() {
        let mut site = sample_site();
        site.selectors.content_of_chapter = " ".into();
        let err = CompiledSite::compile(&site).unwrap_err();
        assert!(err.to_string().contains("content_of_chapter"));
    }

    #[test]
    fn other_path_must_be_bound_by_every_novel() {
        let mut site = sample_site();
        site.chapter_list_url_template = "${baseUrl}/${otherPath0}/${novelId}/${pageNum}".into();
        let config = AppConfig::builder()
            .site(site)
            .novels(vec![NovelEntry::builder().novel_id("abc").build()])
            .build();
        assert!(config.compile().unwrap_err().is_configuration());
    }

    #[test]
    fn rejects_unknown_version() {
        let config = AppConfig::builder().version(7).site(sample_site()).build();
        assert!(config.compile().unwrap_err().is_configuration());
    }

    #[test]
    fn loads_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r##"
storage_path = "data"

[spider]
force_refetch = true

[site]
base_url = "https://novel.example"
chapter_list_url_template = "${baseUrl}/${novelId}/page${pageNum}.html"
chapter_id_and_part_regex = '${baseUrl}/${novelId}/(?<chapterId>\d+)\.html'

[site.selectors]
novel_name_of_list = "h1"
chapter_url_of_list = "ul a"
next_page_url_of_list = "a.next"
title_of_chapter = "h1"
content_of_chapter = "#content"
next_page_url_of_chapter = "a.np"

[[novels]]
novel_id = "abc"
end_page_num = 3
"##,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.storage_path, "data");
        assert_eq!(config.output_dir(), Path::new("data").join("novels"));
        assert!(config.spider.force_refetch);
        assert_eq!(config.novels[0].end_page_num, 3);
        assert_eq!(config.site.compose.chapter_suffix, "\n\n\n");
        config.compile().unwrap();
    }
}
