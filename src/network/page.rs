//! 页面读取契约 (Page Reader)
//!
//! 抓取端只向核心暴露选择器级别的读取能力：文本、属性、元素枚举与当前 URL。

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::core::error::{Result, SpiderError};

/// 选择器命中的元素快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkElement {
    pub text: String,
    pub href: Option<String>,
}

#[async_trait]
pub trait PageReader: Send + Sync {
    /// 实际加载的 URL（重定向之后）
    fn url(&self) -> &str;

    /// 第一个命中元素的可见文本
    async fn text(&self, selector: &str) -> Result<Option<String>>;

    /// 第一个带有该属性的命中元素的属性值
    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;

    async fn elements(&self, selector: &str) -> Result<Vec<LinkElement>>;
}

/// 静态 HTML 页面
///
/// 只保存原始文本，每次读取时重新解析，页面值可以安全地跨任务传递。
#[derive(Debug, Clone)]
pub struct HtmlPage {
    url: String,
    html: String,
}

impl HtmlPage {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    fn select_text(&self, selector: &str) -> Result<Option<String>> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(&self.html);
        Ok(document.select(&selector).next().map(inner_text))
    }

    fn select_attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(&self.html);
        Ok(document
            .select(&selector)
            .find_map(|el| el.value().attr(name).map(str::to_string)))
    }

    fn select_elements(&self, selector: &str) -> Result<Vec<LinkElement>> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(&self.html);
        Ok(document
            .select(&selector)
            .map(|el| LinkElement {
                text: inner_text(el).trim().to_string(),
                href: el.value().attr("href").map(str::to_string),
            })
            .collect())
    }
}

#[async_trait]
impl PageReader for HtmlPage {
    fn url(&self) -> &str {
        &self.url
    }

    async fn text(&self, selector: &str) -> Result<Option<String>> {
        self.select_text(selector)
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        self.select_attribute(selector, name)
    }

    async fn elements(&self, selector: &str) -> Result<Vec<LinkElement>> {
        self.select_elements(selector)
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| SpiderError::configuration(format!("invalid selector '{}': {}", selector, e)))
}

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "section", "article", "h1", "h2", "h3", "h4", "h5", "h6", "tr",
    "blockquote", "pre",
];

/// 近似浏览器 `innerText`：块级元素与 `<br>` 换行，源码中的空白折叠为单个空格
pub(crate) fn inner_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    push_text(element, &mut raw);

    raw.lines()
        .map(|line| line.trim_matches(' '))
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            match name {
                "script" | "style" | "noscript" => {}
                "br" => out.push('\n'),
                _ if BLOCK_TAGS.contains(&name) => {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                    push_text(child_el, out);
                    if !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
                _ => push_text(child_el, out),
            }
        } else if let Some(text) = child.value().as_text() {
            push_collapsed(text, out);
        }
    }
}

fn push_collapsed(text: &str, out: &mut String) {
    let mut pending_space = false;
    for ch in text.chars() {
        if matches!(ch, ' ' | '\n' | '\r' | '\t') {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() && !out.ends_with(['\n', ' ']) {
            out.push(' ');
        }
        pending_space = false;
        out.push(ch);
    }
    if pending_space && !out.is_empty() && !out.ends_with(['\n', ' ']) {
        out.push(' ');
    }
}
