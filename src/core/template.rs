//! 模板解析器 (Template Resolver)
//!
//! 配置中的 URL / 正则模板在加载时一次性解析为类型化的占位符表。
//! 用于构造正则时，所有代入值先经过转义，站点路径中的元字符不会破坏表达式。

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use regex::{Captures, Regex};

use crate::core::error::{Result, SpiderError};

/// 占位符 `${name}`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Placeholder {
    BaseUrl,
    NovelId,
    ChapterId,
    PageNum,
    Part,
    PartPath,
    NovelName,
    ChapterTitle,
    /// `${otherPath0}`, `${otherPath1}`, ...
    OtherPath(usize),
}

impl FromStr for Placeholder {
    type Err = SpiderError;

    fn from_str(name: &str) -> Result<Self> {
        let placeholder = match name {
            "baseUrl" => Self::BaseUrl,
            "novelId" => Self::NovelId,
            "chapterId" => Self::ChapterId,
            "pageNum" => Self::PageNum,
            "part" => Self::Part,
            "partPath" => Self::PartPath,
            "novelName" => Self::NovelName,
            "chapterTitle" => Self::ChapterTitle,
            other => {
                let index = other
                    .strip_prefix("otherPath")
                    .filter(|digits| !digits.is_empty())
                    .and_then(|digits| digits.parse::<usize>().ok())
                    .ok_or_else(|| {
                        SpiderError::configuration(format!("unknown placeholder ${{{}}}", other))
                    })?;
                Self::OtherPath(index)
            }
        };
        Ok(placeholder)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BaseUrl => write!(f, "${{baseUrl}}"),
            Self::NovelId => write!(f, "${{novelId}}"),
            Self::ChapterId => write!(f, "${{chapterId}}"),
            Self::PageNum => write!(f, "${{pageNum}}"),
            Self::Part => write!(f, "${{part}}"),
            Self::PartPath => write!(f, "${{partPath}}"),
            Self::NovelName => write!(f, "${{novelName}}"),
            Self::ChapterTitle => write!(f, "${{chapterTitle}}"),
            Self::OtherPath(i) => write!(f, "${{otherPath{}}}", i),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// 占位符取值表
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<Placeholder, String>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, placeholder: Placeholder, value: impl Into<String>) -> Self {
        self.set(placeholder, value);
        self
    }

    /// 绑定 `${otherPathN}` 族
    pub fn with_other_paths(mut self, other_paths: &[String]) -> Self {
        for (index, path) in other_paths.iter().enumerate() {
            self.set(Placeholder::OtherPath(index), path.clone());
        }
        self
    }

    pub fn set(&mut self, placeholder: Placeholder, value: impl Into<String>) {
        self.values.insert(placeholder, value.into());
    }

    pub fn get(&self, placeholder: &Placeholder) -> Option<&str> {
        self.values.get(placeholder).map(String::as_str)
    }
}

/// 已解析的模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("${") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| {
                SpiderError::configuration(format!("unterminated placeholder in template: {}", source))
            })?;
            segments.push(Segment::Slot(after[..end].parse()?));
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Slot(p) => Some(p),
            Segment::Literal(_) => None,
        })
    }

    pub fn contains(&self, placeholder: &Placeholder) -> bool {
        self.placeholders().any(|p| p == placeholder)
    }

    /// 原样代入（用于 URL 与存储键）
    pub fn render(&self, bindings: &Bindings) -> Result<String> {
        self.render_with(bindings, |value| value.to_string())
    }

    /// 代入前转义（用于构造正则）
    pub fn render_escaped(&self, bindings: &Bindings) -> Result<String> {
        self.render_with(bindings, regex::escape)
    }

    fn render_with(&self, bindings: &Bindings, encode: impl Fn(&str) -> String) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(placeholder) => {
                    let value = bindings.get(placeholder).ok_or_else(|| {
                        SpiderError::configuration(format!(
                            "no value bound for {} in template: {}",
                            placeholder, self.source
                        ))
                    })?;
                    out.push_str(&encode(value));
                }
            }
        }
        Ok(out)
    }
}

/// 正则模板
///
/// 加载时以探针值编译一次，校验语法并记录命名捕获组。
/// 不含占位符的模板直接保留编译结果。
#[derive(Debug, Clone)]
pub struct PatternTemplate {
    template: Template,
    groups: Vec<String>,
    fixed: Option<Regex>,
}

impl PatternTemplate {
    pub fn parse(source: &str, required_groups: &[&str]) -> Result<Self> {
        let template = Template::parse(source)?;

        let mut probe = Bindings::new();
        for placeholder in template.placeholders() {
            probe.set(placeholder.clone(), "probe");
        }
        let regex = Regex::new(&template.render_escaped(&probe)?).map_err(|e| {
            SpiderError::configuration(format!("invalid regex template {}: {}", source, e))
        })?;
        let groups: Vec<String> = regex.capture_names().flatten().map(str::to_string).collect();

        if let Some(missing) = required_groups
            .iter()
            .find(|name| !groups.iter().any(|g| g == *name))
        {
            return Err(SpiderError::configuration(format!(
                "regex template must declare named group (?<{}>...): {}",
                missing, source
            )));
        }

        let fixed = template.placeholders().next().is_none().then_some(regex);
        Ok(Self {
            template,
            groups,
            fixed,
        })
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g == name)
    }

    pub fn compile(&self, bindings: &Bindings) -> Result<Cow<'_, Regex>> {
        if let Some(regex) = &self.fixed {
            return Ok(Cow::Borrowed(regex));
        }
        let pattern = self.template.render_escaped(bindings)?;
        Regex::new(&pattern).map(Cow::Owned).map_err(|e| {
            SpiderError::configuration(format!("invalid regex {}: {}", pattern, e))
        })
    }
}

/// 读取数值捕获组；组缺失返回 `None`，非数字视为解析错误
pub fn capture_number(caps: &Captures<'_>, name: &str) -> Option<Result<u32>> {
    caps.name(name).map(|m| {
        m.as_str()
            .trim()
            .parse::<u32>()
            .map_err(|_| SpiderError::Parse(format!("group {} is not a number: {}", name, m.as_str())))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_placeholders() {
        let tpl = Template::parse("${baseUrl}/${otherPath0}/${novelId}/page${pageNum}.html").unwrap();
        let bindings = Bindings::new()
            .with(Placeholder::BaseUrl, "https://example.com")
            .with(Placeholder::NovelId, "42")
            .with(Placeholder::PageNum, "3")
            .with_other_paths(&["book".to_string()]);

        let url = tpl.render(&bindings).unwrap();
        assert_eq!(url, "https://example.com/book/42/page3.html");
        assert!(!url.contains("${"));
    }

    #[test]
    fn unbound_placeholder_is_configuration_error() {
        let tpl = Template::parse("${novelId}_${chapterId}").unwrap();
        let err = tpl
            .render(&Bindings::new().with(Placeholder::NovelId, "1"))
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn rejects_unknown_and_unterminated_placeholders() {
        assert!(Template::parse("${bogus}").unwrap_err().is_configuration());
        assert!(Template::parse("${novelId").unwrap_err().is_configuration());
        assert!(Template::parse("${otherPath}").unwrap_err().is_configuration());
    }

    #[test]
    fn escapes_values_when_building_regex() {
        let pattern =
            PatternTemplate::parse(r"${baseUrl}/${novelId}/(?<chapterId>\d+)\.html", &["chapterId"])
                .unwrap();
        let bindings = Bindings::new()
            .with(Placeholder::BaseUrl, "https://a.b")
            .with(Placeholder::NovelId, "1+1");
        let regex = pattern.compile(&bindings).unwrap();

        assert!(regex.is_match("https://a.b/1+1/7.html"));
        // 未转义时 `1+1` 会匹配 `11`，`.` 会匹配任意字符
        assert!(!regex.is_match("https://a.b/11/7.html"));
        assert!(!regex.is_match("https://axb/1+1/7.html"));
    }

    #[test]
    fn distinct_ids_do_not_cross_match() {
        let pattern = PatternTemplate::parse(r"^/${novelId}/(?<chapterId>\d+)$", &["chapterId"]).unwrap();
        let a = pattern
            .compile(&Bindings::new().with(Placeholder::NovelId, "n.1"))
            .unwrap();
        assert!(a.is_match("/n.1/5"));
        assert!(!a.is_match("/nx1/5"));
    }

    #[test]
    fn static_pattern_compiled_once() {
        let fixed = PatternTemplate::parse(r"本章未完.*", &[]).unwrap();
        let regex = fixed.compile(&Bindings::new()).unwrap();
        assert!(matches!(regex, Cow::Borrowed(_)));
        assert!(regex.is_match("本章未完，请点击下一页"));

        let bound = PatternTemplate::parse(r"${novelName}最新章节", &[]).unwrap();
        let regex = bound
            .compile(&Bindings::new().with(Placeholder::NovelName, "书"))
            .unwrap();
        assert!(matches!(regex, Cow::Owned(_)));
        assert!(regex.is_match("书最新章节"));
    }

    #[test]
    fn required_group_checked_at_load() {
        let err = PatternTemplate::parse(r"${baseUrl}/(?<part>\d+)", &["chapterId"]).unwrap_err();
        assert!(err.is_configuration());

        let ok = PatternTemplate::parse(r"(?<chapterId>\d+)(_(?<part>\d+))?", &["chapterId"]).unwrap();
        assert!(ok.has_group("part"));
        assert!(!ok.has_group("pageNum"));
    }

    #[test]
    fn optional_number_group() {
        let regex = Regex::new(r"c(?<chapterId>\d+)(_(?<part>\d+))?").unwrap();
        let caps = regex.captures("c12").unwrap();
        assert!(capture_number(&caps, "part").is_none());

        let caps = regex.captures("c12_3").unwrap();
        assert_eq!(capture_number(&caps, "part").unwrap().unwrap(), 3);
    }
}
