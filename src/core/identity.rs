//! 章节分片标识 (Chapter-Part Identity)
//!
//! 由 (novelId, chapterId, part) 推导稳定的存储键。断点续传依赖键在多次运行之间保持不变。

use crate::core::error::{Result, SpiderError};
use crate::core::template::{Bindings, Placeholder, Template};

#[derive(Debug, Clone)]
pub struct PartIdentity {
    key: Template,
    part_paths: Option<Vec<Template>>,
}

impl PartIdentity {
    pub fn new(key_template: &str, part_path_templates: Option<&[String]>) -> Result<Self> {
        let key = Template::parse(key_template)?;
        if let Some(p) = key.placeholders().find(|p| {
            !matches!(
                p,
                Placeholder::NovelId | Placeholder::ChapterId | Placeholder::Part | Placeholder::PartPath
            )
        }) {
            return Err(SpiderError::configuration(format!(
                "chapter_part_id_template does not support placeholder {}",
                p
            )));
        }
        if !key.contains(&Placeholder::ChapterId) {
            return Err(SpiderError::configuration(
                "chapter_part_id_template must contain ${chapterId}",
            ));
        }

        let part_paths = part_path_templates
            .map(|sources| {
                if sources.is_empty() {
                    return Err(SpiderError::configuration("part_path_templates is empty"));
                }
                sources
                    .iter()
                    .map(|source| {
                        let template = Template::parse(source)?;
                        let foreign = template
                            .placeholders()
                            .find(|p| **p != Placeholder::Part)
                            .cloned();
                        match foreign {
                            Some(p) => Err(SpiderError::configuration(format!(
                                "part_path_templates does not support placeholder {}",
                                p
                            ))),
                            None => Ok(template),
                        }
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .transpose()?;

        match (key.contains(&Placeholder::PartPath), part_paths.is_some()) {
            (true, false) => Err(SpiderError::configuration(
                "chapter_part_id_template uses ${partPath} but part_path_templates is not configured",
            )),
            (false, true) => Err(SpiderError::configuration(
                "part_path_templates is configured but chapter_part_id_template lacks ${partPath}",
            )),
            _ => Ok(Self { key, part_paths }),
        }
    }

    /// 可区分的最大分页数；`None` 表示不受限
    pub fn max_part(&self) -> Option<u32> {
        match &self.part_paths {
            Some(paths) => Some(paths.len() as u32),
            None if self.key.contains(&Placeholder::Part) => None,
            None => Some(1),
        }
    }

    /// 推导存储键。越界的分页序号属于模板与数据不匹配，直接报配置错误。
    pub fn resolve(&self, novel_id: &str, chapter_id: &str, part: u32) -> Result<String> {
        if part == 0 || self.max_part().is_some_and(|max| part > max) {
            return Err(SpiderError::configuration(format!(
                "cannot resolve chapter part id for novelId:{} chapterId:{} part:{} (max {})",
                novel_id,
                chapter_id,
                part,
                self.max_part().unwrap_or(u32::MAX)
            )));
        }

        let part_text = part.to_string();
        let mut bindings = Bindings::new()
            .with(Placeholder::NovelId, novel_id)
            .with(Placeholder::ChapterId, chapter_id)
            .with(Placeholder::Part, part_text.clone());

        if let Some(paths) = &self.part_paths {
            let part_path = paths[(part - 1) as usize]
                .render(&Bindings::new().with(Placeholder::Part, part_text))?;
            bindings.set(Placeholder::PartPath, part_path);
        }

        self.key.render(&bindings)
    }
}
