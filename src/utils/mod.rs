use std::path::Path;

use tokio::fs;
use url::Url;

/// 把页面中的链接解析为绝对地址；无法解析时返回 `None`
pub fn to_absolute_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with('#') {
        return None;
    }

    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }

    let base = Url::parse(base).ok()?;
    if let Some(path_without_slashes) = href.strip_prefix("//") {
        return Some(format!("{}://{}", base.scheme(), path_without_slashes));
    }

    base.join(href).ok().map(|u| u.to_string())
}

/// 把小说名转成安全的文件名：路径分隔符与控制字符替换为 `_`
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim_end_matches(['.', ' ']);
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        return String::new();
    }
    cleaned.to_string()
}

/// 删除文件，文件不存在时视为成功
pub async fn remove_file_if_exists(path: impl AsRef<Path>) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
