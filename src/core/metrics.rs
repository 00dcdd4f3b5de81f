//! 运行统计与指标文本 (Status Metrics)
//!
//! 统计记录随断点迁移一同更新，由外部指标端点按 Prometheus 文本格式渲染。

use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::core::checkpoint::CrawlStatus;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistic {
    #[serde(default)]
    pub run_id: Option<u64>,
    #[serde(default)]
    pub status: CrawlStatus,
    /// `"i/n"`
    #[serde(default)]
    pub progress: String,
    #[serde(default)]
    pub novel_name: String,
    #[serde(default)]
    pub page_num: u32,
    #[serde(default)]
    pub requests_finished: u64,
    #[serde(default)]
    pub requests_failed: u64,
    /// 毫秒时间戳
    #[serde(default)]
    pub started_at: u64,
}

impl Statistic {
    pub fn start(run_id: u64, total_novels: usize, novel_index: usize) -> Self {
        Self {
            run_id: Some(run_id),
            progress: progress(novel_index, total_novels),
            started_at: now_millis(),
            ..Default::default()
        }
    }
}

pub fn progress(novel_index: usize, total_novels: usize) -> String {
    format!("{}/{}", (novel_index + 1).min(total_novels), total_novels)
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// 渲染指标文本；尚无运行记录时 `id` 为 `None`
pub fn render_metrics(statistic: &Statistic) -> String {
    let or_none = |s: &str| if s.is_empty() { "None".to_string() } else { label(s) };
    let id = statistic
        .run_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "None".to_string());

    let mut out = String::new();
    let _ = writeln!(out, "# HELP crawler_status 状态");
    let _ = writeln!(out, "# TYPE crawler_status gauge");
    let _ = writeln!(
        out,
        "crawler_status{{id=\"{}\",progress=\"{}\",novelName=\"{}\",pageNum=\"{}\",}} {}",
        id,
        or_none(&statistic.progress),
        or_none(&statistic.novel_name),
        statistic.page_num,
        statistic.status.code()
    );

    if statistic.run_id.is_some() {
        let _ = writeln!(out, "# HELP crawler_start_at 开始时间(Timestamp)");
        let _ = writeln!(out, "# TYPE crawler_start_at gauge");
        let _ = writeln!(out, "crawler_start_at {}", statistic.started_at);

        let _ = writeln!(out, "# HELP crawler_request_count 请求统计");
        let _ = writeln!(out, "# TYPE crawler_request_count gauge");
        let _ = writeln!(out, "crawler_request_count{{type=\"finished\",}} {}", statistic.requests_finished);
        let _ = writeln!(out, "crawler_request_count{{type=\"failed\",}} {}", statistic.requests_failed);
    }

    out.truncate(out.trim_end_matches('\n').len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_idle_status() {
        let text = render_metrics(&Statistic::default());
        assert_eq!(
            text.lines().last().unwrap(),
            r#"crawler_status{id="None",progress="None",novelName="None",pageNum="0",} 0"#
        );
        assert!(!text.contains("crawler_start_at"));
    }

    #[test]
    fn renders_running_status() {
        let mut statistic = Statistic::start(42, 3, 1);
        statistic.status = CrawlStatus::Composing;
        statistic.novel_name = "书 \"一\"".into();
        statistic.page_num = 5;
        statistic.requests_finished = 10;
        statistic.requests_failed = 2;

        let text = render_metrics(&statistic);
        assert!(text.contains(r#"crawler_status{id="42",progress="2/3",novelName="书 \"一\"",pageNum="5",} 2"#));
        assert!(text.contains(r#"crawler_request_count{type="failed",} 2"#));
        assert!(!text.ends_with('\n'));
    }
}
