//! 终端进度渲染引擎 (Terminal UI Progress Engine)
//!
//! 基于 `indicatif` 实现非阻塞式进度条编排，按事件同步抓取与组装阶段的状态。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::core::event::{EventReceiver, SpiderEvent};

/// 全局 TUI 容器 (Singleton)
static MULTI: OnceLock<MultiProgress> = OnceLock::new();

/// 获取全局进度容器实例
pub fn get_multi() -> &'static MultiProgress {
    MULTI.get_or_init(MultiProgress::new)
}

/// TUI 状态容器
struct UiState {
    /// 当前小说主状态条
    main_bar: Option<ProgressBar>,
    /// 组装进度条
    compose_bar: Option<ProgressBar>,
    /// 已保存的分片数
    saved_parts: u64,
}

impl UiState {
    fn new() -> Self {
        Self {
            main_bar: None,
            compose_bar: None,
            saved_parts: 0,
        }
    }
}

static STATE: OnceLock<Arc<RwLock<UiState>>> = OnceLock::new();

fn get_state() -> &'static Arc<RwLock<UiState>> {
    STATE.get_or_init(|| Arc::new(RwLock::new(UiState::new())))
}

/// 进度协调器 (Progress Orchestrator)
pub struct Ui;

impl Ui {
    /// 激活事件监听循环，启动异步渲染管线
    pub fn run(receiver: EventReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv_async().await {
                Self::handle_event(event);
            }
        })
    }

    fn handle_event(event: SpiderEvent) {
        let multi = get_multi();
        let state = get_state();
        let mut ui = state.write();

        match event {
            SpiderEvent::NovelStarted { novel_id, progress } => {
                if let Some(bar) = ui.main_bar.take() {
                    bar.finish();
                }
                let style = ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(style);
                bar.set_message(format!("📚 [{}] {}", progress, novel_id));
                bar.enable_steady_tick(Duration::from_millis(100));
                ui.main_bar = Some(bar);
                ui.saved_parts = 0;
            }
            SpiderEvent::PageIndexed {
                novel_name,
                page_num,
                chapters,
                queued,
            } => {
                if let Some(ref bar) = ui.main_bar {
                    bar.set_message(format!(
                        "📚 {} 第{}页: {} 章, 待抓取 {}",
                        novel_name, page_num, chapters, queued
                    ));
                }
            }
            SpiderEvent::ChapterSaved { title, .. } => {
                ui.saved_parts += 1;
                if let Some(ref bar) = ui.main_bar {
                    bar.set_message(format!("⬇️ [{}] {}", ui.saved_parts, truncate_string(&title, 30)));
                }
            }
            SpiderEvent::RequestFailed { url, .. } => {
                if let Some(ref bar) = ui.main_bar {
                    bar.set_message(format!("⚠️ FAILED: {}", truncate_string(&url, 60)));
                }
            }
            SpiderEvent::Composing { chapters, .. } => {
                let style = ProgressStyle::default_bar()
                    .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▉▊▋▌▍▎▏  ");

                let bar = multi.add(ProgressBar::new(chapters as u64));
                bar.set_style(style);
                ui.compose_bar = Some(bar);
            }
            SpiderEvent::ComposeProgress { current, title, .. } => {
                if let Some(ref bar) = ui.compose_bar {
                    bar.set_position(current as u64);
                    bar.set_message(truncate_string(&title, 30));
                }
            }
            SpiderEvent::Composed { path } => {
                if let Some(bar) = ui.compose_bar.take() {
                    bar.finish_with_message(format!("📖 {}", path));
                }
            }
            SpiderEvent::TaskCompleted => {
                if let Some(ref bar) = ui.main_bar {
                    bar.finish_with_message("✅ TASK FINISHED");
                }
            }
            SpiderEvent::TaskFailed { error } => {
                if let Some(bar) = ui.compose_bar.take() {
                    bar.abandon();
                }
                if let Some(ref bar) = ui.main_bar {
                    bar.abandon_with_message(format!("❌ FAILED: {}", error));
                }
            }
        }
    }
}

/// 执行语义化字符串截断
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::truncate_string;

    #[test]
    fn truncates_by_chars() {
        assert_eq!(truncate_string("短标题", 30), "短标题");
        assert_eq!(truncate_string("一二三四五六七八", 6), "一二三...");
    }
}
