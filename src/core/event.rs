//! 事件系统定义
//!
//! 用于 Engine 与 UI 之间的完全解耦通信

use flume::{Receiver, Sender};

/// Spider 事件类型
#[derive(Debug, Clone)]
pub enum SpiderEvent {
    /// 开始处理一本小说
    NovelStarted { novel_id: String, progress: String },

    /// 列表页已索引
    PageIndexed {
        novel_name: String,
        page_num: u32,
        chapters: usize,
        queued: usize,
    },

    /// 章节分片已保存
    ChapterSaved { title: String, chapter_part_id: String },

    /// 请求在重试后仍失败
    RequestFailed { url: String, error: String },

    /// 开始组装
    Composing { novel_id: String, chapters: usize },

    /// 组装中的章节进度
    ComposeProgress { current: usize, total: usize, title: String },

    /// 组装完成
    Composed { path: String },

    /// 全部小说处理完成
    TaskCompleted,

    /// 任务失败
    TaskFailed { error: String },
}

/// 事件发送器
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<SpiderEvent>,
}

impl EventSender {
    pub fn new(tx: Sender<SpiderEvent>) -> Self {
        Self { tx }
    }

    /// 发送事件
    pub fn emit(&self, event: SpiderEvent) {
        let _ = self.tx.send(event);
    }
}

/// 事件接收器
pub struct EventReceiver {
    rx: Receiver<SpiderEvent>,
}

impl EventReceiver {
    pub fn new(rx: Receiver<SpiderEvent>) -> Self {
        Self { rx }
    }

    /// 异步接收事件
    pub async fn recv_async(&self) -> Option<SpiderEvent> {
        self.rx.recv_async().await.ok()
    }
}

/// 创建事件通道
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = flume::unbounded();
    (EventSender::new(tx), EventReceiver::new(rx))
}
