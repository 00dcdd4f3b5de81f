use std::collections::{HashSet, VecDeque};

use super::task::Task;

/// 请求队列：先进先出，支持插队，同一 URL 在一次抓取中只入队一次
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<Task>,
    seen: HashSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 入队到末尾；重复 URL 返回 `false`
    pub fn push_back(&mut self, task: Task) -> bool {
        if !self.seen.insert(task.url().to_string()) {
            return false;
        }
        self.queue.push_back(task);
        true
    }

    /// 插队到队首
    pub fn push_front(&mut self, task: Task) -> bool {
        if !self.seen.insert(task.url().to_string()) {
            return false;
        }
        self.queue.push_front(task);
        true
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
