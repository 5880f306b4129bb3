//! 故事请求上下文
//!
//! 封装"我正在处理哪一次提交"这一信息，只用于日志

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

/// 一次提交的上下文
#[derive(Debug, Clone)]
pub struct StoryCtx {
    /// 请求编号（进程内递增）
    pub request_index: u64,

    /// 提交时间
    pub started_at: String,

    /// 画风
    pub style: String,
}

impl StoryCtx {
    pub fn new(style: impl Into<String>) -> Self {
        Self {
            request_index: NEXT_REQUEST.fetch_add(1, Ordering::Relaxed),
            started_at: chrono::Local::now().format("%H:%M:%S").to_string(),
            style: style.into(),
        }
    }

    /// 某一页的日志前缀
    pub fn page_label(&self, page: usize) -> String {
        format!("[请求 {} 第{}页]", self.request_index, page)
    }
}

impl Display for StoryCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[请求 {} @{}]", self.request_index, self.started_at)
    }
}
