//! 插图服务 - 业务能力层
//!
//! 把一段故事变成一张插图的地址

use tracing::info;

use crate::clients::PredictionClient;
use crate::error::{AppError, AppResult};

/// 图片提示词最多取的单词数
pub const IMAGE_PROMPT_WORDS: usize = 10;

/// 从故事段落派生图片提示词
///
/// 取前十个以空白分隔的单词，用单个空格连接，并以画风作为前缀。
pub fn image_prompt(segment: &str, style: &str) -> String {
    let words = segment
        .split_whitespace()
        .take(IMAGE_PROMPT_WORDS)
        .collect::<Vec<_>>()
        .join(" ");

    let style = style.trim();
    if style.is_empty() {
        words
    } else {
        format!("{}: {}", style, words)
    }
}

/// 插图服务
pub struct IllustrationService {
    client: PredictionClient,
}

impl IllustrationService {
    pub fn new(client: PredictionClient) -> Self {
        Self { client }
    }

    /// 为一段故事生成插图，返回最后一个输出的地址
    ///
    /// 提示词已包含画风前缀，因此提交时不再额外拼接。
    pub async fn illustrate(&self, label: &str, prompt: &str, api_key: &str) -> AppResult<String> {
        info!("{} 🎨 图片提示词: {}", label, prompt);
        let job = self.client.run(prompt, "", api_key).await?;

        let url = job
            .last_output()
            .map(str::to_string)
            .ok_or_else(|| AppError::generation_failed(format!("图片任务 {} 没有输出", job.id)))?;

        info!("{} ✓ 插图完成: {}", label, url);
        Ok(url)
    }
}
