//! 故事生成服务 - 业务能力层
//!
//! 只负责"写故事"能力：发送一次补全请求，并把返回文本切成两段。

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, warn};

use crate::clients::ChatBackend;
use crate::error::AppResult;
use crate::models::StoryText;

/// 第一段标记
pub const PART1_MARKER: &str = "[PART1]";
/// 第二段标记
pub const PART2_MARKER: &str = "[PART2]";

const SYSTEM_MESSAGE: &str = "You are a master of short horror fiction. \
                              You always follow the requested output format exactly.";

/// 故事生成服务
///
/// 职责：
/// - 用固定模板调用 LLM
/// - 按标记切分结果
/// - 标记缺失时返回空段落，不视为错误
pub struct StoryGenerator {
    backend: Arc<dyn ChatBackend>,
}

impl StoryGenerator {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// 生成两段式故事
    ///
    /// 请求失败时返回 `GenerationFailed`；切分永远不会失败。
    pub async fn generate(&self, prompt: &str, api_key: &str) -> AppResult<StoryText> {
        let user_message = build_story_prompt(prompt);
        let raw = self
            .backend
            .chat(&user_message, Some(SYSTEM_MESSAGE), api_key)
            .await?;

        debug!("故事原文长度: {} 字符", raw.chars().count());

        let story = split_story(&raw);
        if story.part1.is_empty() || story.part2.is_empty() {
            warn!("⚠️ 故事缺少分段标记，对应段落为空");
        }
        Ok(story)
    }
}

/// 构建固定的故事提示词
pub fn build_story_prompt(prompt: &str) -> String {
    format!(
        "Write a short horror story based on this prompt: {prompt}\n\n\
         Split the story into exactly two parts of similar length.\n\
         Start the first part with the marker {PART1_MARKER} and the second part with the marker {PART2_MARKER}.\n\
         Do not write a title and do not add anything before {PART1_MARKER}."
    )
}

const MARKER_PATTERN: &str = r"\[PART([12])\]";

/// 按 `[PART1]` / `[PART2]` 切分原文
///
/// 每个标记对应的段落从标记结尾延伸到下一个标记或文本末尾；
/// 同一标记出现多次时只取第一次。
pub fn split_story(raw: &str) -> StoryText {
    let mut story = StoryText::default();
    let Ok(re) = Regex::new(MARKER_PATTERN) else {
        return story;
    };
    let markers: Vec<_> = re.captures_iter(raw).collect();
    let mut seen = [false, false];

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(digit)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(raw.len());
        let segment = raw[whole.end()..end].trim().to_string();

        match digit.as_str() {
            "1" if !seen[0] => {
                seen[0] = true;
                story.part1 = segment;
            }
            "2" if !seen[1] => {
                seen[1] = true;
                story.part2 = segment;
            }
            _ => {}
        }
    }

    story
}
