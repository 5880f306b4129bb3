//! 故事相关的数据模型

use serde::{Deserialize, Serialize};

/// 生成的故事正文，分为两段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryText {
    pub part1: String,
    pub part2: String,
}

impl StoryText {
    /// 按页面顺序返回两段正文
    pub fn parts(&self) -> [&str; 2] {
        [&self.part1, &self.part2]
    }
}

/// 调用方提供的两个外部服务凭证
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default)]
    pub llm_api_key: Option<String>,
    #[serde(default)]
    pub image_api_key: Option<String>,
}

impl Credentials {
    pub fn new(llm_api_key: impl Into<String>, image_api_key: impl Into<String>) -> Self {
        Self {
            llm_api_key: Some(llm_api_key.into()),
            image_api_key: Some(image_api_key.into()),
        }
    }

    /// 缺失的一项使用服务端默认值补齐；请求携带的值始终优先
    pub fn or_defaults(self, llm_default: Option<&str>, image_default: Option<&str>) -> Self {
        Self {
            llm_api_key: non_blank(self.llm_api_key).or_else(|| llm_default.map(str::to_string)),
            image_api_key: non_blank(self.image_api_key)
                .or_else(|| image_default.map(str::to_string)),
        }
    }

    /// 两个凭证都存在时返回 (llm, image)
    pub fn both(&self) -> Option<(&str, &str)> {
        let llm = self.llm_api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
        let image = self.image_api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
        Some((llm, image))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// 一页内容：一段正文 + 一张插图地址
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryPage {
    pub text: String,
    pub image_url: String,
}

/// 编排结果，可序列化后交给下载动作重新排版
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedDocument {
    pub prompt: String,
    pub style: String,
    pub pages: Vec<StoryPage>,
}
