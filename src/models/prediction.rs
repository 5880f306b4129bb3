//! 图片生成任务（Prediction）数据模型

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 任务状态，词汇由图片生成服务定义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    #[serde(alias = "pending")]
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl PredictionStatus {
    /// 是否已进入终态
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PredictionStatus::Succeeded | PredictionStatus::Failed | PredictionStatus::Canceled
        )
    }
}

/// 任务的查询地址
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionUrls {
    #[serde(default)]
    pub get: Option<String>,
    #[serde(default)]
    pub cancel: Option<String>,
}

/// 一个图片生成任务的快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionJob {
    pub id: String,
    pub status: PredictionStatus,
    /// 只在 `Succeeded` 之后读取
    #[serde(default, deserialize_with = "deserialize_output")]
    pub output: Vec<String>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub urls: PredictionUrls,
}

impl PredictionJob {
    /// 最后一个产出的资源地址
    pub fn last_output(&self) -> Option<&str> {
        self.output.last().map(String::as_str)
    }

    /// 服务端返回的错误信息（字符串化）
    pub fn error_message(&self) -> Option<String> {
        match &self.error {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

/// output 可能是 null、单个字符串或字符串数组
fn deserialize_output<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(url)) => vec![url],
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    })
}
