/// LLM API 客户端
///
/// 封装所有与 OpenAI 兼容接口的聊天调用逻辑
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// 聊天补全能力
///
/// 密钥随每次调用传入，实现方不得缓存调用方的凭证。
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(
        &self,
        user_message: &str,
        system_message: Option<&str>,
        api_key: &str,
    ) -> AppResult<String>;
}

/// LLM 客户端
#[derive(Debug, Clone)]
pub struct LlmClient {
    api_base_url: String,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(config: &Config) -> Self {
        Self {
            api_base_url: config.llm_api_base_url.clone(),
            model_name: config.llm_model_name.clone(),
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
        }
    }

    fn build_messages(
        user_message: &str,
        system_message: Option<&str>,
    ) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        let mut messages = Vec::new();

        // 添加系统消息（如果提供）
        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        Ok(messages)
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn chat(
        &self,
        user_message: &str,
        system_message: Option<&str>,
        api_key: &str,
    ) -> AppResult<String> {
        debug!("正在调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        // 每次调用按调用方密钥构建客户端
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&self.api_base_url);
        let client = Client::with_config(openai_config);

        let request = Self::build_messages(user_message, system_message)
            .and_then(|messages| {
                CreateChatCompletionRequestArgs::default()
                    .model(&self.model_name)
                    .messages(messages)
                    .temperature(self.temperature)
                    .top_p(1.0)
                    .max_tokens(self.max_tokens)
                    .build()
            })
            .map_err(|e| AppError::generation_failed(format!("构建 LLM 请求失败: {}", e)))?;

        let response = client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            AppError::generation_failed(format!("LLM API 调用失败 (模型: {}): {}", self.model_name, e))
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                AppError::generation_failed(format!("LLM 返回内容为空 (模型: {})", self.model_name))
            })?;

        Ok(content.trim().to_string())
    }
}
