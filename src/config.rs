use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_FILE: &str = "story.toml";

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- LLM 配置 ---
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 服务端默认 LLM 密钥（请求未携带时使用）
    pub llm_api_key: Option<String>,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    // --- 图片生成 API 配置 ---
    pub image_api_base_url: String,
    /// 模型标识，格式为 owner/name
    pub image_model: String,
    /// 服务端默认图片服务密钥
    pub image_api_key: Option<String>,
    pub image_aspect_ratio: String,
    pub image_output_format: String,
    pub image_output_quality: u32,
    /// 默认画风
    pub image_style: String,
    /// Webhook 回调地址的主机部分
    pub webhook_host: Option<String>,
    // --- 轮询配置 ---
    pub poll_interval_ms: u64,
    pub poll_timeout_secs: u64,
    pub http_timeout_secs: u64,
    // --- 服务配置 ---
    pub bind_addr: String,
    pub output_pdf: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_base_url: "https://api.groq.com/openai/v1".to_string(),
            llm_model_name: "llama-3.1-8b-instant".to_string(),
            llm_api_key: None,
            llm_temperature: 1.0,
            llm_max_tokens: 1024,
            image_api_base_url: "https://api.replicate.com/v1".to_string(),
            image_model: "black-forest-labs/flux-schnell".to_string(),
            image_api_key: None,
            image_aspect_ratio: "1:1".to_string(),
            image_output_format: "webp".to_string(),
            image_output_quality: 80,
            image_style: "Story scene".to_string(),
            webhook_host: None,
            poll_interval_ms: 1000,
            poll_timeout_secs: 300,
            http_timeout_secs: 60,
            bind_addr: "127.0.0.1:3000".to_string(),
            output_pdf: "horror_story.pdf".to_string(),
        }
    }
}

impl Config {
    /// 加载配置：TOML 文件（可选）+ 环境变量覆盖
    ///
    /// 文件路径优先取 `STORY_CONFIG`，否则使用 `story.toml`，文件不存在时使用默认值。
    pub fn load() -> AppResult<Self> {
        let path = std::env::var("STORY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let base = if Path::new(&path).exists() {
            info!("📄 读取配置文件: {}", path);
            Self::from_toml_str(&std::fs::read_to_string(&path)?)?
        } else {
            debug!("配置文件 {} 不存在，使用默认配置", path);
            Self::default()
        };
        Ok(base.with_env_overrides())
    }

    /// 从 TOML 文本解析，未出现的字段取默认值
    pub fn from_toml_str(text: &str) -> AppResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(self) -> Self {
        let default = self;
        Self {
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            llm_api_key: non_empty_env("LLM_API_KEY").or_else(|| non_empty_env("GROQ_API_KEY")).or(default.llm_api_key),
            llm_temperature: std::env::var("LLM_TEMPERATURE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_temperature),
            llm_max_tokens: std::env::var("LLM_MAX_TOKENS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.llm_max_tokens),
            image_api_base_url: std::env::var("IMAGE_API_BASE_URL").unwrap_or(default.image_api_base_url),
            image_model: std::env::var("IMAGE_MODEL").unwrap_or(default.image_model),
            image_api_key: non_empty_env("REPLICATE_API_TOKEN").or_else(|| non_empty_env("REPLICATE_API_KEY")).or(default.image_api_key),
            image_aspect_ratio: std::env::var("IMAGE_ASPECT_RATIO").unwrap_or(default.image_aspect_ratio),
            image_output_format: std::env::var("IMAGE_OUTPUT_FORMAT").unwrap_or(default.image_output_format),
            image_output_quality: std::env::var("IMAGE_OUTPUT_QUALITY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.image_output_quality),
            image_style: std::env::var("IMAGE_STYLE").unwrap_or(default.image_style),
            webhook_host: webhook_host_from_env().or(default.webhook_host),
            poll_interval_ms: std::env::var("POLL_INTERVAL_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.poll_interval_ms),
            poll_timeout_secs: std::env::var("POLL_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.poll_timeout_secs),
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.http_timeout_secs),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(default.bind_addr),
            output_pdf: std::env::var("OUTPUT_PDF").unwrap_or(default.output_pdf),
        }
    }

    /// 构建共享的 HTTP 客户端
    pub fn http_client(&self) -> AppResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.http_timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("HTTP 客户端构建失败: {}", e)))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// 部署在 Vercel 时使用 `https://$VERCEL_URL`，否则退回 `NGROK_HOST`
fn webhook_host_from_env() -> Option<String> {
    non_empty_env("VERCEL_URL")
        .map(|host| format!("https://{}", host))
        .or_else(|| non_empty_env("NGROK_HOST"))
}
