//! 图片生成服务客户端
//!
//! 封装 Prediction 的创建、查询和轮询等待。
//! 每次调用都显式传入调用方的密钥，客户端本身不持有任何凭证。

use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{PredictionJob, PredictionStatus};
use crate::utils::logging::truncate_text;

/// 图片生成请求中的固定参数
#[derive(Debug, Clone)]
pub struct ImageInputSettings {
    pub aspect_ratio: String,
    pub output_format: String,
    pub output_quality: u32,
}

/// 图片生成服务客户端
#[derive(Debug, Clone)]
pub struct PredictionClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    input: ImageInputSettings,
    webhook_host: Option<String>,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl PredictionClient {
    /// 创建新的客户端
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: config.image_api_base_url.trim_end_matches('/').to_string(),
            model: config.image_model.clone(),
            input: ImageInputSettings {
                aspect_ratio: config.image_aspect_ratio.clone(),
                output_format: config.image_output_format.clone(),
                output_quality: config.image_output_quality,
            },
            webhook_host: config
                .webhook_host
                .as_ref()
                .map(|h| h.trim_end_matches('/').to_string()),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
        }
    }

    /// 自定义轮询间隔和截止时间
    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    fn create_endpoint(&self) -> String {
        format!("{}/models/{}/predictions", self.base_url, self.model)
    }

    fn get_endpoint(&self, id: &str) -> String {
        format!("{}/predictions/{}", self.base_url, id)
    }

    /// 构建创建请求的 JSON 主体
    fn build_create_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "input": {
                "prompt": prompt,
                "aspect_ratio": self.input.aspect_ratio,
                "output_format": self.input.output_format,
                "output_quality": self.input.output_quality,
            }
        });

        if let Some(host) = &self.webhook_host {
            body["webhook"] = json!(format!("{}/api/webhooks", host));
            body["webhook_events_filter"] = json!(["start", "completed"]);
        }

        body
    }

    /// 提交一个图片生成任务
    ///
    /// # 参数
    /// - `prompt`: 图片提示词，不能为空
    /// - `style`: 画风描述，非空时作为前缀
    /// - `api_key`: 调用方的图片服务密钥
    pub async fn create(&self, prompt: &str, style: &str, api_key: &str) -> AppResult<PredictionJob> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AppError::validation("图片提示词不能为空"));
        }
        let api_key = require_key(api_key)?;

        let full_prompt = styled_prompt(prompt, style);
        let endpoint = self.create_endpoint();
        debug!("创建图片任务: {} | 提示词: {}", endpoint, truncate_text(&full_prompt, 80));

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(&self.build_create_body(&full_prompt))
            .send()
            .await
            .map_err(|e| AppError::request_failed(&endpoint, e))?;

        let job = read_job(&endpoint, response).await?;

        if let Some(message) = job.error_message() {
            warn!("图片服务创建任务返回错误: {}", message);
            return Err(AppError::service(endpoint, None, message));
        }

        debug!("任务已创建: {} ({:?})", job.id, job.status);
        Ok(job)
    }

    /// 查询一次任务状态
    pub async fn poll(&self, id: &str, api_key: &str) -> AppResult<PredictionJob> {
        let api_key = require_key(api_key)?;
        let endpoint = self.get_endpoint(id);

        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| AppError::request_failed(&endpoint, e))?;

        read_job(&endpoint, response).await
    }

    /// 按固定间隔轮询，直到任务进入终态或超过截止时间
    ///
    /// 失败（或被取消）的任务返回 `GenerationFailed`，不会读取其输出。
    pub async fn await_completion(&self, job: PredictionJob, api_key: &str) -> AppResult<PredictionJob> {
        let started = Instant::now();
        let mut job = job;

        loop {
            match job.status {
                PredictionStatus::Succeeded => {
                    debug!("任务 {} 完成，耗时 {:?}", job.id, started.elapsed());
                    return Ok(job);
                }
                PredictionStatus::Failed | PredictionStatus::Canceled => {
                    let reason = job
                        .error_message()
                        .unwrap_or_else(|| format!("任务状态为 {:?}", job.status));
                    warn!("任务 {} 失败: {}", job.id, reason);
                    return Err(AppError::generation_failed(format!("图片任务 {} 失败: {}", job.id, reason)));
                }
                PredictionStatus::Starting | PredictionStatus::Processing => {}
            }

            let waited = started.elapsed();
            if waited >= self.poll_timeout {
                warn!("任务 {} 轮询超时 ({:?})", job.id, waited);
                return Err(AppError::TimedOut { id: job.id, waited });
            }

            sleep(self.poll_interval).await;
            job = self.poll(&job.id, api_key).await?;
            debug!("任务 {} 当前状态: {:?}", job.id, job.status);
        }
    }

    /// 创建任务并等待完成
    pub async fn run(&self, prompt: &str, style: &str, api_key: &str) -> AppResult<PredictionJob> {
        let job = self.create(prompt, style, api_key).await?;
        info!("🎨 图片任务 {} 已提交，等待完成...", job.id);
        self.await_completion(job, api_key).await
    }
}

/// 画风非空时以 `画风: 提示词` 的形式拼接
pub fn styled_prompt(prompt: &str, style: &str) -> String {
    let style = style.trim();
    if style.is_empty() {
        prompt.to_string()
    } else {
        format!("{}: {}", style, prompt)
    }
}

fn require_key(api_key: &str) -> AppResult<&str> {
    let key = api_key.trim();
    if key.is_empty() {
        return Err(AppError::Auth("缺少图片服务密钥".to_string()));
    }
    Ok(key)
}

/// 检查响应状态并解析任务快照
async fn read_job(endpoint: &str, response: reqwest::Response) -> AppResult<PredictionJob> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AppError::request_failed(endpoint, e))?;

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(AppError::Auth(extract_error_message(&body)));
    }
    if !status.is_success() {
        return Err(AppError::service(
            endpoint,
            Some(status.as_u16()),
            extract_error_message(&body),
        ));
    }

    serde_json::from_str(&body).map_err(|e| {
        AppError::service(
            endpoint,
            Some(status.as_u16()),
            format!("无法解析任务响应: {} ({})", e, truncate_text(&body, 200)),
        )
    })
}

/// 从错误响应中提取服务给出的信息
///
/// 依次尝试 `detail`、`error`、`title` 字段，都没有时返回原始文本。
pub fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        for field in ["detail", "error", "title"] {
            match value.get(field) {
                Some(Value::String(message)) if !message.is_empty() => return message.clone(),
                Some(Value::Object(obj)) => {
                    if let Some(Value::String(message)) = obj.get("message") {
                        return message.clone();
                    }
                }
                _ => {}
            }
        }
    }
    if body.trim().is_empty() {
        "服务未返回错误信息".to_string()
    } else {
        truncate_text(body.trim(), 500)
    }
}
