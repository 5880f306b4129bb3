//! 故事处理流程 - 流程层
//!
//! 核心职责：定义"一次提交"的完整处理流程
//!
//! 流程顺序：
//! 1. 校验提示词和两个凭证
//! 2. 生成两段式故事
//! 3. 由两段正文派生两个图片提示词
//! 4. 并发运行两个图片任务（任一失败即整体失败）
//! 5. 组合成两页 (正文, 插图)

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::clients::{ChatBackend, LlmClient, PredictionClient};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Credentials, GeneratedDocument, StoryPage};
use crate::services::image_service::image_prompt;
use crate::services::{IllustrationService, StoryGenerator};
use crate::utils::truncate_text;
use crate::workflow::story_ctx::StoryCtx;

/// 故事处理流程
///
/// - 编排完整的生成流程
/// - 不持有任何凭证，凭证随每次提交传入
/// - 只依赖业务能力（services）
pub struct StoryFlow {
    generator: StoryGenerator,
    illustrator: IllustrationService,
}

impl StoryFlow {
    /// 使用显式构造的客户端创建流程
    pub fn new(backend: Arc<dyn ChatBackend>, predictions: PredictionClient) -> Self {
        Self {
            generator: StoryGenerator::new(backend),
            illustrator: IllustrationService::new(predictions),
        }
    }

    /// 按配置构建默认客户端
    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        Self::new(
            Arc::new(LlmClient::new(config)),
            PredictionClient::new(config, http),
        )
    }

    pub async fn run(
        &self,
        prompt: &str,
        style: &str,
        credentials: &Credentials,
    ) -> AppResult<GeneratedDocument> {
        let ctx = StoryCtx::new(style);

        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AppError::validation("提示词不能为空"));
        }
        let (llm_key, image_key) = credentials
            .both()
            .ok_or_else(|| AppError::validation("需要同时提供故事服务和图片服务的密钥"))?;

        info!("{} 📝 正在生成故事: {}", ctx, truncate_text(prompt, 80));
        let story = self.generator.generate(prompt, llm_key).await.map_err(|e| {
            error!("{} ❌ 故事生成失败: {}", ctx, e);
            e
        })?;
        info!(
            "{} ✓ 故事生成完成 (第一段 {} 字符, 第二段 {} 字符)",
            ctx,
            story.part1.chars().count(),
            story.part2.chars().count()
        );

        // 缺少标记的段落为空，此时用用户提示词派生图片提示词
        let [prompt1, prompt2] = story.parts().map(|part| {
            if part.trim().is_empty() {
                warn!("{} ⚠️ 段落为空，改用用户提示词生成插图", ctx);
                image_prompt(prompt, style)
            } else {
                image_prompt(part, style)
            }
        });
        let (label1, label2) = (ctx.page_label(1), ctx.page_label(2));

        // 两个图片任务没有先后要求；任一失败时另一个 future 被丢弃，停止本地轮询
        let (url1, url2) = futures::try_join!(
            self.illustrator.illustrate(&label1, &prompt1, image_key),
            self.illustrator.illustrate(&label2, &prompt2, image_key)
        )
        .map_err(|e| {
            error!("{} ❌ 插图生成失败: {}", ctx, e);
            e
        })?;

        info!("{} ✅ 全部完成", ctx);

        Ok(GeneratedDocument {
            prompt: prompt.to_string(),
            style: style.to_string(),
            pages: vec![
                StoryPage {
                    text: story.part1,
                    image_url: url1,
                },
                StoryPage {
                    text: story.part2,
                    image_url: url2,
                },
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockito::Matcher;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingBackend {
        reply: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatBackend for CountingBackend {
        async fn chat(&self, _user: &str, _system: Option<&str>, _key: &str) -> AppResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn backend(reply: &str) -> Arc<CountingBackend> {
        Arc::new(CountingBackend {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    fn flow(backend: Arc<CountingBackend>, base_url: &str) -> StoryFlow {
        let config = Config {
            image_api_base_url: base_url.to_string(),
            ..Config::default()
        };
        let predictions = PredictionClient::new(&config, reqwest::Client::new())
            .with_polling(Duration::from_millis(10), Duration::from_secs(2));
        StoryFlow::new(backend, predictions)
    }

    const CREATE_PATH: &str = "/models/black-forest-labs/flux-schnell/predictions";

    #[tokio::test]
    async fn test_missing_credentials_fails_before_network() {
        let llm = backend("[PART1]a[PART2]b");
        let flow = flow(llm.clone(), "http://127.0.0.1:9");

        let err = flow
            .run("a haunted doll", "Story scene", &Credentials::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_prompt_is_validation_error() {
        let llm = backend("[PART1]a[PART2]b");
        let flow = flow(llm.clone(), "http://127.0.0.1:9");

        let err = flow
            .run("   ", "Story scene", &Credentials::new("gsk", "r8"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_pairs_segments_with_images() {
        let mut server = mockito::Server::new_async().await;
        let create1 = server
            .mock("POST", CREATE_PATH)
            .match_header("authorization", "Bearer r8")
            .match_body(Matcher::PartialJson(json!({
                "input": { "prompt": "Story scene: Knock knock at midnight" }
            })))
            .with_status(201)
            .with_body(r#"{"id":"p1","status":"starting"}"#)
            .create_async()
            .await;
        let create2 = server
            .mock("POST", CREATE_PATH)
            .match_body(Matcher::PartialJson(json!({
                "input": { "prompt": "Story scene: Silence fell" }
            })))
            .with_status(201)
            .with_body(r#"{"id":"p2","status":"starting"}"#)
            .create_async()
            .await;
        let _get1 = server
            .mock("GET", "/predictions/p1")
            .with_status(200)
            .with_body(r#"{"id":"p1","status":"succeeded","output":["https://img/p1-0.webp","https://img/p1-1.webp"]}"#)
            .create_async()
            .await;
        let _get2 = server
            .mock("GET", "/predictions/p2")
            .with_status(200)
            .with_body(r#"{"id":"p2","status":"succeeded","output":["https://img/p2.webp"]}"#)
            .create_async()
            .await;

        let llm = backend("Title\n[PART1] Knock knock at midnight [PART2] Silence fell");
        let document = flow(llm.clone(), &server.url())
            .run("knocking", "Story scene", &Credentials::new("gsk", "r8"))
            .await
            .unwrap();

        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
        assert_eq!(document.pages.len(), 2);
        assert_eq!(document.pages[0].text, "Knock knock at midnight");
        assert_eq!(document.pages[0].image_url, "https://img/p1-1.webp");
        assert_eq!(document.pages[1].text, "Silence fell");
        assert_eq!(document.pages[1].image_url, "https://img/p2.webp");
        create1.assert_async().await;
        create2.assert_async().await;
    }

    #[tokio::test]
    async fn test_story_without_markers_illustrates_user_prompt() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", CREATE_PATH)
            .match_body(Matcher::PartialJson(json!({ "input": { "prompt": "a prompt" } })))
            .with_status(201)
            .with_body(r#"{"id":"p1","status":"succeeded","output":["https://img/p1.webp"]}"#)
            .expect(2)
            .create_async()
            .await;

        let document = flow(backend("just text"), &server.url())
            .run("a prompt", "", &Credentials::new("gsk", "r8"))
            .await
            .unwrap();

        assert_eq!(document.pages.len(), 2);
        assert!(document.pages.iter().all(|page| page.text.is_empty()));
        assert!(document.pages.iter().all(|page| page.image_url == "https://img/p1.webp"));
        create.assert_async().await;
    }

    #[tokio::test]
    async fn test_one_failed_image_fails_whole_run() {
        let mut server = mockito::Server::new_async().await;
        let _create1 = server
            .mock("POST", CREATE_PATH)
            .match_body(Matcher::PartialJson(json!({ "input": { "prompt": "Story scene: one" } })))
            .with_status(201)
            .with_body(r#"{"id":"ok","status":"starting"}"#)
            .create_async()
            .await;
        let _create2 = server
            .mock("POST", CREATE_PATH)
            .match_body(Matcher::PartialJson(json!({ "input": { "prompt": "Story scene: two" } })))
            .with_status(201)
            .with_body(r#"{"id":"bad","status":"starting"}"#)
            .create_async()
            .await;
        let _get_ok = server
            .mock("GET", "/predictions/ok")
            .with_status(200)
            .with_body(r#"{"id":"ok","status":"succeeded","output":["https://img/ok.webp"]}"#)
            .create_async()
            .await;
        let _get_bad = server
            .mock("GET", "/predictions/bad")
            .with_status(200)
            .with_body(r#"{"id":"bad","status":"failed","error":"safety filter"}"#)
            .create_async()
            .await;

        let err = flow(backend("[PART1]one[PART2]two"), &server.url())
            .run("p", "Story scene", &Credentials::new("gsk", "r8"))
            .await
            .unwrap_err();

        match err {
            AppError::GenerationFailed(message) => assert!(message.contains("safety filter")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_image_key_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", CREATE_PATH)
            .with_status(401)
            .with_body(r#"{"detail":"Invalid token."}"#)
            .expect_at_least(1)
            .create_async()
            .await;

        let err = flow(backend("[PART1]one[PART2]two"), &server.url())
            .run("p", "Story scene", &Credentials::new("gsk", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }
}
