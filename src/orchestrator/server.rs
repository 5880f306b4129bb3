//! HTTP 服务
//!
//! 表单页面、生成接口、PDF 下载，以及图片任务的代理接口。

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::clients::PredictionClient;
use crate::config::Config;
use crate::error::{AppError, AppResult, ErrorKind};
use crate::models::{Credentials, GeneratedDocument};
use crate::services::DocumentAssembler;
use crate::workflow::StoryFlow;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// 下载文件名
pub const PDF_FILE_NAME: &str = "horror_story.pdf";

/// 所有 handler 共享的只读状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub flow: Arc<StoryFlow>,
    pub predictions: PredictionClient,
    pub assembler: Arc<DocumentAssembler>,
}

impl AppState {
    pub fn new(config: Config) -> AppResult<Self> {
        let http = config.http_client()?;
        Ok(Self {
            flow: Arc::new(StoryFlow::from_config(&config, http.clone())),
            predictions: PredictionClient::new(&config, http.clone()),
            assembler: Arc::new(DocumentAssembler::new(http)),
            config: Arc::new(config),
        })
    }
}

/// 构建路由
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Html(INDEX_HTML) }))
        .route("/api/story", post(generate_story))
        .route("/api/pdf", post(download_pdf))
        .route("/api/predictions", post(create_prediction))
        .route("/api/predictions/:id", get(get_prediction))
        .route("/api/generate-image", post(generate_image))
        .route("/api/webhooks", post(receive_webhook))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// 启动服务并阻塞直到退出
pub async fn serve(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("🌐 服务已启动: http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ========== 请求体 ==========

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoryRequest {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    style: Option<String>,
    #[serde(default)]
    llm_api_key: Option<String>,
    #[serde(default)]
    image_api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictionRequest {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    api_key: String,
}

// ========== Handlers ==========

async fn generate_story(State(state): State<AppState>, Json(request): Json<StoryRequest>) -> Response {
    let credentials = Credentials {
        llm_api_key: request.llm_api_key,
        image_api_key: request.image_api_key,
    }
    .or_defaults(
        state.config.llm_api_key.as_deref(),
        state.config.image_api_key.as_deref(),
    );
    let style = request
        .style
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| state.config.image_style.clone());

    match state.flow.run(&request.prompt, &style, &credentials).await {
        Ok(document) => Json(document).into_response(),
        Err(e) => error_response(e),
    }
}

async fn download_pdf(State(state): State<AppState>, Json(document): Json<GeneratedDocument>) -> Response {
    match state.assembler.build_pdf(&document).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", PDF_FILE_NAME),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn create_prediction(State(state): State<AppState>, Json(request): Json<PredictionRequest>) -> Response {
    if request.prompt.trim().is_empty() || request.api_key.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Prompt & API KEY are required");
    }

    match state.predictions.create(&request.prompt, "", &request.api_key).await {
        Ok(job) => (StatusCode::CREATED, Json(job)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_prediction(State(state): State<AppState>, Path(id): Path<String>, headers: HeaderMap) -> Response {
    let Some(api_key) = bearer_token(&headers) else {
        return json_error(StatusCode::BAD_REQUEST, "API key is required");
    };

    match state.predictions.poll(&id, &api_key).await {
        Ok(job) => Json(job).into_response(),
        Err(e) => error_response(e),
    }
}

async fn generate_image(State(state): State<AppState>, Json(request): Json<PredictionRequest>) -> Response {
    if request.prompt.trim().is_empty() || request.api_key.trim().is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "Prompt & API KEY are required");
    }

    let result = state.predictions.run(&request.prompt, "", &request.api_key).await;
    match result.and_then(|job| {
        job.last_output()
            .map(str::to_string)
            .ok_or_else(|| AppError::generation_failed(format!("图片任务 {} 没有输出", job.id)))
    }) {
        Ok(image_url) => Json(json!({ "imageUrl": image_url })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn receive_webhook(Json(payload): Json<Value>) -> StatusCode {
    let id = payload.get("id").and_then(Value::as_str).unwrap_or("?");
    let status = payload.get("status").and_then(Value::as_str).unwrap_or("?");
    info!("🔔 收到 Webhook: 任务 {} 状态 {}", id, status);
    StatusCode::OK
}

// ========== 辅助函数 ==========

/// 取 `Authorization: Bearer <key>` 中的密钥
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(' ').nth(1))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Auth => StatusCode::UNAUTHORIZED,
        ErrorKind::Service | ErrorKind::GenerationFailed => StatusCode::BAD_GATEWAY,
        ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: AppError) -> Response {
    warn!("请求失败: {}", err);
    json_error(status_for(err.kind()), &err.to_string())
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        AppState::new(Config {
            image_api_base_url: "http://127.0.0.1:9".to_string(),
            llm_api_base_url: "http://127.0.0.1:9".to_string(),
            ..Config::default()
        })
        .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, "Bearer r8_abc".parse().unwrap());
        assert_eq!(bearer_token(&headers).as_deref(), Some("r8_abc"));
        headers.insert(header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Auth), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(ErrorKind::TimedOut), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_index_page() {
        let response = router(test_state())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_prediction_requires_key() {
        let response = router(test_state())
            .oneshot(
                Request::builder()
                    .uri("/api/predictions/p1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "API key is required");
    }

    #[tokio::test]
    async fn test_create_prediction_requires_prompt_and_key() {
        let response = router(test_state())
            .oneshot(post_json("/api/predictions", json!({ "prompt": "a ghost" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Prompt & API KEY are required");
    }

    #[tokio::test]
    async fn test_create_prediction_proxies_to_service() {
        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", "/models/black-forest-labs/flux-schnell/predictions")
            .match_header("authorization", "Bearer r8")
            .with_status(201)
            .with_body(r#"{"id":"p1","status":"starting"}"#)
            .create_async()
            .await;

        let state = AppState::new(Config {
            image_api_base_url: server.url(),
            ..Config::default()
        })
        .unwrap();
        let response = router(state)
            .oneshot(post_json("/api/predictions", json!({ "prompt": "a ghost", "apiKey": "r8" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["id"], "p1");
        assert_eq!(body["status"], "starting");
    }

    #[tokio::test]
    async fn test_story_without_credentials_is_bad_request() {
        let response = router(test_state())
            .oneshot(post_json("/api/story", json!({ "prompt": "a haunted doll" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(response).await["error"].as_str().unwrap().contains("密钥"));
    }

    #[tokio::test]
    async fn test_webhook_ack() {
        let response = router(test_state())
            .oneshot(post_json("/api/webhooks", json!({ "id": "p1", "status": "succeeded" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
