//! # Story Illustrator
//!
//! 根据一句提示词生成两段式恐怖小故事、为每段生成插图，并排版成 PDF
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 只负责和外部 API 通信，凭证随调用传入
//! - `LlmClient` - OpenAI 兼容的聊天补全（`ChatBackend`）
//! - `PredictionClient` - 图片生成任务的创建、查询与轮询
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理一段内容
//! - `StoryGenerator` - 写故事并按标记切分
//! - `IllustrationService` - 派生图片提示词并取回插图地址
//! - `DocumentAssembler` - 排版并生成 PDF
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次提交"的完整处理流程
//! - `StoryCtx` - 上下文封装（请求编号 + 画风）
//! - `StoryFlow` - 流程编排（故事 → 并发插图 → 两页内容）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/app` - 命令行一次性生成
//! - `orchestrator/server` - HTTP 服务
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, ErrorKind};
pub use models::{Credentials, GeneratedDocument, PredictionJob, StoryPage, StoryText};
pub use orchestrator::{App, GenerateRequest};
pub use workflow::{StoryCtx, StoryFlow};
