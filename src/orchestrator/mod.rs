//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责把流程暴露给使用者，是整个系统的"入口"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用主结构
//! - 持有配置
//! - 命令行一次性生成：流程 → PDF → 写文件
//! - 启动 HTTP 服务
//!
//! ### `server` - HTTP 服务
//! - 表单页面与生成接口
//! - PDF 下载（只排版，不重新生成）
//! - 图片任务代理接口与 Webhook 接收
//!
//! ## 层次关系
//!
//! ```text
//! app / server (处理一次提交)
//!     ↓
//! workflow::StoryFlow (故事 → 两张插图)
//!     ↓
//! services (能力层：story / image / document)
//!     ↓
//! clients (外部 API：LLM / 图片生成)
//! ```

pub mod app;
pub mod server;

// 重新导出主要类型
pub use app::{App, GenerateRequest};
pub use server::{router, AppState};
