//! 应用入口 - 编排层
//!
//! 持有配置和共享 HTTP 客户端，提供两种运行方式：
//! - `generate`：命令行一次性生成并写出 PDF
//! - `serve`：启动 HTTP 服务

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::models::Credentials;
use crate::orchestrator::server::{self, AppState};
use crate::services::DocumentAssembler;
use crate::utils::logging::log_startup;
use crate::workflow::StoryFlow;

/// 一次命令行生成的参数
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub style: Option<String>,
    pub credentials: Credentials,
    pub output: Option<PathBuf>,
}

/// 应用主结构
pub struct App {
    config: Config,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config, mode: &str) -> Self {
        log_startup(mode, &config);
        Self { config }
    }

    /// 生成故事与插图并写出 PDF，返回文件路径
    pub async fn generate(&self, request: GenerateRequest) -> Result<PathBuf> {
        let http = self.config.http_client()?;
        let flow = StoryFlow::from_config(&self.config, http.clone());
        let assembler = DocumentAssembler::new(http);

        let credentials = request.credentials.or_defaults(
            self.config.llm_api_key.as_deref(),
            self.config.image_api_key.as_deref(),
        );
        let style = request
            .style
            .unwrap_or_else(|| self.config.image_style.clone());

        let document = flow.run(&request.prompt, &style, &credentials).await?;

        for (i, page) in document.pages.iter().enumerate() {
            info!("📖 第 {} 页插图: {}", i + 1, page.image_url);
        }

        let bytes = assembler.build_pdf(&document).await?;
        let output = request
            .output
            .unwrap_or_else(|| PathBuf::from(&self.config.output_pdf));
        tokio::fs::write(&output, &bytes)
            .await
            .with_context(|| format!("写入 PDF 失败: {}", output.display()))?;

        info!("💾 PDF 已保存至: {}", output.display());
        Ok(output)
    }

    /// 启动 HTTP 服务
    pub async fn serve(&self, bind_addr: Option<String>) -> Result<()> {
        let bind_addr = bind_addr.unwrap_or_else(|| self.config.bind_addr.clone());
        server::serve(AppState::new(self.config.clone())?, &bind_addr).await
    }
}
