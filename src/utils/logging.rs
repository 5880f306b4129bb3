/// 日志工具模块
///
/// 提供日志初始化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化全局日志
///
/// 默认级别为 `info`，可通过 `RUST_LOG` 覆盖。重复调用不会报错。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(mode: &str, config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - {}", mode);
    info!("📝 故事模型: {}", config.llm_model_name);
    info!("🎨 图片模型: {}", config.image_model);
    info!(
        "⏱️ 轮询间隔: {}ms / 截止时间: {}s",
        config.poll_interval_ms, config.poll_timeout_secs
    );
    if let Some(host) = &config.webhook_host {
        info!("🔔 Webhook: {}/api/webhooks", host);
    }
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（字符数）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
