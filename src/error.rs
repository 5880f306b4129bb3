use std::time::Duration;

use thiserror::Error;

/// 应用程序错误类型
///
/// 前五个变体构成编排流程对外暴露的错误分类，
/// 其余变体只出现在文档生成、配置加载等外围环节。
#[derive(Debug, Error)]
pub enum AppError {
    /// 参数校验失败（缺少提示词或凭证）
    #[error("参数校验失败: {0}")]
    Validation(String),

    /// 凭证缺失或被外部服务拒绝
    #[error("认证失败: {0}")]
    Auth(String),

    /// 外部 API 返回非 2xx 或网络请求失败
    #[error("服务错误 ({endpoint}, 状态码: {}): {message}", status.map(|s| s.to_string()).unwrap_or_else(|| "无".to_string()))]
    Service {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    /// 生成任务进入失败终态
    #[error("生成失败: {0}")]
    GenerationFailed(String),

    /// 轮询超出截止时间
    #[error("任务 {id} 在 {}秒 内未完成", waited.as_secs())]
    TimedOut { id: String, waited: Duration },

    /// 文档生成错误
    #[error("文档生成失败: {0}")]
    Document(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    #[error("文件错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 错误分类，供 HTTP 层映射状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Auth,
    Service,
    GenerationFailed,
    TimedOut,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Auth(_) => ErrorKind::Auth,
            AppError::Service { .. } => ErrorKind::Service,
            AppError::GenerationFailed(_) => ErrorKind::GenerationFailed,
            AppError::TimedOut { .. } => ErrorKind::TimedOut,
            AppError::Document(_) | AppError::Config(_) | AppError::Io(_) => ErrorKind::Internal,
        }
    }

    // ========== 便捷构造函数 ==========

    /// 创建参数校验错误
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    /// 创建服务错误
    pub fn service(endpoint: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        AppError::Service {
            endpoint: endpoint.into(),
            status,
            message: message.into(),
        }
    }

    /// 创建网络请求失败错误（无 HTTP 状态码）
    pub fn request_failed(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        AppError::Service {
            endpoint: endpoint.into(),
            status: source.status().map(|s| s.as_u16()),
            message: source.to_string(),
        }
    }

    /// 创建生成失败错误
    pub fn generation_failed(message: impl Into<String>) -> Self {
        AppError::GenerationFailed(message.into())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<printpdf::Error> for AppError {
    fn from(err: printpdf::Error) -> Self {
        AppError::Document(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Document(format!("图片解码失败: {}", err))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
