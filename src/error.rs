use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::{ArtifactKind, Role};

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 投稿解析错误（致命，整个运行中止）
    #[error("解析错误: {0}")]
    Resolution(#[from] ResolutionError),
    /// 远程获取错误
    #[error("获取错误: {0}")]
    Fetch(#[from] FetchError),
    /// 文档组装错误
    #[error("组装错误: {0}")]
    Assembly(#[from] AssemblyError),
    /// 导出缓存错误
    #[error("缓存错误: {0}")]
    Cache(#[from] CacheError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
}

/// 投稿解析错误
///
/// 任何一种都是致命的：不会产生部分解析结果。
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// 会议不存在
    #[error("会议不存在: {venue_id}")]
    UnknownVenue { venue_id: String },
    /// 当前账号没有该角色的权限
    #[error("没有以 {role} 身份访问 {venue_id} 的权限")]
    PermissionDenied { venue_id: String, role: Role },
    /// 过滤条件不合法
    #[error("过滤条件不合法: {0}")]
    InvalidFilter(String),
    /// 远程调用失败
    #[error("获取分配列表失败: {0}")]
    Remote(#[source] FetchError),
}

/// 远程获取错误种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// 资源不存在
    NotFound,
    /// 请求频率限制
    RateLimited,
    /// 暂时性网络错误
    Transient,
    /// 权限不足
    PermissionDenied,
}

impl FetchErrorKind {
    /// 是否值得重试
    pub fn is_retryable(self) -> bool {
        matches!(self, FetchErrorKind::RateLimited | FetchErrorKind::Transient)
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchErrorKind::NotFound => "NotFound",
            FetchErrorKind::RateLimited => "RateLimited",
            FetchErrorKind::Transient => "Transient",
            FetchErrorKind::PermissionDenied => "PermissionDenied",
        };
        f.write_str(name)
    }
}

/// 远程获取错误
#[derive(Debug, Clone, Error)]
#[error("{kind} ({endpoint}): {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub endpoint: String,
    pub message: String,
    /// 服务端建议的等待时间（仅 RateLimited）
    pub retry_after: Option<Duration>,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn not_found(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NotFound, endpoint, message)
    }

    pub fn permission_denied(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::PermissionDenied, endpoint, message)
    }

    pub fn transient(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Transient, endpoint, message)
    }

    pub fn rate_limited(endpoint: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::new(FetchErrorKind::RateLimited, endpoint, "请求过于频繁")
        }
    }
}

/// 文档组装错误
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// 角色要求的产物既没有获取也没有标记为缺失
    #[error("缺少必需的产物: {kind}")]
    MissingArtifact { kind: ArtifactKind },
    /// 审稿意见没有任何可用内容
    #[error("审稿意见 {review_id} 内容为空")]
    MalformedReview { review_id: String },
    /// PDF 文件格式不正确
    #[error("PDF 文件格式不正确: {reason}")]
    MalformedPdf { reason: String },
}

/// 导出缓存错误
#[derive(Debug, Error)]
pub enum CacheError {
    /// 缓存目录不可写（致命）
    #[error("缓存目录不可写 ({}): {source}", path.display())]
    Unwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 读取缓存失败
    #[error("读取缓存失败 ({}): {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 缓存内容损坏
    #[error("缓存内容无法解析 ({}): {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// 写入缓存失败
    #[error("写入缓存失败 ({}): {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 单个投稿导出流程的错误
///
/// 在 BatchOrchestrator 边界被捕获并记录到清单中，不会中止整个运行。
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({}): {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({}): {source}", path.display())]
    TomlParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置值超出允许范围
    #[error("配置项 {name} 的值 '{value}' 不合法: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
    /// 登录凭据缺失
    #[error("以 {role} 身份运行需要 OpenReview 凭据 (token 或 用户名/密码)")]
    MissingCredentials { role: Role },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: async_openai::error::OpenAIError,
    },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 远程调用结果类型
pub type FetchResult<T> = Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rate_limited_and_transient_are_retryable() {
        assert!(FetchErrorKind::RateLimited.is_retryable());
        assert!(FetchErrorKind::Transient.is_retryable());
        assert!(!FetchErrorKind::NotFound.is_retryable());
        assert!(!FetchErrorKind::PermissionDenied.is_retryable());
    }

    #[test]
    fn test_fetch_error_display_names_kind_and_endpoint() {
        let err = FetchError::not_found("/notes?id=abc", "note missing");
        let text = err.to_string();
        assert!(text.contains("NotFound"));
        assert!(text.contains("/notes?id=abc"));
    }

    #[test]
    fn test_export_error_is_transparent() {
        let err: ExportError = FetchError::rate_limited("/notes", None).into();
        assert!(err.to_string().starts_with("RateLimited"));
    }
}
