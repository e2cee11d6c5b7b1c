use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::infrastructure::RetryPolicy;
use crate::services::meta_review_service::MetaReviewMode;

/// LLM 接口类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ApiKind {
    #[value(name = "openai")]
    #[serde(rename = "openai")]
    OpenAi,
    Azure,
}

impl FromStr for ApiKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ApiKind::OpenAi),
            "azure" => Ok(ApiKind::Azure),
            other => Err(format!("未知 API 类型: {}", other)),
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时处理的投稿数量
    pub max_concurrent_submissions: usize,
    /// 导出缓存根目录
    pub download_dir: PathBuf,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 未设置 RUST_LOG 时使用的日志级别
    pub log_filter: String,
    /// 运行标识，决定清单目录名；为空时按启动时间生成
    pub run_tag: Option<String>,
    // --- OpenReview 配置 ---
    pub openreview_base_url: String,
    pub openreview_username: Option<String>,
    pub openreview_password: Option<String>,
    pub openreview_token: Option<String>,
    pub request_timeout_secs: u64,
    /// 列表接口每页条数
    pub page_size: usize,
    /// 正式审稿意见的邀请名后缀
    pub review_name: String,
    /// audience 角色未指定投稿时默认处理的数量
    pub audience_default_limit: usize,
    // --- 重试配置 ---
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_multiplier: f64,
    // --- LLM 配置 ---
    pub api_kind: ApiKind,
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 评估用模型，未设置时与生成模型相同
    pub evaluation_model_name: Option<String>,
    pub azure_api_version: String,
    pub llm_temperature: Option<f32>,
    pub llm_max_tokens: u32,
    pub meta_review_mode: MetaReviewMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_submissions: 3,
            download_dir: PathBuf::from("downloads"),
            verbose_logging: false,
            log_filter: "info".to_string(),
            run_tag: None,
            openreview_base_url: "https://api2.openreview.net".to_string(),
            openreview_username: None,
            openreview_password: None,
            openreview_token: None,
            request_timeout_secs: 60,
            page_size: 1000,
            review_name: "Official_Review".to_string(),
            audience_default_limit: 5,
            retry_max_attempts: 5,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            retry_multiplier: 2.0,
            api_kind: ApiKind::OpenAi,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o".to_string(),
            evaluation_model_name: None,
            azure_api_version: "2024-10-21".to_string(),
            llm_temperature: Some(0.3),
            llm_max_tokens: 2048,
            meta_review_mode: MetaReviewMode::Balanced,
        }
    }
}

impl Config {
    /// 读取配置：TOML 文件（可选）+ 环境变量覆盖
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        base.with_env_overrides()
    }

    /// 默认值 + 环境变量
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::TomlParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    fn with_env_overrides(self) -> Result<Self, ConfigError> {
        let config = Self {
            max_concurrent_submissions: env_parse("MAX_CONCURRENT_SUBMISSIONS", self.max_concurrent_submissions)?,
            download_dir: env_string("DOWNLOAD_DIR").map(PathBuf::from).unwrap_or(self.download_dir),
            verbose_logging: env_parse("VERBOSE_LOGGING", self.verbose_logging)?,
            log_filter: env_string("LOG_FILTER").unwrap_or(self.log_filter),
            run_tag: env_string("RUN_TAG").or(self.run_tag),
            openreview_base_url: env_string("OPENREVIEW_BASEURL").unwrap_or(self.openreview_base_url),
            openreview_username: env_string("OPENREVIEW_USERNAME").or(self.openreview_username),
            openreview_password: env_string("OPENREVIEW_PASSWORD").or(self.openreview_password),
            openreview_token: env_string("OPENREVIEW_TOKEN").or(self.openreview_token),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", self.request_timeout_secs)?,
            page_size: env_parse("PAGE_SIZE", self.page_size)?,
            review_name: env_string("REVIEW_NAME").unwrap_or(self.review_name),
            audience_default_limit: env_parse("AUDIENCE_DEFAULT_LIMIT", self.audience_default_limit)?,
            retry_max_attempts: env_parse("RETRY_MAX_ATTEMPTS", self.retry_max_attempts)?,
            retry_base_delay_ms: env_parse("RETRY_BASE_DELAY_MS", self.retry_base_delay_ms)?,
            retry_max_delay_ms: env_parse("RETRY_MAX_DELAY_MS", self.retry_max_delay_ms)?,
            retry_multiplier: env_parse("RETRY_MULTIPLIER", self.retry_multiplier)?,
            api_kind: env_parse("LLM_API_KIND", self.api_kind)?,
            llm_api_key: env_string("LLM_API_KEY")
                .or_else(|| env_string("OPENAI_API_KEY"))
                .unwrap_or(self.llm_api_key),
            llm_api_base_url: env_string("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: env_string("LLM_MODEL_NAME").unwrap_or(self.llm_model_name),
            evaluation_model_name: env_string("EVALUATION_MODEL_NAME").or(self.evaluation_model_name),
            azure_api_version: env_string("AZURE_API_VERSION").unwrap_or(self.azure_api_version),
            llm_temperature: match env_string("LLM_TEMPERATURE") {
                Some(raw) => Some(parse_value("LLM_TEMPERATURE", &raw)?),
                None => self.llm_temperature,
            },
            llm_max_tokens: env_parse("LLM_MAX_TOKENS", self.llm_max_tokens)?,
            meta_review_mode: env_parse("META_REVIEW_MODE", self.meta_review_mode)?,
        };
        config.validate()
    }

    /// 检查取值范围
    pub fn validate(self) -> Result<Self, ConfigError> {
        if !self.retry_multiplier.is_finite() || self.retry_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                name: "retry_multiplier".to_string(),
                value: self.retry_multiplier.to_string(),
                reason: "退避倍数必须 >= 1".to_string(),
            });
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(ConfigError::InvalidValue {
                name: "retry_base_delay_ms".to_string(),
                value: self.retry_base_delay_ms.to_string(),
                reason: format!("不能大于 retry_max_delay_ms ({})", self.retry_max_delay_ms),
            });
        }
        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
        .with_multiplier(self.retry_multiplier)
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str, current: T) -> Result<T, ConfigError> {
    match env_string(name) {
        Some(raw) => parse_value(name, &raw),
        None => Ok(current),
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::EnvVarParseFailed {
        var_name: name.to_string(),
        value: raw.to_string(),
        expected_type: std::any::type_name::<T>().to_string(),
    })
}
