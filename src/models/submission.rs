//! 投稿引用与解析过滤条件

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::role::{AcceptanceStatus, Role};

/// 已解析的投稿引用
///
/// 解析完成后不再修改；缓存目录以 `forum_id` 为键。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionRef {
    pub venue_id: String,
    pub forum_id: String,
    /// 投稿编号（显式指定 ID 时在获取前未知）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub role: Role,
}

impl SubmissionRef {
    pub fn new(venue_id: impl Into<String>, forum_id: impl Into<String>, role: Role) -> Self {
        Self {
            venue_id: venue_id.into(),
            forum_id: forum_id.into(),
            number: None,
            title: None,
            role,
        }
    }

    pub fn with_listing(mut self, number: Option<u64>, title: Option<String>) -> Self {
        self.number = number;
        self.title = title.filter(|t| !t.trim().is_empty());
        self
    }

    /// 缓存键：可逆编码，不同的 forum ID 不会落到同一个目录
    pub fn cache_key(&self) -> String {
        encode_key(&self.forum_id)
    }

    /// 日志中使用的简短名称
    pub fn display_name(&self) -> String {
        match self.number {
            Some(number) => format!("Submission{} ({})", number, self.forum_id),
            None => self.forum_id.clone(),
        }
    }
}

impl fmt::Display for SubmissionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {} 角色#{}]", self.venue_id, self.display_name(), self.role)
    }
}

/// 投稿解析过滤条件
#[derive(Debug, Clone, Default)]
pub struct ResolveFilters {
    /// 显式指定的 forum ID（存在时跳过按角色列出分配）
    pub forum_ids: Vec<String>,
    /// 录用状态过滤（仅 audience 角色）
    pub acceptance_status: Option<AcceptanceStatus>,
}

impl ResolveFilters {
    /// 由命令行的原始值构造，支持重复参数与逗号分隔
    pub fn from_raw(raw_forum_ids: &[String], acceptance_status: Option<AcceptanceStatus>) -> Self {
        Self {
            forum_ids: parse_forum_ids(raw_forum_ids),
            acceptance_status,
        }
    }
}

/// 拆分逗号分隔的 forum ID，去掉空白与重复项，保留首次出现的顺序
pub fn parse_forum_ids(raw: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

/// 把 forum ID 编码为目录名
///
/// `[A-Za-z0-9_-]` 原样保留，其余字节写作 `%XX`；空字符串编码为 `%`。
pub fn encode_key(raw: &str) -> String {
    if raw.is_empty() {
        return "%".to_string();
    }
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// 把任意字符串转换为可用作目录名的片段（有损，用于会议目录与运行标识）
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}
