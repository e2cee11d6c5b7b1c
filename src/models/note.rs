//! 平台原始记录
//!
//! OpenReview v2 接口返回的 note / edge / group / profile 结构。
//! 只保留流水线用到的字段，其他字段在反序列化时忽略。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// 平台上的一条 note（投稿、审稿意见、评论、决定等）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub forum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replyto: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    /// 创建时间（毫秒时间戳）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdate: Option<i64>,
    #[serde(default)]
    pub invitations: Vec<String>,
    #[serde(default)]
    pub signatures: Vec<String>,
    #[serde(default)]
    pub content: Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl Note {
    /// 读取字段的原始值，兼容 `{ "value": ... }` 包装
    pub fn content_value(&self, key: &str) -> Option<&JsonValue> {
        unwrap_content(&self.content, key)
    }

    /// 按顺序尝试多个字段，返回第一个非空文本
    pub fn content_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|key| self.content_value(key))
            .map(value_to_text)
            .find(|text| !text.is_empty())
    }

    pub fn has_content_key(&self, key: &str) -> bool {
        self.content.contains_key(key)
    }

    /// 邀请名的末段（`/-/` 之后的部分）
    pub fn invitation_tails(&self) -> impl Iterator<Item = &str> {
        self.invitations
            .iter()
            .map(|inv| inv.rsplit("/-/").next().unwrap_or(inv.as_str()))
    }

    /// 是否存在以 `tail` 结尾的邀请
    pub fn has_invitation_tail(&self, tail: &str) -> bool {
        self.invitations
            .iter()
            .any(|inv| inv.ends_with(tail) || inv.contains(&format!("/-/{}", tail)))
    }

    /// 任一署名包含给定片段
    pub fn signed_by(&self, fragment: &str) -> bool {
        self.signatures.iter().any(|sig| sig.contains(fragment))
    }

    pub fn title(&self) -> Option<String> {
        self.content_text(&["title"])
    }

    /// 会议 ID：优先使用 domain，其次从邀请名推断
    pub fn venue_id(&self) -> Option<String> {
        self.domain.clone().or_else(|| {
            self.invitations
                .first()
                .and_then(|inv| inv.split("/-/").next())
                .map(str::to_string)
        })
    }
}

fn unwrap_content<'a>(content: &'a Map<String, JsonValue>, key: &str) -> Option<&'a JsonValue> {
    let value = match content.get(key)? {
        JsonValue::Object(map) if map.contains_key("value") => map.get("value")?,
        other => other,
    };
    if value.is_null() {
        None
    } else {
        Some(value)
    }
}

/// 把字段值转换为文本：列表按行拼接，标量去掉首尾空白
pub fn value_to_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.trim().to_string(),
        JsonValue::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// 分配边
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub head: String,
    #[serde(default)]
    pub tail: String,
    #[serde(default)]
    pub invitation: String,
}

/// 分组
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub members: Vec<String>,
    /// 会议分组的配置项（如 `review_name`、`submission_name`）
    #[serde(default)]
    pub content: Map<String, JsonValue>,
}

impl Group {
    pub fn content_text(&self, key: &str) -> Option<String> {
        unwrap_content(&self.content, key)
            .map(value_to_text)
            .filter(|text| !text.is_empty())
    }

    /// 会议配置的正式审稿邀请名
    pub fn review_name(&self) -> Option<String> {
        self.content_text("review_name")
    }
}

/// 用户档案
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub content: ProfileContent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileContent {
    #[serde(default)]
    pub names: Vec<ProfileName>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default, rename = "preferredEmail")]
    pub preferred_email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileName {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub preferred: bool,
}

impl Profile {
    /// 当前用户的所有身份标识（档案 ID、别名、邮箱），用于匹配分配边的 tail
    pub fn identities(&self) -> Vec<String> {
        let mut ids = vec![self.id.clone()];
        let names = self.content.names.iter().filter_map(|n| n.username.clone());
        let emails = self.content.emails.iter().cloned();
        let preferred = self.content.preferred_email.iter().cloned();
        for candidate in names.chain(emails).chain(preferred) {
            if !candidate.is_empty() && !ids.contains(&candidate) {
                ids.push(candidate);
            }
        }
        ids
    }
}
