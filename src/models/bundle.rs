//! 文档包
//!
//! 组装后的标准化文本表示。每个投稿一个，创建后不再修改，重新导出时整体替换。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::role::Role;
use crate::models::submission::SubmissionRef;

/// 章节标签，序列化为 `metadata` / `submission-text` / `review-N` / `rebuttal-N`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SectionLabel {
    Metadata,
    SubmissionText,
    Review(usize),
    Rebuttal(usize),
}

impl fmt::Display for SectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionLabel::Metadata => f.write_str("metadata"),
            SectionLabel::SubmissionText => f.write_str("submission-text"),
            SectionLabel::Review(n) => write!(f, "review-{}", n),
            SectionLabel::Rebuttal(n) => write!(f, "rebuttal-{}", n),
        }
    }
}

impl FromStr for SectionLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metadata" => return Ok(SectionLabel::Metadata),
            "submission-text" => return Ok(SectionLabel::SubmissionText),
            _ => {}
        }
        let parse_index = |raw: &str| {
            raw.parse::<usize>()
                .map_err(|_| format!("无效的章节标签: {}", s))
        };
        if let Some(n) = s.strip_prefix("review-") {
            Ok(SectionLabel::Review(parse_index(n)?))
        } else if let Some(n) = s.strip_prefix("rebuttal-") {
            Ok(SectionLabel::Rebuttal(parse_index(n)?))
        } else {
            Err(format!("无效的章节标签: {}", s))
        }
    }
}

impl From<SectionLabel> for String {
    fn from(label: SectionLabel) -> Self {
        label.to_string()
    }
}

impl TryFrom<String> for SectionLabel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 文档包中的一个章节
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSection {
    pub label: SectionLabel,
    pub title: String,
    pub body: String,
    /// false 表示内容不可用（例如 PDF 无法提取文本）
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

impl BundleSection {
    pub fn new(label: SectionLabel, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            label,
            title: title.into(),
            body: body.into(),
            available: true,
        }
    }

    pub fn unavailable(label: SectionLabel, title: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            label,
            title: title.into(),
            body: reason.into(),
            available: false,
        }
    }
}

/// 标准化文档包
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentBundle {
    pub submission: SubmissionRef,
    /// 构建时的角色视角
    pub role: Role,
    pub sections: Vec<BundleSection>,
}

impl DocumentBundle {
    pub fn section(&self, label: &SectionLabel) -> Option<&BundleSection> {
        self.sections.iter().find(|s| &s.label == label)
    }

    pub fn labels(&self) -> Vec<SectionLabel> {
        self.sections.iter().map(|s| s.label.clone()).collect()
    }

    pub fn review_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| matches!(s.label, SectionLabel::Review(_)))
            .count()
    }

    pub fn has_rebuttals(&self) -> bool {
        self.sections
            .iter()
            .any(|s| matches!(s.label, SectionLabel::Rebuttal(_)))
    }

    /// 渲染为纯文本，供下游生成器使用
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            out.push_str(&format!("===== [{}] {} =====\n", section.label, section.title));
            if !section.available {
                out.push_str("(unavailable) ");
            }
            out.push_str(section.body.trim_end());
            out.push_str("\n\n");
        }
        out
    }
}
