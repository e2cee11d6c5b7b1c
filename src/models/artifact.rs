//! 投稿产物集合
//!
//! `ArtifactSet` 是单个投稿的原始材料。获取阶段逐步填充，
//! 组装成功后由 ExportCache 整体落盘，之后不再修改。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::role::ArtifactKind;
use crate::models::submission::SubmissionRef;

/// 投稿的基本信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    /// 平台上的 venue 描述（例如 "ICLR 2026 Poster"）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

/// 一条正式审稿意见
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: String,
    /// 匿名署名，例如 `Reviewer_ab12`
    pub author: String,
    /// 创建时间（毫秒时间戳）
    pub timestamp: i64,
    pub body: String,
    /// 结构化评分字段（rating / confidence / soundness ...）
    #[serde(default)]
    pub ratings: BTreeMap<String, String>,
}

impl ReviewRecord {
    pub fn rating(&self) -> Option<&str> {
        self.ratings.get("rating").map(String::as_str)
    }
}

/// 一条作者回复
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuttalRecord {
    pub id: String,
    pub author: String,
    pub timestamp: i64,
    /// 所回复的审稿意见 ID（沿回复链解析得到）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub body: String,
}

/// 决定与元评审信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_review: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// 单个投稿的原始产物
///
/// PDF 字节不参与 JSON 序列化，由缓存单独存为 `paper.pdf`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub submission: SubmissionRef,
    #[serde(default)]
    pub metadata: SubmissionMetadata,
    #[serde(skip)]
    pub pdf: Option<Vec<u8>>,
    #[serde(default)]
    pub reviews: Vec<ReviewRecord>,
    #[serde(default)]
    pub rebuttals: Vec<RebuttalRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<DecisionRecord>,
    /// 已确认在平台上不存在的产物
    #[serde(default)]
    pub absent: BTreeSet<ArtifactKind>,
}

impl ArtifactSet {
    pub fn new(submission: SubmissionRef) -> Self {
        Self {
            submission,
            metadata: SubmissionMetadata::default(),
            pdf: None,
            reviews: Vec::new(),
            rebuttals: Vec::new(),
            decision: None,
            absent: BTreeSet::new(),
        }
    }

    /// 产物是否实际存在
    pub fn has(&self, kind: ArtifactKind) -> bool {
        match kind {
            ArtifactKind::Pdf => self.pdf.as_ref().is_some_and(|bytes| !bytes.is_empty()),
            ArtifactKind::Reviews => !self.reviews.is_empty(),
            ArtifactKind::Rebuttals => !self.rebuttals.is_empty(),
            ArtifactKind::Decision => self.decision.is_some(),
        }
    }

    pub fn mark_absent(&mut self, kind: ArtifactKind) {
        self.absent.insert(kind);
    }

    /// 产物已获取或已标记缺失
    pub fn is_accounted(&self, kind: ArtifactKind) -> bool {
        self.has(kind) || self.absent.contains(&kind)
    }

    /// 第一个既未获取也未标记缺失的产物
    pub fn first_unaccounted(&self, required: &[ArtifactKind]) -> Option<ArtifactKind> {
        required.iter().copied().find(|kind| !self.is_accounted(*kind))
    }

    /// 所有必需产物都实际存在
    pub fn has_all(&self, required: &[ArtifactKind]) -> bool {
        required.iter().all(|kind| self.has(*kind))
    }

    pub fn decision_status(&self) -> Option<&str> {
        self.decision.as_ref().and_then(|d| d.decision.as_deref())
    }
}
