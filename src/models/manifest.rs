//! 导出清单
//!
//! 每次运行一份，由 BatchOrchestrator 逐条构建，条目顺序与解析顺序一致。
//! 清单不跨运行合并，持久化由导出缓存负责。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{ExportError, FetchErrorKind};
use crate::models::role::Role;
use crate::models::submission::SubmissionRef;

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    RateLimited,
    Transient,
    PermissionDenied,
    Assembly,
    Cache,
    Cancelled,
    /// 处理任务异常退出
    Internal,
}

impl From<FetchErrorKind> for FailureKind {
    fn from(kind: FetchErrorKind) -> Self {
        match kind {
            FetchErrorKind::NotFound => FailureKind::NotFound,
            FetchErrorKind::RateLimited => FailureKind::RateLimited,
            FetchErrorKind::Transient => FailureKind::Transient,
            FetchErrorKind::PermissionDenied => FailureKind::PermissionDenied,
        }
    }
}

impl From<&ExportError> for FailureKind {
    fn from(err: &ExportError) -> Self {
        match err {
            ExportError::Fetch(e) => e.kind.into(),
            ExportError::Assembly(_) => FailureKind::Assembly,
            ExportError::Cache(_) => FailureKind::Cache,
        }
    }
}

/// 单个投稿的导出结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExportOutcome {
    Success {
        bundle_dir: PathBuf,
        /// 复用了缓存中的产物，没有远程请求
        reused: bool,
    },
    Failure {
        kind: FailureKind,
        reason: String,
    },
}

impl ExportOutcome {
    pub fn failed(err: &ExportError) -> Self {
        ExportOutcome::Failure {
            kind: err.into(),
            reason: err.to_string(),
        }
    }

    pub fn cancelled() -> Self {
        ExportOutcome::Failure {
            kind: FailureKind::Cancelled,
            reason: "运行已取消，未开始处理".to_string(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        ExportOutcome::Failure {
            kind: FailureKind::Internal,
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExportOutcome::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ExportOutcome::Failure { kind, .. } => Some(*kind),
            ExportOutcome::Success { .. } => None,
        }
    }
}

/// 生成 / 评估任务的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Done { output: PathBuf, summary: String },
    Failed { reason: String },
}

/// 清单条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub submission: SubmissionRef,
    pub outcome: ExportOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<TaskOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<TaskOutcome>,
}

impl ManifestEntry {
    pub fn new(submission: SubmissionRef, outcome: ExportOutcome) -> Self {
        Self {
            submission,
            outcome,
            generation: None,
            evaluation: None,
        }
    }

    pub fn bundle_dir(&self) -> Option<&PathBuf> {
        match &self.outcome {
            ExportOutcome::Success { bundle_dir, .. } => Some(bundle_dir),
            ExportOutcome::Failure { .. } => None,
        }
    }
}

/// 清单统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestCounts {
    pub total: usize,
    pub succeeded: usize,
    pub reused: usize,
    pub failed: usize,
    pub by_kind: BTreeMap<FailureKind, usize>,
}

/// 一次运行的导出清单
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub run_tag: String,
    pub venue_id: String,
    pub role: Role,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub skip_existing: bool,
    pub entries: Vec<ManifestEntry>,
    #[serde(default)]
    pub counts: ManifestCounts,
}

impl ExportManifest {
    pub fn new(venue_id: impl Into<String>, role: Role, skip_existing: bool) -> Self {
        let started_at = Utc::now();
        Self {
            run_tag: started_at.format("%Y%m%dT%H%M%S%.3fZ").to_string(),
            venue_id: venue_id.into(),
            role,
            started_at,
            finished_at: None,
            skip_existing,
            entries: Vec::new(),
            counts: ManifestCounts::default(),
        }
    }

    /// 使用指定的运行标识代替按时间生成的标识
    pub fn with_run_tag(mut self, run_tag: Option<&str>) -> Self {
        if let Some(tag) = run_tag.map(str::trim).filter(|t| !t.is_empty()) {
            self.run_tag = crate::models::submission::sanitize_component(tag);
        }
        self
    }

    pub fn push(&mut self, entry: ManifestEntry) {
        self.entries.push(entry);
    }

    /// 运行结束：记录结束时间并计算统计
    pub fn finalize(&mut self) {
        self.finished_at = Some(Utc::now());
        self.counts = self.compute_counts();
    }

    pub fn compute_counts(&self) -> ManifestCounts {
        let mut counts = ManifestCounts {
            total: self.entries.len(),
            ..Default::default()
        };
        for entry in &self.entries {
            match &entry.outcome {
                ExportOutcome::Success { reused, .. } => {
                    counts.succeeded += 1;
                    if *reused {
                        counts.reused += 1;
                    }
                }
                ExportOutcome::Failure { kind, .. } => {
                    counts.failed += 1;
                    *counts.by_kind.entry(*kind).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    pub fn successes(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter().filter(|e| e.outcome.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter().filter(|e| !e.outcome.is_success())
    }
}
