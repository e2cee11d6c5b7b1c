//! 元评审任务处理器 - 编排层
//!
//! ## 职责
//!
//! 在导出完成后，对清单中成功的投稿执行生成 / 评估任务：
//! - 从缓存读取文档包，不发起远程请求
//! - 与导出相同的有限并发
//! - 结果写入条目目录，并回填到清单条目

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::{DocumentBundle, ExportManifest, SubmissionRef, TaskOutcome};
use crate::services::meta_review_service::{ConflictFlag, RewriteDecision};
use crate::services::{extract_recommendation, ExportCache, GenerationOptions, MetaReviewService, Recommendation};

pub const GENERATED_FILE: &str = "generated_meta_review.txt";
pub const EVALUATION_FILE: &str = "meta_review_evaluation.json";

/// 导出后执行的任务
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TaskKind {
    Generate,
    Evaluate,
    /// 先生成，再评估刚生成的元评审
    Both,
}

impl TaskKind {
    pub fn generates(self) -> bool {
        matches!(self, TaskKind::Generate | TaskKind::Both)
    }

    pub fn evaluates(self) -> bool {
        matches!(self, TaskKind::Evaluate | TaskKind::Both)
    }
}

/// 任务统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSummary {
    pub generated: usize,
    pub evaluated: usize,
    pub failed: usize,
    pub recommendations: BTreeMap<Recommendation, usize>,
    pub rewrite_requested: usize,
    pub conflicts: usize,
}

#[derive(Debug, Default)]
struct EntryResult {
    generation: Option<TaskOutcome>,
    evaluation: Option<TaskOutcome>,
    recommendation: Option<Recommendation>,
    verdict: Option<(RewriteDecision, ConflictFlag)>,
}

/// 元评审任务处理器
#[derive(Clone)]
pub struct MetaReviewProcessor {
    cache: ExportCache,
    generator: Arc<MetaReviewService>,
    evaluator: Arc<MetaReviewService>,
    options: GenerationOptions,
    concurrency: usize,
    cancel: CancellationToken,
}

impl MetaReviewProcessor {
    /// # 参数
    /// - `generator`: 生成用服务
    /// - `evaluator`: 评估用服务（可与生成用服务为同一个）
    pub fn new(
        cache: ExportCache,
        generator: Arc<MetaReviewService>,
        evaluator: Arc<MetaReviewService>,
        options: GenerationOptions,
    ) -> Self {
        Self {
            cache,
            generator,
            evaluator,
            options,
            concurrency: 3,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 对清单中所有成功的条目执行任务，结果回填到条目
    pub async fn run(&self, manifest: &mut ExportManifest, task: TaskKind) -> TaskSummary {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::new();

        for (idx, entry) in manifest.entries.iter().enumerate() {
            if !entry.outcome.is_success() {
                continue;
            }
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                handles.push((idx, None));
                continue;
            };

            let processor = self.clone();
            let submission = entry.submission.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                processor.process_entry(idx + 1, &submission, task).await
            });
            handles.push((idx, Some(handle)));
        }

        let mut summary = TaskSummary::default();
        for (idx, handle) in handles {
            let result = match handle {
                Some(handle) => match handle.await {
                    Ok(result) => result,
                    Err(e) => {
                        error!("[投稿 {}] 任务执行失败: {}", idx + 1, e);
                        failed_result(task, format!("任务执行失败: {}", e))
                    }
                },
                None => failed_result(task, "运行已取消".to_string()),
            };
            tally(&mut summary, &result);
            let entry = &mut manifest.entries[idx];
            entry.generation = result.generation.or(entry.generation.take());
            entry.evaluation = result.evaluation.or(entry.evaluation.take());
        }
        summary
    }

    async fn process_entry(&self, index: usize, submission: &SubmissionRef, task: TaskKind) -> EntryResult {
        let mut result = EntryResult::default();
        let bundle = match self.cache.read_bundle(submission).await {
            Ok(Some(bundle)) => bundle,
            Ok(None) => return failed_result(task, "缓存中没有文档包".to_string()),
            Err(e) => return failed_result(task, e.to_string()),
        };

        let mut generated = None;
        if task.generates() {
            info!("[投稿 {}] ✍️ 生成元评审...", index);
            match self.generate(submission, &bundle).await {
                Ok((outcome, text, recommendation)) => {
                    info!("[投稿 {}] ✓ 生成完成，推荐: {}", index, recommendation);
                    result.generation = Some(outcome);
                    result.recommendation = Some(recommendation);
                    generated = Some(text);
                }
                Err(reason) => {
                    error!("[投稿 {}] ❌ 生成失败: {}", index, reason);
                    result.generation = Some(TaskOutcome::Failed { reason });
                }
            }
        }

        if task.evaluates() {
            info!("[投稿 {}] 🔍 评估元评审...", index);
            match self.evaluate(submission, &bundle, generated).await {
                Ok((outcome, verdict)) => {
                    result.evaluation = Some(outcome);
                    result.verdict = Some(verdict);
                }
                Err(reason) => {
                    warn!("[投稿 {}] ⚠️ 评估失败: {}", index, reason);
                    result.evaluation = Some(TaskOutcome::Failed { reason });
                }
            }
        }
        result
    }

    async fn generate(
        &self,
        submission: &SubmissionRef,
        bundle: &DocumentBundle,
    ) -> Result<(TaskOutcome, String, Recommendation), String> {
        let text = self
            .generator
            .generate(bundle, submission.role, &self.options)
            .await
            .map_err(|e| e.to_string())?;
        let output = self
            .cache
            .write_output(submission, GENERATED_FILE, text.as_bytes())
            .await
            .map_err(|e| e.to_string())?;
        let recommendation = extract_recommendation(&text);
        let outcome = TaskOutcome::Done {
            output,
            summary: format!("recommendation: {}", recommendation),
        };
        Ok((outcome, text, recommendation))
    }

    /// 评估对象优先级：本次生成的文本 → 已有的生成结果 → 平台上的元评审
    async fn evaluate(
        &self,
        submission: &SubmissionRef,
        bundle: &DocumentBundle,
        generated: Option<String>,
    ) -> Result<(TaskOutcome, (RewriteDecision, ConflictFlag)), String> {
        let candidate = match generated {
            Some(text) => Some(text),
            None => self.existing_candidate(submission).await?,
        };
        let candidate = candidate
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| "没有可评估的元评审".to_string())?;

        let evaluation = self
            .evaluator
            .evaluate(bundle, &candidate)
            .await
            .map_err(|e| e.to_string())?;
        let bytes = serde_json::to_vec_pretty(&evaluation).map_err(|e| e.to_string())?;
        let output = self
            .cache
            .write_output(submission, EVALUATION_FILE, &bytes)
            .await
            .map_err(|e| e.to_string())?;

        let outcome = TaskOutcome::Done {
            output,
            summary: format!("decision: {:?}, conflict: {:?}", evaluation.decision, evaluation.conflict),
        };
        Ok((outcome, (evaluation.decision, evaluation.conflict)))
    }

    async fn existing_candidate(&self, submission: &SubmissionRef) -> Result<Option<String>, String> {
        if let Some(text) = self
            .cache
            .read_output(submission, GENERATED_FILE)
            .await
            .map_err(|e| e.to_string())?
        {
            return Ok(Some(text));
        }
        let set = self.cache.read(submission).await.map_err(|e| e.to_string())?;
        Ok(set.and_then(|s| s.decision).and_then(|d| d.meta_review))
    }
}

fn failed_result(task: TaskKind, reason: String) -> EntryResult {
    EntryResult {
        generation: task.generates().then(|| TaskOutcome::Failed { reason: reason.clone() }),
        evaluation: task.evaluates().then(|| TaskOutcome::Failed { reason }),
        ..Default::default()
    }
}

fn tally(summary: &mut TaskSummary, result: &EntryResult) {
    let failed = |outcome: &Option<TaskOutcome>| matches!(outcome, Some(TaskOutcome::Failed { .. }));
    if failed(&result.generation) || failed(&result.evaluation) {
        summary.failed += 1;
    }
    if let Some(recommendation) = result.recommendation {
        summary.generated += 1;
        *summary.recommendations.entry(recommendation).or_insert(0) += 1;
    }
    if let Some((decision, conflict)) = result.verdict {
        summary.evaluated += 1;
        if decision == RewriteDecision::Rewrite {
            summary.rewrite_requested += 1;
        }
        if conflict == ConflictFlag::Yes {
            summary.conflicts += 1;
        }
    }
}
