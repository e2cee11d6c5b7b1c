//! 批量导出处理器 - 编排层
//!
//! ## 职责
//!
//! 遍历解析得到的投稿列表，以有限并发执行每个投稿的导出流程，并构建本次运行的清单。
//!
//! ## 核心功能
//!
//! 1. **并发控制**：使用 Semaphore 限制同时处理的投稿数量
//! 2. **失败隔离**：单个投稿的任何错误只记录在清单中，不影响其他投稿
//! 3. **确定顺序**：按解析顺序等待任务，清单顺序与完成顺序无关
//! 4. **协作取消**：取消后不再启动新的投稿，已开始的投稿照常完成

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::{ExportManifest, ExportOutcome, ManifestEntry, Role, SubmissionRef};
use crate::workflow::{ExportFlow, SubmissionCtx};

/// 运行选项
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// 最大并发数
    pub concurrency: usize,
    /// 最多处理的投稿数量
    pub limit: Option<usize>,
    /// 缓存完整时跳过远程获取
    pub skip_existing: bool,
    pub run_tag: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            limit: None,
            skip_existing: false,
            run_tag: None,
        }
    }
}

enum Slot {
    Spawned(SubmissionRef, JoinHandle<ExportOutcome>),
    Cancelled(SubmissionRef),
}

/// 批量导出处理器
pub struct BatchOrchestrator {
    flow: Arc<ExportFlow>,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    pub fn new(flow: Arc<ExportFlow>) -> Self {
        Self {
            flow,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 处理所有投稿
    ///
    /// # 参数
    /// - `venue_id`: 会议 ID（写入清单）
    /// - `role`: 角色视角（写入清单）
    /// - `submissions`: 按处理顺序排列的投稿
    /// - `options`: 并发数、数量上限、是否复用缓存
    ///
    /// # 返回
    /// 已完成的清单，条目顺序与 `submissions` 一致
    pub async fn run(
        &self,
        venue_id: &str,
        role: Role,
        submissions: Vec<SubmissionRef>,
        options: &RunOptions,
    ) -> ExportManifest {
        let mut manifest =
            ExportManifest::new(venue_id, role, options.skip_existing).with_run_tag(options.run_tag.as_deref());

        let submissions: Vec<SubmissionRef> = match options.limit {
            Some(limit) if limit < submissions.len() => {
                info!("✂️ 只处理前 {} 个投稿 (共 {} 个)", limit, submissions.len());
                submissions.into_iter().take(limit).collect()
            }
            _ => submissions,
        };
        let total = submissions.len();

        let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
        let mut slots = Vec::with_capacity(total);

        for (idx, submission) in submissions.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                slots.push(Slot::Cancelled(submission));
                continue;
            };

            let ctx = SubmissionCtx::new(idx + 1, submission.clone());
            let flow = self.flow.clone();
            let skip_existing = options.skip_existing;

            let handle = tokio::spawn(async move {
                let _permit = permit;
                match flow.run(&ctx, skip_existing).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("{} ❌ 处理失败: {}", ctx, e);
                        ExportOutcome::failed(&e)
                    }
                }
            });
            slots.push(Slot::Spawned(submission, handle));
        }

        if self.cancel.is_cancelled() {
            warn!("⚠️ 运行已取消，等待进行中的投稿完成...");
        }

        let mut succeeded = 0;
        for (idx, slot) in slots.into_iter().enumerate() {
            let (submission, outcome) = match slot {
                Slot::Spawned(submission, handle) => match handle.await {
                    Ok(outcome) => (submission, outcome),
                    Err(e) => {
                        error!("[投稿 {}] 任务执行失败: {}", idx + 1, e);
                        (submission, ExportOutcome::internal(format!("任务执行失败: {}", e)))
                    }
                },
                Slot::Cancelled(submission) => (submission, ExportOutcome::cancelled()),
            };
            if outcome.is_success() {
                succeeded += 1;
            }
            manifest.push(ManifestEntry::new(submission, outcome));
        }

        info!("\n{}", "─".repeat(60));
        info!("✓ 导出完成: 成功 {}/{}", succeeded, total);
        info!("{}", "─".repeat(60));

        manifest.finalize();
        manifest
    }
}
