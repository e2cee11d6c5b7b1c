//! 应用主结构 - 编排层
//!
//! 管理一次运行的完整生命周期：
//! 打开缓存 → 连接 OpenReview → 解析投稿 → 批量导出 → 写清单 → 可选的生成 / 评估任务。
//!
//! 解析阶段的错误和缓存目录不可写都是致命的，会在任何投稿开始处理前中止运行。

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::RunRequest;
use crate::clients::{LlmClient, OpenReviewClient, ReviewPlatform};
use crate::config::Config;
use crate::infrastructure::PdfExtractor;
use crate::models::{ExportManifest, ExportOutcome, ManifestEntry};
use crate::orchestrator::batch_processor::BatchOrchestrator;
use crate::orchestrator::meta_review_processor::{MetaReviewProcessor, TaskKind};
use crate::services::meta_review_service::DEFAULT_SCORE_STATEMENT;
use crate::services::{
    ArtifactFetcher, AssignmentResolver, DocumentAssembler, ExportCache, GenerationOptions, MetaReviewService,
};
use crate::utils::logging;
use crate::workflow::ExportFlow;

/// 应用主结构
pub struct App {
    config: Config,
    request: RunRequest,
    cancel: CancellationToken,
}

impl App {
    pub fn new(config: Config, request: RunRequest) -> Self {
        Self {
            config,
            request,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 运行应用主逻辑
    ///
    /// # 返回
    /// 本次运行的清单（已写入磁盘）
    pub async fn run(&self) -> Result<ExportManifest> {
        let role = self.request.role;
        logging::log_startup(
            &self.request.venue,
            role,
            self.config.max_concurrent_submissions,
            &self.config.download_dir,
        );

        let (cache, mut manifest) = match &self.request.submission_folder {
            Some(folder) => {
                let cache = ExportCache::open_at(folder.clone())
                    .await
                    .with_context(|| format!("无法打开导出目录: {}", folder.display()))?;
                let manifest = self.manifest_from_cache(&cache).await?;
                (cache, manifest)
            }
            None => {
                let cache = ExportCache::open(&self.config.download_dir, &self.request.venue)
                    .await
                    .context("导出缓存目录不可用")?;
                let manifest = self.export(cache.clone()).await?;
                (cache, manifest)
            }
        };

        let mut manifest_path = cache.write_manifest(&manifest).await.context("写入清单失败")?;

        if let Some(task) = self.request.task {
            self.run_task(&cache, &mut manifest, task).await;
            manifest_path = cache.write_manifest(&manifest).await.context("写入清单失败")?;
        }

        logging::print_final_stats(&manifest, &manifest_path);
        Ok(manifest)
    }

    /// 从 OpenReview 解析并导出
    async fn export(&self, cache: ExportCache) -> Result<ExportManifest> {
        let role = self.request.role;
        let client = OpenReviewClient::connect(&self.config, role)
            .await
            .context("连接 OpenReview 失败")?;
        let platform: Arc<dyn ReviewPlatform> = Arc::new(client);
        let retry = self.config.retry_policy();

        info!("\n📋 正在解析待处理的投稿...");
        let resolver = AssignmentResolver::new(platform.clone(), retry.clone());
        let submissions = resolver
            .resolve(&self.request.venue, role, &self.request.filters())
            .await
            .context("解析投稿失败")?;

        let options = self.request.run_options(&self.config);
        if submissions.is_empty() {
            warn!("⚠️ 没有找到需要处理的投稿");
        }
        logging::log_run_plan(
            options.limit.map_or(submissions.len(), |l| l.min(submissions.len())),
            options.concurrency,
        );

        let review_name = match resolver.review_name(&self.request.venue).await {
            Some(name) => {
                info!("📝 会议配置的审稿邀请名: {}", name);
                name
            }
            None => self.config.review_name.clone(),
        };
        let fetcher = ArtifactFetcher::new(platform, retry).with_review_name(review_name);
        let assembler = DocumentAssembler::new(Arc::new(PdfExtractor));
        let flow = ExportFlow::new(cache, fetcher, assembler).with_no_rebuttal(self.request.no_rebuttal);

        let orchestrator = BatchOrchestrator::new(Arc::new(flow)).with_cancellation(self.cancel.clone());
        Ok(orchestrator
            .run(&self.request.venue, role, submissions, &options)
            .await)
    }

    /// `--submission-folder`：用已有的缓存条目构建清单，不访问远程
    async fn manifest_from_cache(&self, cache: &ExportCache) -> Result<ExportManifest> {
        let options = self.request.run_options(&self.config);
        let filters = self.request.filters();
        let assembler =
            DocumentAssembler::new(Arc::new(PdfExtractor)).with_no_rebuttal(self.request.no_rebuttal);

        let entries = cache.cached_entries().await.context("读取导出目录失败")?;
        let mut manifest = ExportManifest::new(&self.request.venue, self.request.role, true)
            .with_run_tag(options.run_tag.as_deref());

        let selected = entries
            .into_iter()
            .filter(|(set, _)| filters.forum_ids.is_empty() || filters.forum_ids.contains(&set.submission.forum_id))
            .take(options.limit.unwrap_or(usize::MAX));

        for (set, bundle) in selected {
            let outcome = match bundle {
                Some(_) => ExportOutcome::Success {
                    bundle_dir: cache.entry_dir(&set.submission),
                    reused: true,
                },
                None => match assembler.assemble(&set) {
                    Ok(bundle) => match cache.write(&set, &bundle).await {
                        Ok(bundle_dir) => ExportOutcome::Success {
                            bundle_dir,
                            reused: true,
                        },
                        Err(e) => ExportOutcome::failed(&e.into()),
                    },
                    Err(e) => ExportOutcome::failed(&e.into()),
                },
            };
            manifest.push(ManifestEntry::new(set.submission, outcome));
        }

        info!("📁 从导出目录载入 {} 个投稿", manifest.entries.len());
        manifest.finalize();
        Ok(manifest)
    }

    async fn run_task(&self, cache: &ExportCache, manifest: &mut ExportManifest, task: TaskKind) {
        let generator = Arc::new(MetaReviewService::new(Arc::new(LlmClient::new(&self.config))));
        let evaluator = Arc::new(MetaReviewService::new(Arc::new(LlmClient::for_evaluation(&self.config))));
        let options = GenerationOptions {
            mode: self.config.meta_review_mode,
            no_rebuttal: self.request.no_rebuttal,
            score_statement: Some(DEFAULT_SCORE_STATEMENT.to_string()),
        };

        info!("\n🤖 开始执行任务: {:?}", task);
        let processor = MetaReviewProcessor::new(cache.clone(), generator, evaluator, options)
            .with_concurrency(self.config.max_concurrent_submissions)
            .with_cancellation(self.cancel.clone());
        let summary = processor.run(manifest, task).await;
        logging::log_task_summary(&summary);
    }
}
