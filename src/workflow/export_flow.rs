//! 投稿导出流程 - 流程层
//!
//! 核心职责：定义"一个投稿"的完整导出流程
//!
//! 流程顺序：
//! 1. 缓存检查（仅 skip-existing 模式）→ 完整则复用，不发起远程请求
//! 2. 获取产物 → 组装文档包
//! 3. 原子写入缓存
//!
//! 组装失败时不写缓存，旧条目保持不变。

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::error::ExportError;
use crate::models::{ArtifactKind, ArtifactSet, ExportOutcome};
use crate::services::{ArtifactFetcher, DocumentAssembler, ExportCache};
use crate::workflow::submission_ctx::SubmissionCtx;

/// 投稿导出流程
///
/// - 只依赖业务能力（services），不持有并发资源
/// - 每个投稿独立执行，互不影响
pub struct ExportFlow {
    cache: ExportCache,
    fetcher: ArtifactFetcher,
    assembler: DocumentAssembler,
    no_rebuttal: bool,
}

impl ExportFlow {
    pub fn new(cache: ExportCache, fetcher: ArtifactFetcher, assembler: DocumentAssembler) -> Self {
        Self {
            cache,
            fetcher,
            assembler,
            no_rebuttal: false,
        }
    }

    /// 作者回复阶段未开始：回复不计入必需产物
    pub fn with_no_rebuttal(mut self, no_rebuttal: bool) -> Self {
        self.assembler = self.assembler.with_no_rebuttal(no_rebuttal);
        self.no_rebuttal = no_rebuttal;
        self
    }

    pub fn cache(&self) -> &ExportCache {
        &self.cache
    }

    /// 该角色下判断缓存是否完整所需的产物
    pub fn required_kinds(&self, ctx: &SubmissionCtx) -> Vec<ArtifactKind> {
        ctx.submission.role.profile().required_kinds(self.no_rebuttal)
    }

    /// 执行单个投稿的导出
    ///
    /// # 参数
    /// - `ctx`: 投稿上下文
    /// - `skip_existing`: 缓存完整时复用，不发起远程请求
    ///
    /// # 返回
    /// 成功时返回条目目录；获取、组装、写入的错误原样返回，由编排层记录
    pub async fn run(&self, ctx: &SubmissionCtx, skip_existing: bool) -> Result<ExportOutcome, ExportError> {
        let submission = &ctx.submission;
        info!("{} 📄 开始处理 {}", ctx, submission.display_name());

        if skip_existing {
            if let Some(bundle_dir) = self.try_reuse(ctx).await {
                info!("{} ♻️ 缓存完整，跳过远程获取", ctx);
                return Ok(ExportOutcome::Success {
                    bundle_dir,
                    reused: true,
                });
            }
        }

        let set = self.fetcher.fetch(submission).await?;
        debug!(
            "{} 获取完成: {} 条审稿意见, {} 条作者回复, PDF {}",
            ctx,
            set.reviews.len(),
            set.rebuttals.len(),
            if set.has(ArtifactKind::Pdf) { "有" } else { "无" }
        );

        let bundle = self.assembler.assemble(&set)?;
        let bundle_dir = self.cache.write(&set, &bundle).await?;
        info!("{} ✓ 已导出 {} 个章节 → {}", ctx, bundle.sections.len(), bundle_dir.display());

        Ok(ExportOutcome::Success {
            bundle_dir,
            reused: false,
        })
    }

    /// 尝试复用缓存条目
    ///
    /// 重新组装缓存中的产物；文档包有变化时才重写条目。
    /// 任何读取或组装问题都返回 `None`，回退到远程获取。
    async fn try_reuse(&self, ctx: &SubmissionCtx) -> Option<PathBuf> {
        let submission = &ctx.submission;
        let required = self.required_kinds(ctx);
        if !self.cache.is_complete(submission, &required).await {
            debug!("{} 缓存不完整，需要重新获取", ctx);
            return None;
        }

        let set: ArtifactSet = match self.cache.read(submission).await {
            Ok(Some(set)) if set.submission.role == submission.role => set,
            Ok(Some(set)) => {
                debug!("{} 缓存以 {} 角色导出，需要重新获取", ctx, set.submission.role);
                return None;
            }
            Ok(None) => return None,
            Err(e) => {
                warn!("{} ⚠️ 缓存读取失败，将重新获取: {}", ctx, e);
                return None;
            }
        };

        let bundle = match self.assembler.assemble(&set) {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!("{} ⚠️ 缓存产物无法组装，将重新获取: {}", ctx, e);
                return None;
            }
        };

        let cached = self.cache.read_bundle(submission).await.ok().flatten();
        if cached.as_ref() == Some(&bundle) {
            return Some(self.cache.entry_dir(submission));
        }
        match self.cache.write(&set, &bundle).await {
            Ok(dir) => {
                debug!("{} 文档包已按当前规则重建", ctx);
                Some(dir)
            }
            Err(e) => {
                warn!("{} ⚠️ 重建文档包失败，将重新获取: {}", ctx, e);
                None
            }
        }
    }
}
