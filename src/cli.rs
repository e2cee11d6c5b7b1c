//! 命令行参数
//!
//! 只负责解析与合并配置，核心模块只接收已经校验过的值。

use std::path::PathBuf;

use clap::Parser;

use crate::config::{ApiKind, Config};
use crate::models::{AcceptanceStatus, ResolveFilters, Role};
use crate::orchestrator::{RunOptions, TaskKind};
use crate::services::MetaReviewMode;

/// 导出 OpenReview 投稿与审稿意见，并生成 / 评估元评审
#[derive(Debug, Clone, Parser)]
#[command(name = "meta_review_export", version, about)]
pub struct RunRequest {
    /// 会议 ID，例如 ICLR.cc/2026/Conference
    pub venue: String,

    /// 角色视角
    #[arg(long, default_value = "ac")]
    pub role: Role,

    /// LLM 接口类型
    #[arg(long, value_enum)]
    pub api: Option<ApiKind>,

    /// 只处理指定的 forum ID（可重复，也可用逗号分隔）
    #[arg(long = "forum-id")]
    pub forum_ids: Vec<String>,

    /// 最多处理的投稿数量
    #[arg(long)]
    pub limit: Option<usize>,

    /// 缓存完整时复用，不再远程获取
    #[arg(long = "skip-existing-export")]
    pub skip_existing_export: bool,

    /// 直接使用已有的导出目录（不访问 OpenReview）
    #[arg(long = "submission-folder")]
    pub submission_folder: Option<PathBuf>,

    /// 作者回复阶段尚未开始
    #[arg(long = "no-rebuttal")]
    pub no_rebuttal: bool,

    /// 导出完成后执行的任务；不指定时只导出
    #[arg(long, value_enum)]
    pub task: Option<TaskKind>,

    /// audience 角色的录用状态过滤
    #[arg(long = "audience-paper-type", alias = "status")]
    pub audience_paper_type: Option<AcceptanceStatus>,

    /// 最大并发数
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// 生成模式
    #[arg(long, value_enum)]
    pub mode: Option<MetaReviewMode>,

    /// 运行标识（清单目录名）
    #[arg(long = "run-tag")]
    pub run_tag: Option<String>,

    /// 导出根目录
    #[arg(long = "download-dir")]
    pub download_dir: Option<PathBuf>,

    /// OpenReview API 地址
    #[arg(long)]
    pub baseurl: Option<String>,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long)]
    pub password: Option<String>,

    #[arg(long)]
    pub token: Option<String>,

    /// TOML 配置文件
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 显示详细日志
    #[arg(long, short)]
    pub verbose: bool,
}

impl RunRequest {
    /// 命令行参数覆盖配置文件与环境变量
    pub fn apply_to(&self, mut config: Config) -> Config {
        if let Some(api) = self.api {
            config.api_kind = api;
        }
        if let Some(concurrency) = self.concurrency {
            config.max_concurrent_submissions = concurrency.max(1);
        }
        if let Some(mode) = self.mode {
            config.meta_review_mode = mode;
        }
        if let Some(dir) = &self.download_dir {
            config.download_dir = dir.clone();
        }
        if let Some(tag) = &self.run_tag {
            config.run_tag = Some(tag.clone());
        }
        if let Some(url) = &self.baseurl {
            config.openreview_base_url = url.clone();
        }
        if let Some(username) = &self.username {
            config.openreview_username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            config.openreview_password = Some(password.clone());
        }
        if let Some(token) = &self.token {
            config.openreview_token = Some(token.clone());
        }
        config.verbose_logging |= self.verbose;
        config
    }

    pub fn filters(&self) -> ResolveFilters {
        ResolveFilters::from_raw(&self.forum_ids, self.audience_paper_type)
    }

    /// audience 角色未指定投稿时默认只处理少量投稿
    pub fn effective_limit(&self, config: &Config) -> Option<usize> {
        match self.limit {
            Some(limit) => Some(limit),
            None if self.role == Role::Audience && self.filters().forum_ids.is_empty() => {
                Some(config.audience_default_limit)
            }
            None => None,
        }
    }

    pub fn run_options(&self, config: &Config) -> RunOptions {
        RunOptions {
            concurrency: config.max_concurrent_submissions,
            limit: self.effective_limit(config),
            skip_existing: self.skip_existing_export,
            run_tag: config.run_tag.clone(),
        }
    }
}
