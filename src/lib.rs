//! # Meta Review Export
//!
//! 从 OpenReview 导出会议投稿与审稿产物，组装为统一的文档包，
//! 再交给文本生成模型生成 / 评估元评审。
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure / Clients）
//! - `infrastructure/` - 与业务无关的能力：重试策略、PDF 文本提取
//! - `clients/` - 远程接口：`ReviewPlatform`（OpenReview）、`TextGenerator`（LLM）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个投稿
//! - `AssignmentResolver` - 按角色解析投稿列表
//! - `ArtifactFetcher` - 获取单个投稿的产物
//! - `DocumentAssembler` - 组装文档包
//! - `ExportCache` - 磁盘缓存（原子写入）
//! - `MetaReviewService` - 生成 / 评估元评审
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个投稿"的完整导出流程
//! - `SubmissionCtx` - 上下文封装（处理位置 + 投稿引用）
//! - `ExportFlow` - 流程编排（缓存检查 → 获取 → 组装 → 写入）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 有限并发的批量导出，构建清单
//! - `orchestrator/meta_review_processor` - 对成功条目执行生成 / 评估
//! - `orchestrator/app` - 一次运行的生命周期
//!
//! ## 模块结构

pub mod cli;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use cli::RunRequest;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{DocumentBundle, ExportManifest, Role, SubmissionRef};
pub use orchestrator::{App, BatchOrchestrator, RunOptions};
pub use workflow::{ExportFlow, SubmissionCtx};
