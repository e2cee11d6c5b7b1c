//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用主结构
//! - 打开缓存、连接 OpenReview、解析投稿
//! - 写入清单，输出全局统计信息
//!
//! ### `batch_processor` - 批量导出处理器
//! - 控制并发数量（Semaphore）
//! - 单个投稿失败只记录，不中止
//! - 按解析顺序构建清单，支持协作取消
//!
//! ### `meta_review_processor` - 元评审任务处理器
//! - 对成功导出的投稿生成 / 评估元评审
//!
//! ## 层次关系
//!
//! ```text
//! app
//!     ↓
//! batch_processor (处理 Vec<SubmissionRef>)
//!     ↓
//! workflow::ExportFlow (处理单个投稿)
//!     ↓
//! meta_review_processor (处理清单中成功的条目)
//! ```

pub mod app;
pub mod batch_processor;
pub mod meta_review_processor;

pub use app::App;
pub use batch_processor::{BatchOrchestrator, RunOptions};
pub use meta_review_processor::{MetaReviewProcessor, TaskKind, TaskSummary};
