/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::path::Path;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::models::{ExportManifest, FailureKind, Role};
use crate::orchestrator::TaskSummary;

/// 初始化 tracing 日志
///
/// `RUST_LOG` 优先；未设置时使用 `level`，`verbose` 时强制 debug。
/// 重复调用（例如多个测试）时静默忽略。
pub fn init(level: &str, verbose: bool) {
    let default_level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("meta_review_export={},warn", default_level)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `venue_id`: 会议 ID
/// - `role`: 角色视角
/// - `max_concurrent`: 最大并发数
/// - `download_dir`: 导出目录
pub fn log_startup(venue_id: &str, role: Role, max_concurrent: usize, download_dir: &Path) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 元评审导出流水线");
    info!("🏛️ 会议: {}", venue_id);
    info!("👤 角色: {}", role);
    info!("📊 最大并发数: {}", max_concurrent);
    info!("📁 导出目录: {}", download_dir.display());
    info!("{}", "=".repeat(60));
}

/// 记录投稿解析结果
///
/// # 参数
/// - `total`: 投稿总数
/// - `max_concurrent`: 最大并发数
pub fn log_run_plan(total: usize, max_concurrent: usize) {
    info!("✓ 解析得到 {} 个待处理的投稿", total);
    info!("📋 最多同时处理 {} 个", max_concurrent);
}

/// 打印最终统计信息
///
/// # 参数
/// - `manifest`: 已完成的清单
/// - `manifest_path`: 清单文件路径
pub fn print_final_stats(manifest: &ExportManifest, manifest_path: &Path) {
    let counts = manifest.compute_counts();
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{} (复用缓存 {})", counts.succeeded, counts.total, counts.reused);
    info!("❌ 失败: {}", counts.failed);
    for (kind, count) in &counts.by_kind {
        info!("   - {}: {}", failure_label(*kind), count);
    }
    for entry in manifest.failures().take(20) {
        if let crate::models::ExportOutcome::Failure { reason, .. } = &entry.outcome {
            warn!("   {} {}", entry.submission.display_name(), truncate_text(reason, 120));
        }
    }
    info!("{}", "=".repeat(60));
    info!("\n清单已保存至: {}", manifest_path.display());
}

/// 打印生成 / 评估任务统计
pub fn log_task_summary(summary: &TaskSummary) {
    info!("\n{}", "─".repeat(60));
    info!("🤖 任务完成: 生成 {}, 评估 {}, 失败 {}", summary.generated, summary.evaluated, summary.failed);
    for (recommendation, count) in &summary.recommendations {
        info!("   - {}: {}", recommendation, count);
    }
    if summary.evaluated > 0 {
        info!("   需要重写: {}, 与审稿意见冲突: {}", summary.rewrite_requested, summary.conflicts);
    }
    info!("{}", "─".repeat(60));
}

fn failure_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::NotFound => "不存在",
        FailureKind::RateLimited => "频率限制",
        FailureKind::Transient => "暂时性错误",
        FailureKind::PermissionDenied => "权限不足",
        FailureKind::Assembly => "组装失败",
        FailureKind::Cache => "缓存错误",
        FailureKind::Cancelled => "已取消",
        FailureKind::Internal => "内部错误",
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_counts_chars() {
        assert_eq!(truncate_text("审稿意见内容", 2), "审稿...");
        assert_eq!(truncate_text("short", 10), "short");
    }
}
