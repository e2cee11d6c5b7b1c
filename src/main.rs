use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use meta_review_export::utils::logging;
use meta_review_export::{App, Config, RunRequest};

#[tokio::main]
async fn main() -> Result<()> {
    let request = RunRequest::parse();

    // 加载配置：TOML 文件 → 环境变量 → 命令行参数
    let config = Config::load(request.config.as_deref()).context("加载配置失败")?;
    let config = request.apply_to(config);

    // 初始化日志
    logging::init(&config.log_filter, config.verbose_logging);

    // Ctrl-C：不再启动新的投稿，等待进行中的投稿完成
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⚠️ 收到中断信号，正在停止...");
            signal_token.cancel();
        }
    });

    App::new(config, request).with_cancellation(cancel).run().await?;

    Ok(())
}
