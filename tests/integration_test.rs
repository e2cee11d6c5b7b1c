use std::sync::Arc;

use meta_review_export::clients::{OpenReviewClient, ReviewPlatform};
use meta_review_export::config::Config;
use meta_review_export::infrastructure::PdfExtractor;
use meta_review_export::models::{ResolveFilters, Role};
use meta_review_export::services::{ArtifactFetcher, AssignmentResolver, DocumentAssembler, ExportCache};
use meta_review_export::utils::logging;
use meta_review_export::{BatchOrchestrator, ExportFlow, RunOptions};

const LIVE_VENUE: &str = "ICLR.cc/2024/Conference";

#[tokio::test]
#[ignore] // 默认忽略，需要网络：cargo test -- --ignored
async fn test_live_audience_export() {
    logging::init("info", false);

    let config = Config::from_env().expect("加载配置失败");
    let client = OpenReviewClient::connect(&config, Role::Audience)
        .await
        .expect("连接 OpenReview 失败");
    let platform: Arc<dyn ReviewPlatform> = Arc::new(client);

    let resolver = AssignmentResolver::new(platform.clone(), config.retry_policy());
    let submissions = resolver
        .resolve(LIVE_VENUE, Role::Audience, &ResolveFilters::default())
        .await
        .expect("解析投稿失败");
    assert!(!submissions.is_empty(), "应该能列出公开投稿");

    let dir = tempfile::tempdir().unwrap();
    let cache = ExportCache::open(dir.path(), LIVE_VENUE).await.unwrap();
    let fetcher = ArtifactFetcher::new(platform, config.retry_policy());
    let flow = ExportFlow::new(cache, fetcher, DocumentAssembler::new(Arc::new(PdfExtractor)));

    let manifest = BatchOrchestrator::new(Arc::new(flow))
        .run(
            LIVE_VENUE,
            Role::Audience,
            submissions,
            &RunOptions {
                concurrency: 2,
                limit: Some(2),
                skip_existing: false,
                run_tag: None,
            },
        )
        .await;

    assert_eq!(manifest.counts.total, 2);
    assert!(manifest.counts.succeeded >= 1, "至少一个投稿应该导出成功");
}

#[tokio::test]
#[ignore]
async fn test_live_venue_group_exists() {
    let config = Config::from_env().expect("加载配置失败");
    let client = OpenReviewClient::anonymous(&config.openreview_base_url, config.request_timeout())
        .expect("创建客户端失败");

    let group = client.group(LIVE_VENUE).await;
    assert!(group.is_ok(), "应该能获取会议分组");
}
