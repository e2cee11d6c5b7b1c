mod common;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use common::{FakePlatform, PlainTextExtractor, VENUE};
use meta_review_export::infrastructure::RetryPolicy;
use meta_review_export::models::{ExportOutcome, Role, SubmissionRef};
use meta_review_export::services::{ArtifactFetcher, DocumentAssembler, ExportCache};
use meta_review_export::{App, BatchOrchestrator, Config, ExportFlow, RunOptions, RunRequest};

async fn exported_venue(root: &Path) -> ExportCache {
    let platform = FakePlatform::new()
        .with_full_submission("F1", 1, "ICLR 2026 Poster")
        .with_full_submission("F2", 2, "ICLR 2026 Oral")
        .into_arc();
    let cache = ExportCache::open(root, VENUE).await.unwrap();
    let fetcher = ArtifactFetcher::new(platform, RetryPolicy::immediate(1));
    let flow = ExportFlow::new(cache.clone(), fetcher, DocumentAssembler::new(Arc::new(PlainTextExtractor)));
    let refs = vec![
        SubmissionRef::new(VENUE, "F1", Role::Ac),
        SubmissionRef::new(VENUE, "F2", Role::Ac),
    ];
    let manifest = BatchOrchestrator::new(Arc::new(flow))
        .run(VENUE, Role::Ac, refs, &RunOptions::default())
        .await;
    assert_eq!(manifest.counts.succeeded, 2);
    cache
}

fn request(folder: &Path, extra: &[&str]) -> RunRequest {
    let folder = folder.to_string_lossy().to_string();
    let mut args = vec!["meta_review_export", VENUE, "--submission-folder", folder.as_str()];
    args.extend_from_slice(extra);
    RunRequest::try_parse_from(args).unwrap()
}

fn config(root: &Path) -> Config {
    Config {
        download_dir: root.to_path_buf(),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_folder_manifest_rebuilds_missing_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let cache = exported_venue(dir.path()).await;
    let f2 = SubmissionRef::new(VENUE, "F2", Role::Ac);
    let original = cache.read_bundle(&f2).await.unwrap().unwrap();
    std::fs::remove_file(cache.entry_dir(&f2).join("bundle.json")).unwrap();

    let manifest = App::new(config(dir.path()), request(cache.root(), &[]))
        .run()
        .await
        .unwrap();

    let forums: Vec<&str> = manifest.entries.iter().map(|e| e.submission.forum_id.as_str()).collect();
    assert_eq!(forums, vec!["F1", "F2"]);
    assert!(manifest
        .entries
        .iter()
        .all(|e| matches!(e.outcome, ExportOutcome::Success { reused: true, .. })));
    // 重建使用真实的 PDF 提取器，正文内容可能不同，章节结构不变
    let rebuilt = cache.read_bundle(&f2).await.unwrap().unwrap();
    assert_eq!(rebuilt.labels(), original.labels());
}

#[tokio::test]
async fn test_folder_manifest_honours_forum_filter() {
    let dir = tempfile::tempdir().unwrap();
    let cache = exported_venue(dir.path()).await;

    let manifest = App::new(config(dir.path()), request(cache.root(), &["--forum-id", "F2"]))
        .run()
        .await
        .unwrap();

    assert_eq!(manifest.entries.len(), 1);
    assert_eq!(manifest.entries[0].submission.forum_id, "F2");
    assert_eq!(manifest.counts.succeeded, 1);
}
