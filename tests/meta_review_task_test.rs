mod common;

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::{FakePlatform, PlainTextExtractor, VENUE};
use meta_review_export::clients::TextGenerator;
use meta_review_export::error::{FetchErrorKind, LlmError};
use meta_review_export::infrastructure::RetryPolicy;
use meta_review_export::models::{ExportManifest, Role, SubmissionRef, TaskOutcome};
use meta_review_export::orchestrator::meta_review_processor::{EVALUATION_FILE, GENERATED_FILE};
use meta_review_export::orchestrator::{MetaReviewProcessor, TaskKind};
use meta_review_export::services::{
    ArtifactFetcher, DocumentAssembler, ExportCache, GenerationOptions, MetaReviewService, Recommendation,
};
use meta_review_export::{BatchOrchestrator, ExportFlow, RunOptions};

const DRAFT: &str = "GENERATED DRAFT\nFinal Recommendation: Poster";
const VERDICT: &str = "REWRITE_DECISION: REWRITE - lacks rebuttal discussion\nCONFLICT_WITH_REVIEWS: NO - consistent.";

/// 按提示词类型返回固定回复，并记录每次的用户消息
#[derive(Default)]
struct RecordingGenerator {
    evaluation_messages: Mutex<Vec<String>>,
    generation_calls: Mutex<usize>,
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    async fn complete(&self, system: Option<&str>, user: &str) -> Result<String, LlmError> {
        if system.is_some_and(|s| s.contains("REWRITE_DECISION")) {
            self.evaluation_messages.lock().unwrap().push(user.to_string());
            Ok(VERDICT.to_string())
        } else {
            *self.generation_calls.lock().unwrap() += 1;
            Ok(DRAFT.to_string())
        }
    }

    fn model_name(&self) -> &str {
        "recording"
    }
}

fn refs(forums: &[&str]) -> Vec<SubmissionRef> {
    forums.iter().map(|f| SubmissionRef::new(VENUE, *f, Role::Ac)).collect()
}

async fn export(platform: FakePlatform, root: &Path, forums: &[&str]) -> (ExportCache, ExportManifest) {
    let cache = ExportCache::open(root, VENUE).await.unwrap();
    let fetcher = ArtifactFetcher::new(platform.into_arc(), RetryPolicy::immediate(1));
    let assembler = DocumentAssembler::new(Arc::new(PlainTextExtractor));
    let flow = ExportFlow::new(cache.clone(), fetcher, assembler);
    let manifest = BatchOrchestrator::new(Arc::new(flow))
        .run(VENUE, Role::Ac, refs(forums), &RunOptions::default())
        .await;
    (cache, manifest)
}

fn processor(cache: &ExportCache, generator: Arc<RecordingGenerator>) -> MetaReviewProcessor {
    let service = Arc::new(MetaReviewService::new(generator));
    MetaReviewProcessor::new(cache.clone(), service.clone(), service, GenerationOptions::default())
        .with_concurrency(2)
}

#[tokio::test]
async fn test_both_evaluates_the_freshly_generated_text() {
    let dir = tempfile::tempdir().unwrap();
    let platform = FakePlatform::new()
        .with_full_submission("F1", 1, "ICLR 2026 Poster")
        .with_meta_review("F1", 1, "PLATFORM META F1");
    let (cache, mut manifest) = export(platform, dir.path(), &["F1"]).await;

    let generator = Arc::new(RecordingGenerator::default());
    let summary = processor(&cache, generator.clone())
        .run(&mut manifest, TaskKind::Both)
        .await;

    assert_eq!(summary.generated, 1);
    assert_eq!(summary.evaluated, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.rewrite_requested, 1);
    assert_eq!(summary.recommendations.get(&Recommendation::Poster), Some(&1));

    let messages = generator.evaluation_messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("GENERATED DRAFT"));
    assert!(!messages[0].contains("PLATFORM META F1"));

    let entry = &manifest.entries[0];
    assert!(matches!(entry.generation, Some(TaskOutcome::Done { .. })));
    assert!(matches!(entry.evaluation, Some(TaskOutcome::Done { .. })));
    let submission = &refs(&["F1"])[0];
    assert_eq!(cache.read_output(submission, GENERATED_FILE).await.unwrap().as_deref(), Some(DRAFT));
    let evaluation = cache.read_output(submission, EVALUATION_FILE).await.unwrap().unwrap();
    assert!(evaluation.contains("REWRITE"));
}

#[tokio::test]
async fn test_evaluate_prefers_saved_draft_then_platform_meta_review() {
    let dir = tempfile::tempdir().unwrap();
    let platform = FakePlatform::new()
        .with_full_submission("F1", 1, "ICLR 2026 Poster")
        .with_full_submission("F2", 2, "ICLR 2026 Poster")
        .with_full_submission("F3", 3, "ICLR 2026 Poster")
        .with_meta_review("F1", 1, "PLATFORM META F1")
        .with_meta_review("F2", 2, "PLATFORM META F2");
    let (cache, mut manifest) = export(platform, dir.path(), &["F1", "F2", "F3"]).await;
    cache
        .write_output(&refs(&["F1"])[0], GENERATED_FILE, b"EARLIER DRAFT")
        .await
        .unwrap();

    let generator = Arc::new(RecordingGenerator::default());
    let summary = processor(&cache, generator.clone())
        .run(&mut manifest, TaskKind::Evaluate)
        .await;

    assert_eq!(*generator.generation_calls.lock().unwrap(), 0);
    assert_eq!(summary.evaluated, 2);
    assert_eq!(summary.failed, 1);

    let messages = generator.evaluation_messages.lock().unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages
        .iter()
        .any(|m| m.contains("EARLIER DRAFT") && !m.contains("PLATFORM META F1")));
    assert!(messages.iter().any(|m| m.contains("PLATFORM META F2")));

    assert!(manifest.entries[0].generation.is_none());
    assert!(matches!(manifest.entries[2].evaluation, Some(TaskOutcome::Failed { .. })));
}

#[tokio::test]
async fn test_failed_exports_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let platform = FakePlatform::new()
        .with_full_submission("F1", 1, "ICLR 2026 Poster")
        .with_full_submission("F2", 2, "ICLR 2026 Poster")
        .fail_forum("F2", FetchErrorKind::PermissionDenied);
    let (cache, mut manifest) = export(platform, dir.path(), &["F1", "F2"]).await;
    assert!(!manifest.entries[1].outcome.is_success());

    let generator = Arc::new(RecordingGenerator::default());
    let summary = processor(&cache, generator.clone())
        .run(&mut manifest, TaskKind::Generate)
        .await;

    assert_eq!(*generator.generation_calls.lock().unwrap(), 1);
    assert_eq!(summary.generated, 1);
    assert!(manifest.entries[0].generation.is_some());
    assert!(manifest.entries[1].generation.is_none());
}
