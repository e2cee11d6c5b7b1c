mod common;

use std::sync::Arc;

use common::{FakePlatform, VENUE};
use meta_review_export::error::ResolutionError;
use meta_review_export::infrastructure::RetryPolicy;
use meta_review_export::models::{AcceptanceStatus, ResolveFilters, Role, SubmissionRef};
use meta_review_export::services::AssignmentResolver;

fn resolver(platform: Arc<FakePlatform>) -> AssignmentResolver {
    AssignmentResolver::new(platform, RetryPolicy::immediate(2))
}

fn ids(refs: &[SubmissionRef]) -> Vec<&str> {
    refs.iter().map(|r| r.forum_id.as_str()).collect()
}

fn public_venue() -> FakePlatform {
    FakePlatform::new()
        .with_bare_submission("P1", 1, "ICLR 2026 Poster")
        .with_bare_submission("O2", 2, "ICLR 2026 Oral")
        .with_bare_submission("P3", 3, "ICLR 2026 Poster")
        .with_bare_submission("S4", 4, "Submitted to ICLR 2026")
}

#[tokio::test]
async fn test_explicit_ids_bypass_assignment_listing() {
    let platform = public_venue()
        .with_edges(&format!("{}/Area_Chairs/-/Assignment", VENUE), &["P3", "O2"])
        .into_arc();
    let filters = ResolveFilters::from_raw(&["A, B".to_string()], None);

    let refs = resolver(platform.clone())
        .resolve(VENUE, Role::Ac, &filters)
        .await
        .unwrap();

    assert_eq!(ids(&refs), vec!["A", "B"]);
    assert!(refs.iter().all(|r| r.role == Role::Ac && r.venue_id == VENUE));
    // 只确认了会议存在
    assert_eq!(platform.calls(), 1);
}

#[tokio::test]
async fn test_audience_defaults_to_poster() {
    let platform = public_venue().anonymous().into_arc();
    let refs = resolver(platform)
        .resolve(VENUE, Role::Audience, &ResolveFilters::default())
        .await
        .unwrap();
    assert_eq!(ids(&refs), vec!["P1", "P3"]);
}

#[tokio::test]
async fn test_audience_status_filter() {
    let platform = public_venue().anonymous().into_arc();
    let oral = ResolveFilters::from_raw(&[], Some(AcceptanceStatus::Oral));
    let refs = resolver(platform.clone())
        .resolve(VENUE, Role::Audience, &oral)
        .await
        .unwrap();
    assert_eq!(ids(&refs), vec!["O2"]);

    let rejected = ResolveFilters::from_raw(&[], Some(AcceptanceStatus::Rejected));
    let refs = resolver(platform)
        .resolve(VENUE, Role::Audience, &rejected)
        .await
        .unwrap();
    assert_eq!(ids(&refs), vec!["S4"]);
}

#[tokio::test]
async fn test_ac_assignments_come_from_edges_sorted_by_number() {
    let platform = public_venue()
        .with_edges(
            &format!("{}/Area_Chairs/-/Assignment", VENUE),
            &["P3", "P1", "MISSING", "P3"],
        )
        .into_arc();

    let refs = resolver(platform)
        .resolve(VENUE, Role::Ac, &ResolveFilters::default())
        .await
        .unwrap();

    assert_eq!(ids(&refs), vec!["P1", "P3"]);
    assert_eq!(refs[0].number, Some(1));
    assert_eq!(refs[1].title.as_deref(), Some("Paper 3"));
}

#[tokio::test]
async fn test_reviewer_and_author_assignments_come_from_groups() {
    let platform = public_venue()
        .with_member_group(&format!("{}/Submission2/Reviewer_abc", VENUE))
        .with_member_group(&format!("{}/Submission4/Reviewers", VENUE))
        .with_member_group(&format!("{}/Submission3/Authors", VENUE))
        .into_arc();

    let reviewer = resolver(platform.clone())
        .resolve(VENUE, Role::Reviewer, &ResolveFilters::default())
        .await
        .unwrap();
    assert_eq!(ids(&reviewer), vec!["O2"]);

    let author = resolver(platform)
        .resolve(VENUE, Role::Author, &ResolveFilters::default())
        .await
        .unwrap();
    assert_eq!(ids(&author), vec!["P3"]);
}

#[tokio::test]
async fn test_unknown_venue_is_fatal() {
    let platform = public_venue().into_arc();
    let err = resolver(platform)
        .resolve("NoSuch.cc/2026/Conference", Role::Ac, &ResolveFilters::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::UnknownVenue { .. }));
}

#[tokio::test]
async fn test_permission_problems_are_fatal() {
    let denied = public_venue().deny_venue().into_arc();
    let err = resolver(denied)
        .resolve(VENUE, Role::Sac, &ResolveFilters::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::PermissionDenied { role: Role::Sac, .. }));

    // 分配列表需要登录身份
    let anonymous = public_venue().anonymous().into_arc();
    let err = resolver(anonymous)
        .resolve(VENUE, Role::Ac, &ResolveFilters::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::PermissionDenied { .. }));
}

#[tokio::test]
async fn test_empty_venue_is_invalid() {
    let platform = public_venue().into_arc();
    let err = resolver(platform)
        .resolve("  ", Role::Audience, &ResolveFilters::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ResolutionError::InvalidFilter(_)));
}

#[tokio::test]
async fn test_review_name_comes_from_venue_group() {
    let custom = public_venue().with_review_name("Review").into_arc();
    assert_eq!(resolver(custom).review_name(VENUE).await.as_deref(), Some("Review"));

    let plain = public_venue().into_arc();
    assert_eq!(resolver(plain.clone()).review_name(VENUE).await, None);
    // 分组不存在时回退到配置
    assert_eq!(resolver(plain).review_name("NoSuch.cc/2026/Conference").await, None);
}
