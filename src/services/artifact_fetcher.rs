//! 产物获取服务 - 业务能力层
//!
//! 为单个投稿从远程平台获取原始产物，不持有任何持久状态。
//!
//! ## 职责
//! - 获取投稿 note、全部回复、PDF 附件
//! - 把回复分类为审稿意见 / 作者回复 / 决定与元评审
//! - 沿回复链解析作者回复所针对的审稿意见
//! - 缺失的产物记录为 absent，而不是报错（角色强制要求的 PDF 除外）
//! - 可重试的错误交给 `RetryPolicy`，其余立即返回

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::clients::{NoteQuery, ReviewPlatform};
use crate::error::{FetchError, FetchErrorKind, FetchResult};
use crate::infrastructure::RetryPolicy;
use crate::models::note::value_to_text;
use crate::models::{
    ArtifactKind, ArtifactSet, DecisionRecord, Note, RebuttalRecord, ReviewRecord, SubmissionMetadata,
    SubmissionRef,
};

/// 作为结构化评分保存的字段（左：原字段，右：保存名）
const RATING_FIELDS: &[(&[&str], &str)] = &[
    (&["rating", "recommendation"], "rating"),
    (&["confidence"], "confidence"),
    (&["soundness"], "soundness"),
    (&["presentation"], "presentation"),
    (&["contribution"], "contribution"),
];

/// 正文中按固定顺序输出的字段
const REVIEW_SECTIONS: &[(&str, &[&str])] = &[
    ("SUMMARY", &["summary", "summary_of_the_paper", "main_review"]),
    ("STRENGTHS", &["strengths", "what_are_the_strengths"]),
    ("WEAKNESSES", &["weaknesses", "what_are_the_weaknesses", "limitations"]),
    ("QUESTIONS", &["questions", "questions_to_authors"]),
];

/// 不进入正文的字段
const REVIEW_SKIPPED: &[&str] = &[
    "title",
    "rating",
    "recommendation",
    "confidence",
    "soundness",
    "presentation",
    "contribution",
    "flag_for_ethics_review",
    "code_of_conduct",
];

const TYPICAL_REVIEW_KEYS: &[&str] = &[
    "summary",
    "summary_of_the_paper",
    "main_review",
    "strengths",
    "weaknesses",
    "questions",
    "rating",
    "confidence",
    "soundness",
    "presentation",
    "contribution",
];

const REBUTTAL_KEYWORDS: &[&str] = &[
    "rebuttal",
    "official_response",
    "author_response",
    "author_official_comment",
    "reply_rebuttal",
    "author_discussion",
    "author_reply",
];

const COMMENT_TEXT_KEYS: &[&str] = &[
    "comment",
    "text",
    "rebuttal",
    "author_response",
    "official_response",
    "response",
    "reply",
    "message",
];

const DECISION_TAILS: &[&str] = &[
    "Decision",
    "Paper_Decision",
    "Submission_Decision",
    "Meta_Review_Decision",
];

/// 回复链最大深度
const MAX_REPLY_DEPTH: usize = 64;

/// 产物获取服务
pub struct ArtifactFetcher {
    platform: Arc<dyn ReviewPlatform>,
    retry: RetryPolicy,
    review_name: String,
}

impl ArtifactFetcher {
    pub fn new(platform: Arc<dyn ReviewPlatform>, retry: RetryPolicy) -> Self {
        Self {
            platform,
            retry,
            review_name: "Official_Review".to_string(),
        }
    }

    /// 自定义正式审稿意见的邀请名后缀
    pub fn with_review_name(mut self, review_name: impl Into<String>) -> Self {
        self.review_name = review_name.into();
        self
    }

    /// 获取单个投稿的全部产物
    ///
    /// # 参数
    /// - `submission`: 已解析的投稿引用
    ///
    /// # 返回
    /// 完整填充的 `ArtifactSet`；缺失的产物记录在 `absent` 中
    pub async fn fetch(&self, submission: &SubmissionRef) -> FetchResult<ArtifactSet> {
        let platform = &self.platform;
        let forum_id = submission.forum_id.as_str();

        let root = self
            .retry
            .run("获取投稿", || platform.note(forum_id))
            .await?;
        let query = NoteQuery::forum(forum_id);
        let replies: Vec<Note> = self
            .retry
            .run("获取回复", || platform.notes(&query))
            .await?
            .into_iter()
            .filter(|n| n.id != root.id)
            .collect();
        debug!("{} 共有 {} 条回复", submission.display_name(), replies.len());

        let mut set = ArtifactSet::new(submission.clone());
        set.metadata = metadata_from(&root, submission);

        let ctx = ForumContext::new(&root, submission, &self.review_name);
        let mut review_ids = HashSet::new();
        let mut decision_notes = Vec::new();
        let mut meta_review_notes = Vec::new();
        let mut rebuttal_notes = Vec::new();

        for note in &replies {
            if ctx.is_decision(note) {
                decision_notes.push(note);
            } else if ctx.is_meta_review(note) {
                meta_review_notes.push(note);
            } else if ctx.is_official_review(note) {
                review_ids.insert(note.id.clone());
                set.reviews.push(review_record(note));
            } else if ctx.is_rebuttal(note) {
                rebuttal_notes.push(note);
            }
        }

        let by_id: HashMap<&str, &Note> = replies.iter().map(|n| (n.id.as_str(), n)).collect();
        set.rebuttals = rebuttal_notes
            .into_iter()
            .map(|note| RebuttalRecord {
                id: note.id.clone(),
                author: signature_label(note),
                timestamp: note.cdate.unwrap_or_default(),
                reply_to: resolve_reply_target(note, &by_id, &review_ids),
                body: note
                    .content_text(COMMENT_TEXT_KEYS)
                    .unwrap_or_else(|| "(no text)".to_string()),
            })
            .collect();
        set.reviews.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        set.rebuttals.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        set.decision = decision_record(&decision_notes, &meta_review_notes);

        set.pdf = self.fetch_pdf(&root, submission).await?;

        for kind in [
            ArtifactKind::Pdf,
            ArtifactKind::Reviews,
            ArtifactKind::Rebuttals,
            ArtifactKind::Decision,
        ] {
            if !set.has(kind) {
                set.mark_absent(kind);
            }
        }
        Ok(set)
    }

    /// 下载 PDF；没有 PDF 时返回 `None`，角色强制要求时返回 NotFound
    async fn fetch_pdf(&self, root: &Note, submission: &SubmissionRef) -> FetchResult<Option<Vec<u8>>> {
        let mandatory = submission.role.profile().pdf_mandatory;
        let endpoint = format!("/attachment?id={}&name=pdf", root.id);

        if root.content_value("pdf").is_none() {
            if mandatory {
                return Err(FetchError::not_found(endpoint, "投稿没有 PDF 附件"));
            }
            return Ok(None);
        }

        let platform = &self.platform;
        let note_id = root.id.as_str();
        match self
            .retry
            .run("下载 PDF", || platform.attachment(note_id, "pdf"))
            .await
        {
            Ok(bytes) if !bytes.is_empty() => Ok(Some(bytes)),
            Ok(_) if mandatory => Err(FetchError::not_found(endpoint, "PDF 附件为空")),
            Ok(_) => Ok(None),
            Err(err)
                if !mandatory
                    && matches!(err.kind, FetchErrorKind::NotFound | FetchErrorKind::PermissionDenied) =>
            {
                warn!("⚠️ {} PDF 不可用，记录为缺失: {}", submission.display_name(), err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

// ========== 分类规则 ==========

/// 单个 forum 的分类上下文
struct ForumContext<'a> {
    forum_id: &'a str,
    review_name: &'a str,
    reviewers_group: String,
    reviewer_prefix: String,
    authors_group: String,
}

impl<'a> ForumContext<'a> {
    fn new(root: &'a Note, submission: &SubmissionRef, review_name: &'a str) -> Self {
        let venue_id = root.venue_id().unwrap_or_else(|| submission.venue_id.clone());
        let number = root
            .number
            .or(submission.number)
            .map(|n| n.to_string())
            .unwrap_or_default();
        let prefix = format!("{}/Submission{}", venue_id, number);
        Self {
            forum_id: &root.id,
            review_name,
            reviewers_group: format!("{}/Reviewers", prefix),
            reviewer_prefix: format!("{}/Reviewer_", prefix),
            authors_group: format!("{}/Authors", prefix),
        }
    }

    fn replies_to_forum(&self, note: &Note) -> bool {
        note.replyto.as_deref() == Some(self.forum_id)
    }

    fn signed_by_reviewer(&self, note: &Note) -> bool {
        note.signed_by(&self.reviewers_group)
            || note.signed_by(&self.reviewer_prefix)
            || note.signed_by("Anonymous")
            || note.signed_by("AnonReviewer")
    }

    fn is_official_review(&self, note: &Note) -> bool {
        if !self.replies_to_forum(note) {
            return false;
        }
        if note.has_invitation_tail(self.review_name) {
            return true;
        }
        self.signed_by_reviewer(note) && TYPICAL_REVIEW_KEYS.iter().any(|k| note.has_content_key(k))
    }

    fn is_rebuttal(&self, note: &Note) -> bool {
        let by_invitation = note.invitation_tails().any(|tail| {
            let lower = tail.to_lowercase();
            REBUTTAL_KEYWORDS.iter().any(|k| lower.contains(k))
                || (lower.contains("confidential_comment") && lower.contains("author"))
        });
        by_invitation
            || (note.has_invitation_tail("Official_Comment") && note.signed_by(&self.authors_group))
    }

    fn is_meta_review(&self, note: &Note) -> bool {
        note.has_invitation_tail("Meta_Review") && !note.has_invitation_tail("Meta_Review_Decision")
    }

    fn is_decision(&self, note: &Note) -> bool {
        DECISION_TAILS.iter().any(|tail| note.invitation_tails().any(|t| t == *tail))
    }
}

fn metadata_from(root: &Note, submission: &SubmissionRef) -> SubmissionMetadata {
    let keywords = root
        .content_value("keywords")
        .map(|v| match v {
            serde_json::Value::Array(items) => items
                .iter()
                .map(value_to_text)
                .filter(|s| !s.is_empty())
                .collect(),
            other => value_to_text(other)
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
        .unwrap_or_default();

    SubmissionMetadata {
        title: root.title().or_else(|| submission.title.clone()),
        number: root.number.or(submission.number),
        venue: root.content_text(&["venue"]),
        venue_id: root.content_text(&["venueid"]),
        abstract_text: root.content_text(&["abstract"]),
        keywords,
    }
}

/// 署名末段，例如 `.../Submission3/Reviewer_ab12` → `Reviewer_ab12`
fn signature_label(note: &Note) -> String {
    note.signatures
        .first()
        .map(|sig| sig.rsplit('/').next().unwrap_or(sig).to_string())
        .unwrap_or_else(|| "Anonymous".to_string())
}

fn review_record(note: &Note) -> ReviewRecord {
    let mut ratings = BTreeMap::new();
    for (keys, name) in RATING_FIELDS {
        if let Some(value) = note.content_text(keys) {
            ratings.insert(name.to_string(), value);
        }
    }
    ReviewRecord {
        id: note.id.clone(),
        author: signature_label(note),
        timestamp: note.cdate.unwrap_or_default(),
        body: render_review_body(note),
        ratings,
    }
}

/// 正文：固定顺序的主要段落，之后是其余非评分字段
fn render_review_body(note: &Note) -> String {
    let mut out = String::new();
    let mut printed: HashSet<&str> = HashSet::new();

    for (label, keys) in REVIEW_SECTIONS {
        if let Some(text) = note.content_text(keys) {
            out.push_str(&format!("{}:\n{}\n\n", label, text));
            printed.extend(keys.iter().copied());
        }
    }

    for (key, _) in note.content.iter() {
        if REVIEW_SKIPPED.contains(&key.as_str()) || printed.contains(key.as_str()) {
            continue;
        }
        if let Some(text) = note.content_text(&[key.as_str()]) {
            out.push_str(&format!("{}:\n{}\n\n", humanize_key(key), text));
        }
    }
    out.trim_end().to_string()
}

fn humanize_key(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// 沿 replyto 向上查找，直到遇到一条审稿意见
fn resolve_reply_target(note: &Note, by_id: &HashMap<&str, &Note>, review_ids: &HashSet<String>) -> Option<String> {
    let mut current = note.replyto.as_deref()?;
    for _ in 0..MAX_REPLY_DEPTH {
        if review_ids.contains(current) {
            return Some(current.to_string());
        }
        current = by_id.get(current)?.replyto.as_deref()?;
    }
    None
}

fn latest<'a>(notes: &[&'a Note]) -> Option<&'a Note> {
    notes.iter().max_by_key(|n| n.cdate.unwrap_or_default()).copied()
}

fn decision_record(decisions: &[&Note], meta_reviews: &[&Note]) -> Option<DecisionRecord> {
    let decision_note = latest(decisions);
    let meta_note = latest(meta_reviews);
    if decision_note.is_none() && meta_note.is_none() {
        return None;
    }

    let decision = decision_note
        .and_then(|n| n.content_text(&["decision", "recommendation"]))
        .or_else(|| meta_note.and_then(|n| n.content_text(&["recommendation", "decision"])));
    let meta_review = meta_note.and_then(|n| {
        n.content_text(&["metareview", "meta_review", "summary", "comment"])
    });
    let timestamp = decision_note.or(meta_note).and_then(|n| n.cdate);

    Some(DecisionRecord {
        decision,
        meta_review,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use serde_json::json;

    fn note(value: serde_json::Value) -> Note {
        serde_json::from_value(value).unwrap()
    }

    fn ctx_fixture() -> (Note, SubmissionRef) {
        let root = note(json!({
            "id": "F1", "forum": "F1", "number": 3, "domain": "V",
            "invitations": ["V/-/Submission"],
            "content": { "title": { "value": "Paper" }, "pdf": { "value": "/pdf/abc.pdf" } }
        }));
        (root, SubmissionRef::new("V", "F1", Role::Ac))
    }

    #[test]
    fn test_classifies_review_rebuttal_and_decision() {
        let (root, sub) = ctx_fixture();
        let ctx = ForumContext::new(&root, &sub, "Official_Review");

        let review = note(json!({
            "id": "R1", "forum": "F1", "replyto": "F1",
            "invitations": ["V/Submission3/-/Official_Review"],
            "signatures": ["V/Submission3/Reviewer_ab"],
            "content": { "summary": { "value": "ok" } }
        }));
        let rebuttal = note(json!({
            "id": "C1", "forum": "F1", "replyto": "R1",
            "invitations": ["V/Submission3/-/Official_Comment"],
            "signatures": ["V/Submission3/Authors"],
            "content": { "comment": { "value": "thanks" } }
        }));
        let decision = note(json!({
            "id": "D1", "forum": "F1", "replyto": "F1",
            "invitations": ["V/Submission3/-/Decision"],
            "content": { "decision": { "value": "Accept (Poster)" } }
        }));

        assert!(ctx.is_official_review(&review));
        assert!(!ctx.is_rebuttal(&review));
        assert!(ctx.is_rebuttal(&rebuttal));
        assert!(!ctx.is_official_review(&rebuttal));
        assert!(ctx.is_decision(&decision));
    }

    #[test]
    fn test_venue_review_name_recognises_custom_invitation() {
        let (root, sub) = ctx_fixture();
        let committee_review = note(json!({
            "id": "R7", "forum": "F1", "replyto": "F1",
            "invitations": ["V/Submission3/-/Review"],
            "signatures": ["V/Submission3/Program_Committee_xy"],
            "content": { "review": { "value": "Solid work." } }
        }));

        let default_ctx = ForumContext::new(&root, &sub, "Official_Review");
        assert!(!default_ctx.is_official_review(&committee_review));

        let venue_ctx = ForumContext::new(&root, &sub, "Review");
        assert!(venue_ctx.is_official_review(&committee_review));
    }

    #[test]
    fn test_reply_chain_resolves_to_review() {
        let review = note(json!({ "id": "R1", "forum": "F1", "replyto": "F1" }));
        let reviewer_followup = note(json!({ "id": "C1", "forum": "F1", "replyto": "R1" }));
        let author_reply = note(json!({ "id": "C2", "forum": "F1", "replyto": "C1" }));
        let notes = [review, reviewer_followup, author_reply];
        let by_id: HashMap<&str, &Note> = notes.iter().map(|n| (n.id.as_str(), n)).collect();
        let review_ids = HashSet::from(["R1".to_string()]);

        assert_eq!(resolve_reply_target(&notes[2], &by_id, &review_ids).as_deref(), Some("R1"));
        let general = note(json!({ "id": "C3", "forum": "F1", "replyto": "F1" }));
        assert_eq!(resolve_reply_target(&general, &by_id, &review_ids), None);
    }

    #[test]
    fn test_review_record_splits_ratings_from_body() {
        let review = note(json!({
            "id": "R1", "forum": "F1", "cdate": 5,
            "signatures": ["V/Submission3/Reviewer_ab"],
            "content": {
                "rating": { "value": "6: marginally above" },
                "confidence": { "value": 4 },
                "summary": { "value": "A summary." },
                "weaknesses": { "value": "Some gaps." },
                "limitations_discussion": { "value": "Adequate." },
                "code_of_conduct": { "value": "Yes" }
            }
        }));
        let record = review_record(&review);
        assert_eq!(record.author, "Reviewer_ab");
        assert_eq!(record.rating(), Some("6: marginally above"));
        assert_eq!(record.ratings.get("confidence").map(String::as_str), Some("4"));
        assert!(record.body.starts_with("SUMMARY:\nA summary."));
        assert!(record.body.contains("WEAKNESSES:\nSome gaps."));
        assert!(record.body.contains("Limitations discussion:\nAdequate."));
        assert!(!record.body.contains("code_of_conduct"));
        assert!(!record.body.contains("Yes"));
    }

    #[test]
    fn test_decision_record_prefers_latest_decision() {
        let old = note(json!({ "id": "D0", "cdate": 1, "content": { "decision": { "value": "Reject" } } }));
        let new = note(json!({ "id": "D1", "cdate": 2, "content": { "decision": { "value": "Accept (Oral)" } } }));
        let meta = note(json!({ "id": "M1", "cdate": 1, "content": { "metareview": { "value": "Strong." } } }));
        let record = decision_record(&[&old, &new], &[&meta]).unwrap();
        assert_eq!(record.decision.as_deref(), Some("Accept (Oral)"));
        assert_eq!(record.meta_review.as_deref(), Some("Strong."));
        assert!(decision_record(&[], &[]).is_none());
    }
}
