//! 集成测试共用的内存评审平台

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use meta_review_export::clients::{NoteQuery, ReviewPlatform};
use meta_review_export::error::{FetchError, FetchErrorKind, FetchResult};
use meta_review_export::infrastructure::{PdfText, TextExtractor};
use meta_review_export::models::{Group, Note};

pub const VENUE: &str = "ICLR.cc/2026/Conference";

/// 脚本化的失败：次数为 `None` 时永远失败
struct ScriptedFailure {
    kind: FetchErrorKind,
    remaining: Option<usize>,
}

/// 内存评审平台，记录每一次远程调用
#[derive(Default)]
pub struct FakePlatform {
    pub identities: Vec<String>,
    submissions: Vec<Note>,
    replies: HashMap<String, Vec<Note>>,
    pdfs: HashMap<String, Vec<u8>>,
    pdf_errors: HashMap<String, FetchErrorKind>,
    edges: HashMap<String, Vec<String>>,
    member_groups: Vec<Group>,
    venue_denied: bool,
    review_name: Option<String>,
    failures: Mutex<HashMap<String, ScriptedFailure>>,
    calls: AtomicUsize,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            identities: vec!["~Test_User1".to_string(), "test@example.com".to_string()],
            ..Default::default()
        }
    }

    pub fn anonymous(mut self) -> Self {
        self.identities.clear();
        self
    }

    pub fn deny_venue(mut self) -> Self {
        self.venue_denied = true;
        self
    }

    /// 会议分组中配置的审稿邀请名
    pub fn with_review_name(mut self, review_name: &str) -> Self {
        self.review_name = Some(review_name.to_string());
        self
    }

    /// 添加一个带 PDF、两条审稿意见、一条作者回复和决定的投稿
    pub fn with_full_submission(mut self, forum: &str, number: u64, venue: &str) -> Self {
        self.submissions.push(submission_note(forum, number, venue, true));
        self.pdfs
            .insert(forum.to_string(), format!("%PDF-Body text of {}", forum).into_bytes());
        self.replies.insert(
            forum.to_string(),
            vec![
                review_note(forum, number, "r1", 1_000, "6"),
                review_note(forum, number, "r2", 2_000, "3"),
                rebuttal_note(forum, number, "c1", 3_000, &format!("{}-r1", forum)),
                decision_note(forum, number, 9_000, "Accept (Poster)"),
            ],
        );
        self
    }

    /// 添加一个只有投稿 note 的投稿（没有回复和 PDF）
    pub fn with_bare_submission(mut self, forum: &str, number: u64, venue: &str) -> Self {
        self.submissions.push(submission_note(forum, number, venue, false));
        self
    }

    /// 投稿声明了 PDF，但附件请求失败
    pub fn with_unreachable_pdf(mut self, forum: &str, number: u64, venue: &str, kind: FetchErrorKind) -> Self {
        self.submissions.push(submission_note(forum, number, venue, true));
        self.pdf_errors.insert(forum.to_string(), kind);
        self
    }

    /// 给投稿追加一条平台上的元评审
    pub fn with_meta_review(mut self, forum: &str, number: u64, text: &str) -> Self {
        self.replies
            .entry(forum.to_string())
            .or_default()
            .push(meta_review_note(forum, number, 8_000, text));
        self
    }

    pub fn with_edges(mut self, invitation: &str, heads: &[&str]) -> Self {
        self.edges
            .insert(invitation.to_string(), heads.iter().map(|h| h.to_string()).collect());
        self
    }

    pub fn with_member_group(mut self, group_id: &str) -> Self {
        self.member_groups.push(Group {
            id: group_id.to_string(),
            members: self.identities.clone(),
            ..Default::default()
        });
        self
    }

    /// 该 forum 的 note 请求总是失败
    pub fn fail_forum(self, forum: &str, kind: FetchErrorKind) -> Self {
        self.script_failure(forum, kind, None)
    }

    /// 该 forum 的 note 请求前 `times` 次失败
    pub fn fail_forum_times(self, forum: &str, kind: FetchErrorKind, times: usize) -> Self {
        self.script_failure(forum, kind, Some(times))
    }

    fn script_failure(self, forum: &str, kind: FetchErrorKind, remaining: Option<usize>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(forum.to_string(), ScriptedFailure { kind, remaining });
        self
    }

    /// 直接编辑某个 forum 的回复列表
    pub fn replies_mut(&mut self, forum: &str) -> &mut Vec<Note> {
        self.replies.entry(forum.to_string()).or_default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check_failure(&self, forum: &str, endpoint: &str) -> FetchResult<()> {
        let mut failures = self.failures.lock().unwrap();
        let Some(failure) = failures.get_mut(forum) else {
            return Ok(());
        };
        match failure.remaining.as_mut() {
            Some(0) => return Ok(()),
            Some(n) => *n -= 1,
            None => {}
        }
        Err(match failure.kind {
            FetchErrorKind::RateLimited => FetchError::rate_limited(endpoint, None),
            kind => FetchError::new(kind, endpoint, "scripted failure"),
        })
    }
}

#[async_trait]
impl ReviewPlatform for FakePlatform {
    async fn profile_ids(&self) -> FetchResult<Vec<String>> {
        self.record();
        Ok(self.identities.clone())
    }

    async fn group(&self, group_id: &str) -> FetchResult<Group> {
        self.record();
        let endpoint = format!("/groups?id={}", group_id);
        if group_id != VENUE {
            return Err(FetchError::not_found(endpoint, "group not found"));
        }
        if self.venue_denied {
            return Err(FetchError::permission_denied(endpoint, "forbidden"));
        }
        let mut content = serde_json::Map::new();
        if let Some(name) = &self.review_name {
            content.insert("review_name".to_string(), json!({ "value": name }));
        }
        Ok(Group {
            id: VENUE.to_string(),
            members: Vec::new(),
            content,
        })
    }

    async fn member_groups(&self, member: &str) -> FetchResult<Vec<Group>> {
        self.record();
        Ok(self
            .member_groups
            .iter()
            .filter(|g| g.members.iter().any(|m| m == member))
            .cloned()
            .collect())
    }

    async fn assignment_heads(&self, invitation: &str, tail: &str) -> FetchResult<Vec<String>> {
        self.record();
        if !self.identities.iter().any(|id| id == tail) {
            return Ok(Vec::new());
        }
        Ok(self.edges.get(invitation).cloned().unwrap_or_default())
    }

    async fn note(&self, note_id: &str) -> FetchResult<Note> {
        self.record();
        let endpoint = format!("/notes?id={}", note_id);
        self.check_failure(note_id, &endpoint)?;
        self.submissions
            .iter()
            .find(|n| n.id == note_id)
            .cloned()
            .ok_or_else(|| FetchError::not_found(endpoint, "note not found"))
    }

    async fn notes(&self, query: &NoteQuery) -> FetchResult<Vec<Note>> {
        self.record();
        if let Some(forum) = &query.forum {
            self.check_failure(forum, &format!("/notes?forum={}", forum))?;
            let mut notes: Vec<Note> = self.submissions.iter().filter(|n| &n.id == forum).cloned().collect();
            notes.extend(self.replies.get(forum).cloned().unwrap_or_default());
            return Ok(notes);
        }
        match &query.invitation {
            Some(inv) if inv == &format!("{}/-/Submission", VENUE) => Ok(self.submissions.clone()),
            _ => Ok(Vec::new()),
        }
    }

    async fn attachment(&self, note_id: &str, _field: &str) -> FetchResult<Vec<u8>> {
        self.record();
        let endpoint = format!("/attachment?id={}", note_id);
        if let Some(kind) = self.pdf_errors.get(note_id) {
            return Err(FetchError::new(*kind, endpoint, "scripted attachment failure"));
        }
        self.pdfs
            .get(note_id)
            .cloned()
            .ok_or_else(|| FetchError::not_found(endpoint, "no pdf"))
    }
}

/// 测试用提取器：`%PDF-` 之后的字节按 UTF-8 解释
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, pdf: &[u8]) -> PdfText {
        let text = String::from_utf8_lossy(pdf.get(5..).unwrap_or_default()).trim().to_string();
        if text.is_empty() {
            PdfText::Unavailable("no text layer".to_string())
        } else {
            PdfText::Extracted(text)
        }
    }
}

// ========== note 构造 ==========

fn note(value: Value) -> Note {
    serde_json::from_value(value).unwrap()
}

pub fn submission_note(forum: &str, number: u64, venue: &str, with_pdf: bool) -> Note {
    let mut content = json!({
        "title": { "value": format!("Paper {}", number) },
        "abstract": { "value": "An abstract." },
        "keywords": { "value": ["testing", "rust"] },
        "venue": { "value": venue },
        "venueid": { "value": VENUE },
    });
    if with_pdf {
        content["pdf"] = json!({ "value": format!("/pdf/{}.pdf", forum) });
    }
    note(json!({
        "id": forum,
        "forum": forum,
        "number": number,
        "cdate": 100,
        "domain": VENUE,
        "invitations": [format!("{}/-/Submission", VENUE)],
        "signatures": [format!("{}/Submission{}/Authors", VENUE, number)],
        "content": content,
    }))
}

pub fn review_note(forum: &str, number: u64, suffix: &str, cdate: i64, rating: &str) -> Note {
    note(json!({
        "id": format!("{}-{}", forum, suffix),
        "forum": forum,
        "replyto": forum,
        "cdate": cdate,
        "invitations": [format!("{}/Submission{}/-/Official_Review", VENUE, number)],
        "signatures": [format!("{}/Submission{}/Reviewer_{}", VENUE, number, suffix)],
        "content": {
            "summary": { "value": format!("Summary by {}", suffix) },
            "weaknesses": { "value": "Some weaknesses." },
            "rating": { "value": rating },
            "confidence": { "value": "4" },
        },
    }))
}

pub fn rebuttal_note(forum: &str, number: u64, suffix: &str, cdate: i64, reply_to: &str) -> Note {
    note(json!({
        "id": format!("{}-{}", forum, suffix),
        "forum": forum,
        "replyto": reply_to,
        "cdate": cdate,
        "invitations": [format!("{}/Submission{}/-/Official_Comment", VENUE, number)],
        "signatures": [format!("{}/Submission{}/Authors", VENUE, number)],
        "content": { "comment": { "value": "Thanks, we addressed this." } },
    }))
}

pub fn decision_note(forum: &str, number: u64, cdate: i64, decision: &str) -> Note {
    note(json!({
        "id": format!("{}-decision", forum),
        "forum": forum,
        "replyto": forum,
        "cdate": cdate,
        "invitations": [format!("{}/Submission{}/-/Decision", VENUE, number)],
        "signatures": [format!("{}/Program_Chairs", VENUE)],
        "content": { "decision": { "value": decision } },
    }))
}

pub fn meta_review_note(forum: &str, number: u64, cdate: i64, text: &str) -> Note {
    note(json!({
        "id": format!("{}-meta", forum),
        "forum": forum,
        "replyto": forum,
        "cdate": cdate,
        "invitations": [format!("{}/Submission{}/-/Meta_Review", VENUE, number)],
        "signatures": [format!("{}/Submission{}/Area_Chair_x", VENUE, number)],
        "content": {
            "metareview": { "value": text },
            "recommendation": { "value": "Accept (Poster)" },
        },
    }))
}
