//! 文档组装服务 - 业务能力层
//!
//! 把 `ArtifactSet` 转换为有序、标签稳定的 `DocumentBundle`。
//!
//! ## 章节顺序
//! 1. `metadata`：投稿 ID、编号、标题、决定状态、角色视角
//! 2. `submission-text`：PDF 文本（仅在获取到 PDF 时存在，无法提取时标记为不可用）
//! 3. `review-N` / `rebuttal-N`：审稿意见按时间升序，作者回复紧跟在所回复的审稿意见之后
//!
//! 组装结果只依赖输入，不含时间戳，因此对同一输入总是产生相同的文档包。

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::AssemblyError;
use crate::infrastructure::pdf_text::looks_like_pdf;
use crate::infrastructure::{PdfText, TextExtractor};
use crate::models::{
    ArtifactSet, BundleSection, DocumentBundle, RebuttalRecord, ReviewRecord, SectionLabel,
};

/// 文档组装服务
pub struct DocumentAssembler {
    extractor: Arc<dyn TextExtractor>,
    no_rebuttal: bool,
}

impl DocumentAssembler {
    pub fn new(extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            extractor,
            no_rebuttal: false,
        }
    }

    /// 作者回复阶段尚未开始时，回复不再是必需产物
    pub fn with_no_rebuttal(mut self, no_rebuttal: bool) -> Self {
        self.no_rebuttal = no_rebuttal;
        self
    }

    /// 组装文档包
    ///
    /// # 参数
    /// - `set`: 已获取（或从缓存读取）的产物
    ///
    /// # 返回
    /// 组装好的文档包；必需产物缺失或格式错误时返回 `AssemblyError`
    pub fn assemble(&self, set: &ArtifactSet) -> Result<DocumentBundle, AssemblyError> {
        let role = set.submission.role;
        let profile = role.profile();
        let required = profile.required_kinds(self.no_rebuttal);
        if let Some(kind) = set.first_unaccounted(&required) {
            return Err(AssemblyError::MissingArtifact { kind });
        }

        let mut sections = vec![metadata_section(set)];

        if let Some(pdf) = set.pdf.as_deref().filter(|bytes| !bytes.is_empty()) {
            sections.push(self.submission_text_section(pdf, profile.pdf_mandatory)?);
        }

        for review in &set.reviews {
            if review.body.trim().is_empty() && review.ratings.is_empty() {
                return Err(AssemblyError::MalformedReview {
                    review_id: review.id.clone(),
                });
            }
        }

        sections.extend(exchange_sections(&set.reviews, &set.rebuttals));
        debug!(
            "{} 组装完成，共 {} 个章节",
            set.submission.display_name(),
            sections.len()
        );

        Ok(DocumentBundle {
            submission: set.submission.clone(),
            role,
            sections,
        })
    }

    fn submission_text_section(&self, pdf: &[u8], mandatory: bool) -> Result<BundleSection, AssemblyError> {
        const TITLE: &str = "Submission Text";
        if !looks_like_pdf(pdf) {
            if mandatory {
                return Err(AssemblyError::MalformedPdf {
                    reason: "缺少 %PDF 文件头".to_string(),
                });
            }
            return Ok(BundleSection::unavailable(
                SectionLabel::SubmissionText,
                TITLE,
                "附件不是有效的 PDF 文件",
            ));
        }
        match self.extractor.extract(pdf) {
            PdfText::Extracted(text) => Ok(BundleSection::new(SectionLabel::SubmissionText, TITLE, text)),
            PdfText::Unavailable(reason) => {
                warn!("⚠️ PDF 文本不可用: {}", reason);
                Ok(BundleSection::unavailable(SectionLabel::SubmissionText, TITLE, reason))
            }
        }
    }
}

fn metadata_section(set: &ArtifactSet) -> BundleSection {
    let meta = &set.metadata;
    let mut lines = vec![format!("Forum: {}", set.submission.forum_id)];
    if let Some(number) = meta.number.or(set.submission.number) {
        lines.push(format!("Number: {}", number));
    }
    let title = meta
        .title
        .clone()
        .or_else(|| set.submission.title.clone())
        .unwrap_or_else(|| "(untitled)".to_string());
    lines.push(format!("Title: {}", title));
    lines.push(format!("Venue: {}", set.submission.venue_id));
    if let Some(venue) = &meta.venue {
        lines.push(format!("Venue Status: {}", venue));
    }
    lines.push(format!("Decision: {}", set.decision_status().unwrap_or("N/A")));
    lines.push(format!("Role: {}", set.submission.role));
    if !meta.keywords.is_empty() {
        lines.push(format!("Keywords: {}", meta.keywords.join(", ")));
    }

    let mut body = lines.join("\n");
    if let Some(abstract_text) = &meta.abstract_text {
        body.push_str(&format!("\n\nAbstract:\n{}", abstract_text));
    }
    if let Some(meta_review) = set.decision.as_ref().and_then(|d| d.meta_review.as_deref()) {
        body.push_str(&format!("\n\nMeta-review:\n{}", meta_review));
    }
    BundleSection::new(SectionLabel::Metadata, "Metadata", body)
}

/// 按时间排序审稿意见，并把每条作者回复挂到对应的审稿意见之后
fn exchange_sections(reviews: &[ReviewRecord], rebuttals: &[RebuttalRecord]) -> Vec<BundleSection> {
    let mut ordered_reviews: Vec<&ReviewRecord> = reviews.iter().collect();
    ordered_reviews.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

    let mut ordered_rebuttals: Vec<&RebuttalRecord> = rebuttals.iter().collect();
    ordered_rebuttals.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

    // 每条审稿意见之后的回复；无法挂靠的放在最后
    let mut attached: Vec<Vec<&RebuttalRecord>> = vec![Vec::new(); ordered_reviews.len()];
    let mut trailing = Vec::new();
    for rebuttal in ordered_rebuttals {
        match anchor_review(&ordered_reviews, rebuttal) {
            Some(index) => attached[index].push(rebuttal),
            None => trailing.push(rebuttal),
        }
    }

    let mut sections = Vec::new();
    let mut rebuttal_no = 0;
    let mut push_rebuttal = |sections: &mut Vec<BundleSection>, rebuttal: &RebuttalRecord, target: Option<usize>| {
        rebuttal_no += 1;
        let title = match target {
            Some(review_no) => format!("Rebuttal by {} (response to review-{})", rebuttal.author, review_no),
            None => format!("Rebuttal by {}", rebuttal.author),
        };
        sections.push(BundleSection::new(
            SectionLabel::Rebuttal(rebuttal_no),
            title,
            rebuttal.body.clone(),
        ));
    };

    for (index, review) in ordered_reviews.iter().enumerate() {
        let review_no = index + 1;
        sections.push(BundleSection::new(
            SectionLabel::Review(review_no),
            format!("Official Review by {}", review.author),
            render_review(review),
        ));
        for rebuttal in &attached[index] {
            push_rebuttal(&mut sections, *rebuttal, Some(review_no));
        }
    }
    for rebuttal in trailing {
        push_rebuttal(&mut sections, rebuttal, None);
    }
    sections
}

/// 回复挂靠位置：显式回复对象 > 时间上最近的前一条审稿意见 > 第一条审稿意见
fn anchor_review(reviews: &[&ReviewRecord], rebuttal: &RebuttalRecord) -> Option<usize> {
    if reviews.is_empty() {
        return None;
    }
    if let Some(target) = &rebuttal.reply_to {
        if let Some(index) = reviews.iter().position(|r| &r.id == target) {
            return Some(index);
        }
    }
    let preceding = reviews
        .iter()
        .rposition(|r| r.timestamp <= rebuttal.timestamp);
    Some(preceding.unwrap_or(0))
}

fn render_review(review: &ReviewRecord) -> String {
    let mut out = String::new();
    let rating = review.rating();
    let confidence = review.ratings.get("confidence").map(String::as_str);
    if rating.is_some() || confidence.is_some() {
        out.push_str(&format!(
            "Rating: {} | Confidence: {}\n",
            rating.unwrap_or("N/A"),
            confidence.unwrap_or("N/A")
        ));
    }
    let facets: Vec<String> = ["soundness", "presentation", "contribution"]
        .iter()
        .filter_map(|key| {
            review
                .ratings
                .get(*key)
                .map(|v| format!("{}: {}", capitalize(key), v))
        })
        .collect();
    if !facets.is_empty() {
        out.push_str(&facets.join(" | "));
        out.push('\n');
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(review.body.trim());
    out.trim_end().to_string()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
