//! 元评审服务 - 业务能力层
//!
//! 基于文档包生成元评审、评估已有元评审。只负责提示词与结果解析，
//! 模型调用通过 `TextGenerator` 完成。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clients::TextGenerator;
use crate::error::LlmError;
use crate::models::{DocumentBundle, Role, SectionLabel};

/// 默认的评分说明
pub const DEFAULT_SCORE_STATEMENT: &str = "The score is indicated by the overall recommendation on a scale from 1 to 5, \
with 1 being the lowest and 5 being the highest. 2 is the borderline reject and 3 is the borderline accept.";

/// 生成模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MetaReviewMode {
    #[default]
    Balanced,
    Strict,
    Detailed,
}

impl FromStr for MetaReviewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "balanced" => Ok(MetaReviewMode::Balanced),
            "strict" => Ok(MetaReviewMode::Strict),
            "detailed" => Ok(MetaReviewMode::Detailed),
            other => Err(format!("未知生成模式: {}", other)),
        }
    }
}

impl fmt::Display for MetaReviewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetaReviewMode::Balanced => "balanced",
            MetaReviewMode::Strict => "strict",
            MetaReviewMode::Detailed => "detailed",
        };
        f.write_str(name)
    }
}

/// 生成选项
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub mode: MetaReviewMode,
    /// 作者尚未提交回复
    pub no_rebuttal: bool,
    pub score_statement: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            mode: MetaReviewMode::Balanced,
            no_rebuttal: false,
            score_statement: Some(DEFAULT_SCORE_STATEMENT.to_string()),
        }
    }
}

/// 最终推荐
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Recommendation {
    Oral,
    Spotlight,
    Poster,
    Reject,
    Unknown,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 是否需要重写
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewriteDecision {
    Rewrite,
    Ok,
    Unknown,
}

/// 是否与审稿意见冲突
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictFlag {
    Yes,
    No,
    Unknown,
}

/// 评估结果（评分 + 反馈）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub decision: RewriteDecision,
    pub rewrite_reason: String,
    pub conflict: ConflictFlag,
    pub conflict_reason: String,
    pub raw_response: String,
}

/// 元评审服务
pub struct MetaReviewService {
    generator: Arc<dyn TextGenerator>,
}

impl MetaReviewService {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// 生成元评审
    ///
    /// # 参数
    /// - `bundle`: 文档包
    /// - `role`: 文档包对应的角色视角
    /// - `options`: 生成模式等选项
    pub async fn generate(
        &self,
        bundle: &DocumentBundle,
        role: Role,
        options: &GenerationOptions,
    ) -> Result<String, LlmError> {
        let system_message = build_generation_prompt(options);
        let user_message = format!(
            "The following materials were exported under the `{}` role.\n\n{}",
            role,
            bundle.render_text()
        );
        debug!(
            "生成元评审: {} (模式 {}, {} 字符)",
            bundle.submission.display_name(),
            options.mode,
            user_message.len()
        );
        self.generator
            .complete(Some(&system_message), &user_message)
            .await
    }

    /// 评估一份元评审是否需要重写、是否与审稿意见冲突
    ///
    /// # 参数
    /// - `bundle`: 文档包（取其中的审稿意见）
    /// - `candidate`: 待评估的元评审文本
    pub async fn evaluate(&self, bundle: &DocumentBundle, candidate: &str) -> Result<Evaluation, LlmError> {
        let user_message = build_evaluation_message(bundle, candidate, Some(DEFAULT_SCORE_STATEMENT));
        let raw = self
            .generator
            .complete(Some(EVALUATION_PROMPT), &user_message)
            .await?;
        Ok(interpret_evaluation(&raw))
    }
}

// ========== 提示词 ==========

const EVALUATION_PROMPT: &str = "You are an expert Senior Area Chair (SAC) for ICLR.\n\
Your goal is to identify questionable meta-reviews that need revision before sending to authors \
and ensure that the meta-reviews are of high quality.\n\
Good meta-reviews should clearly justify the final decision, summarize the overall reviewer sentiment, \
and explain how the authors' feedback was taken into account. One of each point is sufficient and should be flagged as OK.\n\
Please evaluate whether the current meta-review should be rewritten before sharing with authors.\n\
Do not make a publication decision about the paper itself.\n\
Also determine whether the meta-review conflicts with the reviewers' overall stance. \
If the meta-review is negative and at least one individual review is also negative, this alone is not a conflict.\n\
Respond exactly with two lines in this format:\n\
REWRITE_DECISION: <REWRITE or OK> - <one sentence naming the missing point (use 'OK' with no reason if appropriate)>\n\
CONFLICT_WITH_REVIEWS: <YES or NO> - <one-sentence explanation>.";

/// 构建生成元评审的系统提示词
pub fn build_generation_prompt(options: &GenerationOptions) -> String {
    let mut prompt = String::new();
    if options.no_rebuttal {
        prompt.push_str(
            "IMPORTANT: The authors have not submitted a rebuttal yet. \
Base your decision on whether the paper itself addresses the reviewers' weaknesses and questions.\n\n",
        );
    }
    prompt.push_str(
        "You are an Area Chair for a top-tier AI conference. Write a comprehensive meta-review based on the paper \
and all reviewer comments, applying high standards.\n\
If at least one reviewer gave a negative score and you recommend acceptance, make sure their major concerns \
were adequately addressed in the authors' response.\n\n\
ACCEPTANCE CATEGORIES:\n\
- Oral (top 1-2%): exceptional papers with groundbreaking contributions\n\
- Spotlight (top 5%): high-quality papers with strong contributions and solid methodology\n\
- Poster (top 25%): good papers with reasonable contributions and some limitations\n\
- Reject: significant flaws, insufficient novelty, poor execution or limited impact\n\n\
Guidelines:\n",
    );
    if let Some(scores) = &options.score_statement {
        prompt.push_str(&format!("- {}\n", scores));
    }
    prompt.push_str(
        "- Judge the content of the reviews rather than their scores or confidence.\n\
- State that you have read the author response, even if it did not change the outcome.\n\
- Take a decisive stand on borderline papers.\n\
- Counter biases you perceive in the reviews.\n\n\
Please provide:\n\
1. META-REVIEW following the guidelines above.\n\
2. FINAL RECOMMENDATION: one of [Oral, Spotlight, Poster, Reject] with justification, at the very end.",
    );
    let mode_line = match options.mode {
        MetaReviewMode::Strict => {
            "Mode: STRICT - Be conservative with positive recommendations and highlight any significant concerns."
        }
        MetaReviewMode::Detailed => {
            "Mode: DETAILED - Provide extensive analysis with specific references and detailed technical commentary."
        }
        MetaReviewMode::Balanced => {
            "Mode: BALANCED - Weigh strengths and weaknesses equally."
        }
    };
    prompt.push_str("\n\n");
    prompt.push_str(mode_line);
    prompt
}

fn build_evaluation_message(bundle: &DocumentBundle, candidate: &str, score_statement: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(scores) = score_statement {
        out.push_str(&format!("Score scale: {}\n", scores));
    }
    out.push_str("\n=== REVIEWER COMMENTS ===\n");
    for section in &bundle.sections {
        if matches!(section.label, SectionLabel::Review(_) | SectionLabel::Rebuttal(_)) {
            out.push_str(&format!("\n--- {} ---\n{}\n", section.title, section.body));
        }
    }
    out.push_str("\n=== META-REVIEW UNDER EVALUATION ===\n");
    out.push_str(candidate.trim());
    out.push('\n');
    out
}

// ========== 结果解析 ==========

/// 从生成的元评审中提取最终推荐
pub fn extract_recommendation(text: &str) -> Recommendation {
    const PATTERNS: &[&str] = &[
        r"(?i)final\s*recommendation\**\s*[:\-–]?\s*\**\s*(oral|spotlight|poster|reject)\b",
        r"(?i)recommendation\**\s*[:\-–]?\s*\**\s*(oral|spotlight|poster|reject)\b",
    ];
    PATTERNS
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .find_map(|re| re.captures(text).and_then(|caps| caps.get(1)).map(|m| m.as_str().to_lowercase()))
        .map(|token| match token.as_str() {
            "oral" => Recommendation::Oral,
            "spotlight" => Recommendation::Spotlight,
            "poster" => Recommendation::Poster,
            "reject" => Recommendation::Reject,
            _ => Recommendation::Unknown,
        })
        .unwrap_or(Recommendation::Unknown)
}

fn letters_upper(raw: &str) -> String {
    raw.chars().filter(|c| c.is_alphabetic()).collect::<String>().to_uppercase()
}

pub fn normalize_decision(raw: &str) -> RewriteDecision {
    let token = letters_upper(raw);
    if token.contains("REWRITE") || token.contains("REVISE") || token.contains("REVISION") {
        RewriteDecision::Rewrite
    } else if token.contains("OK") || token.contains("KEEP") || token.contains("ACCEPTABLE") {
        RewriteDecision::Ok
    } else {
        RewriteDecision::Unknown
    }
}

pub fn normalize_conflict(raw: &str) -> ConflictFlag {
    let token = letters_upper(raw);
    if token.starts_with("YES") {
        ConflictFlag::Yes
    } else if token.starts_with("NO") {
        ConflictFlag::No
    } else {
        ConflictFlag::Unknown
    }
}

/// 拆分 `KEY: TOKEN - reason`
fn split_verdict(line: &str) -> (String, String) {
    let (_, remainder) = line.split_once(':').unwrap_or(("", ""));
    let remainder = remainder.trim();
    match remainder.split_once('-') {
        Some((token, reason)) => (token.trim().to_string(), reason.trim().to_string()),
        None => (remainder.to_string(), String::new()),
    }
}

/// 解析评估回复的两行格式
pub fn interpret_evaluation(raw: &str) -> Evaluation {
    let mut decision_token = String::new();
    let mut rewrite_reason = String::new();
    let mut conflict_token = String::new();
    let mut conflict_reason = String::new();

    for line in raw.lines() {
        let stripped = line.trim().trim_start_matches(['*', '#', ' ']);
        let upper = stripped.to_uppercase();
        if upper.starts_with("REWRITE_DECISION") {
            (decision_token, rewrite_reason) = split_verdict(stripped);
        } else if upper.starts_with("CONFLICT_WITH_REVIEWS") {
            (conflict_token, conflict_reason) = split_verdict(stripped);
        }
    }

    let decision = normalize_decision(&decision_token);
    if decision != RewriteDecision::Rewrite {
        rewrite_reason.clear();
    } else if rewrite_reason.is_empty() {
        rewrite_reason = reason_after_keyword(&decision_token);
    }

    Evaluation {
        decision,
        rewrite_reason,
        conflict: normalize_conflict(&conflict_token),
        conflict_reason,
        raw_response: raw.to_string(),
    }
}

fn reason_after_keyword(token: &str) -> String {
    let upper = token.to_uppercase();
    let Some(index) = upper.find("REWRITE") else {
        return String::new();
    };
    let fragment = token[index + "REWRITE".len()..].trim_matches(|c: char| c == ' ' || c == ':' || c == '-');
    fragment.split('.').next().unwrap_or(fragment).trim().to_string()
}
