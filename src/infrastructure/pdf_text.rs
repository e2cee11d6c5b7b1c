//! PDF 文本提取 - 基础设施层
//!
//! 只暴露"从 PDF 字节中取出文本"的能力，不认识投稿与文档包。
//! 提取失败、没有文本层（扫描件）都表现为 `Unavailable`，由组装器决定如何呈现。

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::debug;

/// 文本提取结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfText {
    Extracted(String),
    Unavailable(String),
}

/// 文本提取能力
pub trait TextExtractor: Send + Sync {
    fn extract(&self, pdf: &[u8]) -> PdfText;
}

/// 基于 `pdf-extract` 的提取器，按内容流顺序输出，适用于单栏排版
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, pdf: &[u8]) -> PdfText {
        // pdf-extract 遇到部分损坏的文件会 panic
        let outcome = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(pdf)));
        match outcome {
            Ok(Ok(raw)) => {
                let text = normalize_text(&raw);
                if text.is_empty() {
                    PdfText::Unavailable("PDF 中没有可提取的文本（可能是扫描件）".to_string())
                } else {
                    debug!("PDF 文本提取完成，共 {} 字符", text.chars().count());
                    PdfText::Extracted(text)
                }
            }
            Ok(Err(e)) => PdfText::Unavailable(format!("PDF 文本提取失败: {}", e)),
            Err(_) => PdfText::Unavailable("PDF 文本提取器异常退出".to_string()),
        }
    }
}

/// 文件头是否为 PDF（允许头部前有少量填充字节）
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(1024)];
    window.windows(5).any(|w| w == b"%PDF-")
}

/// 去掉行尾空白与多余空行
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0;
    for line in raw.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}
