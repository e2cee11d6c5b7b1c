//! 投稿处理上下文
//!
//! 封装"我正在处理本次运行中的第几个投稿"这一信息

use std::fmt::Display;

use crate::models::SubmissionRef;

/// 投稿处理上下文
#[derive(Debug, Clone)]
pub struct SubmissionCtx {
    /// 在解析顺序中的位置（从1开始，仅用于日志显示）
    pub index: usize,

    pub submission: SubmissionRef,
}

impl SubmissionCtx {
    pub fn new(index: usize, submission: SubmissionRef) -> Self {
        Self { index, submission }
    }
}

impl Display for SubmissionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[投稿 {}]", self.index)
    }
}
