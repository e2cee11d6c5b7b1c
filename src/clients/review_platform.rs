//! 评审平台接口
//!
//! 流水线与远程平台之间的接缝。生产环境由 `OpenReviewClient` 实现，
//! 测试中可替换为内存实现。所有方法都只做一次请求，不做重试。

use async_trait::async_trait;

use crate::error::FetchResult;
use crate::models::{Group, Note};

/// note 列表查询条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteQuery {
    pub forum: Option<String>,
    pub invitation: Option<String>,
}

impl NoteQuery {
    pub fn forum(forum_id: impl Into<String>) -> Self {
        Self {
            forum: Some(forum_id.into()),
            invitation: None,
        }
    }

    pub fn invitation(invitation: impl Into<String>) -> Self {
        Self {
            forum: None,
            invitation: Some(invitation.into()),
        }
    }
}

/// 远程评审平台
#[async_trait]
pub trait ReviewPlatform: Send + Sync {
    /// 当前登录用户的全部身份标识；匿名访问时为空
    async fn profile_ids(&self) -> FetchResult<Vec<String>>;

    /// 获取分组（也用于判断会议是否存在）
    async fn group(&self, group_id: &str) -> FetchResult<Group>;

    /// 某个身份所属的全部分组
    async fn member_groups(&self, member: &str) -> FetchResult<Vec<Group>>;

    /// 分配边的 head（投稿 forum ID），按邀请名与 tail 过滤
    async fn assignment_heads(&self, invitation: &str, tail: &str) -> FetchResult<Vec<String>>;

    /// 按 ID 获取单条 note
    async fn note(&self, note_id: &str) -> FetchResult<Note>;

    /// 分页获取全部符合条件的 note
    async fn notes(&self, query: &NoteQuery) -> FetchResult<Vec<Note>>;

    /// 下载附件（例如 `pdf` 字段）
    async fn attachment(&self, note_id: &str, field: &str) -> FetchResult<Vec<u8>>;
}
