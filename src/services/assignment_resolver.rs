//! 投稿解析服务 - 业务能力层
//!
//! 给定会议与角色，得出本次运行要处理的有序投稿列表。
//!
//! ## 职责
//! - 显式指定 forum ID 时原样返回（保持顺序、去重），不查询分配列表
//! - 否则按角色配置表中的来源列出分配：分配边 / 成员分组 / 公开投稿
//! - 录用状态过滤只在 audience 角色下生效
//! - 任何错误都是致命的，不返回部分结果

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::clients::{NoteQuery, ReviewPlatform};
use crate::error::{FetchError, FetchErrorKind, ResolutionError};
use crate::infrastructure::RetryPolicy;
use crate::models::{AcceptanceStatus, AssignmentSource, Note, ResolveFilters, Role, SubmissionRef};

/// 投稿解析服务
pub struct AssignmentResolver {
    platform: Arc<dyn ReviewPlatform>,
    retry: RetryPolicy,
}

impl AssignmentResolver {
    pub fn new(platform: Arc<dyn ReviewPlatform>, retry: RetryPolicy) -> Self {
        Self { platform, retry }
    }

    /// 解析投稿列表
    ///
    /// # 参数
    /// - `venue_id`: 会议 ID，例如 `ICLR.cc/2026/Conference`
    /// - `role`: 角色视角
    /// - `filters`: 显式 forum ID 与录用状态过滤
    ///
    /// # 返回
    /// 按处理顺序排列、无重复的投稿引用
    pub async fn resolve(
        &self,
        venue_id: &str,
        role: Role,
        filters: &ResolveFilters,
    ) -> Result<Vec<SubmissionRef>, ResolutionError> {
        let venue_id = venue_id.trim().trim_end_matches('/');
        if venue_id.is_empty() {
            return Err(ResolutionError::InvalidFilter("会议 ID 为空".to_string()));
        }
        if filters.acceptance_status.is_some() && role != Role::Audience {
            warn!("⚠️ 录用状态过滤只对 audience 角色生效，已忽略");
        }

        self.ensure_venue(venue_id, role).await?;

        if !filters.forum_ids.is_empty() {
            info!("📌 使用显式指定的 {} 个投稿", filters.forum_ids.len());
            let mut seen = HashSet::new();
            return Ok(filters
                .forum_ids
                .iter()
                .filter(|id| seen.insert(id.as_str()))
                .map(|id| SubmissionRef::new(venue_id, id.as_str(), role))
                .collect());
        }

        let profile = role.profile();
        let notes = match profile.assignment {
            AssignmentSource::Edges { invitation_suffix } => {
                self.list_by_edges(venue_id, role, invitation_suffix).await?
            }
            AssignmentSource::MemberGroups { group_pattern } => {
                self.list_by_member_groups(venue_id, role, group_pattern).await?
            }
            AssignmentSource::PublicSubmissions => {
                let status = filters
                    .acceptance_status
                    .or(profile.default_status_filter);
                self.list_public(venue_id, role, status).await?
            }
        };

        let refs = order_submissions(venue_id, role, notes);
        info!("✓ 角色 {} 共分配到 {} 个投稿", role, refs.len());
        Ok(refs)
    }

    /// 确认会议存在且可访问
    async fn ensure_venue(&self, venue_id: &str, role: Role) -> Result<(), ResolutionError> {
        let platform = &self.platform;
        self.retry
            .run("获取会议分组", || platform.group(venue_id))
            .await
            .map(|_| ())
            .map_err(|err| match err.kind {
                FetchErrorKind::NotFound => ResolutionError::UnknownVenue {
                    venue_id: venue_id.to_string(),
                },
                _ => listing_error(venue_id, role, err),
            })
    }

    /// 会议分组中配置的正式审稿邀请名
    ///
    /// # 返回
    /// 未配置或分组获取失败时返回 `None`，由调用方使用配置中的默认值
    pub async fn review_name(&self, venue_id: &str) -> Option<String> {
        let platform = &self.platform;
        let venue_id = venue_id.trim().trim_end_matches('/');
        match self.retry.run("获取会议分组", || platform.group(venue_id)).await {
            Ok(group) => group.review_name(),
            Err(err) => {
                debug!("读取会议的审稿邀请名失败: {}", err);
                None
            }
        }
    }

    async fn identities(&self, venue_id: &str, role: Role) -> Result<Vec<String>, ResolutionError> {
        let platform = &self.platform;
        let ids = self
            .retry
            .run("获取用户档案", || platform.profile_ids())
            .await
            .map_err(|err| listing_error(venue_id, role, err))?;
        if ids.is_empty() {
            // 分配列表需要登录身份
            return Err(ResolutionError::PermissionDenied {
                venue_id: venue_id.to_string(),
                role,
            });
        }
        debug!("当前用户身份: {:?}", ids);
        Ok(ids)
    }

    /// ac / sac：通过分配边列出
    async fn list_by_edges(
        &self,
        venue_id: &str,
        role: Role,
        invitation_suffix: &str,
    ) -> Result<Vec<Note>, ResolutionError> {
        let identities = self.identities(venue_id, role).await?;
        let invitation = format!("{}/{}", venue_id, invitation_suffix);
        let platform = &self.platform;

        let mut heads = Vec::new();
        for identity in &identities {
            let found = self
                .retry
                .run("获取分配边", || platform.assignment_heads(&invitation, identity))
                .await
                .map_err(|err| listing_error(venue_id, role, err))?;
            heads.extend(found);
        }

        let mut seen = HashSet::new();
        let mut notes = Vec::new();
        for head in heads.into_iter().filter(|h| seen.insert(h.clone())) {
            match self.retry.run("获取投稿", || platform.note(&head)).await {
                Ok(note) => notes.push(note),
                Err(err) if err.kind == FetchErrorKind::NotFound => {
                    warn!("⚠️ 分配的投稿 {} 不存在，已跳过", head);
                }
                Err(err) => return Err(listing_error(venue_id, role, err)),
            }
        }
        Ok(notes)
    }

    /// author / reviewer：通过所属分组中的投稿编号列出
    async fn list_by_member_groups(
        &self,
        venue_id: &str,
        role: Role,
        group_pattern: &str,
    ) -> Result<Vec<Note>, ResolutionError> {
        let identities = self.identities(venue_id, role).await?;
        let pattern = format!("^{}{}", regex::escape(venue_id), group_pattern);
        let matcher = Regex::new(&pattern)
            .map_err(|e| ResolutionError::InvalidFilter(format!("分组匹配模式无效: {}", e)))?;
        let platform = &self.platform;

        let mut numbers = BTreeSet::new();
        for identity in &identities {
            let groups = self
                .retry
                .run("获取所属分组", || platform.member_groups(identity))
                .await
                .map_err(|err| listing_error(venue_id, role, err))?;
            numbers.extend(
                groups
                    .iter()
                    .filter_map(|g| matcher.captures(&g.id))
                    .filter_map(|caps| caps.get(1)?.as_str().parse::<u64>().ok()),
            );
        }
        if numbers.is_empty() {
            return Ok(Vec::new());
        }

        let submissions = self.submission_notes(venue_id, role).await?;
        Ok(submissions
            .into_iter()
            .filter(|note| note.number.is_some_and(|n| numbers.contains(&n)))
            .collect())
    }

    /// audience：全部公开投稿，按录用状态过滤
    async fn list_public(
        &self,
        venue_id: &str,
        role: Role,
        status: Option<AcceptanceStatus>,
    ) -> Result<Vec<Note>, ResolutionError> {
        let submissions = self.submission_notes(venue_id, role).await?;
        let Some(status) = status else {
            return Ok(submissions);
        };
        info!("🔎 按录用状态过滤: {}", status);
        Ok(submissions
            .into_iter()
            .filter(|note| {
                let venue = note.content_text(&["venue"]).unwrap_or_default();
                let venue_field = note.content_text(&["venueid"]).unwrap_or_default();
                status.matches(&[venue.as_str(), venue_field.as_str()])
            })
            .collect())
    }

    async fn submission_notes(&self, venue_id: &str, role: Role) -> Result<Vec<Note>, ResolutionError> {
        let query = NoteQuery::invitation(format!("{}/-/Submission", venue_id));
        let platform = &self.platform;
        self.retry
            .run("获取投稿列表", || platform.notes(&query))
            .await
            .map_err(|err| listing_error(venue_id, role, err))
    }
}

fn listing_error(venue_id: &str, role: Role, err: FetchError) -> ResolutionError {
    match err.kind {
        FetchErrorKind::PermissionDenied => ResolutionError::PermissionDenied {
            venue_id: venue_id.to_string(),
            role,
        },
        _ => ResolutionError::Remote(err),
    }
}

/// 按 forum 去重，按投稿编号排序（无编号的排在最后，保持原顺序）
fn order_submissions(venue_id: &str, role: Role, notes: Vec<Note>) -> Vec<SubmissionRef> {
    let mut by_forum: HashMap<String, usize> = HashMap::new();
    let mut refs: Vec<SubmissionRef> = Vec::new();
    for note in notes {
        let forum = if note.forum.is_empty() { note.id.clone() } else { note.forum.clone() };
        if by_forum.contains_key(&forum) {
            continue;
        }
        by_forum.insert(forum.clone(), refs.len());
        refs.push(SubmissionRef::new(venue_id, forum, role).with_listing(note.number, note.title()));
    }
    refs.sort_by_key(|r| r.number.unwrap_or(u64::MAX));
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, number: Option<u64>) -> Note {
        Note {
            id: id.to_string(),
            forum: id.to_string(),
            number,
            ..Default::default()
        }
    }

    #[test]
    fn test_order_submissions_dedupes_and_sorts() {
        let notes = vec![note("c", Some(3)), note("a", Some(1)), note("c", Some(3)), note("x", None)];
        let refs = order_submissions("V", Role::Ac, notes);
        let ids: Vec<&str> = refs.iter().map(|r| r.forum_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "x"]);
    }
}
