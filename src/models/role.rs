//! 角色与角色配置表
//!
//! 每个角色的差异（分配列表来源、必需产物、默认过滤条件）集中在一张静态表里，
//! 其他模块只查表，不在各处分支判断角色。

use phf::phf_map;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 获取产物时所处的视角
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Author,
    Reviewer,
    Ac,
    Sac,
    Audience,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Author,
        Role::Reviewer,
        Role::Ac,
        Role::Sac,
        Role::Audience,
    ];

    /// 命令行与存储中使用的名称
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Author => "author",
            Role::Reviewer => "reviewer",
            Role::Ac => "ac",
            Role::Sac => "sac",
            Role::Audience => "audience",
        }
    }

    /// 查表获取角色配置
    pub fn profile(self) -> &'static RoleProfile {
        // 表覆盖了所有变体，见 test_every_role_has_a_profile
        &ROLE_PROFILES[self.as_str()]
    }

    /// 是否需要登录
    pub fn requires_login(self) -> bool {
        self != Role::Audience
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ROLE_PROFILES
            .get(s.trim().to_ascii_lowercase().as_str())
            .map(|profile| profile.role)
            .ok_or_else(|| format!("未知角色: {} (可选: author, reviewer, ac, sac, audience)", s))
    }
}

/// 投稿产物类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Pdf,
    Reviews,
    Rebuttals,
    Decision,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Pdf => "pdf",
            ArtifactKind::Reviews => "reviews",
            ArtifactKind::Rebuttals => "rebuttals",
            ArtifactKind::Decision => "decision",
        };
        f.write_str(name)
    }
}

/// 录用状态过滤条件（仅 audience 角色有意义）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceStatus {
    Oral,
    Spotlight,
    Poster,
    Rejected,
}

impl AcceptanceStatus {
    /// 在 venue / venueid 字段中匹配的关键词
    pub fn match_terms(self) -> &'static [&'static str] {
        match self {
            AcceptanceStatus::Oral => &["oral"],
            AcceptanceStatus::Spotlight => &["spotlight"],
            AcceptanceStatus::Poster => &["poster"],
            AcceptanceStatus::Rejected => &["rejected", "withdrawn", "submitted"],
        }
    }

    /// 判断 venue 描述是否属于该状态（大小写不敏感）
    pub fn matches(self, venue_fields: &[&str]) -> bool {
        venue_fields.iter().any(|field| {
            let lower = field.to_lowercase();
            self.match_terms().iter().any(|term| lower.contains(term))
        })
    }
}

impl FromStr for AcceptanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oral" => Ok(AcceptanceStatus::Oral),
            "spotlight" => Ok(AcceptanceStatus::Spotlight),
            "poster" => Ok(AcceptanceStatus::Poster),
            "rejected" => Ok(AcceptanceStatus::Rejected),
            other => Err(format!(
                "未知录用状态: {} (可选: oral, spotlight, poster, rejected)",
                other
            )),
        }
    }
}

impl fmt::Display for AcceptanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcceptanceStatus::Oral => "oral",
            AcceptanceStatus::Spotlight => "spotlight",
            AcceptanceStatus::Poster => "poster",
            AcceptanceStatus::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// 分配列表的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentSource {
    /// 通过分配边（edge）查询，参数为邀请名后缀
    Edges { invitation_suffix: &'static str },
    /// 通过成员所属分组查询，参数为分组 ID 匹配模式
    MemberGroups { group_pattern: &'static str },
    /// 公开的全部投稿
    PublicSubmissions,
}

/// 角色配置记录
#[derive(Debug)]
pub struct RoleProfile {
    pub role: Role,
    pub assignment: AssignmentSource,
    /// 判断缓存是否完整时要求存在的产物
    pub required: &'static [ArtifactKind],
    /// 没有 PDF 时是否视为获取失败
    pub pdf_mandatory: bool,
    /// 没有显式投稿 ID 时的默认录用状态过滤
    pub default_status_filter: Option<AcceptanceStatus>,
}

impl RoleProfile {
    /// 结合 `--no-rebuttal` 计算实际要求的产物
    pub fn required_kinds(&self, no_rebuttal: bool) -> Vec<ArtifactKind> {
        self.required
            .iter()
            .copied()
            .filter(|kind| !(no_rebuttal && *kind == ArtifactKind::Rebuttals))
            .collect()
    }
}

static ROLE_PROFILES: phf::Map<&'static str, RoleProfile> = phf_map! {
    "author" => RoleProfile {
        role: Role::Author,
        assignment: AssignmentSource::MemberGroups { group_pattern: r"/Submission(\d+)/Authors" },
        required: &[ArtifactKind::Reviews, ArtifactKind::Rebuttals],
        pdf_mandatory: false,
        default_status_filter: None,
    },
    "reviewer" => RoleProfile {
        role: Role::Reviewer,
        assignment: AssignmentSource::MemberGroups { group_pattern: r"/Submission(\d+)/Reviewer_" },
        required: &[ArtifactKind::Pdf, ArtifactKind::Reviews, ArtifactKind::Rebuttals],
        pdf_mandatory: true,
        default_status_filter: None,
    },
    "ac" => RoleProfile {
        role: Role::Ac,
        assignment: AssignmentSource::Edges { invitation_suffix: "Area_Chairs/-/Assignment" },
        required: &[ArtifactKind::Pdf, ArtifactKind::Reviews, ArtifactKind::Rebuttals],
        pdf_mandatory: true,
        default_status_filter: None,
    },
    "sac" => RoleProfile {
        role: Role::Sac,
        assignment: AssignmentSource::Edges { invitation_suffix: "Senior_Area_Chairs/-/Assignment" },
        required: &[ArtifactKind::Reviews, ArtifactKind::Rebuttals, ArtifactKind::Decision],
        pdf_mandatory: false,
        default_status_filter: None,
    },
    "audience" => RoleProfile {
        role: Role::Audience,
        assignment: AssignmentSource::PublicSubmissions,
        required: &[ArtifactKind::Reviews, ArtifactKind::Decision],
        pdf_mandatory: false,
        default_status_filter: Some(AcceptanceStatus::Poster),
    },
};
