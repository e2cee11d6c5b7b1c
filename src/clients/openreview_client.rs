/// OpenReview API 客户端
///
/// 封装所有与 OpenReview v2 REST 接口相关的调用，
/// 并把 HTTP 状态码统一映射为 `FetchError` 的四种类别。
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info};

use crate::clients::review_platform::{NoteQuery, ReviewPlatform};
use crate::config::Config;
use crate::error::{AppResult, ConfigError, FetchError, FetchResult};
use crate::models::{Edge, Group, Note, Profile, Role};

/// OpenReview 客户端
pub struct OpenReviewClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    page_size: usize,
}

impl OpenReviewClient {
    /// 创建匿名客户端
    pub fn anonymous(base_url: impl Into<String>, timeout: Duration) -> FetchResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::transient(&base_url, format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self {
            http,
            base_url,
            token: None,
            page_size: 1000,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// 按配置建立连接：优先 token，其次用户名/密码登录，audience 角色允许匿名
    pub async fn connect(config: &Config, role: Role) -> AppResult<Self> {
        let client = Self::anonymous(&config.openreview_base_url, config.request_timeout())?
            .with_page_size(config.page_size);

        if let Some(token) = config.openreview_token.as_deref().filter(|t| !t.is_empty()) {
            info!("🔑 使用 token 访问 OpenReview");
            return Ok(client.with_token(token));
        }

        match (&config.openreview_username, &config.openreview_password) {
            (Some(username), Some(password)) if !username.is_empty() => {
                let token = client.login(username, password).await?;
                info!("🔑 已登录 OpenReview: {}", username);
                Ok(client.with_token(token))
            }
            _ if role.requires_login() => Err(ConfigError::MissingCredentials { role }.into()),
            _ => {
                info!("👤 以匿名身份访问 OpenReview");
                Ok(client)
            }
        }
    }

    /// 用户名/密码登录，返回访问 token
    pub async fn login(&self, username: &str, password: &str) -> FetchResult<String> {
        let endpoint = "/login";
        let response = self
            .http
            .post(self.url(endpoint))
            .json(&json!({ "id": username, "password": password }))
            .send()
            .await
            .map_err(|e| transport_error(endpoint, e))?;
        let body: JsonValue = check_status(endpoint, response)
            .await?
            .json()
            .await
            .map_err(|e| decode_error(endpoint, e))?;
        body.get("token")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| FetchError::permission_denied(endpoint, "登录响应中没有 token"))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send_get(&self, path: &str, query: &[(&str, String)]) -> FetchResult<Response> {
        let endpoint = describe_endpoint(path, query);
        let mut request = self.http.get(self.url(path)).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        debug!("GET {}", endpoint);
        let response = request.send().await.map_err(|e| transport_error(&endpoint, e))?;
        check_status(&endpoint, response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> FetchResult<T> {
        let endpoint = describe_endpoint(path, query);
        self.send_get(path, query)
            .await?
            .json::<T>()
            .await
            .map_err(|e| decode_error(&endpoint, e))
    }

    /// 按 limit/offset 翻页，直到返回不足一页
    async fn get_paged<T: DeserializeOwned>(
        &self,
        path: &str,
        key: &str,
        query: &[(&str, String)],
    ) -> FetchResult<Vec<T>> {
        let mut items = Vec::new();
        let mut offset = 0usize;
        loop {
            let mut page_query = query.to_vec();
            page_query.push(("limit", self.page_size.to_string()));
            page_query.push(("offset", offset.to_string()));

            let body: JsonValue = self.get_json(path, &page_query).await?;
            let page: Vec<T> = match body.get(key) {
                Some(values) => serde_json::from_value(values.clone()).map_err(|e| {
                    FetchError::transient(describe_endpoint(path, &page_query), format!("响应字段 {} 解析失败: {}", key, e))
                })?,
                None => Vec::new(),
            };
            let fetched = page.len();
            items.extend(page);
            if fetched < self.page_size {
                return Ok(items);
            }
            offset += fetched;
        }
    }
}

#[async_trait]
impl ReviewPlatform for OpenReviewClient {
    async fn profile_ids(&self) -> FetchResult<Vec<String>> {
        if self.token.is_none() {
            return Ok(Vec::new());
        }
        let body: JsonValue = self.get_json("/profiles", &[]).await?;
        let profiles: Vec<Profile> = body
            .get("profiles")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| FetchError::transient("/profiles", format!("档案解析失败: {}", e)))?
            .unwrap_or_default();
        Ok(profiles.first().map(Profile::identities).unwrap_or_default())
    }

    async fn group(&self, group_id: &str) -> FetchResult<Group> {
        let query = [("id", group_id.to_string())];
        let groups: Vec<Group> = self.get_paged("/groups", "groups", &query).await?;
        groups
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::not_found(describe_endpoint("/groups", &query), "分组不存在"))
    }

    async fn member_groups(&self, member: &str) -> FetchResult<Vec<Group>> {
        self.get_paged("/groups", "groups", &[("member", member.to_string())])
            .await
    }

    async fn assignment_heads(&self, invitation: &str, tail: &str) -> FetchResult<Vec<String>> {
        let query = [("invitation", invitation.to_string()), ("tail", tail.to_string())];
        let edges: Vec<Edge> = self.get_paged("/edges", "edges", &query).await?;
        Ok(edges.into_iter().map(|edge| edge.head).collect())
    }

    async fn note(&self, note_id: &str) -> FetchResult<Note> {
        let query = [("id", note_id.to_string())];
        let body: JsonValue = self.get_json("/notes", &query).await?;
        let notes: Vec<Note> = body
            .get("notes")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| FetchError::transient(describe_endpoint("/notes", &query), format!("note 解析失败: {}", e)))?
            .unwrap_or_default();
        notes
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::not_found(describe_endpoint("/notes", &query), "note 不存在"))
    }

    async fn notes(&self, query: &NoteQuery) -> FetchResult<Vec<Note>> {
        let mut params = Vec::new();
        if let Some(forum) = &query.forum {
            params.push(("forum", forum.clone()));
        }
        if let Some(invitation) = &query.invitation {
            params.push(("invitation", invitation.clone()));
        }
        self.get_paged("/notes", "notes", &params).await
    }

    async fn attachment(&self, note_id: &str, field: &str) -> FetchResult<Vec<u8>> {
        let query = [("id", note_id.to_string()), ("name", field.to_string())];
        let endpoint = describe_endpoint("/attachment", &query);
        let bytes = self
            .send_get("/attachment", &query)
            .await?
            .bytes()
            .await
            .map_err(|e| transport_error(&endpoint, e))?;
        Ok(bytes.to_vec())
    }
}

// ========== 错误映射 ==========

fn describe_endpoint(path: &str, query: &[(&str, String)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let params: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}?{}", path, params.join("&"))
}

fn transport_error(endpoint: &str, err: reqwest::Error) -> FetchError {
    let reason = if err.is_timeout() {
        "请求超时"
    } else if err.is_connect() {
        "连接失败"
    } else {
        "网络错误"
    };
    FetchError::transient(endpoint, format!("{}: {}", reason, err))
}

fn decode_error(endpoint: &str, err: reqwest::Error) -> FetchError {
    FetchError::transient(endpoint, format!("响应解析失败: {}", err))
}

/// 把非 2xx 响应映射为对应的错误类别
async fn check_status(endpoint: &str, response: Response) -> FetchResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    let message = format!("HTTP {}: {}", status.as_u16(), crate::utils::truncate_text(&body, 200));

    let err = match status {
        StatusCode::NOT_FOUND => FetchError::not_found(endpoint, message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::permission_denied(endpoint, message),
        StatusCode::TOO_MANY_REQUESTS => FetchError {
            message,
            ..FetchError::rate_limited(endpoint, retry_after)
        },
        StatusCode::REQUEST_TIMEOUT => FetchError::transient(endpoint, message),
        s if s.is_server_error() => FetchError::transient(endpoint, message),
        _ => {
            let lower = body.to_lowercase();
            if lower.contains("forbidden") || lower.contains("permission") {
                FetchError::permission_denied(endpoint, message)
            } else {
                FetchError::not_found(endpoint, message)
            }
        }
    };
    Err(err)
}
