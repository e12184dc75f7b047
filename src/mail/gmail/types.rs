/// Gmail 凭据与邮件数据结构
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// 未返回 expires_in 时使用的默认有效期
pub const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(3600);

/// OAuth2 凭据
///
/// 有效 = Access Token 未过期；过期但持有 Refresh Token = 可刷新
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// 访问令牌
    #[serde(rename = "token")]
    pub access_token: String,

    /// 刷新令牌（授权服务器可能不下发）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Access Token 过期时间（UTC）
    #[serde(rename = "expiry", default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// 已授予的权限范围
    #[serde(default)]
    pub scopes: Vec<String>,

    /// 其余字段原样保留（如 google-auth 写入的 client_id / token_uri / account）
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Credential {
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: Some(expires_at),
            scopes,
            extra: Map::new(),
        }
    }

    /// 从当前时刻起算 `expires_in` 后的过期时间
    ///
    /// 超出可表示的时间范围时返回 `None`
    pub fn expiry_after(expires_in: Duration) -> Option<DateTime<Utc>> {
        let delta = chrono::Duration::from_std(expires_in).ok()?;
        Utc::now().checked_add_signed(delta)
    }

    /// Access Token 是否仍然有效
    ///
    /// 过期时间未知时视为无效
    pub fn is_valid(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at > Utc::now(),
            None => false,
        }
    }

    /// 是否可以通过 Refresh Token 刷新
    pub fn is_refreshable(&self) -> bool {
        !self.is_valid() && self.refresh_token.is_some()
    }

    /// 是否覆盖了全部请求的 scope
    pub fn covers_scopes(&self, requested: &[String]) -> bool {
        requested.iter().all(|s| self.scopes.contains(s))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &mask_token(&self.access_token))
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(mask_token),
            )
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            // 可能含 client_secret，只输出字段名
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// 日志输出用：只保留前 4 个字符
pub fn mask_token(token: &str) -> String {
    match token.get(..4) {
        Some(prefix) if token.len() > 8 => format!("{}***", prefix),
        _ => "***".to_string(),
    }
}

/// 未读邮件摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    /// 邮件 ID
    pub id: String,

    /// 预览文本（Gmail snippet）
    pub preview: String,
}

/// messages.list 响应
#[derive(Debug, Deserialize)]
pub(crate) struct ListMessagesResponse {
    /// 无匹配邮件时 Gmail 不返回此字段
    #[serde(default)]
    pub messages: Vec<MessageRef>,
}

/// messages.list 中的单条引用
#[derive(Debug, Deserialize)]
pub(crate) struct MessageRef {
    pub id: String,
}

/// messages.get 响应（只取需要的字段）
#[derive(Debug, Deserialize)]
pub(crate) struct MessageResource {
    #[serde(default)]
    pub snippet: String,
}
