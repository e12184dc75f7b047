/// Gmail API 调用模块
///
/// 只暴露本程序需要的两个操作：列出未读邮件、按 ID 获取预览
use serde::de::DeserializeOwned;

use crate::mail::gmail::error::ApiError;
use crate::mail::gmail::token::AuthenticatedSession;
use crate::mail::gmail::types::{ListMessagesResponse, MessageResource};
use crate::utils::http_client;

/// 邮件 API 能力
pub trait MailApi {
    /// 列出未读邮件 ID（保持服务端返回顺序）
    async fn list_unread(&self) -> Result<Vec<String>, ApiError>;

    /// 获取单封邮件的预览文本
    async fn get_preview(&self, id: &str) -> Result<String, ApiError>;
}

/// Gmail API 客户端
pub struct GmailApiClient {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
    label: String,
    query: String,
}

impl GmailApiClient {
    /// 创建新的 Gmail API 客户端
    ///
    /// # Arguments
    /// * `session` - 已授权会话
    /// * `base_url` - API 根地址，如 `https://gmail.googleapis.com`
    pub fn new(session: &AuthenticatedSession, base_url: &str) -> Self {
        Self {
            http: http_client::get_client().clone(),
            access_token: session.access_token().to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            label: "INBOX".to_string(),
            query: "is:unread".to_string(),
        }
    }

    /// 设置查询的标签与搜索语句
    pub fn with_query(mut self, label: &str, query: &str) -> Self {
        self.label = label.to_string();
        self.query = query.to_string();
        self
    }

    /// 替换 HTTP 客户端
    #[cfg(test)]
    fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/gmail/v1/users/me/messages", self.base_url)
    }

    /// 单封邮件地址，ID 作为一个路径段转义
    fn message_url(&self, id: &str) -> Result<reqwest::Url, ApiError> {
        let mut url = reqwest::Url::parse(&self.messages_url())
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.clone()))?
            .push(id);
        Ok(url)
    }
}

impl MailApi for GmailApiClient {
    async fn list_unread(&self) -> Result<Vec<String>, ApiError> {
        tracing::debug!("正在查询未读邮件（label={}, q={}）", self.label, self.query);

        let response = self
            .http
            .get(self.messages_url())
            .bearer_auth(&self.access_token)
            .query(&[("labelIds", self.label.as_str()), ("q", self.query.as_str())])
            .send()
            .await?;

        let list: ListMessagesResponse = read_json(response).await?;
        let ids: Vec<String> = list.messages.into_iter().map(|m| m.id).collect();

        tracing::debug!("查询到 {} 封未读邮件", ids.len());
        Ok(ids)
    }

    async fn get_preview(&self, id: &str) -> Result<String, ApiError> {
        let response = self
            .http
            .get(self.message_url(id)?)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let message: MessageResource = read_json(response).await?;
        Ok(message.snippet)
    }
}

/// 检查状态码并解析 JSON 响应体
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::warn!("Gmail API 拒绝了 Access Token（401），可能已被撤销");
        }
        return Err(ApiError::Status { status, body });
    }

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(ApiError::Decode)
}
