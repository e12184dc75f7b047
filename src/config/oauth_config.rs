/// OAuth2 客户端凭据读取模块
///
/// 从 Google Cloud Console 下载的客户端密钥 JSON 中读取 client_id / client_secret
/// 及授权端点，支持 `installed`（桌面应用）与 `web` 两种格式
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

use crate::mail::gmail::error::AuthError;

/// OAuth2 客户端配置
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    /// OAuth2 客户端 ID
    pub client_id: String,

    /// OAuth2 客户端密钥（公共客户端可能没有）
    #[serde(default)]
    pub client_secret: Option<String>,

    /// 授权端点
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,

    /// Token 端点
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// 客户端密钥文件外层结构
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<OAuthConfig>,
    web: Option<OAuthConfig>,
}

impl OAuthConfig {
    /// 从客户端密钥文件加载
    ///
    /// # Errors
    /// - 文件不存在或无法读取
    /// - JSON 格式错误或缺少 `installed` / `web` 段
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let content = std::fs::read_to_string(path).map_err(|e| AuthError::ClientSecret {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config = Self::parse(&content).map_err(|reason| AuthError::ClientSecret {
            path: path.to_path_buf(),
            reason,
        })?;

        tracing::debug!("✅ 从 {} 加载 OAuth2 客户端配置", path.display());
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, String> {
        let file: ClientSecretFile = serde_json::from_str(content).map_err(|e| e.to_string())?;

        let config = file
            .installed
            .or(file.web)
            .ok_or_else(|| "缺少 installed 或 web 段".to_string())?;

        if config.client_id.trim().is_empty() {
            return Err("client_id 为空".to_string());
        }

        Ok(config)
    }

    /// 从凭据文件内嵌的客户端字段构造
    ///
    /// google-auth 写出的 token.json 自带 client_id / client_secret / token_uri，
    /// 缺少 client_id 时返回 `None`
    pub fn from_embedded(fields: &Map<String, Value>) -> Option<Self> {
        let text = |key: &str| {
            fields
                .get(key)
                .and_then(Value::as_str)
                .filter(|v| !v.trim().is_empty())
                .map(str::to_string)
        };

        Some(Self {
            client_id: text("client_id")?,
            client_secret: text("client_secret"),
            auth_uri: default_auth_uri(),
            token_uri: text("token_uri").unwrap_or_else(default_token_uri),
        })
    }

    /// 随凭据一起保存的客户端字段
    pub fn embedded_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("client_id".to_string(), Value::from(self.client_id.clone()));
        if let Some(secret) = &self.client_secret {
            fields.insert("client_secret".to_string(), Value::from(secret.clone()));
        }
        fields.insert("token_uri".to_string(), Value::from(self.token_uri.clone()));
        fields
    }
}
