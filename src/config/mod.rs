use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod oauth_config;
pub mod storage;

/// Gmail 只读权限
pub const GMAIL_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// Refresh 失败后的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshFailurePolicy {
    /// 记录警告并回退到交互式授权
    #[default]
    Reauthorize,

    /// 直接返回刷新错误
    Fail,
}

impl std::str::FromStr for RefreshFailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reauthorize" => Ok(Self::Reauthorize),
            "fail" => Ok(Self::Fail),
            other => anyhow::bail!("未知的 refresh 失败策略: {}（可选: reauthorize, fail）", other),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 凭据缓存文件
    pub token_path: PathBuf,

    /// OAuth2 客户端密钥文件
    pub client_secret_path: PathBuf,

    /// 请求的权限范围
    pub scopes: Vec<String>,

    /// 查询的标签
    pub label: String,

    /// Gmail 搜索语句
    pub query: String,

    /// Gmail API 根地址
    pub api_base_url: String,

    /// 等待授权回调的超时时间（秒）
    pub callback_timeout_secs: u64,

    /// Refresh 失败后的处理策略
    pub on_refresh_failure: RefreshFailurePolicy,

    /// 是否自动打开浏览器
    pub open_browser: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from("token.json"),
            client_secret_path: PathBuf::from("credentials.json"),
            scopes: vec![GMAIL_READONLY_SCOPE.to_string()],
            label: "INBOX".to_string(),
            query: "is:unread".to_string(),
            api_base_url: "https://gmail.googleapis.com".to_string(),
            callback_timeout_secs: 120,
            on_refresh_failure: RefreshFailurePolicy::Reauthorize,
            open_browser: true,
        }
    }
}

impl AppConfig {
    /// 加载配置
    ///
    /// 优先级（从高到低）：
    /// 1. 环境变量：`INBOX_PEEK_TOKEN_PATH`, `INBOX_PEEK_CLIENT_SECRET_PATH`,
    ///    `INBOX_PEEK_ON_REFRESH_FAILURE`, `INBOX_PEEK_NO_BROWSER`
    /// 2. 配置文件：`<config_dir>/inbox-peek/config.toml`
    /// 3. 默认值
    pub fn load() -> Result<Self> {
        let mut config = match config_path() {
            Some(path) => Self::load_from_file(&path)?,
            None => {
                tracing::debug!("无法获取配置目录，使用默认配置");
                Self::default()
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// 从配置文件加载，文件不存在时返回默认值
    fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("配置文件不存在，使用默认配置: {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;

        tracing::info!("✅ 从配置文件加载配置: {}", path.display());
        Ok(config)
    }

    /// 用环境变量覆盖
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = var("INBOX_PEEK_TOKEN_PATH") {
            self.token_path = PathBuf::from(path);
        }
        if let Some(path) = var("INBOX_PEEK_CLIENT_SECRET_PATH") {
            self.client_secret_path = PathBuf::from(path);
        }
        if let Some(policy) = var("INBOX_PEEK_ON_REFRESH_FAILURE") {
            self.on_refresh_failure = policy.parse()?;
        }
        if var("INBOX_PEEK_NO_BROWSER").is_some_and(|v| !v.is_empty() && v != "0") {
            self.open_browser = false;
        }
        Ok(())
    }
}

/// 获取配置文件路径
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("inbox-peek").join("config.toml"))
}
