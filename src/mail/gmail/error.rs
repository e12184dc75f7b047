/// Gmail 模块错误类型
use std::path::PathBuf;

/// 授权 / 刷新 / Token 持久化相关错误
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// 客户端密钥文件缺失或格式错误
    #[error("客户端密钥文件不可用 ({path}): {reason}")]
    ClientSecret { path: PathBuf, reason: String },

    /// Token 文件读写失败
    #[error("Token 文件读写失败 ({path}): {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Token 序列化失败
    #[error("Token 序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Refresh Token 交换失败
    #[error("Refresh Token 交换失败: {0}")]
    Refresh(String),

    /// 授权码流程失败（用户拒绝、交换失败、网络错误等）
    #[error("授权失败: {0}")]
    Authorization(String),

    /// 本地回调服务器出错
    #[error("本地回调服务器出错: {0}")]
    Callback(String),

    /// 用户未在规定时间内完成授权
    #[error("授权超时：{0} 秒内未收到回调")]
    Timeout(u64),

    /// CSRF state 不匹配
    #[error("CSRF 验证失败：state 不匹配")]
    StateMismatch,

    /// OAuth2 端点 URL 无效
    #[error("OAuth2 配置无效: {0}")]
    Config(String),
}

/// Gmail API 调用错误
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 网络层失败
    #[error("请求 Gmail API 失败: {0}")]
    Http(#[from] reqwest::Error),

    /// 远端返回非成功状态码
    #[error("Gmail API 返回错误 {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// 响应体无法解析
    #[error("解析 Gmail API 响应失败: {0}")]
    Decode(#[source] serde_json::Error),

    /// API 根地址无法拼出请求地址
    #[error("无效的 Gmail API 地址: {0}")]
    InvalidUrl(String),

    /// 单封邮件获取失败（整批中止）
    #[error("获取邮件 {id} 失败: {source}")]
    Message {
        id: String,
        #[source]
        source: Box<ApiError>,
    },
}

impl From<oauth2::url::ParseError> for AuthError {
    fn from(e: oauth2::url::ParseError) -> Self {
        Self::Config(e.to_string())
    }
}
