/// Gmail 模块 - OAuth2 认证与 API 调用
pub mod api;
pub mod error;
pub mod oauth;
pub mod token;
pub mod types;

// 重新导出常用类型
pub use api::GmailApiClient;
pub use oauth::GoogleAuthorizer;
pub use token::CredentialManager;
