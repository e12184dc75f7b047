use anyhow::{Context, Result};
use std::time::Duration;

mod config;
mod inbox;
mod mail;
mod utils;

use config::AppConfig;
use config::storage::TokenStore;
use mail::gmail::types::MessageSummary;
use mail::gmail::{CredentialManager, GmailApiClient, GoogleAuthorizer};

fn main() -> Result<()> {
    // 1. 初始化日志
    init_logger()?;

    // 2. 加载配置
    let config = AppConfig::load().context("加载配置失败")?;
    tracing::debug!("配置: {:?}", config);

    // 3. 创建 Tokio 运行时，所有请求依次执行
    let rt = tokio::runtime::Runtime::new()?;

    let summaries = match rt.block_on(run(&config)) {
        Ok(summaries) => summaries,
        Err(e) => {
            tracing::error!("❌ {:#}", e);
            return Err(e);
        }
    };

    tracing::debug!(
        "未读邮件 ID: {:?}",
        summaries.iter().map(|s| s.id.as_str()).collect::<Vec<_>>()
    );

    // 4. 输出结果
    inbox::render(&summaries, &mut std::io::stdout().lock()).context("写入标准输出失败")?;

    Ok(())
}

/// 获取授权会话并列出未读邮件
async fn run(config: &AppConfig) -> Result<Vec<MessageSummary>> {
    let authorizer = GoogleAuthorizer::new(
        config.client_secret_path.clone(),
        Duration::from_secs(config.callback_timeout_secs),
        config.open_browser,
    );
    let manager = CredentialManager::new(
        TokenStore::new(&config.token_path),
        authorizer,
        config.on_refresh_failure,
    );

    let session = manager
        .obtain_session(&config.scopes)
        .await
        .context("获取授权会话失败")?;
    tracing::debug!("会话凭据: {:?}", session.credential());

    let api = GmailApiClient::new(&session, &config.api_base_url)
        .with_query(&config.label, &config.query);

    inbox::list_unread(&api).await.context("获取未读邮件失败")
}

/// 初始化日志，输出到 stderr，stdout 只保留邮件摘要
fn init_logger() -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inbox_peek=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;

    Ok(())
}
