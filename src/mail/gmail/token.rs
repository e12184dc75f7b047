/// 凭据生命周期管理：加载 / 刷新 / 授权 / 持久化
use crate::config::RefreshFailurePolicy;
use crate::config::storage::TokenStore;
use crate::mail::gmail::error::AuthError;
use crate::mail::gmail::types::Credential;

/// 授权服务器能力
pub trait Authorizer {
    /// 用 Refresh Token 交换新的 Access Token
    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError>;

    /// 交互式授权码流程
    async fn authorize(&self, scopes: &[String]) -> Result<Credential, AuthError>;
}

/// 已授权会话，绑定一个有效凭据
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    credential: Credential,
}

impl AuthenticatedSession {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    /// Bearer Access Token
    pub fn access_token(&self) -> &str {
        &self.credential.access_token
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

/// 凭据管理器
///
/// 负责产出一个可用的 [`AuthenticatedSession`]
pub struct CredentialManager<A> {
    store: TokenStore,
    authorizer: A,
    on_refresh_failure: RefreshFailurePolicy,
}

impl<A: Authorizer> CredentialManager<A> {
    pub fn new(store: TokenStore, authorizer: A, on_refresh_failure: RefreshFailurePolicy) -> Self {
        Self {
            store,
            authorizer,
            on_refresh_failure,
        }
    }

    /// 获取已授权会话
    ///
    /// 1. 加载缓存凭据（不存在或损坏视为无凭据）
    /// 2. 凭据过期且有 Refresh Token 时刷新一次，得到有效凭据后立即保存
    /// 3. 仍无有效凭据时执行交互式授权并保存
    ///
    /// # Errors
    /// - 凭据文件无法读取或写入
    /// - 刷新失败且策略为 [`RefreshFailurePolicy::Fail`]
    /// - 交互式授权失败
    pub async fn obtain_session(&self, scopes: &[String]) -> Result<AuthenticatedSession, AuthError> {
        let loaded = self.store.load()?;

        if let Some(credential) = &loaded {
            if !credential.covers_scopes(scopes) {
                tracing::warn!(
                    "⚠️ 缓存凭据的 scope {:?} 未覆盖请求的 scope {:?}",
                    credential.scopes,
                    scopes
                );
            }

            if credential.is_valid() {
                tracing::info!("✅ 使用缓存凭据（过期时间: {:?}）", credential.expires_at);
                return Ok(AuthenticatedSession::new(credential.clone()));
            }

            if credential.is_refreshable() {
                tracing::info!("Access Token 已过期（{:?}），尝试刷新", credential.expires_at);

                let outcome = self.authorizer.refresh(credential).await.and_then(|refreshed| {
                    if refreshed.is_valid() {
                        Ok(refreshed)
                    } else {
                        Err(AuthError::Refresh(format!(
                            "刷新得到的 Access Token 已过期（{:?}）",
                            refreshed.expires_at
                        )))
                    }
                });

                match outcome {
                    Ok(refreshed) => {
                        self.store.save(&refreshed)?;
                        return Ok(AuthenticatedSession::new(refreshed));
                    }
                    Err(e) => match self.on_refresh_failure {
                        RefreshFailurePolicy::Fail => return Err(e),
                        RefreshFailurePolicy::Reauthorize => {
                            tracing::warn!("⚠️ 刷新失败，回退到交互式授权: {}", e);
                        }
                    },
                }
            } else {
                tracing::info!("缓存凭据已过期且没有 Refresh Token，需要重新授权");
            }
        }

        let credential = self.authorizer.authorize(scopes).await?;
        self.store.save(&credential)?;
        tracing::info!("✅ 凭据已保存: {}", self.store.path().display());

        Ok(AuthenticatedSession::new(credential))
    }
}
