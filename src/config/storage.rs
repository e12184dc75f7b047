/// Token 文件存储模块
///
/// 负责将 OAuth2 凭据持久化到本地 JSON 文件
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::mail::gmail::error::AuthError;
use crate::mail::gmail::types::Credential;

/// 凭据文件存储
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 加载凭据
    ///
    /// # Returns
    /// 文件不存在或内容损坏时返回 `None`
    ///
    /// # Errors
    /// - 文件存在但无法读取（权限不足等）
    pub fn load(&self) -> Result<Option<Credential>, AuthError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("凭据文件不存在: {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(AuthError::Storage {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        match serde_json::from_str::<Credential>(&content) {
            Ok(credential) => {
                tracing::debug!(
                    "已加载凭据 {}（过期时间: {:?}）",
                    self.path.display(),
                    credential.expires_at
                );
                Ok(Some(credential))
            }
            Err(e) => {
                tracing::warn!("⚠️ 凭据文件损坏，忽略: {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    /// 保存凭据（覆盖整个文件）
    ///
    /// Unix 下文件权限设为 0600
    pub fn save(&self, credential: &Credential) -> Result<(), AuthError> {
        let storage_err = |source| AuthError::Storage {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(storage_err)?;
        }

        let content = serde_json::to_string_pretty(credential)?;
        std::fs::write(&self.path, content).map_err(storage_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .map_err(storage_err)?;
        }

        tracing::debug!("凭据已保存到: {}", self.path.display());
        Ok(())
    }
}
