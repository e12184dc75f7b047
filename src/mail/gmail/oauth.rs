/// Gmail OAuth2 认证流程
///
/// 实现授权码流程（带 PKCE）与 Refresh Token 交换
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
    basic::{BasicClient, BasicErrorResponse, BasicTokenResponse},
    reqwest::async_http_client,
};
use std::collections::HashMap;
use std::io::Cursor;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiny_http::{Header, Response, Server, StatusCode};

use crate::config::oauth_config::OAuthConfig;
use crate::mail::gmail::error::AuthError;
use crate::mail::gmail::token::Authorizer;
use crate::mail::gmail::types::{Credential, DEFAULT_EXPIRES_IN, mask_token};

/// OAuth2 成功页面 HTML
const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>授权成功 - inbox-peek</title>
    <style>
        body { font-family: -apple-system, "Segoe UI", Arial, sans-serif; text-align: center; margin-top: 15vh; }
        h1 { color: #4caf50; }
        p { color: #666; }
    </style>
</head>
<body>
    <h1>✓ 授权成功</h1>
    <p>现在可以关闭此页面并返回终端。</p>
</body>
</html>"#;

/// OAuth2 错误页面 HTML
const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>授权失败 - inbox-peek</title>
    <style>
        body { font-family: -apple-system, "Segoe UI", Arial, sans-serif; text-align: center; margin-top: 15vh; }
        h1 { color: #f44336; }
        p { color: #666; }
    </style>
</head>
<body>
    <h1>✗ 授权失败</h1>
    <p>请返回终端查看错误信息。</p>
</body>
</html>"#;

/// 授权回调参数
#[derive(Debug, PartialEq, Eq)]
struct CallbackParams {
    code: String,
    state: String,
}

/// 授权地址的展示方式
type AuthUrlHandler = Arc<dyn Fn(&str) + Send + Sync>;

fn print_auth_url(auth_url: &str) {
    println!("请在浏览器中打开以下地址完成授权：\n{}", auth_url);
}

/// 基于 Google OAuth2 端点的授权器
#[derive(Clone)]
pub struct GoogleAuthorizer {
    client_secret_path: PathBuf,
    callback_timeout: Duration,
    open_browser: bool,
    on_auth_url: AuthUrlHandler,
}

impl GoogleAuthorizer {
    /// 创建授权器，客户端密钥文件在真正需要时才读取
    pub fn new(client_secret_path: PathBuf, callback_timeout: Duration, open_browser: bool) -> Self {
        Self {
            client_secret_path,
            callback_timeout,
            open_browser,
            on_auth_url: Arc::new(print_auth_url),
        }
    }

    /// 替换授权地址的展示方式（默认打印到 stdout）
    #[cfg(test)]
    fn with_auth_url_handler(mut self, handler: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_auth_url = Arc::new(handler);
        self
    }

    fn oauth_config(&self) -> Result<OAuthConfig, AuthError> {
        OAuthConfig::load(&self.client_secret_path)
    }

    /// 刷新用的客户端配置：优先使用凭据内嵌的字段，否则读取客户端密钥文件
    fn refresh_config(&self, credential: &Credential) -> Result<OAuthConfig, AuthError> {
        match OAuthConfig::from_embedded(&credential.extra) {
            Some(config) => {
                tracing::debug!("使用凭据文件内嵌的客户端配置（client_id={}）", config.client_id);
                Ok(config)
            }
            None => self.oauth_config(),
        }
    }
}

impl fmt::Debug for GoogleAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleAuthorizer")
            .field("client_secret_path", &self.client_secret_path)
            .field("callback_timeout", &self.callback_timeout)
            .field("open_browser", &self.open_browser)
            .finish_non_exhaustive()
    }
}

impl Authorizer for GoogleAuthorizer {
    async fn refresh(&self, credential: &Credential) -> Result<Credential, AuthError> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::Refresh("凭据中没有 Refresh Token".to_string()))?;

        tracing::debug!("开始刷新 Access Token（refresh_token={}）", mask_token(refresh_token));

        let config = self.refresh_config(credential)?;
        let client = build_client(&config, None)?;

        let response = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                let detail = describe_token_error(&e);
                if detail.contains("invalid_grant") {
                    tracing::error!("❌ Refresh Token 已过期或被撤销: {}", detail);
                }
                AuthError::Refresh(detail)
            })?;

        let mut refreshed =
            credential_from_response(&response, Some(refresh_token), &credential.scopes)
                .map_err(AuthError::Refresh)?;
        refreshed.extra = credential.extra.clone();
        tracing::info!("✅ Access Token 刷新成功（新的过期时间: {:?}）", refreshed.expires_at);

        Ok(refreshed)
    }

    async fn authorize(&self, scopes: &[String]) -> Result<Credential, AuthError> {
        tracing::info!("🔐 开始 OAuth2 授权码流程");

        let config = self.oauth_config()?;

        // 端口 0：由系统分配临时端口
        let server = Server::http("127.0.0.1:0")
            .map_err(|e| AuthError::Callback(format!("无法启动本地服务器: {}", e)))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .ok_or_else(|| AuthError::Callback("本地服务器未监听 TCP 端口".to_string()))?;

        let redirect_uri = format!("http://127.0.0.1:{}/", port);
        let client = build_client(&config, Some(redirect_uri))?;

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, csrf_state) = client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "offline")
            .set_pkce_challenge(pkce_challenge)
            .url();

        tracing::info!("✅ 本地服务器启动成功: http://127.0.0.1:{}", port);
        (self.on_auth_url)(auth_url.as_str());

        if self.open_browser {
            if let Err(e) = webbrowser::open(auth_url.as_str()) {
                tracing::warn!("⚠️ 无法打开浏览器，请手动复制上面的地址: {}", e);
            }
        }

        // server 移入阻塞任务，任务结束时关闭监听
        let timeout = self.callback_timeout;
        let callback = tokio::task::spawn_blocking(move || wait_for_callback(server, timeout))
            .await
            .map_err(|e| AuthError::Callback(format!("回调线程异常: {}", e)))??;

        tracing::info!("✅ 收到授权回调");

        if callback.state != *csrf_state.secret() {
            return Err(AuthError::StateMismatch);
        }

        let response = client
            .exchange_code(AuthorizationCode::new(callback.code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                AuthError::Authorization(format!("授权码交换失败: {}", describe_token_error(&e)))
            })?;

        let mut credential = credential_from_response(&response, None, scopes)
            .map_err(|reason| AuthError::Authorization(format!("Token 响应无效: {}", reason)))?;
        credential.extra = config.embedded_fields();
        if credential.refresh_token.is_none() {
            tracing::warn!("⚠️ 授权服务器未返回 Refresh Token，过期后需重新授权");
        }

        tracing::info!("🎉 OAuth2 授权完成");
        Ok(credential)
    }
}

fn build_client(config: &OAuthConfig, redirect_uri: Option<String>) -> Result<BasicClient, AuthError> {
    let client = BasicClient::new(
        ClientId::new(config.client_id.clone()),
        config.client_secret.clone().map(ClientSecret::new),
        AuthUrl::new(config.auth_uri.clone())?,
        Some(TokenUrl::new(config.token_uri.clone())?),
    );

    Ok(match redirect_uri {
        Some(uri) => client.set_redirect_uri(RedirectUrl::new(uri)?),
        None => client,
    })
}

/// 由 Token 响应构造凭据
///
/// 未下发新 Refresh Token 时沿用旧值；未返回 scope 时沿用请求的 scope。
/// `expires_in` 超出可表示范围时返回错误
fn credential_from_response(
    response: &BasicTokenResponse,
    previous_refresh_token: Option<&str>,
    fallback_scopes: &[String],
) -> Result<Credential, String> {
    let refresh_token = response
        .refresh_token()
        .map(|t| t.secret().clone())
        .or_else(|| previous_refresh_token.map(str::to_string));

    let expires_in = response.expires_in().unwrap_or(DEFAULT_EXPIRES_IN);
    let expires_at = Credential::expiry_after(expires_in)
        .ok_or_else(|| format!("expires_in 超出范围: {} 秒", expires_in.as_secs()))?;

    let scopes = match response.scopes() {
        Some(scopes) if !scopes.is_empty() => scopes.iter().map(|s| s.as_str().to_string()).collect(),
        _ => fallback_scopes.to_vec(),
    };

    Ok(Credential::new(
        response.access_token().secret().clone(),
        refresh_token,
        expires_at,
        scopes,
    ))
}

fn describe_token_error<RE>(e: &RequestTokenError<RE, BasicErrorResponse>) -> String
where
    RE: std::error::Error + 'static,
{
    match e {
        RequestTokenError::ServerResponse(response) => match response.error_description() {
            Some(description) => format!("{}: {}", response.error(), description),
            None => response.error().to_string(),
        },
        other => other.to_string(),
    }
}

fn html_response(status: u16, body: &str) -> Response<Cursor<Vec<u8>>> {
    let response = Response::from_string(body).with_status_code(StatusCode(status));
    match Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

/// 等待一次授权回调
///
/// 既没有 `code` 也没有 `error` 的请求（如 /favicon.ico）返回 404 并继续等待
fn wait_for_callback(server: Server, timeout: Duration) -> Result<CallbackParams, AuthError> {
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(AuthError::Timeout(timeout.as_secs()));
        }

        let request = match server.recv_timeout(remaining) {
            Ok(Some(request)) => request,
            Ok(None) => return Err(AuthError::Timeout(timeout.as_secs())),
            Err(e) => return Err(AuthError::Callback(e.to_string())),
        };

        tracing::debug!("收到请求: {}", request.url());

        let params: HashMap<String, String> = url::Url::parse("http://127.0.0.1")
            .and_then(|base| base.join(request.url()))
            .map(|u| u.query_pairs().into_owned().collect())
            .unwrap_or_default();

        if let Some(error) = params.get("error") {
            tracing::error!("用户拒绝授权: {}", error);
            let reason = format!("用户拒绝授权: {}", error);
            request
                .respond(html_response(200, ERROR_HTML))
                .map_err(|e| AuthError::Callback(e.to_string()))?;
            return Err(AuthError::Authorization(reason));
        }

        match (params.get("code"), params.get("state")) {
            (Some(code), Some(state)) => {
                let callback = CallbackParams {
                    code: code.clone(),
                    state: state.clone(),
                };
                request
                    .respond(html_response(200, SUCCESS_HTML))
                    .map_err(|e| AuthError::Callback(e.to_string()))?;
                return Ok(callback);
            }
            _ => {
                if let Err(e) = request.respond(Response::empty(StatusCode(404))) {
                    tracing::debug!("响应无关请求失败: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// 在临时目录写入客户端密钥文件并创建授权器
    fn authorizer_for(dir: &tempfile::TempDir, token_uri: String) -> GoogleAuthorizer {
        let path = dir.path().join("credentials.json");
        std::fs::write(
            &path,
            serde_json::json!({
                "installed": {
                    "client_id": "client-id",
                    "client_secret": "client-secret",
                    "auth_uri": "https://accounts.example.com/auth",
                    "token_uri": token_uri
                }
            })
            .to_string(),
        )
        .unwrap();

        GoogleAuthorizer::new(path, Duration::from_secs(10), false)
    }

    fn expired_credential() -> Credential {
        Credential {
            access_token: "old-access".to_string(),
            refresh_token: Some("old-refresh".to_string()),
            expires_at: Some(chrono::Utc::now() - chrono::Duration::hours(1)),
            scopes: vec!["scope-a".to_string()],
            extra: serde_json::Map::new(),
        }
    }

    /// 模拟浏览器：从授权地址取出 redirect_uri 与 state，带上授权码回调本地服务器
    ///
    /// `forged_state` 非空时用它替换真实的 state
    fn simulate_browser(forged_state: Option<&'static str>) -> impl Fn(&str) + Send + Sync + 'static {
        move |auth_url: &str| {
            let params: HashMap<String, String> = url::Url::parse(auth_url)
                .unwrap()
                .query_pairs()
                .into_owned()
                .collect();
            assert_eq!(params["access_type"], "offline");
            assert_eq!(params["code_challenge_method"], "S256");

            let state = forged_state.unwrap_or(params["state"].as_str()).to_string();
            let mut callback = url::Url::parse(&params["redirect_uri"]).unwrap();
            callback
                .query_pairs_mut()
                .append_pair("code", "auth-code")
                .append_pair("state", &state);

            tokio::spawn(async move {
                let _ = reqwest::get(callback).await;
            });
        }
    }

    fn bind_server() -> (Server, u16) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        (server, port)
    }

    #[test]
    fn test_html_contains_charset() {
        assert!(SUCCESS_HTML.contains("utf-8"));
        assert!(ERROR_HTML.contains("utf-8"));
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let authorizer = authorizer_for(&dir, format!("{}/token", server.uri()));

        let refreshed = authorizer.refresh(&expired_credential()).await.unwrap();

        assert_eq!(refreshed.access_token, "new-access");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(refreshed.scopes, vec!["scope-a".to_string()]);
        assert!(refreshed.is_valid());
    }

    #[tokio::test]
    async fn test_refresh_rotated_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "refresh_token": "new-refresh",
                "token_type": "Bearer",
                "expires_in": 3599,
                "scope": "scope-a scope-b"
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let authorizer = authorizer_for(&dir, format!("{}/token", server.uri()));

        let refreshed = authorizer.refresh(&expired_credential()).await.unwrap();
        assert_eq!(refreshed.refresh_token.as_deref(), Some("new-refresh"));
        assert_eq!(refreshed.scopes, vec!["scope-a".to_string(), "scope-b".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_invalid_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let authorizer = authorizer_for(&dir, format!("{}/token", server.uri()));

        let err = authorizer.refresh(&expired_credential()).await.unwrap_err();
        assert!(matches!(&err, AuthError::Refresh(detail) if detail.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn test_refresh_rejects_out_of_range_expires_in() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "token_type": "Bearer",
                "expires_in": 9223372036854775807u64
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let authorizer = authorizer_for(&dir, format!("{}/token", server.uri()));

        let err = authorizer.refresh(&expired_credential()).await.unwrap_err();
        assert!(matches!(&err, AuthError::Refresh(detail) if detail.contains("expires_in")));
    }

    #[tokio::test]
    async fn test_refresh_uses_embedded_client_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embedded-token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        // 没有客户端密钥文件，只靠凭据中的字段
        let dir = tempfile::tempdir().unwrap();
        let authorizer = GoogleAuthorizer::new(
            dir.path().join("credentials.json"),
            Duration::from_secs(10),
            false,
        );

        let mut credential = expired_credential();
        credential.extra = serde_json::json!({
            "client_id": "embedded-id",
            "client_secret": "embedded-secret",
            "token_uri": format!("{}/embedded-token", server.uri()),
            "account": ""
        })
        .as_object()
        .unwrap()
        .clone();

        let refreshed = authorizer.refresh(&credential).await.unwrap();

        assert_eq!(refreshed.access_token, "new-access");
        assert_eq!(refreshed.extra, credential.extra);
    }

    #[tokio::test]
    async fn test_authorize_exchanges_code_with_pkce_verifier() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=auth-code"))
            .and(body_string_contains("code_verifier="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "granted-access",
                "refresh_token": "granted-refresh",
                "token_type": "Bearer",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let token_uri = format!("{}/token", server.uri());
        let authorizer =
            authorizer_for(&dir, token_uri.clone()).with_auth_url_handler(simulate_browser(None));

        let credential = authorizer.authorize(&["scope-a".to_string()]).await.unwrap();

        assert_eq!(credential.access_token, "granted-access");
        assert_eq!(credential.refresh_token.as_deref(), Some("granted-refresh"));
        assert_eq!(credential.scopes, vec!["scope-a".to_string()]);
        assert!(credential.is_valid());
        // 之后刷新不再依赖客户端密钥文件
        assert_eq!(credential.extra["client_id"], "client-id");
        assert_eq!(credential.extra["token_uri"], token_uri.as_str());
    }

    #[tokio::test]
    async fn test_authorize_state_mismatch_skips_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let authorizer = authorizer_for(&dir, format!("{}/token", server.uri()))
            .with_auth_url_handler(simulate_browser(Some("forged-state")));

        let result = authorizer.authorize(&["scope-a".to_string()]).await;
        assert!(matches!(result, Err(AuthError::StateMismatch)));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let authorizer = authorizer_for(&dir, "https://oauth.example.com/token".to_string());

        let mut credential = expired_credential();
        credential.refresh_token = None;

        assert!(matches!(
            authorizer.refresh(&credential).await,
            Err(AuthError::Refresh(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_missing_client_secret_file() {
        let dir = tempfile::tempdir().unwrap();
        let authorizer = GoogleAuthorizer::new(
            dir.path().join("credentials.json"),
            Duration::from_secs(1),
            false,
        );

        assert!(matches!(
            authorizer.refresh(&expired_credential()).await,
            Err(AuthError::ClientSecret { .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_for_callback_success() {
        let (server, port) = bind_server();
        let waiter =
            tokio::task::spawn_blocking(move || wait_for_callback(server, Duration::from_secs(10)));

        let body = reqwest::get(format!("http://127.0.0.1:{}/?code=abc&state=xyz&scope=s", port))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("授权成功"));

        let callback = waiter.await.unwrap().unwrap();
        assert_eq!(
            callback,
            CallbackParams {
                code: "abc".to_string(),
                state: "xyz".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_wait_for_callback_ignores_unrelated_requests() {
        let (server, port) = bind_server();
        let waiter =
            tokio::task::spawn_blocking(move || wait_for_callback(server, Duration::from_secs(10)));

        let client = reqwest::Client::new();
        let favicon = client
            .get(format!("http://127.0.0.1:{}/favicon.ico", port))
            .send()
            .await
            .unwrap();
        assert_eq!(favicon.status(), 404);

        client
            .get(format!("http://127.0.0.1:{}/?code=c1&state=s1", port))
            .send()
            .await
            .unwrap();

        let callback = waiter.await.unwrap().unwrap();
        assert_eq!(callback.code, "c1");
    }

    #[tokio::test]
    async fn test_wait_for_callback_access_denied() {
        let (server, port) = bind_server();
        let waiter =
            tokio::task::spawn_blocking(move || wait_for_callback(server, Duration::from_secs(10)));

        let body = reqwest::get(format!("http://127.0.0.1:{}/?error=access_denied", port))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("授权失败"));

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(&err, AuthError::Authorization(reason) if reason.contains("access_denied")));
    }

    #[test]
    fn test_wait_for_callback_timeout() {
        let (server, _) = bind_server();
        let result = wait_for_callback(server, Duration::from_millis(50));
        assert!(matches!(result, Err(AuthError::Timeout(_))));
    }
}
