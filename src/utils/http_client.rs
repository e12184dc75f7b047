/// 全局共享的 HTTP 客户端
///
/// 所有 Gmail API 请求复用同一个连接池
use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// 全局 HTTP 客户端实例（懒初始化）
pub static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .pool_max_idle_per_host(4)
        .timeout(Duration::from_secs(30)) // 整体请求超时 30 秒
        .connect_timeout(Duration::from_secs(10)) // 连接建立超时 10 秒
        .user_agent(concat!("inbox-peek/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("构建全局 HTTP 客户端失败")
});

/// 获取全局 HTTP 客户端
pub fn get_client() -> &'static Client {
    &HTTP_CLIENT
}
