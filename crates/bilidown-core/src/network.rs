//! 网络访问：共享 Cookie 罐 + 延迟构建的 HTTP 客户端。
//!
//! 约定：
//! - 进程内只有一个 Cookie 罐；所有请求自动携带其中的 Cookie，
//!   所有响应的 `Set-Cookie` 自动写回
//! - 客户端在第一次使用时构建，之后复用
//!
//! 作者：bilidown 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::sync::{Arc, PoisonError, RwLock};

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::Url;
use tokio::sync::OnceCell;
use tracing::debug;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const DEFAULT_REFERER: &str = "https://www.bilibili.com/";

/// 可整体清空的 Cookie 罐。
///
/// `reqwest::cookie::Jar` 本身不支持清空，这里在外层包一把读写锁，
/// 清空时直接换一个新的 `Jar`。
#[derive(Debug, Default)]
pub struct SessionJar {
    inner: RwLock<Jar>,
}

impl SessionJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// 序列化指定来源可见的全部 Cookie（`a=1; b=2`）；没有 Cookie 时为空串。
    pub fn cookie_string(&self, origin: &Url) -> String {
        self.cookies(origin)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .unwrap_or_default()
    }

    /// 写入一条 `Set-Cookie` 格式的 Cookie。
    pub fn add_cookie_str(&self, cookie: &str, url: &Url) {
        self.read().add_cookie_str(cookie, url);
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Jar::default();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Jar> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CookieStore for SessionJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.read().set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.read().cookies(url)
    }
}

/// 网络访问入口（客户端工厂 + Cookie 罐访问）。
#[derive(Debug, Default)]
pub struct NetworkAccess {
    jar: Arc<SessionJar>,
    client: OnceCell<reqwest::Client>,
}

impl NetworkAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取绑定共享 Cookie 罐的 HTTP 客户端（首次调用时构建）。
    ///
    /// 异常处理：
    /// - TLS 后端初始化失败等构建错误会返回给调用方，下次调用会重试构建
    pub async fn client(&self) -> Result<&reqwest::Client, reqwest::Error> {
        self.client
            .get_or_try_init(|| async {
                let mut headers = HeaderMap::new();
                headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
                headers.insert(REFERER, HeaderValue::from_static(DEFAULT_REFERER));
                debug!("构建 HTTP 客户端");
                reqwest::Client::builder()
                    .cookie_provider(Arc::clone(&self.jar))
                    .default_headers(headers)
                    .build()
            })
            .await
    }

    pub fn jar(&self) -> &Arc<SessionJar> {
        &self.jar
    }

    /// 指定来源的 Cookie 串。
    pub fn cookie_string(&self, origin: &Url) -> String {
        self.jar.cookie_string(origin)
    }

    pub fn remove_all_cookies(&self) {
        self.jar.clear();
    }

    /// 用已保存的 Cookie 串恢复会话。
    ///
    /// 参数：
    /// - `cookie_string`：`a=1; b=2` 形式的请求头串
    /// - `origin`：Cookie 所属来源
    /// - `domain`：写回时使用的 `Domain` 属性；`None` 表示仅限 `origin` 主机
    ///
    /// 返回值：
    /// - 写入的 Cookie 条数（空段与缺少 `=` 的段会被跳过）
    pub fn restore_cookie_string(&self, cookie_string: &str, origin: &Url, domain: Option<&str>) -> usize {
        let mut restored = 0;
        for pair in cookie_string.split(';').map(str::trim) {
            if pair.is_empty() || !pair.contains('=') {
                continue;
            }
            let cookie = match domain {
                Some(domain) => format!("{pair}; Domain={domain}; Path=/"),
                None => format!("{pair}; Path=/"),
            };
            self.jar.add_cookie_str(&cookie, origin);
            restored += 1;
        }
        restored
    }
}
