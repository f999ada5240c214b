//! 平台接口地址与请求/响应结构。
//!
//! 所有响应在进入业务逻辑前先按这里的结构反序列化；结构不符的响应
//! 直接以解析错误失败，而不是把缺失字段继续往下传。
//!
//! 作者：bilidown 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::BilibiliError;

pub const VIDEO_INFO_PATH: &str = "/x/web-interface/view";
pub const PLAY_URL_PATH: &str = "/x/player/playurl";
pub const SELF_INFO_PATH: &str = "/x/space/myinfo";
pub const CAPTCHA_PATH: &str = "/x/passport-login/captcha";
pub const ENCRYPTION_KEY_PATH: &str = "/x/passport-login/web/key";
pub const PASSWORD_LOGIN_PATH: &str = "/x/passport-login/web/login";
pub const QR_TICKET_PATH: &str = "/qrcode/getLoginUrl";
pub const QR_POLL_PATH: &str = "/qrcode/getLoginInfo";
pub const LOGOUT_PATH: &str = "/login/exit/v2";

/// 登录成功后的跳转地址（`go_url` / `gourl`）。
pub const HOME_URL: &str = "https://www.bilibili.com/";

/// 平台各站点地址。
///
/// 说明：
/// - `api_base`：资源接口站点（视频信息、个人信息）
/// - `passport_base`：账号接口站点（登录、二维码、退出）
/// - `cookie_origin`：读取会话 Cookie 串时使用的来源
/// - `cookie_domain`：恢复会话时写回 Cookie 的域；`None` 表示仅限 `cookie_origin` 主机
#[derive(Debug, Clone)]
pub struct BilibiliEndpoints {
    pub api_base: String,
    pub passport_base: String,
    pub cookie_origin: Url,
    pub cookie_domain: Option<String>,
}

impl BilibiliEndpoints {
    /// 所有接口都指向同一个站点（本地联调/测试桩）。
    pub fn single_host(base: &str) -> Result<Self, BilibiliError> {
        let base = base.trim_end_matches('/').to_string();
        let cookie_origin = Url::parse(&format!("{base}/"))
            .map_err(|e| BilibiliError::Endpoint(format!("{base}: {e}")))?;
        Ok(Self {
            api_base: base.clone(),
            passport_base: base,
            cookie_origin,
            cookie_domain: None,
        })
    }

    pub fn api(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    pub fn passport(&self, path: &str) -> String {
        format!("{}{path}", self.passport_base)
    }
}

impl Default for BilibiliEndpoints {
    fn default() -> Self {
        Self {
            api_base: "https://api.bilibili.com".to_string(),
            passport_base: "https://passport.bilibili.com".to_string(),
            // 常量地址，解析不会失败
            cookie_origin: Url::parse(HOME_URL).expect("valid home url"),
            cookie_domain: Some(".bilibili.com".to_string()),
        }
    }
}

/// 平台统一响应外壳 `{ code, message, data }`。
///
/// `code != 0` 表示失败，`message` 为可读原因。其余顶层字段（如 `ttl`）
/// 保存在 `extra` 中，序列化时原样写回。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// 将非零 `code` 转为带平台原因的错误。
    pub fn into_success(self, stage: &'static str) -> Result<Self, BilibiliError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(BilibiliError::Remote {
                stage,
                code: self.code,
                message: self.message,
            })
        }
    }
}

/// 密码加密配置：公钥与盐。
#[derive(Debug, Clone, Deserialize)]
pub struct EncryptionSettings {
    pub hash: String,
    pub key: String,
}

/// 人机验证结果，由调用方从验证服务获得后原样传入。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptchaChallenge {
    pub token: String,
    pub challenge: String,
    pub validate: String,
    pub seccode: String,
}

/// 密码登录表单。字段顺序与平台网页端一致。
#[derive(Debug, Serialize)]
pub(crate) struct PasswordLoginForm<'a> {
    pub source: &'static str,
    pub username: &'a str,
    pub password: &'a str,
    pub keep: bool,
    pub token: &'a str,
    pub go_url: &'static str,
    pub challenge: &'a str,
    pub validate: &'a str,
    pub seccode: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct VideoInfoQuery<'a> {
    pub bvid: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct PlayUrlQuery<'a> {
    pub cid: &'a str,
    pub bvid: &'a str,
    pub fourk: u8,
    pub otype: &'static str,
    pub fnver: u8,
    pub fnval: u32,
}

impl<'a> PlayUrlQuery<'a> {
    pub fn new(bvid: &'a str, cid: &'a str) -> Self {
        Self {
            cid,
            bvid,
            fourk: 1,
            otype: "json",
            fnver: 0,
            fnval: 976,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct QrPollForm<'a> {
    #[serde(rename = "oauthKey")]
    pub oauth_key: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct LogoutForm<'a> {
    #[serde(rename = "biliCSRF")]
    pub bili_csrf: &'a str,
    pub gourl: &'static str,
}

/// 二维码登录票据。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrTicket {
    pub url: String,
    pub oauth_key: String,
}

/// 二维码轮询结果（单次）。
///
/// 说明：
/// - `status` 为真表示已确认登录
/// - 未完成时 `data` 为状态码：-1 票据无效、-2 已过期、-4 未扫码、-5 已扫码未确认
/// - `message` 仅供展示，类型不做约束
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QrPollResponse {
    #[serde(default, deserialize_with = "truthy")]
    pub status: bool,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub data: Value,
}

/// 二维码登录所处阶段，便于调用方判断是否继续轮询。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrLoginState {
    Confirmed,
    InvalidKey,
    Expired,
    NotScanned,
    ScannedUnconfirmed,
    Unknown(Option<i64>),
}

impl QrLoginState {
    /// 是否为终态（不应继续轮询）。
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::InvalidKey | Self::Expired)
    }

    /// 直接从原始轮询响应判断阶段，只看 `status` 与 `data` 两个字段。
    pub fn from_raw(raw: &Value) -> Self {
        let status = raw.get("status").is_some_and(is_truthy);
        Self::from_parts(status, raw.get("data").unwrap_or(&Value::Null))
    }

    fn from_parts(status: bool, data: &Value) -> Self {
        if status {
            return Self::Confirmed;
        }
        match data.as_i64() {
            Some(-1) => Self::InvalidKey,
            Some(-2) => Self::Expired,
            Some(-4) => Self::NotScanned,
            Some(-5) => Self::ScannedUnconfirmed,
            other => Self::Unknown(other),
        }
    }
}

impl QrPollResponse {
    pub fn state(&self) -> QrLoginState {
        QrLoginState::from_parts(self.status, &self.data)
    }
}

/// JS 真值规则：`false`/`0`/`""`/`null` 为假，其余为真。
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(is_truthy(&Value::deserialize(deserializer)?))
}
