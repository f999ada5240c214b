//! 视频平台账号服务：登录、会话维护与只读查询。
//!
//! 登录路径（互相独立，最终都落到同一个会话 Cookie 串上）：
//! - 密码登录：获取公钥与盐 → 加密密码 → 提交表单（附人机验证结果）→ 保存 Cookie 串
//! - 二维码登录：获取票据；之后由调用方按自己的节奏反复调用单次轮询，
//!   轮询确认成功时保存 Cookie 串。本服务不持有轮询循环，也不做超时/取消
//! - 退出登录：尽力通知平台失效会话，随后无条件清空本地会话
//!
//! 并发：
//! - 不对同一会话的多个登录流程做串行化；并发登录时最后写入者生效
//!
//! 作者：bilidown 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

pub mod api;
pub mod crypto;
pub mod csrf;

use std::fmt::Display;
use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ConfigError;
use crate::session::SessionContext;
use api::{
    BilibiliEndpoints, CaptchaChallenge, EncryptionSettings, Envelope, LogoutForm,
    PasswordLoginForm, PlayUrlQuery, QrLoginState, QrPollForm, QrTicket, VideoInfoQuery,
};
use crypto::CryptoError;

/// 账号服务错误。
#[derive(Debug, Error)]
pub enum BilibiliError {
    /// 平台返回了非零 `code`。
    #[error("{stage}：{message}")]
    Remote {
        stage: &'static str,
        code: i64,
        message: String,
    },
    #[error("网络请求失败: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("响应解析失败: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("响应缺少 data 字段: {0}")]
    MissingData(&'static str),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("接口地址无效: {0}")]
    Endpoint(String),
}

/// 密码登录所处阶段（仅用于日志）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PasswordLoginStage {
    FetchingKey,
    Encrypting,
    Submitting,
}

/// 账号服务。
///
/// 会话资源（配置存储 + Cookie 罐）通过 [`SessionContext`] 注入，
/// 不依赖任何全局单例。
#[derive(Debug, Clone)]
pub struct BilibiliService {
    ctx: SessionContext,
    endpoints: BilibiliEndpoints,
}

impl BilibiliService {
    pub fn new(ctx: SessionContext, endpoints: BilibiliEndpoints) -> Self {
        Self { ctx, endpoints }
    }

    pub fn endpoints(&self) -> &BilibiliEndpoints {
        &self.endpoints
    }

    /// 启动时用已保存的 Cookie 串恢复会话。
    ///
    /// 返回值：
    /// - 恢复的 Cookie 条数；未登录时为 0
    pub fn restore_session(&self) -> usize {
        let cookie_string = self.ctx.config.cookie_string();
        if cookie_string.is_empty() {
            return 0;
        }
        let restored = self.ctx.network.restore_cookie_string(
            &cookie_string,
            &self.endpoints.cookie_origin,
            self.endpoints.cookie_domain.as_deref(),
        );
        info!("已恢复登录会话（{restored} 条 Cookie）");
        restored
    }

    /// 视频元信息。平台响应原样返回，不检查 `code`。
    pub async fn get_video_info(&self, bvid: &str) -> Result<Value, BilibiliError> {
        let client = self.ctx.network.client().await?;
        let resp = client
            .get(self.endpoints.api(api::VIDEO_INFO_PATH))
            .query(&VideoInfoQuery { bvid })
            .send()
            .await?;
        read_passthrough::<Value>(resp).await
    }

    /// 视频播放地址。平台响应原样返回，不检查 `code`。
    pub async fn get_video_play_url(&self, bvid: &str, cid: &str) -> Result<Value, BilibiliError> {
        let client = self.ctx.network.client().await?;
        let resp = client
            .get(self.endpoints.api(api::PLAY_URL_PATH))
            .query(&PlayUrlQuery::new(bvid, cid))
            .send()
            .await?;
        read_passthrough::<Value>(resp).await
    }

    /// 当前登录用户信息。未登录时平台返回非零 `code`，同样原样返回。
    pub async fn get_self_info(&self) -> Result<Value, BilibiliError> {
        self.get_envelope(self.endpoints.api(api::SELF_INFO_PATH)).await
    }

    /// 人机验证参数（供界面侧拉起验证）。
    pub async fn get_captcha_settings(&self) -> Result<Value, BilibiliError> {
        self.get_envelope(self.endpoints.passport(api::CAPTCHA_PATH)).await
    }

    /// 密码登录。
    ///
    /// 参数：
    /// - `username` / `password`：账号与明文密码
    /// - `captcha`：调用方完成人机验证后得到的四个字段
    ///
    /// 返回值：
    /// - `Ok(())` 即登录成功，此时会话 Cookie 串已写入配置
    ///
    /// 异常处理：
    /// - 获取加密配置或提交登录返回非零 `code`：`Remote`，消息为平台原因；配置不会被修改
    /// - 网络/解析/加密失败：原样向上返回
    pub async fn login_with_password(
        &self,
        username: &str,
        password: &str,
        captcha: &CaptchaChallenge,
    ) -> Result<(), BilibiliError> {
        let client = self.ctx.network.client().await?;

        // 公钥与盐每次登录重新获取，平台可能逐次轮换
        debug!(stage = ?PasswordLoginStage::FetchingKey, "密码登录");
        let resp = client
            .get(self.endpoints.passport(api::ENCRYPTION_KEY_PATH))
            .send()
            .await?;
        let settings: Envelope<EncryptionSettings> = read_json(resp).await?;
        let settings = settings
            .into_success("获取加密配置错误")?
            .data
            .ok_or(BilibiliError::MissingData("加密配置"))?;

        debug!(stage = ?PasswordLoginStage::Encrypting, "密码登录");
        let encrypted = crypto::encrypt_password(&settings.key, &settings.hash, password)?;

        debug!(stage = ?PasswordLoginStage::Submitting, "密码登录");
        let form = PasswordLoginForm {
            source: "main_web",
            username,
            password: &encrypted,
            keep: true,
            token: &captcha.token,
            go_url: api::HOME_URL,
            challenge: &captcha.challenge,
            validate: &captcha.validate,
            seccode: &captcha.seccode,
        };
        let resp = client
            .post(self.endpoints.passport(api::PASSWORD_LOGIN_PATH))
            .form(&form)
            .send()
            .await?;
        let result: Envelope<Value> = read_json(resp).await?;
        result.into_success("登录失败")?;

        self.save_session()?;
        info!("密码登录成功");
        Ok(())
    }

    /// 获取二维码登录票据（一次性 URL 与 `oauthKey`）。不修改任何状态。
    ///
    /// 返回平台原始响应；`data` 需能解析为 [`QrTicket`]（缺省时不检查）。
    pub async fn get_login_qr_code(&self) -> Result<Value, BilibiliError> {
        let client = self.ctx.network.client().await?;
        let resp = client
            .get(self.endpoints.passport(api::QR_TICKET_PATH))
            .send()
            .await?;
        read_passthrough::<QrTicket>(resp).await
    }

    /// 单次查询二维码登录状态。
    ///
    /// 行为：
    /// - 响应 `status` 为真时保存会话 Cookie 串
    /// - 无论是否完成，都原样返回平台响应，由调用方决定是否继续轮询
    ///   （可用 [`QrLoginState::from_raw`] 判断终态）
    /// - 只读取 `status` 与 `data`，其余字段不做类型检查
    ///
    /// 异常处理：
    /// - 响应体不是 JSON 对象：`Decode`
    ///
    /// 轮询间隔、超时与取消均由调用方负责。
    pub async fn get_login_qr_code_status(&self, oauth_key: &str) -> Result<Value, BilibiliError> {
        let client = self.ctx.network.client().await?;
        let resp = client
            .post(self.endpoints.passport(api::QR_POLL_PATH))
            .form(&QrPollForm { oauth_key })
            .send()
            .await?;
        let raw: Value = read_json(resp).await?;
        if !raw.is_object() {
            return Err(BilibiliError::Decode(serde::de::Error::custom(
                "二维码轮询响应不是 JSON 对象",
            )));
        }
        let state = QrLoginState::from_raw(&raw);
        debug!(?state, "二维码登录轮询");

        if state == QrLoginState::Confirmed {
            self.save_session()?;
            info!("二维码登录成功");
        }
        Ok(raw)
    }

    /// 退出登录。
    ///
    /// 步骤：
    /// 1) 从会话 Cookie 串取 CSRF 令牌（缺失时用空串，仍然发起请求）
    /// 2) 通知平台失效会话；任何失败只记日志
    /// 3) 清空 Cookie 罐并把配置中的 Cookie 串置空
    ///
    /// 异常处理：
    /// - 只有第 3 步的配置落盘失败会返回错误；此时内存中的会话已经清空
    pub async fn log_out(&self) -> Result<(), BilibiliError> {
        let cookie_string = self.ctx.config.cookie_string();
        let csrf = csrf::extract_csrf(&cookie_string).unwrap_or_default();
        if csrf.is_empty() {
            debug!("会话中没有 CSRF 令牌，仍尝试通知平台退出");
        }

        ignore_failure("通知平台退出登录", self.invalidate_remote_session(csrf)).await;

        self.ctx.network.remove_all_cookies();
        self.ctx.config.set_cookie_string(String::new())?;
        info!("已退出登录");
        Ok(())
    }

    async fn invalidate_remote_session(&self, csrf: &str) -> Result<(), BilibiliError> {
        let client = self.ctx.network.client().await?;
        let resp = client
            .post(self.endpoints.passport(api::LOGOUT_PATH))
            .form(&LogoutForm {
                bili_csrf: csrf,
                gourl: api::HOME_URL,
            })
            .send()
            .await?;
        let result: Envelope<Value> = read_json(resp).await?;
        result.into_success("退出登录失败")?;
        Ok(())
    }

    async fn get_envelope(&self, url: String) -> Result<Value, BilibiliError> {
        let client = self.ctx.network.client().await?;
        let resp = client.get(url).send().await?;
        read_passthrough::<Value>(resp).await
    }

    fn save_session(&self) -> Result<(), BilibiliError> {
        let cookie_string = self.ctx.network.cookie_string(&self.endpoints.cookie_origin);
        debug!("保存会话 Cookie 串（{} 字节）", cookie_string.len());
        self.ctx.config.set_cookie_string(cookie_string)?;
        Ok(())
    }
}

/// HTTP 状态异常视为网络失败；响应体按目标结构严格解析。
async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, BilibiliError> {
    let body = resp.error_for_status()?.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

/// 透传型接口：按 `Envelope<T>` 校验外壳形状，但返回未经改动的原始响应。
async fn read_passthrough<T: DeserializeOwned>(resp: reqwest::Response) -> Result<Value, BilibiliError> {
    let raw: Value = read_json(resp).await?;
    Envelope::<T>::deserialize(&raw)?;
    Ok(raw)
}

/// 执行一个可失败的步骤，失败只记警告并继续。
async fn ignore_failure<T, E, F>(step: &'static str, fut: F) -> Option<T>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{step}失败（已忽略）: {e}");
            None
        }
    }
}
