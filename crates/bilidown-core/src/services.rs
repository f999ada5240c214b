//! 服务注册表：启动时挂到服务桥上的全部功能服务。
//!
//! 当前服务：
//! - `bilibili`：账号登录、会话维护、视频信息查询
//! - `config`：配置读写
//!
//! 作者：bilidown 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::sync::Arc;

use serde_json::Value;

use crate::bilibili::api::CaptchaChallenge;
use crate::bilibili::BilibiliService;
use crate::bridge::{Args, Bridge, BridgeError, OperationId, ServiceDescriptor, ServiceId};
use crate::config::{AppConfig, ConfigStore};

/// `bilibili` 服务的操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BilibiliOp {
    GetVideoInfo,
    GetVideoPlayUrl,
    GetSelfInfo,
    GetCaptchaSettings,
    LoginWithPassword,
    GetLoginQrCode,
    GetLoginQrCodeStatus,
    LogOut,
}

impl BilibiliOp {
    pub const ALL: [Self; 8] = [
        Self::GetVideoInfo,
        Self::GetVideoPlayUrl,
        Self::GetSelfInfo,
        Self::GetCaptchaSettings,
        Self::LoginWithPassword,
        Self::GetLoginQrCode,
        Self::GetLoginQrCodeStatus,
        Self::LogOut,
    ];
}

impl OperationId for BilibiliOp {
    fn name(self) -> &'static str {
        match self {
            Self::GetVideoInfo => "getVideoInfo",
            Self::GetVideoPlayUrl => "getVideoPlayUrl",
            Self::GetSelfInfo => "getSelfInfo",
            Self::GetCaptchaSettings => "getCaptchaSettings",
            Self::LoginWithPassword => "loginWithPassword",
            Self::GetLoginQrCode => "getLoginQrCode",
            Self::GetLoginQrCodeStatus => "getLoginQrCodeStatus",
            Self::LogOut => "logOut",
        }
    }
}

/// `config` 服务的操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOp {
    GetAll,
    Get,
    Set,
}

impl ConfigOp {
    pub const ALL: [Self; 3] = [Self::GetAll, Self::Get, Self::Set];
}

impl OperationId for ConfigOp {
    fn name(self) -> &'static str {
        match self {
            Self::GetAll => "getAll",
            Self::Get => "get",
            Self::Set => "set",
        }
    }
}

/// 把共享服务对象绑进每次调用。
fn with<S, F, Fut>(service: &Arc<S>, f: F) -> impl Fn(Args) -> Fut + Send + Sync + 'static
where
    S: Send + Sync + 'static,
    F: Fn(Arc<S>, Args) -> Fut + Send + Sync + 'static,
{
    let service = Arc::clone(service);
    move |args| f(Arc::clone(&service), args)
}

/// `bilibili` 服务描述。
///
/// 参数（按位置）：
/// - `getVideoInfo(bvid)`
/// - `getVideoPlayUrl(bvid, cid)`
/// - `loginWithPassword(username, password, captcha)`
/// - `getLoginQrCodeStatus(oauthKey)`
/// - 其余操作无参数
pub fn bilibili_descriptor(service: Arc<BilibiliService>) -> ServiceDescriptor {
    ServiceDescriptor::new(ServiceId::Bilibili)
        .operation(
            BilibiliOp::GetVideoInfo,
            with(&service, |svc, args| async move {
                let bvid: String = args.required(0, "bvid")?;
                svc.get_video_info(&bvid).await.map_err(BridgeError::operation)
            }),
        )
        .operation(
            BilibiliOp::GetVideoPlayUrl,
            with(&service, |svc, args| async move {
                let bvid: String = args.required(0, "bvid")?;
                let cid = args.string_like(1, "cid")?;
                svc.get_video_play_url(&bvid, &cid)
                    .await
                    .map_err(BridgeError::operation)
            }),
        )
        .operation(
            BilibiliOp::GetSelfInfo,
            with(&service, |svc, _args| async move {
                svc.get_self_info().await.map_err(BridgeError::operation)
            }),
        )
        .operation(
            BilibiliOp::GetCaptchaSettings,
            with(&service, |svc, _args| async move {
                svc.get_captcha_settings().await.map_err(BridgeError::operation)
            }),
        )
        .operation(
            BilibiliOp::LoginWithPassword,
            with(&service, |svc, args| async move {
                let username: String = args.required(0, "username")?;
                let password: String = args.required(1, "password")?;
                let captcha: CaptchaChallenge = args.required(2, "captcha")?;
                svc.login_with_password(&username, &password, &captcha)
                    .await
                    .map_err(BridgeError::operation)
            }),
        )
        .operation(
            BilibiliOp::GetLoginQrCode,
            with(&service, |svc, _args| async move {
                svc.get_login_qr_code().await.map_err(BridgeError::operation)
            }),
        )
        .operation(
            BilibiliOp::GetLoginQrCodeStatus,
            with(&service, |svc, args| async move {
                let oauth_key: String = args.required(0, "oauthKey")?;
                svc.get_login_qr_code_status(&oauth_key)
                    .await
                    .map_err(BridgeError::operation)
            }),
        )
        .operation(
            BilibiliOp::LogOut,
            with(&service, |svc, _args| async move {
                svc.log_out().await.map_err(BridgeError::operation)
            }),
        )
}

/// `config` 服务描述：`getAll()`、`get(key)`、`set(key, value)`。
pub fn config_descriptor(store: Arc<ConfigStore>) -> ServiceDescriptor {
    ServiceDescriptor::new(ServiceId::Config)
        .operation(
            ConfigOp::GetAll,
            with(&store, |store, _args| async move { Ok::<AppConfig, BridgeError>(store.get_all()) }),
        )
        .operation(
            ConfigOp::Get,
            with(&store, |store, args| async move {
                let key: String = args.required(0, "key")?;
                Ok::<Option<Value>, BridgeError>(store.get(&key))
            }),
        )
        .operation(
            ConfigOp::Set,
            with(&store, |store, args| async move {
                let key: String = args.required(0, "key")?;
                let value: Value = args.required(1, "value")?;
                store.set(&key, value).map_err(BridgeError::operation)
            }),
        )
}

/// 全部服务描述（注册顺序即此处顺序）。
pub fn bridges(bilibili: Arc<BilibiliService>, config: Arc<ConfigStore>) -> Vec<ServiceDescriptor> {
    vec![bilibili_descriptor(bilibili), config_descriptor(config)]
}

/// 构建服务桥。
///
/// 异常处理：
/// - 通道名冲突时返回 `DuplicateChannel`（属于启动期编程错误）
pub fn init_bridge(bilibili: Arc<BilibiliService>, config: Arc<ConfigStore>) -> Result<Bridge, BridgeError> {
    Bridge::register(bridges(bilibili, config))
}
