//! 会话上下文：认证引擎依赖的两份共享可变状态。
//!
//! 进程启动时创建一次，显式注入到各服务，进程退出时随之释放。
//!
//! 作者：bilidown 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::sync::Arc;

use crate::config::ConfigStore;
use crate::network::NetworkAccess;

/// 会话上下文。
///
/// 说明：
/// - `config`：保存 `cookieString` 的配置存储
/// - `network`：绑定共享 Cookie 罐的网络访问入口
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub config: Arc<ConfigStore>,
    pub network: Arc<NetworkAccess>,
}

impl SessionContext {
    pub fn new(config: Arc<ConfigStore>, network: Arc<NetworkAccess>) -> Self {
        Self { config, network }
    }

    /// 纯内存上下文（测试/一次性会话）。
    pub fn in_memory() -> Self {
        Self::new(Arc::new(ConfigStore::in_memory()), Arc::new(NetworkAccess::new()))
    }
}
