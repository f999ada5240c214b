//! bilidown 主进程核心库。
//!
//! 功能：
//! - 服务桥：把各功能服务的异步操作注册为 `服务名:操作名` 通道并分发调用
//! - 本机 IPC 协议与服务循环（界面进程通过它调用通道）
//! - 视频平台账号服务：密码登录、二维码登录、退出登录、只读查询
//! - 配置存储（含会话 Cookie 串）与共享 Cookie 罐的网络访问
//! - 统一路径与目录约定
//!
//! 作者：bilidown 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

pub mod bilibili;
pub mod bridge;
pub mod config;
pub mod ipc;
pub mod network;
pub mod paths;
pub mod services;
pub mod session;
