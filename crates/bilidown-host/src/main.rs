//! bilidown 主进程。
//!
//! 职责：
//! - 打开配置存储，用已保存的 Cookie 串恢复登录会话
//! - 构建服务桥，启动本机 IPC 服务供界面进程调用各通道
//! - 把实际监听地址以 `BILIDOWN_IPC_ADDR=<地址>` 打到标准输出，界面进程据此连接
//! - 日志一律写标准错误，标准输出只留给上面这类约定输出
//!
//! 安全注意：
//! - IPC 仅监听 127.0.0.1；会话 Cookie 串明文保存在配置文件中
//!
//! 作者：bilidown 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bilidown_core::bilibili::api::BilibiliEndpoints;
use bilidown_core::bilibili::BilibiliService;
use bilidown_core::config::ConfigStore;
use bilidown_core::network::NetworkAccess;
use bilidown_core::session::SessionContext;
use bilidown_core::{ipc, paths, services};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "bilidown-host", version)]
struct Cli {
    /// 配置文件路径；缺省为 `<应用根目录>/config.json`
    #[arg(long)]
    config: Option<PathBuf>,

    /// IPC 监听地址（端口为 0 时由系统分配）
    #[arg(long, default_value = "127.0.0.1:0")]
    listen: SocketAddr,

    /// 只打印已注册的通道后退出
    #[arg(long, default_value_t = false)]
    list_channels: bool,
}

/// 程序入口：初始化日志、恢复会话、注册通道并启动 IPC 服务。
///
/// 异常处理：
/// - 配置读取、通道注册、端口绑定失败会直接返回错误
/// - 收到 Ctrl+C 时正常退出
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => paths::default_config_file()?,
    };
    let config = open_config(&config_path)?;
    info!("配置文件: {}", config_path.display());

    let ctx = SessionContext::new(Arc::new(config), Arc::new(NetworkAccess::new()));
    let bilibili = Arc::new(BilibiliService::new(ctx.clone(), BilibiliEndpoints::default()));
    if bilibili.restore_session() == 0 {
        info!("未登录");
    }

    let bridge = services::init_bridge(bilibili, Arc::clone(&ctx.config)).context("注册服务通道失败")?;

    if cli.list_channels {
        for channel in bridge.channels() {
            println!("{channel}");
        }
        return Ok(());
    }

    if !cli.listen.ip().is_loopback() {
        bail!("IPC 只允许监听本机回环地址: {}", cli.listen);
    }
    let listener = TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("绑定 IPC 端口失败: {}", cli.listen))?;
    let addr = listener.local_addr()?;
    info!("IPC server listening on {addr}");
    println!("BILIDOWN_IPC_ADDR={addr}");

    tokio::select! {
        result = ipc::serve(listener, Arc::new(bridge)) => {
            result.context("IPC 服务异常退出")?;
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("监听退出信号失败: {e}");
            }
            info!("收到退出信号，主进程退出");
        }
    }
    Ok(())
}

/// 打开配置文件；所在目录不存在时先创建。
fn open_config(path: &Path) -> Result<ConfigStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        paths::ensure_dir(parent)?;
    }
    ConfigStore::open(path).with_context(|| format!("读取配置失败: {}", path.display()))
}
