//! 配置目录与落盘路径约定。
//!
//! 目标：
//! - 将落盘路径集中管理，避免散落在各模块中
//! - 允许通过环境变量整体重定向（便携模式/测试）
//!
//! 作者：bilidown 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

/// 系统配置目录下的产品目录名。
///
/// 示例（默认）：
/// - Linux：`~/.config/bilidown`
/// - Windows：`%APPDATA%\bilidown`
pub const VENDOR_DIR: &str = "bilidown";

/// 覆盖应用根目录的环境变量名。
pub const HOME_ENV: &str = "BILIDOWN_HOME";

/// 配置文件名。
pub const CONFIG_FILE_NAME: &str = "config.json";

/// 获取应用根目录。
///
/// 返回值：
/// - 设置了 `BILIDOWN_HOME`（且非空）：直接使用该目录
/// - 否则：`<系统配置目录>/bilidown`
///
/// 异常处理：
/// - 当前平台无法定位系统配置目录时返回错误。
pub fn app_home_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var(HOME_ENV) {
        if !home.trim().is_empty() {
            return Ok(PathBuf::from(home));
        }
    }
    let base = dirs::config_dir().ok_or_else(|| anyhow!("无法定位系统配置目录"))?;
    Ok(base.join(VENDOR_DIR))
}

/// 确保目录存在（不存在则递归创建）。
///
/// 异常处理：
/// - 目录创建失败（权限、路径非法等）会返回错误。
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).with_context(|| format!("创建目录失败: {}", path.display()))?;
    Ok(())
}

/// 默认配置文件路径：`<应用根目录>/config.json`。
pub fn default_config_file() -> Result<PathBuf> {
    Ok(app_home_dir()?.join(CONFIG_FILE_NAME))
}
