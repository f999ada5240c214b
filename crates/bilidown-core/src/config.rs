//! 应用配置存储（config.json）。
//!
//! 目的：
//! - 保存登录会话的 Cookie 串（`cookieString`），供认证引擎读写
//! - 保存其他界面侧配置（任意键值，原样透传）
//!
//! 约定：
//! - 内存中始终持有一份完整配置；`set` 先更新内存再落盘
//! - 文件不存在视为首次运行，返回默认配置
//! - 不对落盘内容做加密（由系统目录权限保证）
//!
//! 作者：bilidown 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// 会话 Cookie 串在配置中的键名。
pub const COOKIE_STRING_KEY: &str = "cookieString";

/// 配置内容（会序列化为 JSON 存储到应用根目录）。
///
/// 字段说明：
/// - `cookie_string`：已登录会话的 Cookie 请求头串；未登录时为空串
/// - `extra`：其余配置项，平铺在 JSON 顶层
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub cookie_string: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 配置读写错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读写配置文件失败: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件失败: {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("配置项 {key} 的值不合法: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// 键值配置存储。
///
/// 并发：
/// - 内部使用互斥锁保护；同一时刻只有一个写入者，最后写入者生效
/// - 落盘在持锁期间完成，保证文件内容与内存一致
#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    inner: Mutex<AppConfig>,
}

impl ConfigStore {
    /// 创建不落盘的存储（测试/临时会话）。
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(AppConfig::default()),
        }
    }

    /// 打开（或初始化）指定路径的配置文件。
    ///
    /// 异常处理：
    /// - 文件不存在：返回默认配置，首次 `set` 时创建文件
    /// - 文件读取失败或 JSON 解析失败：返回错误
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("配置文件不存在，使用默认配置: {}", path.display());
                AppConfig::default()
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        Ok(Self {
            path: Some(path),
            inner: Mutex::new(config),
        })
    }

    /// 落盘路径；内存存储返回 `None`。
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 获取完整配置快照。
    pub fn get_all(&self) -> AppConfig {
        self.lock().clone()
    }

    /// 按键读取单个配置项。
    ///
    /// 返回值：
    /// - 键存在：对应 JSON 值（`cookieString` 为字符串）
    /// - 键不存在：`None`
    pub fn get(&self, key: &str) -> Option<Value> {
        let guard = self.lock();
        if key == COOKIE_STRING_KEY {
            return Some(Value::String(guard.cookie_string.clone()));
        }
        guard.extra.get(key).cloned()
    }

    /// 写入单个配置项并落盘。
    ///
    /// 异常处理：
    /// - `cookieString` 只接受字符串，否则返回 `InvalidValue` 且不做任何修改
    /// - 落盘失败返回 `Io`；此时内存中的值已经更新
    pub fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        let mut guard = self.lock();
        if key == COOKIE_STRING_KEY {
            match value {
                Value::String(s) => guard.cookie_string = s,
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        reason: format!("需要字符串，实际为 {other}"),
                    })
                }
            }
        } else {
            guard.extra.insert(key.to_string(), value);
        }
        self.persist(&guard)
    }

    /// 当前会话 Cookie 串（未登录为空串）。
    pub fn cookie_string(&self) -> String {
        self.lock().cookie_string.clone()
    }

    pub fn set_cookie_string(&self, cookie_string: impl Into<String>) -> Result<(), ConfigError> {
        self.set(COOKIE_STRING_KEY, Value::String(cookie_string.into()))
    }

    fn lock(&self) -> MutexGuard<'_, AppConfig> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let bytes = serde_json::to_vec_pretty(config).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        std::fs::write(path, bytes).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })
    }
}
