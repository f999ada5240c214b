//! 服务桥：把各功能服务的异步操作注册为独立命名的请求/响应通道。
//!
//! 约定：
//! - 通道名固定为 `<服务名>:<操作名>`，启动时注册一次，进程生命周期内不变
//! - 调用参数为位置参数列表（JSON 数组），由各操作自行按位置取值
//! - 操作返回的错误原样传回调用方，不吞掉也不改写
//! - 重复的通道名在注册阶段直接报错，不允许后注册者覆盖先注册者
//! - 各通道之间相互独立，可并发调用，没有顺序保证
//!
//! 作者：bilidown 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// 已注册的通道处理函数。
pub type Handler = Arc<dyn Fn(Args) -> BoxFuture<Result<Value, BridgeError>> + Send + Sync>;

/// 服务桥错误。
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("未注册的通道: {0}")]
    UnknownChannel(String),
    #[error("通道重复注册: {0}")]
    DuplicateChannel(String),
    #[error("第 {index} 个参数 {name} 无效: {reason}")]
    InvalidArgument {
        index: usize,
        name: &'static str,
        reason: String,
    },
    #[error("返回值序列化失败: {0}")]
    Encode(#[source] serde_json::Error),
    /// 操作本身失败；显示内容与原始错误一致。
    #[error(transparent)]
    Operation(#[from] anyhow::Error),
}

impl BridgeError {
    pub fn operation<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Operation(anyhow::Error::new(err))
    }
}

/// 服务标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceId {
    Bilibili,
    Config,
}

impl ServiceId {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bilibili => "bilibili",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 操作标识，由各服务以枚举实现。
pub trait OperationId: Copy + Send + Sync + 'static {
    fn name(self) -> &'static str;
}

/// 由服务名与操作名生成通道名。
pub fn make_channel_name(service: &str, operation: &str) -> String {
    format!("{service}:{operation}")
}

/// 一次调用的位置参数。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    /// 按位置取必填参数并反序列化为目标类型。
    ///
    /// 异常处理：
    /// - 参数缺失或类型不符：`InvalidArgument`
    pub fn required<T: DeserializeOwned>(&self, index: usize, name: &'static str) -> Result<T, BridgeError> {
        let value = self.0.get(index).ok_or_else(|| BridgeError::InvalidArgument {
            index,
            name,
            reason: "缺少参数".to_string(),
        })?;
        serde_json::from_value(value.clone()).map_err(|e| BridgeError::InvalidArgument {
            index,
            name,
            reason: e.to_string(),
        })
    }

    /// 取字符串参数；数字会被转为十进制字符串（界面侧常把 ID 当数字传）。
    pub fn string_like(&self, index: usize, name: &'static str) -> Result<String, BridgeError> {
        match self.0.get(index) {
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => self.required(index, name),
        }
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// 服务描述：服务标识 + 操作表。
pub struct ServiceDescriptor {
    id: ServiceId,
    operations: Vec<(&'static str, Handler)>,
}

impl ServiceDescriptor {
    pub fn new(id: ServiceId) -> Self {
        Self {
            id,
            operations: Vec::new(),
        }
    }

    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn operation_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.operations.iter().map(|(name, _)| *name)
    }

    /// 添加一个操作。返回值会被序列化为 JSON 交给调用方。
    pub fn operation<O, F, Fut, T>(mut self, op: O, f: F) -> Self
    where
        O: OperationId,
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BridgeError>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let handler: Handler = Arc::new(move |args: Args| -> BoxFuture<Result<Value, BridgeError>> {
            let fut = f(args);
            Box::pin(async move {
                let value = fut.await?;
                serde_json::to_value(value).map_err(BridgeError::Encode)
            })
        });
        self.operations.push((op.name(), handler));
        self
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("id", &self.id)
            .field("operations", &self.operation_names().collect::<Vec<_>>())
            .finish()
    }
}

/// 通道分发器。
#[derive(Clone, Default)]
pub struct Bridge {
    handlers: BTreeMap<String, Handler>,
}

impl Bridge {
    /// 注册全部服务描述。
    ///
    /// 异常处理：
    /// - 任意两个操作生成相同通道名（服务名重复或同一服务内操作名重复）：
    ///   返回 `DuplicateChannel`，不产生部分注册的分发器
    pub fn register<I>(descriptors: I) -> Result<Self, BridgeError>
    where
        I: IntoIterator<Item = ServiceDescriptor>,
    {
        let mut handlers = BTreeMap::new();
        for descriptor in descriptors {
            let service = descriptor.id.name();
            for (operation, handler) in descriptor.operations {
                let channel = make_channel_name(service, operation);
                if handlers.contains_key(&channel) {
                    return Err(BridgeError::DuplicateChannel(channel));
                }
                debug!("注册通道 {channel}");
                handlers.insert(channel, handler);
            }
        }
        Ok(Self { handlers })
    }

    /// 已注册的全部通道名（按字典序）。
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.handlers.contains_key(channel)
    }

    /// 调用指定通道。
    ///
    /// 返回值：
    /// - 操作成功：序列化后的返回值
    ///
    /// 异常处理：
    /// - 通道不存在：`UnknownChannel`
    /// - 其余错误为操作本身返回的错误
    pub async fn invoke(&self, channel: &str, args: Vec<Value>) -> Result<Value, BridgeError> {
        let handler = self
            .handlers
            .get(channel)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownChannel(channel.to_string()))?;
        handler(Args::new(args)).await
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("channels", &self.channels().collect::<Vec<_>>())
            .finish()
    }
}
