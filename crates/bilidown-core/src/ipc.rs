//! 界面进程与主进程之间的 IPC 协议与服务循环。
//!
//! 协议形态：
//! - 以 JSON 序列化 [`IpcRequest`] / [`IpcResponse`]，按“单行一条消息”的方式传输
//! - 每条消息携带 `request_id` 用于请求-响应关联
//! - 同一连接上的请求各自独立分发，响应按完成先后写回，不保证与请求顺序一致
//!
//! 约束与注意事项：
//! - `message` 字段为操作错误的原始描述，界面侧负责展示
//! - 仅监听本机回环地址
//!
//! 作者：bilidown 项目组
//! 创建时间：2026-10-18
//! 修改时间：2026-10-18

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridge::Bridge;

/// IPC 请求消息。
///
/// 序列化格式：
/// - 使用 `#[serde(tag = "type")]`，在 JSON 中通过 `type` 字段区分请求类型。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcRequest {
    /// 调用一个通道。
    ///
    /// 参数：
    /// - `request_id`：请求 ID
    /// - `channel`：通道名（`服务名:操作名`）
    /// - `args`：位置参数，缺省为空
    Invoke {
        request_id: Uuid,
        channel: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// 列出全部已注册通道。
    ListChannels { request_id: Uuid },
}

/// IPC 响应消息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    /// 操作成功及其返回值。
    Resolved { request_id: Uuid, value: Value },
    /// 操作失败（或请求无法解析，此时 `request_id` 为全零）。
    Rejected { request_id: Uuid, message: String },
    /// `ListChannels` 的响应。
    Channels {
        request_id: Uuid,
        channels: Vec<String>,
    },
}

/// 处理单条 IPC 请求并返回响应。
///
/// 返回值：
/// - 总是返回 [`IpcResponse`]；错误通过 `IpcResponse::Rejected` 表达
pub async fn handle_request(bridge: &Bridge, req: IpcRequest) -> IpcResponse {
    match req {
        IpcRequest::Invoke {
            request_id,
            channel,
            args,
        } => match bridge.invoke(&channel, args).await {
            Ok(value) => IpcResponse::Resolved { request_id, value },
            Err(e) => {
                debug!("通道 {channel} 调用失败: {e}");
                IpcResponse::Rejected {
                    request_id,
                    message: e.to_string(),
                }
            }
        },
        IpcRequest::ListChannels { request_id } => IpcResponse::Channels {
            request_id,
            channels: bridge.channels().map(str::to_string).collect(),
        },
    }
}

/// IPC 监听主循环：接收连接并为每个连接启动异步任务。
///
/// 异常处理：
/// - `accept()` 失败会直接向上传播（通常为系统资源问题）
pub async fn serve(listener: TcpListener, bridge: Arc<Bridge>) -> std::io::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("IPC 连接建立: {addr}");
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move {
            if let Err(e) = serve_connection(stream, bridge).await {
                warn!("IPC 连接异常结束: {e}");
            }
            debug!("IPC 连接关闭: {addr}");
        });
    }
}

/// 单条请求（含换行）的最大字节数。超过时该行被丢弃并回复 `Rejected`。
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// 单个连接上“执行中 + 待写回”的响应上限；达到上限时暂停读取新请求。
pub const MAX_PENDING_RESPONSES: usize = 64;

/// 读取一行请求的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineRead {
    Eof,
    Line,
    TooLong,
}

/// 读取一行（至多 `limit` 字节）到 `buf`。
///
/// 超长时继续读到换行为止并丢弃，连接仍可继续使用。
async fn read_request_line<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = (&mut *reader).take(limit as u64).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(LineRead::Eof);
    }
    if n < limit || buf.last() == Some(&b'\n') {
        return Ok(LineRead::Line);
    }

    buf.clear();
    loop {
        let (found, used) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(i) => (true, i + 1),
                None => (false, available.len()),
            }
        };
        reader.consume(used);
        if found {
            break;
        }
    }
    Ok(LineRead::TooLong)
}

/// 处理单个连接：读循环解析请求，每条请求单独起任务分发，写任务串行写回响应。
///
/// 背压：
/// - 每条请求先占用响应队列的一个槽位再分发；队列满时读循环等待，
///   客户端不读响应时不会无限堆积任务与响应
async fn serve_connection(stream: TcpStream, bridge: Arc<Bridge>) -> std::io::Result<()> {
    let (reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::channel::<IpcResponse>(MAX_PENDING_RESPONSES);
    let writer_task = tokio::spawn(write_loop(writer, rx));

    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        let rejected = match read_request_line(&mut reader, &mut line, MAX_REQUEST_BYTES).await? {
            LineRead::Eof => break,
            LineRead::TooLong => Some(format!("bad request: 请求超过 {MAX_REQUEST_BYTES} 字节")),
            LineRead::Line if line.iter().all(u8::is_ascii_whitespace) => continue,
            // 协议采用“单行一条 JSON”，便于调试与跨语言实现。
            LineRead::Line => match serde_json::from_slice::<IpcRequest>(&line) {
                Ok(req) => {
                    let Ok(permit) = tx.clone().reserve_owned().await else {
                        break;
                    };
                    let bridge = Arc::clone(&bridge);
                    tokio::spawn(async move {
                        let resp = handle_request(&bridge, req).await;
                        permit.send(resp);
                    });
                    None
                }
                Err(e) => Some(format!("bad request: {e}")),
            },
        };
        if let Some(message) = rejected {
            let resp = IpcResponse::Rejected {
                request_id: Uuid::nil(),
                message,
            };
            if tx.send(resp).await.is_err() {
                break;
            }
        }
    }

    // 读端关闭后等待在途请求写完
    drop(tx);
    match writer_task.await {
        Ok(result) => result,
        Err(e) => {
            info!("IPC 写任务被取消: {e}");
            Ok(())
        }
    }
}

/// 将响应序列化为 JSON 并逐行写回连接。
async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<IpcResponse>) -> std::io::Result<()> {
    while let Some(resp) = rx.recv().await {
        let mut s = serde_json::to_string(&resp)?;
        s.push('\n');
        writer.write_all(s.as_bytes()).await?;
    }
    writer.shutdown().await
}
