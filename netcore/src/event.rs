//! 会话事件定义
//!
//! 会话通过事件向外部协作方报告收发与生命周期变化，异步路径上的错误
//! 也只以事件形式出现，不会跨越异步边界抛出。

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

/// 会话生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// 客户端正在建立连接
    Connecting,
    /// 正常收发
    Active,
    /// 半关闭：不再接受新的写入，等待已排队的数据发送完毕
    Draining,
    /// 终态
    Closed,
}

impl Phase {
    /// 是否允许从当前阶段转移到 `to`
    pub fn can_advance_to(self, to: Phase) -> bool {
        matches!(
            (self, to),
            (Phase::Connecting, Phase::Active)
                | (Phase::Connecting, Phase::Closed)
                | (Phase::Active, Phase::Draining)
                | (Phase::Active, Phase::Closed)
                | (Phase::Draining, Phase::Closed)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Connecting => "connecting",
            Phase::Active => "active",
            Phase::Draining => "draining",
            Phase::Closed => "closed",
        };
        f.write_str(name)
    }
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// 会话 ID，进程内唯一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 粗粒度错误原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorReason {
    ConnectionFailed,
    ConnectionReset,
    ConnectionAborted,
    BrokenPipe,
    AddressInUse,
    /// 累积缓冲区超过上限仍未找到分隔符
    FrameTooLarge,
    Other,
}

impl ErrorReason {
    /// 从 IO 错误映射
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused | io::ErrorKind::NotConnected => {
                ErrorReason::ConnectionFailed
            }
            io::ErrorKind::ConnectionReset => ErrorReason::ConnectionReset,
            io::ErrorKind::ConnectionAborted => ErrorReason::ConnectionAborted,
            io::ErrorKind::BrokenPipe | io::ErrorKind::WriteZero => ErrorReason::BrokenPipe,
            io::ErrorKind::AddrInUse => ErrorReason::AddressInUse,
            _ => ErrorReason::Other,
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorReason::ConnectionFailed => "connection failed",
            ErrorReason::ConnectionReset => "connection reset",
            ErrorReason::ConnectionAborted => "connection aborted",
            ErrorReason::BrokenPipe => "broken pipe",
            ErrorReason::AddressInUse => "address in use",
            ErrorReason::FrameTooLarge => "frame too large",
            ErrorReason::Other => "transport error",
        };
        f.write_str(name)
    }
}

/// 事件内容
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// 收到一条完整消息（不含分隔符）
    Received(Bytes),
    /// 一条消息已完整发送
    Sent(Bytes),
    /// 传输错误，`phase` 为错误处理后会话所处的阶段
    Error {
        reason: ErrorReason,
        phase: Phase,
        detail: String,
    },
    /// 会话进入终态
    Closed,
}

/// 带会话 ID 的事件
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub kind: EventKind,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            EventKind::Received(bytes) => {
                write!(f, "[{}] Bytes received: {}", self.session, HexDump(bytes))
            }
            EventKind::Sent(bytes) => {
                write!(f, "[{}] Bytes written: {}", self.session, HexDump(bytes))
            }
            EventKind::Error {
                reason,
                phase,
                detail,
            } => write!(f, "[{}] Error ({}, now {}): {}", self.session, reason, phase, detail),
            EventKind::Closed => write!(f, "[{}] Session closed", self.session),
        }
    }
}

/// 十六进制显示字节
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// 事件发送端
pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

/// 事件接收端
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// 创建事件通道
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
