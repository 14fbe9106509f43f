//! 错误类型定义

use std::io;

use thiserror::Error;

/// 网络核心错误类型
///
/// 只有同步调用路径会返回这些错误；异步读写过程中的传输错误
/// 以 [`EventKind::Error`](crate::EventKind::Error) 事件的形式上报。
#[derive(Error, Debug)]
pub enum NetError {
    /// 消息中包含帧分隔符
    #[error("Invalid payload: sentinel byte at offset {offset}")]
    InvalidPayload { offset: usize },

    /// 出站连接未能建立
    #[error("Connection to {addr} failed: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    /// 会话已关闭（或正在关闭，不再接受新的写入）
    #[error("Session closed")]
    SessionClosed,

    /// 地址无法解析
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// 网络核心操作结果类型
pub type Result<T> = std::result::Result<T, NetError>;
