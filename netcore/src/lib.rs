//! 异步会话网络核心
//!
//! 包含:
//! - 帧编解码 (FrameCodec，以 0x00 结尾的消息)
//! - 写队列 (WriteQueue，同一时刻最多一次写入在途)
//! - 会话 (Session，流式与数据报两种驱动)
//! - 监听器与会话注册表 (Listener, SessionRegistry)
//! - 事件循环 (Reactor)
//! - 控制台命令解析 (Console)

mod codec;
mod constants;
mod error;
mod event;
mod listener;
mod queue;
mod reactor;
mod registry;
mod session;
mod transport;

pub mod console;
pub mod datagram;
pub mod stream;

pub use codec::{Decoded, Frame, FrameCodec};
pub use console::{Command, Console};
pub use constants::*;
pub use datagram::DatagramSession;
pub use error::{NetError, Result};
pub use event::{
    event_channel, ErrorReason, EventKind, EventReceiver, EventSender, HexDump, Phase,
    SessionEvent, SessionId,
};
pub use listener::Listener;
pub use queue::WriteQueue;
pub use reactor::{Reactor, ReactorConfig, ReactorHandle};
pub use registry::SessionRegistry;
pub use session::{Session, SessionConfig, SessionHandle};
pub use stream::StreamSession;
pub use transport::{
    connect_stream, DatagramSink, DatagramSource, Endpoint, FrameSink, FrameSource, PeerSlot,
    ReadOutcome, StreamSink, StreamSource, TransportConfig, TransportKind,
};
