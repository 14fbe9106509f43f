//! 流式（TCP）会话

use std::net::SocketAddr;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::error::{NetError, Result};
use crate::event::{EventSender, Phase};
use crate::reactor::ReactorHandle;
use crate::session::{Session, SessionConfig, Shared};
use crate::transport::{
    connect_stream, Endpoint, StreamSink, StreamSource, TransportConfig, TransportKind,
};

/// TCP 会话
pub type StreamSession = Session<StreamSource<OwnedReadHalf>, StreamSink<OwnedWriteHalf>>;

/// 主动连接服务器
///
/// 会话以 `Connecting` 阶段创建；连接失败时发出 `Error`（原因为 `ConnectionFailed`）
/// 和 `Closed` 事件并返回 [`NetError::ConnectionFailed`]，不会自动重试。
pub async fn connect(
    reactor: &ReactorHandle,
    addr: &str,
    transport: &TransportConfig,
    config: SessionConfig,
    events: EventSender,
) -> Result<StreamSession> {
    let endpoint = Endpoint::resolve(addr, TransportKind::Stream)
        .await
        .map_err(|e| NetError::ConnectionFailed {
            addr: addr.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
        })?;

    let shared = Shared::new(endpoint, Phase::Connecting, events);
    let stream = match connect_stream(endpoint.addr(), transport).await {
        Ok(stream) => stream,
        Err(source) => {
            warn!("Session {} failed to connect to {}: {}", shared.id(), endpoint, source);
            shared.on_connect_failure(&source);
            return Err(NetError::ConnectionFailed {
                addr: addr.to_string(),
                source,
            });
        }
    };

    shared.transition(Phase::Active);
    info!("Session {} connected to {}", shared.id(), endpoint);

    let (reader, writer) = stream.into_split();
    Ok(Session::with_shared(
        reactor,
        shared,
        StreamSource::with_chunk(reader, config.read_buffer_size),
        StreamSink::new(writer),
        config,
    ))
}

/// 包装服务端接受的连接，会话直接处于 `Active` 阶段
pub fn accepted(
    reactor: &ReactorHandle,
    stream: TcpStream,
    peer: SocketAddr,
    transport: &TransportConfig,
    config: SessionConfig,
    events: EventSender,
) -> Result<StreamSession> {
    stream.set_nodelay(transport.nodelay)?;
    let (reader, writer) = stream.into_split();
    Ok(Session::from_parts(
        reactor,
        Endpoint::stream(peer),
        StreamSource::with_chunk(reader, config.read_buffer_size),
        StreamSink::new(writer),
        config,
        events,
    ))
}
