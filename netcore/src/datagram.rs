//! 数据报（UDP）会话
//!
//! 没有建立连接的阶段，也没有对端发起的 EOF：只有显式关闭或致命的套接字错误
//! 才会让会话离开 `Active`。接收循环与写队列相互独立，收发可以同时在途。

use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::info;

use crate::error::{NetError, Result};
use crate::event::EventSender;
use crate::reactor::ReactorHandle;
use crate::session::{Session, SessionConfig};
use crate::transport::{DatagramSink, DatagramSource, Endpoint, PeerSlot, TransportKind};

/// UDP 会话
pub type DatagramSession = Session<DatagramSource, DatagramSink>;

/// 服务端：绑定本地地址，回复最近一次发来报文的对端
pub async fn bind(
    reactor: &ReactorHandle,
    addr: &str,
    config: SessionConfig,
    events: EventSender,
) -> Result<DatagramSession> {
    let socket = Arc::new(UdpSocket::bind(addr).await?);
    let local = Endpoint::datagram(socket.local_addr()?);
    info!("Datagram socket bound on {}", local);

    let peer = Arc::new(PeerSlot::learned());
    Ok(Session::from_parts(
        reactor,
        local,
        DatagramSource::new(Arc::clone(&socket), Arc::clone(&peer)),
        DatagramSink::new(socket, peer),
        config,
        events,
    ))
}

/// 客户端：绑定临时端口，只与 `addr` 通信
pub async fn connect(
    reactor: &ReactorHandle,
    addr: &str,
    config: SessionConfig,
    events: EventSender,
) -> Result<DatagramSession> {
    let remote = Endpoint::resolve(addr, TransportKind::Datagram).await?;
    let local_addr = if remote.addr().is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    };
    let socket = UdpSocket::bind(local_addr)
        .await
        .map_err(|source| NetError::ConnectionFailed {
            addr: addr.to_string(),
            source,
        })?;
    let socket = Arc::new(socket);
    info!("Datagram socket {} talking to {}", socket.local_addr()?, remote);

    let peer = Arc::new(PeerSlot::fixed(remote.addr()));
    Ok(Session::from_parts(
        reactor,
        remote,
        DatagramSource::new(Arc::clone(&socket), Arc::clone(&peer)),
        DatagramSink::new(socket, peer),
        config,
        events,
    ))
}
