//! 传输层抽象
//!
//! 会话的读循环和写循环只依赖 [`FrameSource`] 与 [`FrameSink`] 两个 trait，
//! 流式（TCP）与数据报（UDP）传输分别实现它们。同一个底层套接字上的
//! 并发读写由传输原语本身保证：TCP 拆分为独立的读写半部，UDP 共享 `Arc<UdpSocket>`。

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use crate::constants::{MAX_DATAGRAM_SIZE, READ_CHUNK_SIZE};
use crate::error::{NetError, Result};

/// 传输层配置
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// 连接超时时间，`None` 表示不限时
    pub connect_timeout: Option<Duration>,
    /// 是否禁用 Nagle 算法（TCP nodelay）
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            nodelay: true, // 消息短小，减少延迟
        }
    }
}

/// 传输类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Stream,
    Datagram,
}

/// 传输端点：地址 + 传输类型，会话绑定后不可变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    addr: SocketAddr,
    kind: TransportKind,
}

impl Endpoint {
    pub fn new(addr: SocketAddr, kind: TransportKind) -> Self {
        Self { addr, kind }
    }

    pub fn stream(addr: SocketAddr) -> Self {
        Self::new(addr, TransportKind::Stream)
    }

    pub fn datagram(addr: SocketAddr) -> Self {
        Self::new(addr, TransportKind::Datagram)
    }

    /// 解析 "host:port" 形式的地址，取第一个结果
    pub async fn resolve(addr: &str, kind: TransportKind) -> Result<Self> {
        let mut addrs = tokio::net::lookup_host(addr)
            .await
            .map_err(|_| NetError::InvalidAddress(addr.to_string()))?;
        let addr = addrs
            .next()
            .ok_or_else(|| NetError::InvalidAddress(addr.to_string()))?;
        Ok(Self::new(addr, kind))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.kind {
            TransportKind::Stream => "tcp",
            TransportKind::Datagram => "udp",
        };
        write!(f, "{}://{}", scheme, self.addr)
    }
}

/// 一次读取的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// 读到了 n 个字节（数据报传输可能为 0）
    Data(usize),
    /// 对端关闭了写方向，只有流式传输会出现
    Eof,
}

/// 入站字节来源
pub trait FrameSource: Send + 'static {
    /// 读取一批字节并追加到累积缓冲区末尾
    fn read_into(
        &mut self,
        buf: &mut BytesMut,
    ) -> impl Future<Output = io::Result<ReadOutcome>> + Send;
}

/// 出站帧去向
pub trait FrameSink: Send + 'static {
    /// 当前是否可以发送（数据报服务端在收到第一个对端报文之前不可发送）
    fn is_ready(&self) -> bool {
        true
    }

    /// 完整发送一帧
    fn send_frame(&mut self, frame: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// 通知对端不再发送数据
    fn close_write(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

// ============================================================================
// 流式实现
// ============================================================================

/// 流式读取端
pub struct StreamSource<R> {
    reader: R,
    chunk: usize,
}

impl<R> StreamSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_chunk(reader, READ_CHUNK_SIZE)
    }

    pub fn with_chunk(reader: R, chunk: usize) -> Self {
        Self {
            reader,
            chunk: chunk.max(1),
        }
    }
}

impl<R: AsyncRead + Unpin + Send + 'static> FrameSource for StreamSource<R> {
    async fn read_into(&mut self, buf: &mut BytesMut) -> io::Result<ReadOutcome> {
        buf.reserve(self.chunk);
        let n = self.reader.read_buf(buf).await?;
        if n == 0 {
            Ok(ReadOutcome::Eof)
        } else {
            Ok(ReadOutcome::Data(n))
        }
    }
}

/// 流式写入端
pub struct StreamSink<W> {
    writer: W,
}

impl<W> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: AsyncWrite + Unpin + Send + 'static> FrameSink for StreamSink<W> {
    async fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await
    }

    async fn close_write(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

/// 建立 TCP 连接并应用配置
pub async fn connect_stream(addr: SocketAddr, config: &TransportConfig) -> io::Result<TcpStream> {
    let stream = match config.connect_timeout {
        Some(limit) => timeout(limit, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??,
        None => TcpStream::connect(addr).await?,
    };
    stream.set_nodelay(config.nodelay)?;
    Ok(stream)
}

// ============================================================================
// 数据报实现
// ============================================================================

/// 数据报对端地址槽
///
/// 客户端创建时即固定；服务端记录最近一次收到报文的来源。
#[derive(Debug, Default)]
pub struct PeerSlot {
    addr: Mutex<Option<SocketAddr>>,
    fixed: bool,
}

impl PeerSlot {
    /// 固定对端
    pub fn fixed(addr: SocketAddr) -> Self {
        Self {
            addr: Mutex::new(Some(addr)),
            fixed: true,
        }
    }

    /// 从入站报文中学习对端
    pub fn learned() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<SocketAddr> {
        *self.addr.lock()
    }

    /// 记录报文来源；返回该来源是否应被接受
    fn observe(&self, from: SocketAddr) -> bool {
        let mut addr = self.addr.lock();
        if self.fixed {
            return *addr == Some(from);
        }
        *addr = Some(from);
        true
    }
}

/// 数据报读取端
pub struct DatagramSource {
    socket: Arc<UdpSocket>,
    peer: Arc<PeerSlot>,
    scratch: Vec<u8>,
}

impl DatagramSource {
    pub fn new(socket: Arc<UdpSocket>, peer: Arc<PeerSlot>) -> Self {
        Self {
            socket,
            peer,
            scratch: vec![0u8; MAX_DATAGRAM_SIZE],
        }
    }
}

impl FrameSource for DatagramSource {
    async fn read_into(&mut self, buf: &mut BytesMut) -> io::Result<ReadOutcome> {
        let (n, from) = self.socket.recv_from(&mut self.scratch).await?;
        if !self.peer.observe(from) {
            tracing::debug!("Ignoring {} bytes from unexpected peer {}", n, from);
            return Ok(ReadOutcome::Data(0));
        }
        buf.extend_from_slice(&self.scratch[..n]);
        Ok(ReadOutcome::Data(n))
    }
}

/// 数据报写入端
pub struct DatagramSink {
    socket: Arc<UdpSocket>,
    peer: Arc<PeerSlot>,
}

impl DatagramSink {
    pub fn new(socket: Arc<UdpSocket>, peer: Arc<PeerSlot>) -> Self {
        Self { socket, peer }
    }
}

impl FrameSink for DatagramSink {
    fn is_ready(&self) -> bool {
        self.peer.get().is_some()
    }

    async fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        let peer = self
            .peer
            .get()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no datagram peer yet"))?;
        let n = self.socket.send_to(frame, peer).await?;
        if n != frame.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("datagram truncated: {} of {} bytes", n, frame.len()),
            ));
        }
        Ok(())
    }

    async fn close_write(&mut self) -> io::Result<()> {
        // 数据报没有半关闭
        Ok(())
    }
}
