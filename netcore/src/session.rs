//! 会话（连接 actor）
//!
//! 一个会话拥有一个传输端点，驱动读循环和写循环两个任务：
//!
//! ```text
//!   外部线程 ──enqueue_outbound──► WriteQueue ──► 写循环 ──► FrameSink
//!                                     ▲
//!   外部线程 ──request_shutdown──► Phase (watch)
//!                                     │
//!   FrameSource ──► 读循环 ──► 累积缓冲区 ──► FrameCodec ──► Received 事件
//! ```
//!
//! 生命周期：`Connecting → Active → Draining → Closed`。阶段保存在 `watch` 通道中，
//! 与阶段相关的事件（`Error`、`Closed`）在阶段转移时发出，保证先后顺序。
//! 跨线程入口只有 [`SessionHandle::enqueue_outbound`] 和 [`SessionHandle::request_shutdown`]。

use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, trace, warn};

use crate::codec::{Frame, FrameCodec};
use crate::constants::{MAX_FRAME_SIZE, READ_CHUNK_SIZE};
use crate::error::Result;
use crate::event::{ErrorReason, EventKind, EventSender, Phase, SessionEvent, SessionId};
use crate::queue::WriteQueue;
use crate::reactor::ReactorHandle;
use crate::transport::{Endpoint, FrameSink, FrameSource, ReadOutcome};

/// 会话配置
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// 每次流式读取预留的字节数
    pub read_buffer_size: usize,
    /// 累积缓冲区中未完成帧的上限
    pub max_frame_size: usize,
    /// 把收到的每条消息原样发回
    pub echo: bool,
    handshake: Vec<Frame>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: READ_CHUNK_SIZE,
            max_frame_size: MAX_FRAME_SIZE,
            echo: false,
            handshake: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// 追加一条握手消息，`start()` 时在读循环开始前入队
    pub fn with_handshake(mut self, message: &[u8]) -> Result<Self> {
        self.handshake.push(FrameCodec::encode(message)?);
        Ok(self)
    }

    pub fn handshake(&self) -> &[Frame] {
        &self.handshake
    }
}

/// 会话共享状态
pub(crate) struct Shared {
    id: SessionId,
    endpoint: Endpoint,
    phase: watch::Sender<Phase>,
    queue: WriteQueue,
    /// 唤醒写循环：有新帧入队、对端就绪或阶段变化
    wake: Notify,
    events: EventSender,
}

impl Shared {
    pub(crate) fn new(endpoint: Endpoint, initial: Phase, events: EventSender) -> Arc<Self> {
        let (phase, _) = watch::channel(initial);
        Arc::new(Self {
            id: SessionId::next(),
            endpoint,
            phase,
            queue: WriteQueue::new(),
            wake: Notify::new(),
            events,
        })
    }

    pub(crate) fn id(&self) -> SessionId {
        self.id
    }

    pub(crate) fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    fn emit(&self, kind: EventKind) {
        // 接收端已经丢弃时静默忽略
        let _ = self.events.send(SessionEvent {
            session: self.id,
            kind,
        });
    }

    /// 阶段转移；`on_enter` 在转移生效的同一临界区内执行，参数为原阶段
    fn transition_with(&self, to: Phase, on_enter: impl FnOnce(Phase)) -> Option<Phase> {
        let mut entered = None;
        self.phase.send_if_modified(|current| {
            let from = *current;
            if !from.can_advance_to(to) {
                return false;
            }
            *current = to;
            on_enter(from);
            if to == Phase::Closed {
                let _ = self.events.send(SessionEvent {
                    session: self.id,
                    kind: EventKind::Closed,
                });
            }
            entered = Some(from);
            true
        });

        let from = entered?;
        debug!("Session {} {} -> {}", self.id, from, to);
        match to {
            Phase::Draining => self.queue.close(),
            Phase::Closed => {
                self.queue.close();
                let dropped = self.queue.abort();
                if dropped > 0 {
                    debug!("Session {} discarded {} unsent frame(s)", self.id, dropped);
                }
                info!("Session {} closed", self.id);
            }
            _ => {}
        }
        self.wake.notify_one();
        Some(from)
    }

    pub(crate) fn transition(&self, to: Phase) -> Option<Phase> {
        self.transition_with(to, |_| {})
    }

    fn enqueue(&self, frame: Frame) -> Result<()> {
        if self.queue.push(frame)? {
            self.wake.notify_one();
        }
        Ok(())
    }

    fn request_shutdown(&self) {
        match self.transition(Phase::Draining) {
            Some(_) => info!(
                "Session {} shutdown requested, {} frame(s) pending",
                self.id,
                self.queue.len()
            ),
            None => debug!(
                "Session {} shutdown ignored in phase {}",
                self.id,
                self.phase()
            ),
        }
    }

    /// 读方向结束（流式传输收到 EOF）
    fn on_peer_eof(&self) {
        // 先关闭队列，之后的空闲判断才不会被新入队的帧打破
        self.queue.close();
        if self.phase() != Phase::Active {
            debug!("Session {} peer closed during {}", self.id, self.phase());
            return;
        }
        info!("Session {} peer closed the connection", self.id);
        if self.queue.is_idle() {
            self.transition(Phase::Closed);
        } else {
            self.transition(Phase::Draining);
        }
    }

    /// 读路径上的致命错误
    fn on_read_failure(&self, reason: ErrorReason, detail: String) {
        self.queue.close();
        let target = if self.queue.is_idle() {
            Phase::Closed
        } else {
            Phase::Draining
        };

        let entered = self.transition_with(Phase::Draining, |_| {
            let _ = self.events.send(SessionEvent {
                session: self.id,
                kind: EventKind::Error {
                    reason,
                    phase: target,
                    detail: detail.clone(),
                },
            });
        });

        match entered {
            Some(_) => {
                warn!("Session {} read failed ({}): {}", self.id, reason, detail);
                if target == Phase::Closed {
                    self.transition(Phase::Closed);
                }
            }
            None => debug!(
                "Session {} read ended during shutdown: {}",
                self.id, detail
            ),
        }
    }

    /// 主动连接失败：`Connecting -> Closed`，错误事件先于 `Closed` 发出
    pub(crate) fn on_connect_failure(&self, err: &io::Error) {
        let detail = err.to_string();
        self.transition_with(Phase::Closed, |_| {
            let _ = self.events.send(SessionEvent {
                session: self.id,
                kind: EventKind::Error {
                    reason: ErrorReason::ConnectionFailed,
                    phase: Phase::Closed,
                    detail: detail.clone(),
                },
            });
        });
    }

    /// 写路径上的致命错误：丢弃剩余帧并关闭
    fn on_write_failure(&self, err: &io::Error) {
        let reason = ErrorReason::from_io(err);
        let detail = err.to_string();
        self.queue.close();

        let entered = self.transition_with(Phase::Draining, |_| {
            let _ = self.events.send(SessionEvent {
                session: self.id,
                kind: EventKind::Error {
                    reason,
                    phase: Phase::Closed,
                    detail: detail.clone(),
                },
            });
        });

        match entered {
            Some(_) => warn!("Session {} write failed ({}): {}", self.id, reason, detail),
            None => debug!(
                "Session {} write failed during shutdown: {}",
                self.id, detail
            ),
        }
        self.transition(Phase::Closed);
    }

    fn dispatch(&self, message: Bytes, echo: bool) {
        trace!("Session {} received {} bytes", self.id, message.len());
        // 先报告收到，再入队回显，保证 Received 总在对应的 Sent 之前
        self.emit(EventKind::Received(message.clone()));
        if echo {
            // 解出的消息必然不含分隔符
            match FrameCodec::encode(&message).and_then(|frame| self.enqueue(frame)) {
                Ok(()) => {}
                Err(e) => debug!("Session {} echo skipped: {}", self.id, e),
            }
        }
    }
}

/// 会话句柄
///
/// 外部代码只持有句柄，用于入队出站消息或请求关闭；可以跨线程克隆。
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn endpoint(&self) -> Endpoint {
        self.shared.endpoint
    }

    pub fn phase(&self) -> Phase {
        self.shared.phase()
    }

    pub fn is_closed(&self) -> bool {
        self.phase() == Phase::Closed
    }

    /// 待发送帧数
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// 编码并入队一条出站消息
    ///
    /// 消息含分隔符时返回 [`NetError::InvalidPayload`](crate::NetError::InvalidPayload)；会话进入 `Draining`
    /// 或 `Closed` 后返回 [`NetError::SessionClosed`](crate::NetError::SessionClosed)。
    pub fn enqueue_outbound(&self, message: &[u8]) -> Result<()> {
        let frame = FrameCodec::encode(message)?;
        self.shared.enqueue(frame)
    }

    /// 唤醒写循环，让它检查队列
    pub fn flush(&self) {
        self.shared.wake.notify_one();
    }

    /// 请求关闭，可重复调用
    pub fn request_shutdown(&self) {
        self.shared.request_shutdown();
    }

    /// 等待会话进入 `Closed`
    pub async fn closed(&self) {
        let mut rx = self.shared.phase.subscribe();
        let _ = rx.wait_for(|phase| *phase == Phase::Closed).await;
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.shared.id)
            .field("endpoint", &self.shared.endpoint)
            .field("phase", &self.phase())
            .finish()
    }
}

/// 尚未启动的会话
pub struct Session<S, K> {
    shared: Arc<Shared>,
    source: S,
    sink: K,
    config: SessionConfig,
    reactor: ReactorHandle,
}

impl<S: FrameSource, K: FrameSink> Session<S, K> {
    /// 用已建立的读写端构造一个 `Active` 会话
    pub fn from_parts(
        reactor: &ReactorHandle,
        endpoint: Endpoint,
        source: S,
        sink: K,
        config: SessionConfig,
        events: EventSender,
    ) -> Self {
        let shared = Shared::new(endpoint, Phase::Active, events);
        Self::with_shared(reactor, shared, source, sink, config)
    }

    pub(crate) fn with_shared(
        reactor: &ReactorHandle,
        shared: Arc<Shared>,
        source: S,
        sink: K,
        config: SessionConfig,
    ) -> Self {
        Self {
            shared,
            source,
            sink,
            config,
            reactor: reactor.clone(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    /// 启动前即可获取句柄
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// 入队握手消息并启动读写循环
    pub fn start(self) -> SessionHandle {
        let handle = self.handle();
        let Session {
            shared,
            source,
            sink,
            config,
            reactor,
        } = self;

        for frame in config.handshake() {
            if let Err(e) = shared.enqueue(frame.clone()) {
                debug!("Session {} handshake not queued: {}", shared.id, e);
            }
        }

        info!("Session {} started on {}", shared.id, shared.endpoint);
        reactor.spawn(write_loop(Arc::clone(&shared), sink));
        reactor.spawn(read_loop(shared, source, config));
        handle
    }
}

/// 读循环：读取、累积、逐帧解码并按到达顺序分发
async fn read_loop<S: FrameSource>(shared: Arc<Shared>, mut source: S, config: SessionConfig) {
    let mut phase_rx = shared.phase.subscribe();
    let mut buffer = BytesMut::with_capacity(config.read_buffer_size);

    loop {
        let outcome = tokio::select! {
            _ = phase_rx.wait_for(|phase| *phase == Phase::Closed) => break,
            result = source.read_into(&mut buffer) => result,
        };

        match outcome {
            Ok(ReadOutcome::Data(n)) => {
                trace!("Session {} read {} bytes", shared.id, n);
                while let Some(message) = FrameCodec::decode_from(&mut buffer) {
                    if shared.phase() == Phase::Closed {
                        break;
                    }
                    shared.dispatch(message, config.echo);
                }

                if buffer.len() > config.max_frame_size {
                    let detail = format!(
                        "{} bytes buffered without a sentinel (max: {})",
                        buffer.len(),
                        config.max_frame_size
                    );
                    shared.on_read_failure(ErrorReason::FrameTooLarge, detail);
                    break;
                }

                // 数据报服务端可能刚学到对端地址
                if !shared.queue.is_empty() {
                    shared.wake.notify_one();
                }
            }
            Ok(ReadOutcome::Eof) => {
                shared.on_peer_eof();
                break;
            }
            Err(e) => {
                shared.on_read_failure(ErrorReason::from_io(&e), e.to_string());
                break;
            }
        }
    }

    trace!("Session {} read loop finished", shared.id);
}

/// 写循环：严格串行地发送队首帧，发送确认后才弹出
async fn write_loop<K: FrameSink>(shared: Arc<Shared>, mut sink: K) {
    loop {
        let phase = shared.phase();
        if phase == Phase::Closed {
            break;
        }

        if sink.is_ready() {
            if let Some(frame) = shared.queue.begin() {
                match sink.send_frame(frame.as_bytes()).await {
                    Ok(()) => {
                        shared.queue.complete();
                        trace!("Session {} wrote {} bytes", shared.id, frame.wire_len());
                        shared.emit(EventKind::Sent(frame.into_payload()));
                        continue;
                    }
                    Err(e) => {
                        shared.on_write_failure(&e);
                        break;
                    }
                }
            }
        } else if phase == Phase::Draining && !shared.queue.is_empty() {
            let dropped = shared.queue.abort();
            debug!(
                "Session {} has no peer to drain to, dropped {} frame(s)",
                shared.id, dropped
            );
        }

        if phase == Phase::Draining && shared.queue.is_idle() {
            if let Err(e) = sink.close_write().await {
                debug!("Session {} half-close failed: {}", shared.id, e);
            }
            shared.transition(Phase::Closed);
            break;
        }

        shared.wake.notified().await;
    }

    trace!("Session {} write loop finished", shared.id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
    use tokio::time::timeout;

    use crate::error::NetError;
    use crate::event::{event_channel, EventReceiver};
    use crate::reactor::{Reactor, ReactorConfig};
    use crate::transport::{StreamSink, StreamSource};

    const WAIT: Duration = Duration::from_secs(5);

    fn test_endpoint() -> Endpoint {
        Endpoint::stream("127.0.0.1:1111".parse::<SocketAddr>().unwrap())
    }

    type DuplexSession = Session<StreamSource<ReadHalf<DuplexStream>>, StreamSink<WriteHalf<DuplexStream>>>;

    fn duplex_session(config: SessionConfig) -> (DuplexSession, DuplexStream, EventReceiver) {
        let (local, remote) = tokio::io::duplex(1024);
        let (reader, writer) = tokio::io::split(local);
        let (events_tx, events_rx) = event_channel();
        let session = Session::from_parts(
            &ReactorHandle::current(),
            test_endpoint(),
            StreamSource::new(reader),
            StreamSink::new(writer),
            config,
            events_tx,
        );
        (session, remote, events_rx)
    }

    async fn next_event(rx: &mut EventReceiver) -> EventKind {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap().kind
    }

    /// 等待直到出现满足条件的事件，返回之前收到的全部事件
    async fn collect_until(rx: &mut EventReceiver, done: impl Fn(&EventKind) -> bool) -> Vec<EventKind> {
        let mut seen = Vec::new();
        loop {
            let kind = next_event(rx).await;
            let stop = done(&kind);
            seen.push(kind);
            if stop {
                return seen;
            }
        }
    }

    #[tokio::test]
    async fn test_receives_frames_in_order() {
        let (session, mut remote, mut events) = duplex_session(SessionConfig::default());
        let _handle = session.start();

        // 两帧在一次写入中到达，第三帧拆成两次
        remote.write_all(b"one\0two\0th").await.unwrap();
        remote.write_all(b"ree\0").await.unwrap();

        assert_eq!(next_event(&mut events).await, EventKind::Received(Bytes::from_static(b"one")));
        assert_eq!(next_event(&mut events).await, EventKind::Received(Bytes::from_static(b"two")));
        assert_eq!(next_event(&mut events).await, EventKind::Received(Bytes::from_static(b"three")));
    }

    #[tokio::test]
    async fn test_enqueue_writes_in_order() {
        let (session, mut remote, mut events) = duplex_session(SessionConfig::default());
        let handle = session.start();

        for msg in ["a", "bb", "ccc"] {
            handle.enqueue_outbound(msg.as_bytes()).unwrap();
        }

        let mut buf = vec![0u8; 9];
        timeout(WAIT, remote.read_exact(&mut buf)).await.unwrap().unwrap();
        assert_eq!(&buf, b"a\0bb\0ccc\0");

        assert_eq!(next_event(&mut events).await, EventKind::Sent(Bytes::from_static(b"a")));
        assert_eq!(next_event(&mut events).await, EventKind::Sent(Bytes::from_static(b"bb")));
        assert_eq!(next_event(&mut events).await, EventKind::Sent(Bytes::from_static(b"ccc")));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_sentinel() {
        let (session, _remote, _events) = duplex_session(SessionConfig::default());
        let handle = session.start();

        let err = handle.enqueue_outbound(b"bad\0payload").unwrap_err();
        assert!(matches!(err, NetError::InvalidPayload { offset: 3 }));
        assert_eq!(handle.pending(), 0);
    }

    #[tokio::test]
    async fn test_handshake_sent_on_start() {
        let config = SessionConfig::default().with_handshake(b"HELLO").unwrap();
        let (session, mut remote, _events) = duplex_session(config);
        let _handle = session.start();

        let mut buf = vec![0u8; 6];
        timeout(WAIT, remote.read_exact(&mut buf)).await.unwrap().unwrap();
        assert_eq!(&buf, b"HELLO\0");
    }

    #[test]
    fn test_handshake_rejects_sentinel() {
        assert!(SessionConfig::default().with_handshake(b"a\0").is_err());
    }

    #[tokio::test]
    async fn test_echo() {
        let config = SessionConfig::default().with_echo(true);
        let (session, mut remote, _events) = duplex_session(config);
        let _handle = session.start();

        remote.write_all(b"Hello\0").await.unwrap();
        let mut buf = vec![0u8; 6];
        timeout(WAIT, remote.read_exact(&mut buf)).await.unwrap().unwrap();
        assert_eq!(&buf, b"Hello\0");
    }

    #[test]
    fn test_echo_reports_received_before_sent() {
        let reactor = Reactor::new(ReactorConfig {
            worker_threads: 4,
            ..Default::default()
        })
        .unwrap();
        let handle = reactor.handle();

        reactor.block_on(async move {
            let (local, mut remote) = tokio::io::duplex(1024);
            let (reader, writer) = tokio::io::split(local);
            let (events_tx, mut events) = event_channel();
            let _session = Session::from_parts(
                &handle,
                test_endpoint(),
                StreamSource::new(reader),
                StreamSink::new(writer),
                SessionConfig::default().with_echo(true),
                events_tx,
            )
            .start();

            for _ in 0..50 {
                remote.write_all(b"ping\0").await.unwrap();
                let mut buf = vec![0u8; 5];
                timeout(WAIT, remote.read_exact(&mut buf)).await.unwrap().unwrap();

                assert_eq!(next_event(&mut events).await, EventKind::Received(Bytes::from_static(b"ping")));
                assert_eq!(next_event(&mut events).await, EventKind::Sent(Bytes::from_static(b"ping")));
            }
        });
        reactor.shutdown(Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_half_closes() {
        let (session, mut remote, mut events) = duplex_session(SessionConfig::default());
        let handle = session.start();

        handle.enqueue_outbound(b"x").unwrap();
        handle.enqueue_outbound(b"y").unwrap();
        handle.request_shutdown();
        assert_eq!(handle.phase(), Phase::Draining);

        // 进入 Draining 后不再接受新的写入
        assert!(matches!(handle.enqueue_outbound(b"z"), Err(NetError::SessionClosed)));
        // 重复请求是空操作
        handle.request_shutdown();

        // 已排队的帧仍按序发出，然后对端看到 EOF
        let mut received = Vec::new();
        timeout(WAIT, remote.read_to_end(&mut received)).await.unwrap().unwrap();
        assert_eq!(&received, b"x\0y\0");

        timeout(WAIT, handle.closed()).await.unwrap();
        assert!(handle.is_closed());

        let seen = collect_until(&mut events, |k| *k == EventKind::Closed).await;
        assert_eq!(
            seen,
            vec![
                EventKind::Sent(Bytes::from_static(b"x")),
                EventKind::Sent(Bytes::from_static(b"y")),
                EventKind::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn test_peer_eof_closes_idle_session() {
        let (session, remote, mut events) = duplex_session(SessionConfig::default());
        let handle = session.start();

        drop(remote);
        timeout(WAIT, handle.closed()).await.unwrap();
        assert_eq!(next_event(&mut events).await, EventKind::Closed);
        assert!(matches!(handle.enqueue_outbound(b"late"), Err(NetError::SessionClosed)));
    }

    #[tokio::test]
    async fn test_peer_eof_with_pending_writes_drains() {
        let (local, mut remote) = tokio::io::duplex(4);
        let (reader, writer) = tokio::io::split(local);
        let (events_tx, mut events) = event_channel();
        let handle = Session::from_parts(
            &ReactorHandle::current(),
            test_endpoint(),
            StreamSource::new(reader),
            StreamSink::new(writer),
            SessionConfig::default(),
            events_tx,
        )
        .start();

        // 管道只有 4 字节容量，两帧都无法立即写完
        handle.enqueue_outbound(b"0123456789").unwrap();
        handle.enqueue_outbound(b"abc").unwrap();
        remote.shutdown().await.unwrap();

        timeout(WAIT, async {
            while handle.phase() == Phase::Active {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(handle.phase(), Phase::Draining);
        assert_eq!(handle.pending(), 2);
        assert!(matches!(handle.enqueue_outbound(b"late"), Err(NetError::SessionClosed)));

        let mut received = Vec::new();
        timeout(WAIT, remote.read_to_end(&mut received)).await.unwrap().unwrap();
        assert_eq!(&received, b"0123456789\0abc\0");

        timeout(WAIT, handle.closed()).await.unwrap();
        let seen = collect_until(&mut events, |k| *k == EventKind::Closed).await;
        assert_eq!(
            seen,
            vec![
                EventKind::Sent(Bytes::from_static(b"0123456789")),
                EventKind::Sent(Bytes::from_static(b"abc")),
                EventKind::Closed,
            ]
        );
    }

    #[tokio::test]
    async fn test_frame_too_large() {
        let config = SessionConfig {
            max_frame_size: 8,
            ..Default::default()
        };
        let (session, mut remote, mut events) = duplex_session(config);
        let handle = session.start();

        remote.write_all(b"0123456789abcdef").await.unwrap();
        match next_event(&mut events).await {
            EventKind::Error { reason, phase, .. } => {
                assert_eq!(reason, ErrorReason::FrameTooLarge);
                assert_eq!(phase, Phase::Closed);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(next_event(&mut events).await, EventKind::Closed);
        assert!(handle.is_closed());
    }

    /// 不产生任何入站数据的读取端
    struct Silent;

    impl FrameSource for Silent {
        async fn read_into(&mut self, _buf: &mut BytesMut) -> io::Result<ReadOutcome> {
            std::future::pending().await
        }
    }

    /// 记录写入顺序并检测并发写入的写入端
    #[derive(Clone, Default)]
    struct Recorder {
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
        fail: bool,
    }

    impl FrameSink for Recorder {
        async fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.writes.lock().push(frame.to_vec());
            Ok(())
        }

        async fn close_write(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn recorder_session(sink: Recorder) -> (Session<Silent, Recorder>, EventReceiver) {
        let (events_tx, events_rx) = event_channel();
        let session = Session::from_parts(
            &ReactorHandle::current(),
            test_endpoint(),
            Silent,
            sink,
            SessionConfig::default(),
            events_tx,
        );
        (session, events_rx)
    }

    #[tokio::test]
    async fn test_writes_never_pipelined() {
        let sink = Recorder::default();
        let (session, mut events) = recorder_session(sink.clone());
        let handle = session.start();

        for i in 0..20 {
            handle.enqueue_outbound(format!("msg-{}", i).as_bytes()).unwrap();
            if i % 3 == 0 {
                tokio::task::yield_now().await;
            }
        }
        handle.request_shutdown();
        timeout(WAIT, handle.closed()).await.unwrap();

        let writes = sink.writes.lock().clone();
        assert_eq!(writes.len(), 20);
        for (i, w) in writes.iter().enumerate() {
            assert_eq!(w, format!("msg-{}\0", i).as_bytes());
        }
        assert_eq!(sink.max_active.load(Ordering::SeqCst), 1);

        let seen = collect_until(&mut events, |k| *k == EventKind::Closed).await;
        assert_eq!(seen.iter().filter(|k| matches!(k, EventKind::Sent(_))).count(), 20);
    }

    #[tokio::test]
    async fn test_write_error_reported_once() {
        let sink = Recorder {
            fail: true,
            ..Default::default()
        };
        let (session, mut events) = recorder_session(sink);
        let handle = session.start();

        handle.enqueue_outbound(b"a").unwrap();
        handle.enqueue_outbound(b"b").unwrap();

        let seen = collect_until(&mut events, |k| *k == EventKind::Closed).await;
        assert_eq!(seen.len(), 2);
        match &seen[0] {
            EventKind::Error { reason, phase, .. } => {
                assert_eq!(*reason, ErrorReason::BrokenPipe);
                assert_eq!(*phase, Phase::Closed);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(handle.is_closed());
        assert_eq!(handle.pending(), 0);
    }

    #[tokio::test]
    async fn test_write_error_during_shutdown_suppressed() {
        let sink = Recorder {
            fail: true,
            ..Default::default()
        };
        let (session, mut events) = recorder_session(sink);
        let handle = session.start();

        // 单线程测试运行时：写循环在这之后才开始执行
        handle.enqueue_outbound(b"a").unwrap();
        handle.request_shutdown();

        let seen = collect_until(&mut events, |k| *k == EventKind::Closed).await;
        assert_eq!(seen, vec![EventKind::Closed]);
    }

    #[tokio::test]
    async fn test_closed_reached_without_peer_input() {
        let (session, _events) = recorder_session(Recorder::default());
        let handle = session.start();

        handle.request_shutdown();
        timeout(WAIT, handle.closed()).await.unwrap();
        assert_eq!(handle.phase(), Phase::Closed);
    }
}
