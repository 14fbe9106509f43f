//! 流式监听器
//!
//! 持续接受连接：每次接受成功后注册会话、立即启动它，再发起下一次接受。
//! 单次接受失败只记录日志，不会停止接受循环。

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::event::EventSender;
use crate::reactor::ReactorHandle;
use crate::registry::SessionRegistry;
use crate::session::{SessionConfig, SessionHandle};
use crate::stream;
use crate::transport::{Endpoint, TransportConfig};

/// TCP 监听器
pub struct Listener {
    endpoint: Endpoint,
    listener: Arc<TcpListener>,
    registry: Arc<SessionRegistry>,
    reactor: ReactorHandle,
    transport: TransportConfig,
    session: SessionConfig,
    events: EventSender,
    /// 关闭信号发送端
    shutdown_tx: watch::Sender<bool>,
}

impl Listener {
    /// 绑定地址并开始监听
    pub async fn bind(
        reactor: &ReactorHandle,
        addr: &str,
        transport: TransportConfig,
        session: SessionConfig,
        events: EventSender,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let endpoint = Endpoint::stream(listener.local_addr()?);
        let (shutdown_tx, _) = watch::channel(false);
        info!("Listening on {}", endpoint);

        Ok(Self {
            endpoint,
            listener: Arc::new(listener),
            registry: Arc::new(SessionRegistry::new()),
            reactor: reactor.clone(),
            transport,
            session,
            events,
            shutdown_tx,
        })
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// 启动接受循环
    pub fn start_accepting(&self) -> JoinHandle<()> {
        let ctx = AcceptContext {
            listener: Arc::clone(&self.listener),
            registry: Arc::clone(&self.registry),
            reactor: self.reactor.clone(),
            transport: self.transport.clone(),
            session: self.session.clone(),
            events: self.events.clone(),
        };
        let shutdown_rx = self.shutdown_tx.subscribe();
        self.reactor.spawn(accept_loop(ctx, shutdown_rx))
    }

    /// 停止接受新连接并请求关闭所有会话，返回受影响的会话数
    pub fn shutdown_all(&self) -> usize {
        self.shutdown_tx.send_replace(true);
        let count = self.registry.shutdown_all();
        info!("Shutdown requested for {} session(s)", count);
        count
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn sessions(&self) -> Vec<SessionHandle> {
        self.registry.snapshot()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if !self.is_shutting_down() {
            self.shutdown_all();
        }
    }
}

struct AcceptContext {
    listener: Arc<TcpListener>,
    registry: Arc<SessionRegistry>,
    reactor: ReactorHandle,
    transport: TransportConfig,
    session: SessionConfig,
    events: EventSender,
}

async fn accept_loop(ctx: AcceptContext, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            result = ctx.listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let session = match stream::accepted(
                            &ctx.reactor,
                            stream,
                            peer,
                            &ctx.transport,
                            ctx.session.clone(),
                            ctx.events.clone(),
                        ) {
                            Ok(session) => session,
                            Err(e) => {
                                warn!("Failed to set up connection from {}: {}", peer, e);
                                continue;
                            }
                        };

                        let handle = session.handle();
                        ctx.registry.insert(handle.clone());
                        session.start();
                        info!("Accepted session {} from {}", handle.id(), peer);

                        // 与 shutdown_all 竞争时，保证新会话也被关闭
                        if *shutdown_rx.borrow() {
                            handle.request_shutdown();
                        }

                        let registry = Arc::clone(&ctx.registry);
                        ctx.reactor.spawn(async move {
                            handle.closed().await;
                            registry.remove(handle.id());
                            debug!("Session {} removed from registry", handle.id());
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }

            // 不把 watch::Ref 带出分支，接受分支还要读取关闭标志
            _ = async { let _ = shutdown_rx.wait_for(|stop| *stop).await; } => {
                info!("Accept loop stopped");
                break;
            }
        }
    }
}
