//! 活动会话注册表
//!
//! 仅用于批量关闭；按引擎分配的会话 ID 存放，不按对端身份去重或索引。

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::event::SessionId;
use crate::session::SessionHandle;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: SessionHandle) {
        self.sessions.lock().insert(handle.id(), handle);
    }

    pub fn remove(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// 当前会话的快照
    pub fn snapshot(&self) -> Vec<SessionHandle> {
        self.sessions.lock().values().cloned().collect()
    }

    /// 对所有会话请求关闭，返回请求数
    ///
    /// 先在锁内取快照，再在锁外逐个请求，临界区内不做任何可能阻塞的调用。
    pub fn shutdown_all(&self) -> usize {
        let sessions = self.snapshot();
        for session in &sessions {
            session.request_shutdown();
        }
        sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use crate::event::{event_channel, Phase};
    use crate::reactor::ReactorHandle;
    use crate::session::{Session, SessionConfig};
    use crate::transport::{Endpoint, StreamSink, StreamSource};

    fn idle_handle() -> (SessionHandle, tokio::io::DuplexStream) {
        let (local, remote) = tokio::io::duplex(64);
        let (reader, writer) = tokio::io::split(local);
        let (events_tx, _) = event_channel();
        let session = Session::from_parts(
            &ReactorHandle::current(),
            Endpoint::stream("127.0.0.1:1111".parse::<SocketAddr>().unwrap()),
            StreamSource::new(reader),
            StreamSink::new(writer),
            SessionConfig::default(),
            events_tx,
        );
        (session.handle(), remote)
    }

    #[tokio::test]
    async fn test_insert_and_remove() {
        let registry = SessionRegistry::new();
        let (a, _ra) = idle_handle();
        let (b, _rb) = idle_handle();

        registry.insert(a.clone());
        registry.insert(b.clone());
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(a.id()).is_some());
        assert!(registry.remove(a.id()).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_all() {
        let registry = SessionRegistry::new();
        let (a, _ra) = idle_handle();
        let (b, _rb) = idle_handle();
        registry.insert(a.clone());
        registry.insert(b.clone());

        assert_eq!(registry.shutdown_all(), 2);
        // 未启动的会话也会进入 Draining
        assert_eq!(a.phase(), Phase::Draining);
        assert_eq!(b.phase(), Phase::Draining);
    }
}
