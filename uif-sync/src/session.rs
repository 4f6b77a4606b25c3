//! Registry of connected editing sessions and their outbound queues.
//!
//! Each session owns a bounded queue drained by its connection task. Delivery
//! never waits: a session whose queue is full loses the payload, so one
//! unresponsive client cannot hold up routing for the others.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use uif_core::SessionId;

/// Public view of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub addr: SocketAddr,
    /// Latest `client_id` seen in a transaction (advisory)
    pub client_id: Option<String>,
}

/// Result of queueing a payload for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Outbound queue full; the payload was dropped
    Backlogged,
    /// Session closed or its connection task has exited
    Gone,
}

struct SessionHandle {
    info: SessionInfo,
    outbound: mpsc::Sender<Arc<String>>,
}

pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    outbound_capacity: usize,
}

impl SessionManager {
    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    /// Register a new session. The receiver is drained by the connection task.
    pub async fn open(&self, addr: SocketAddr) -> (SessionId, mpsc::Receiver<Arc<String>>) {
        let id = SessionId::new();
        let (outbound, rx) = mpsc::channel(self.outbound_capacity);
        let handle = SessionHandle {
            info: SessionInfo {
                id,
                addr,
                client_id: None,
            },
            outbound,
        };
        self.sessions.write().await.insert(id, handle);
        (id, rx)
    }

    /// Record the `client_id` a session is currently using.
    pub async fn attribute(&self, id: SessionId, client_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(handle) = sessions.get_mut(&id) {
            if handle.info.client_id.as_deref() != Some(client_id) {
                log::debug!("Session {id} identifies as {client_id:?}");
                handle.info.client_id = Some(client_id.to_string());
            }
        }
    }

    /// Queue `payload` for the session without waiting for queue space.
    pub async fn deliver(&self, id: SessionId, payload: Arc<String>) -> Delivery {
        let sessions = self.sessions.read().await;
        let Some(handle) = sessions.get(&id) else {
            return Delivery::Gone;
        };
        match handle.outbound.try_send(payload) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Backlogged,
            Err(TrySendError::Closed(_)) => Delivery::Gone,
        }
    }

    pub async fn close(&self, id: SessionId) -> Option<SessionInfo> {
        self.sessions.write().await.remove(&id).map(|h| h.info)
    }

    pub async fn info(&self, id: SessionId) -> Option<SessionInfo> {
        self.sessions.read().await.get(&id).map(|h| h.info.clone())
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .await
            .values()
            .map(|h| h.info.clone())
            .collect()
    }
}
