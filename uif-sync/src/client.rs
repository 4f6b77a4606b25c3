//! WebSocket client for building a remote UI.
//!
//! Provides:
//! - Object id allocation (first id 2, then incrementing)
//! - Edit buffering: edits accumulate until `flush` sends them as one transaction
//! - Offline queue: transactions flushed while disconnected are replayed on connect
//! - Event dispatch: event ids mapped back to handler closures

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use uif_core::{Ack, EditCommand, Node, ObjectId, Rejection, Transaction};
use uuid::Uuid;

use crate::protocol::{Event, ProtocolError, Reply, ServerMessage, WireMessage};

/// First object id handed out by [`UiClient::append_child`].
pub const FIRST_OBJECT_ID: ObjectId = 2;

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Everything the client surfaces to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    /// A UI event for an id this client registered
    Event(Event),
    Ack(Ack),
    Rejected(Rejection),
}

/// Transactions flushed while disconnected, replayed in order on connect.
pub struct OfflineQueue {
    queue: VecDeque<Transaction>,
    max_size: usize,
}

impl OfflineQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Returns false when the queue is full.
    pub fn enqueue(&mut self, tx: Transaction) -> bool {
        if self.queue.len() >= self.max_size {
            return false;
        }
        self.queue.push_back(tx);
        true
    }

    pub fn front(&self) -> Option<&Transaction> {
        self.queue.front()
    }

    pub fn pop_front(&mut self) -> Option<Transaction> {
        self.queue.pop_front()
    }

    pub fn drain(&mut self) -> Vec<Transaction> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Edits across all queued transactions.
    pub fn total_edits(&self) -> usize {
        self.queue.iter().map(|tx| tx.edits.len()).sum()
    }
}

type Handler = Box<dyn FnMut(&Event) + Send>;

/// Maps event ids to the logic that handles them.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<String, Handler>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `id`, replacing any previous one.
    pub fn on(&mut self, id: impl Into<String>, handler: impl FnMut(&Event) + Send + 'static) {
        self.handlers.insert(id.into(), Box::new(handler));
    }

    /// Run the handler registered for the event's id. Returns false if none.
    pub fn dispatch(&mut self, event: &Event) -> bool {
        match self.handlers.get_mut(event.id()) {
            Some(handler) => {
                handler(event);
                true
            }
            None => {
                log::debug!("No handler for event {:?}", event.id());
                false
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.handlers.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// The UI client.
///
/// Edits are buffered locally and sent as one transaction per `flush`.
pub struct UiClient {
    client_id: String,
    server_url: String,
    state: Arc<RwLock<ConnectionState>>,
    next_id: ObjectId,
    pending: Vec<EditCommand>,
    offline_queue: OfflineQueue,
    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<String>>,
    event_rx: Option<mpsc::Receiver<ClientEvent>>,
    event_tx: mpsc::Sender<ClientEvent>,
}

impl UiClient {
    pub fn new(client_id: impl Into<String>, server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            client_id: client_id.into(),
            server_url: server_url.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            next_id: FIRST_OBJECT_ID,
            pending: Vec::new(),
            offline_queue: OfflineQueue::new(10_000),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.event_rx.take()
    }

    /// Connect to the server and replay anything flushed while offline.
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;

        let (ws_stream, _) = match tokio_tungstenite::connect_async(self.server_url.as_str()).await {
            Ok(conn) => conn,
            Err(e) => {
                log::warn!("Failed to connect to {}: {e}", self.server_url);
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ProtocolError::ConnectionClosed);
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        self.outgoing_tx = Some(out_tx);

        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_writer.send(Message::text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.send(Message::Close(None)).await;
        });

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(ClientEvent::Connected).await;
        log::info!("{} connected to {}", self.client_id, self.server_url);

        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => continue,
                };
                let event = match ServerMessage::decode(text.as_str()) {
                    Ok(ServerMessage::Event(event)) => ClientEvent::Event(event),
                    Ok(ServerMessage::Reply(Reply::Ack(ack))) => ClientEvent::Ack(ack),
                    Ok(ServerMessage::Reply(Reply::Rejected(rejection))) => {
                        ClientEvent::Rejected(rejection)
                    }
                    Err(e) => {
                        log::warn!("Ignoring unreadable server message: {e}");
                        continue;
                    }
                };
                let _ = event_tx.send(event).await;
            }

            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(ClientEvent::Disconnected).await;
        });

        self.replay_offline_queue().await
    }

    /// Send queued transactions in order. A transaction leaves the queue only
    /// once it has been handed to the writer.
    async fn replay_offline_queue(&mut self) -> Result<(), ProtocolError> {
        if !self.offline_queue.is_empty() {
            log::info!("Replaying {} queued transactions", self.offline_queue.len());
        }
        while let Some(tx) = self.offline_queue.front() {
            let encoded = tx.encode()?;
            self.send_encoded(encoded).await?;
            self.offline_queue.pop_front();
        }
        Ok(())
    }

    /// Close the connection. Buffered edits are kept.
    pub async fn disconnect(&mut self) {
        self.outgoing_tx = None;
        *self.state.write().await = ConnectionState::Disconnected;
    }

    /// Allocate the next object id.
    pub fn next_object_id(&mut self) -> ObjectId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Random event id for a node that reports events.
    pub fn new_event_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Buffer an `AppendChild` under `parent_id` and return the new node's id.
    pub fn append_child(&mut self, parent_id: ObjectId, node: Node) -> ObjectId {
        let object_id = self.next_object_id();
        self.push_edit(EditCommand::AppendChild {
            parent_id,
            object_id,
            node,
        });
        object_id
    }

    pub fn replace_node(&mut self, object_id: ObjectId, node: Node) {
        self.push_edit(EditCommand::ReplaceNode { object_id, node });
    }

    pub fn remove_child(&mut self, object_id: ObjectId) {
        self.push_edit(EditCommand::RemoveChild { object_id });
    }

    pub fn push_edit(&mut self, edit: EditCommand) {
        self.pending.push(edit);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Send buffered edits as one transaction. Returns the number of edits.
    ///
    /// Nothing is sent when no edits are buffered. While disconnected the
    /// transaction is queued for replay.
    pub async fn flush(&mut self) -> Result<usize, ProtocolError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let tx = Transaction::with_edits(self.client_id.clone(), std::mem::take(&mut self.pending));
        let count = tx.edits.len();

        if self.connection_state().await != ConnectionState::Connected {
            if !self.offline_queue.enqueue(tx) {
                return Err(ProtocolError::ConnectionClosed);
            }
            return Ok(count);
        }

        let encoded = tx.encode()?;
        if let Err(e) = self.send_encoded(encoded).await {
            self.offline_queue.enqueue(tx);
            return Err(e);
        }
        Ok(count)
    }

    async fn send_encoded(&self, encoded: String) -> Result<(), ProtocolError> {
        match self.outgoing_tx {
            Some(ref out) => out
                .send(encoded)
                .await
                .map_err(|_| ProtocolError::ConnectionClosed),
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn offline_queue_len(&self) -> usize {
        self.offline_queue.len()
    }
}
