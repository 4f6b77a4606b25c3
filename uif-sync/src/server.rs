//! WebSocket server for editing clients and rendering consumers.
//!
//! Architecture:
//! ```text
//! ws://host:3012/        editing client ── Transaction ──► SyncEngine::submit
//!                                       ◄── Event / Reply ─┘
//! ws://host:3012/render  renderer       ◄── Snapshot, Applied ── RenderFeed
//!                                       ── Event ──► SyncEngine::route
//! ```
//!
//! Every connection runs in its own task. The shared scene lock is only held
//! inside `SyncEngine`, never across a socket read or write.

use std::net::SocketAddr;
use std::sync::Arc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use uif_core::Transaction;

use crate::engine::SyncEngine;
use crate::protocol::{Event, ProtocolError, Reply, ServerMessage, WireMessage};
use crate::router::RouteOutcome;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type ConnResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Request path that identifies a rendering consumer
    pub render_path: String,
    /// Events buffered per editing session before routing waits
    pub outbound_capacity: usize,
    /// Updates buffered per renderer before it is resynchronized
    pub feed_capacity: usize,
    /// Send `Ack` after every applied transaction
    pub send_acks: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3012".to_string(),
            render_path: "/render".to_string(),
            outbound_capacity: 256,
            feed_capacity: 256,
            send_acks: false,
        }
    }
}

/// Connection-level statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub active_renderers: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub malformed_messages: u64,
}

/// What a received frame means for a connection loop.
enum Frame<T> {
    Decoded(T, usize),
    Malformed(ProtocolError),
    Respond(Message),
    Ignored,
    Closed,
}

pub struct SyncServer {
    config: ServerConfig,
    engine: Arc<SyncEngine>,
    stats: Arc<RwLock<ServerStats>>,
}

impl SyncServer {
    pub fn new(config: ServerConfig) -> Self {
        let engine = Arc::new(SyncEngine::new(
            config.outbound_capacity,
            config.feed_capacity,
        ));
        Self {
            config,
            engine,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Bind `bind_addr` and serve forever.
    pub async fn run(&self) -> ConnResult {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!(
            "listening on ws://{}/ (renderers on {})",
            self.config.bind_addr,
            self.config.render_path
        );
        self.serve(listener).await
    }

    /// Serve on an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> ConnResult {
        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let engine = self.engine.clone();
            let stats = self.stats.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, engine, stats, config).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        engine: Arc<SyncEngine>,
        stats: Arc<RwLock<ServerStats>>,
        config: ServerConfig,
    ) -> ConnResult {
        let mut path = String::from("/");
        let ws_stream = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                path = req.uri().path().to_string();
                Ok(resp)
            },
        )
        .await?;

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let result = if path == config.render_path {
            log::info!("Renderer connected from {addr}");
            Self::serve_renderer(ws_stream, addr, &engine, &stats).await
        } else {
            log::info!("Client connected from {addr} on {path}");
            Self::serve_client(ws_stream, addr, &engine, &stats, config.send_acks).await
        };

        stats.write().await.active_connections -= 1;
        result
    }

    /// Editing session: transactions in, events and replies out.
    async fn serve_client(
        ws_stream: WebSocketStream<TcpStream>,
        addr: SocketAddr,
        engine: &SyncEngine,
        stats: &RwLock<ServerStats>,
        send_acks: bool,
    ) -> ConnResult {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (session, mut outbound) = engine.open_session(addr).await;

        let result: ConnResult = async {
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match Self::classify::<Transaction>(msg, addr) {
                            Frame::Decoded(tx, bytes) => {
                                Self::count_message(stats, bytes).await;
                                let reply = match engine.submit(session, tx).await {
                                    Ok(ack) if send_acks => Some(Reply::Ack(ack)),
                                    Ok(_) => None,
                                    Err(rejection) => Some(Reply::Rejected(rejection)),
                                };
                                if let Some(reply) = reply {
                                    let encoded = ServerMessage::Reply(reply).encode()?;
                                    ws_sender.send(Message::text(encoded)).await?;
                                }
                            }
                            Frame::Malformed(e) => {
                                Self::close_malformed(&mut ws_sender, addr, e, stats).await;
                                break;
                            }
                            Frame::Respond(reply) => ws_sender.send(reply).await?,
                            Frame::Ignored => {}
                            Frame::Closed => break,
                        }
                    }

                    Some(payload) = outbound.recv() => {
                        ws_sender.send(Message::text(payload.as_str().to_owned())).await?;
                    }
                }
            }
            Ok(())
        }
        .await;

        engine.close_session(session).await;
        result
    }

    /// Rendering consumer: snapshot and updates out, events in.
    async fn serve_renderer(
        ws_stream: WebSocketStream<TcpStream>,
        addr: SocketAddr,
        engine: &SyncEngine,
        stats: &RwLock<ServerStats>,
    ) -> ConnResult {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (snapshot, mut feed_rx) = engine.attach_renderer().await;
        ws_sender.send(Message::text(snapshot.encode()?)).await?;

        stats.write().await.active_renderers += 1;

        let result: ConnResult = async {
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match Self::classify::<Event>(msg, addr) {
                            Frame::Decoded(event, bytes) => {
                                Self::count_message(stats, bytes).await;
                                if let RouteOutcome::Dropped(reason) = engine.route(&event).await {
                                    log::debug!("Event {:?} from renderer {addr} dropped: {reason:?}", event.id());
                                }
                            }
                            Frame::Malformed(e) => {
                                Self::close_malformed(&mut ws_sender, addr, e, stats).await;
                                break;
                            }
                            Frame::Respond(reply) => ws_sender.send(reply).await?,
                            Frame::Ignored => {}
                            Frame::Closed => break,
                        }
                    }

                    update = feed_rx.recv() => {
                        match update {
                            Ok(data) => {
                                ws_sender.send(Message::text(data.as_str().to_owned())).await?;
                            }
                            Err(RecvError::Lagged(n)) => {
                                log::warn!("Renderer {addr} lagged by {n} updates, resending snapshot");
                                let (snapshot, rx) = engine.resync_renderer().await;
                                feed_rx = rx;
                                ws_sender.send(Message::text(snapshot.encode()?)).await?;
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                }
            }
            Ok(())
        }
        .await;

        stats.write().await.active_renderers -= 1;
        log::info!("Renderer {addr} disconnected");
        result
    }

    fn classify<T: WireMessage>(
        msg: Option<Result<Message, tungstenite::Error>>,
        addr: SocketAddr,
    ) -> Frame<T> {
        match msg {
            Some(Ok(Message::Text(text))) => Self::decode_frame(text.as_str()),
            Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => Self::decode_frame(text),
                Err(e) => Frame::Malformed(ProtocolError::MalformedMessage(format!(
                    "binary frame is not UTF-8: {e}"
                ))),
            },
            Some(Ok(Message::Ping(data))) => Frame::Respond(Message::Pong(data)),
            Some(Ok(Message::Close(_))) | None => {
                log::info!("Connection closed from {addr}");
                Frame::Closed
            }
            Some(Err(e)) => {
                log::error!("WebSocket error from {addr}: {e}");
                Frame::Closed
            }
            Some(Ok(_)) => Frame::Ignored,
        }
    }

    fn decode_frame<T: WireMessage>(text: &str) -> Frame<T> {
        match T::decode(text) {
            Ok(msg) => Frame::Decoded(msg, text.len()),
            Err(e) => Frame::Malformed(e),
        }
    }

    async fn count_message(stats: &RwLock<ServerStats>, bytes: usize) {
        let mut s = stats.write().await;
        s.total_messages += 1;
        s.total_bytes += bytes as u64;
    }

    /// The protocol has no resynchronization point, so a bad frame ends the connection.
    async fn close_malformed(
        ws_sender: &mut WsSink,
        addr: SocketAddr,
        error: ProtocolError,
        stats: &RwLock<ServerStats>,
    ) {
        log::warn!("Closing {addr}: {error}");
        stats.write().await.malformed_messages += 1;
        let _ = ws_sender.send(Message::Close(None)).await;
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }
}
