//! # uif-sync: keeps remote UI clients and renderers in sync with one tree
//!
//! Editing clients push transactions of tree edits; the server applies each one
//! atomically, fans the result out to renderers, and routes UI events back to
//! whichever session registered the event id.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  Transaction (JSON)  ┌─────────────┐  Snapshot/Applied  ┌────────────┐
//! │  UiClient   │ ───────────────────► │ SyncServer  │ ─────────────────► │  renderer  │
//! │ (per app)   │ ◄─────────────────── │             │ ◄───────────────── │ (/render)  │
//! └─────────────┘   Event / Reply      └──────┬──────┘       Event        └────────────┘
//!                                             │
//!                                      ┌──────┴──────┐
//!                                      │ SyncEngine  │
//!                                      │ Scene lock, │
//!                                      │ router, feed│
//!                                      └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: JSON wire messages and `ProtocolError`
//! - [`session`]: connected sessions and their outbound queues
//! - [`router`]: event id → owning session delivery
//! - [`feed`]: broadcast of committed changes to renderers
//! - [`engine`]: the shared scene and the operations on it
//! - [`server`]: WebSocket server
//! - [`client`]: WebSocket client with edit buffering and offline queue

pub mod protocol;
pub mod session;
pub mod router;
pub mod feed;
pub mod engine;
pub mod server;
pub mod client;

pub use protocol::{Event, ProtocolError, RenderMessage, Reply, ServerMessage, WireMessage};
pub use session::{Delivery, SessionInfo, SessionManager};
pub use router::{DropReason, EventRouter, RouteOutcome, RouterStats};
pub use feed::{FeedStats, RenderFeed};
pub use engine::{EngineStats, SyncEngine};
pub use server::{ServerConfig, ServerStats, SyncServer};
pub use client::{ClientEvent, ConnectionState, EventDispatcher, OfflineQueue, UiClient, FIRST_OBJECT_ID};
