//! Shared synchronization engine: one scene, many sessions.
//!
//! ```text
//! session A ─┐                      ┌─► RenderFeed ─► renderers
//!            ├─ submit ─► RwLock<Scene> (tree + subscriptions)
//! session B ─┘                      └─◄ EventRouter ◄─ renderer events
//!                                          │
//!                                          └─► owning session's queue
//! ```
//!
//! Transactions take the scene write lock for the duration of `Scene::apply`
//! and the feed publish, neither of which awaits. Renderer attach takes the
//! read lock so the snapshot and the feed subscription form a consistent cut.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use uif_core::{Ack, EditCommand, Node, ObjectId, Rejection, Scene, SessionId, Transaction, TreeError};

use crate::feed::{FeedStats, RenderFeed};
use crate::protocol::{Event, RenderMessage};
use crate::router::{EventRouter, RouteOutcome};
use crate::session::{SessionInfo, SessionManager};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub transactions_applied: u64,
    pub transactions_rejected: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
    pub active_sessions: usize,
    pub feed: FeedStats,
}

pub struct SyncEngine {
    scene: Arc<RwLock<Scene>>,
    sessions: Arc<SessionManager>,
    router: EventRouter,
    feed: RenderFeed,
    applied: AtomicU64,
    rejected: AtomicU64,
}

impl SyncEngine {
    pub fn new(outbound_capacity: usize, feed_capacity: usize) -> Self {
        let scene = Arc::new(RwLock::new(Scene::new()));
        let sessions = Arc::new(SessionManager::new(outbound_capacity));
        let router = EventRouter::new(scene.clone(), sessions.clone());
        Self {
            scene,
            sessions,
            router,
            feed: RenderFeed::new(feed_capacity),
            applied: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub async fn open_session(&self, addr: SocketAddr) -> (SessionId, mpsc::Receiver<Arc<String>>) {
        let (id, rx) = self.sessions.open(addr).await;
        log::info!("Session {id} opened from {addr}");
        (id, rx)
    }

    /// Tear down a session. Its subscriptions are dropped; its nodes stay.
    pub async fn close_session(&self, id: SessionId) -> Option<SessionInfo> {
        let info = self.sessions.close(id).await;
        let dropped = self.scene.write().await.drop_session(id);
        log::info!("Session {id} closed, {dropped} event subscriptions dropped");
        info
    }

    /// Apply a transaction atomically on behalf of `session`.
    pub async fn submit(&self, session: SessionId, tx: Transaction) -> Result<Ack, Rejection> {
        self.sessions.attribute(session, &tx.client_id).await;

        let mut scene = self.scene.write().await;
        match scene.apply(session, &tx.edits) {
            Ok(ack) => {
                self.applied.fetch_add(1, Ordering::Relaxed);
                if ack.edits > 0 {
                    log::debug!(
                        "Applied {} edits from {:?} (revision {})",
                        ack.edits,
                        tx.client_id,
                        ack.revision
                    );
                    if log::log_enabled!(log::Level::Trace) {
                        log::trace!("Tree at revision {}:\n{}", ack.revision, scene.tree().outline());
                    }
                    let update = RenderMessage::Applied {
                        revision: ack.revision,
                        client_id: tx.client_id,
                        edits: tx.edits,
                    };
                    if let Err(e) = self.feed.publish(&update) {
                        log::error!("Failed to publish revision {}: {e}", ack.revision);
                    }
                }
                Ok(ack)
            }
            Err(rejection) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "Rejected transaction from {:?} (session {session}): {rejection}",
                    tx.client_id
                );
                Err(rejection)
            }
        }
    }

    /// Hand a UI-generated event to the router.
    pub async fn route(&self, event: &Event) -> RouteOutcome {
        self.router.route(event).await
    }

    /// Snapshot plus a feed receiver positioned right after it.
    pub async fn attach_renderer(&self) -> (RenderMessage, broadcast::Receiver<Arc<String>>) {
        let scene = self.scene.read().await;
        let rx = self.feed.subscribe();
        let snapshot = RenderMessage::Snapshot {
            revision: scene.revision(),
            edits: scene.tree().to_edits(),
        };
        (snapshot, rx)
    }

    /// Like [`attach_renderer`](Self::attach_renderer), for a renderer that lagged.
    pub async fn resync_renderer(&self) -> (RenderMessage, broadcast::Receiver<Arc<String>>) {
        self.feed.record_resync();
        self.attach_renderer().await
    }

    /// Run `f` against a consistent view of the scene.
    pub async fn read<R>(&self, f: impl FnOnce(&Scene) -> R) -> R {
        let scene = self.scene.read().await;
        f(&scene)
    }

    pub async fn get(&self, id: ObjectId) -> Result<Node, TreeError> {
        self.read(|scene| scene.get(id).cloned()).await
    }

    pub async fn snapshot(&self) -> Vec<EditCommand> {
        self.read(|scene| scene.tree().to_edits()).await
    }

    pub async fn revision(&self) -> u64 {
        self.read(|scene| scene.revision()).await
    }

    pub async fn outline(&self) -> String {
        self.read(|scene| scene.tree().outline()).await
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub async fn stats(&self) -> EngineStats {
        let router = self.router.stats();
        EngineStats {
            transactions_applied: self.applied.load(Ordering::Relaxed),
            transactions_rejected: self.rejected.load(Ordering::Relaxed),
            events_delivered: router.delivered,
            events_dropped: router.dropped,
            active_sessions: self.sessions.count().await,
            feed: self.feed.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::WireMessage;
    use crate::router::DropReason;
    use uif_core::ROOT_ID;

    fn addr() -> SocketAddr {
        "127.0.0.1:40002".parse().unwrap()
    }

    fn append(parent_id: ObjectId, object_id: ObjectId, node: Node) -> EditCommand {
        EditCommand::AppendChild {
            parent_id,
            object_id,
            node,
        }
    }

    #[tokio::test]
    async fn test_submit_publishes_to_renderers() {
        let engine = SyncEngine::new(8, 8);
        let (session, _rx) = engine.open_session(addr()).await;
        let (snapshot, mut feed) = engine.attach_renderer().await;
        assert_eq!(
            snapshot,
            RenderMessage::Snapshot {
                revision: 0,
                edits: vec![]
            }
        );

        let tx = Transaction::with_edits("hello", vec![append(ROOT_ID, 10, Node::label("hi"))]);
        let ack = engine.submit(session, tx.clone()).await.unwrap();
        assert_eq!(ack.revision, 1);

        let update = RenderMessage::decode(&feed.recv().await.unwrap()).unwrap();
        assert_eq!(
            update,
            RenderMessage::Applied {
                revision: 1,
                client_id: "hello".into(),
                edits: tx.edits,
            }
        );
    }

    #[tokio::test]
    async fn test_rejection_not_published() {
        let engine = SyncEngine::new(8, 8);
        let (session, _rx) = engine.open_session(addr()).await;
        let (_snapshot, mut feed) = engine.attach_renderer().await;

        let tx = Transaction::with_edits("c", vec![append(7, 8, Node::label("orphan"))]);
        let rejection = engine.submit(session, tx).await.unwrap_err();
        assert_eq!(rejection.error, TreeError::UnknownParent { parent_id: 7 });
        assert!(feed.try_recv().is_err());

        let stats = engine.stats().await;
        assert_eq!(stats.transactions_rejected, 1);
        assert_eq!(stats.transactions_applied, 0);
    }

    #[tokio::test]
    async fn test_snapshot_reflects_tree() {
        let engine = SyncEngine::new(8, 8);
        let (session, _rx) = engine.open_session(addr()).await;
        let edits = vec![
            append(ROOT_ID, 10, Node::window("w")),
            append(10, 11, Node::layout()),
            append(11, 12, Node::label("Hello, World")),
        ];
        engine
            .submit(session, Transaction::with_edits("c", edits.clone()))
            .await
            .unwrap();

        assert_eq!(engine.snapshot().await, edits);
        assert_eq!(engine.get(12).await.unwrap(), Node::label("Hello, World"));
        let (snapshot, _feed) = engine.attach_renderer().await;
        assert_eq!(snapshot.revision(), 1);
    }

    #[tokio::test]
    async fn test_close_session_drops_subscriptions() {
        let engine = SyncEngine::new(8, 8);
        let (session, _rx) = engine.open_session(addr()).await;
        engine
            .submit(
                session,
                Transaction::with_edits("c", vec![append(ROOT_ID, 1, Node::button("x", "X"))]),
            )
            .await
            .unwrap();

        engine.close_session(session).await;
        assert_eq!(
            engine.route(&Event::clicked("X")).await,
            RouteOutcome::Dropped(DropReason::UnknownEventId)
        );
        assert!(engine.get(1).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_sessions_serialize() {
        let engine = Arc::new(SyncEngine::new(8, 8));
        let (setup, _rx) = engine.open_session(addr()).await;
        engine
            .submit(
                setup,
                Transaction::with_edits("setup", vec![append(ROOT_ID, 1, Node::window("w"))]),
            )
            .await
            .unwrap();

        let mut handles = Vec::new();
        for worker in 0..8u32 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                let (session, _rx) = engine.open_session(addr()).await;
                for i in 0..25u32 {
                    let id = 100 + worker * 1000 + i;
                    let tx = Transaction::with_edits(
                        format!("worker-{worker}"),
                        vec![append(1, id, Node::label(format!("{id}")))],
                    );
                    engine.submit(session, tx).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let children = engine.read(|scene| scene.tree().children(1).len()).await;
        assert_eq!(children, 200);
        assert_eq!(engine.revision().await, 201);
    }

    #[tokio::test]
    async fn test_contended_duplicate_only_one_wins() {
        let engine = Arc::new(SyncEngine::new(8, 8));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                let (session, _rx) = engine.open_session(addr()).await;
                let tx = Transaction::with_edits("racer", vec![append(ROOT_ID, 42, Node::label("mine"))]);
                engine.submit(session, tx).await.is_ok()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(engine.read(|scene| scene.tree().len()).await, 1);
    }

    #[tokio::test]
    async fn test_route_racing_replace_is_never_half_applied() {
        let engine = Arc::new(SyncEngine::new(256, 8));
        let (owner, _owner_rx) = engine.open_session(addr()).await;
        engine
            .submit(
                owner,
                Transaction::with_edits("owner", vec![append(ROOT_ID, 5, Node::button("Go", "B1"))]),
            )
            .await
            .unwrap();

        let mut routes = Vec::new();
        for _ in 0..64 {
            let engine = engine.clone();
            routes.push(tokio::spawn(async move {
                tokio::task::yield_now().await;
                engine.route(&Event::clicked("B1")).await
            }));
        }
        let replacer = {
            let engine = engine.clone();
            tokio::spawn(async move {
                let (other, _rx) = engine.open_session(addr()).await;
                let tx = Transaction::with_edits(
                    "other",
                    vec![EditCommand::ReplaceNode {
                        object_id: 5,
                        node: Node::label("gone"),
                    }],
                );
                engine.submit(other, tx).await.unwrap();
            })
        };

        for route in routes {
            let outcome = route.await.unwrap();
            assert!(
                outcome == RouteOutcome::Delivered(owner)
                    || outcome == RouteOutcome::Dropped(DropReason::UnknownEventId),
                "unexpected outcome {outcome:?}"
            );
        }
        replacer.await.unwrap();

        for _ in 0..8 {
            assert_eq!(
                engine.route(&Event::clicked("B1")).await,
                RouteOutcome::Dropped(DropReason::UnknownEventId)
            );
        }
    }

    #[tokio::test]
    async fn test_unread_session_does_not_block_routing() {
        let engine = SyncEngine::new(1, 8);
        let (slow, _slow_rx) = engine.open_session(addr()).await;
        let (fast, mut fast_rx) = engine.open_session(addr()).await;
        engine
            .submit(slow, Transaction::with_edits("slow", vec![append(ROOT_ID, 1, Node::button("A", "A"))]))
            .await
            .unwrap();
        engine
            .submit(fast, Transaction::with_edits("fast", vec![append(ROOT_ID, 2, Node::button("B", "B"))]))
            .await
            .unwrap();

        let routed = tokio::time::timeout(std::time::Duration::from_millis(500), async {
            engine.route(&Event::clicked("A")).await;
            engine.route(&Event::clicked("A")).await;
            engine.route(&Event::clicked("B")).await
        })
        .await
        .expect("routing waited on a session that is not reading");

        assert_eq!(routed, RouteOutcome::Delivered(fast));
        assert!(fast_rx.try_recv().is_ok());
        let stats = engine.stats().await;
        assert_eq!(stats.events_delivered, 2);
        assert_eq!(stats.events_dropped, 1);
    }
}
