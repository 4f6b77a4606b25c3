//! Routes UI-generated events to the session that registered their id.
//!
//! The owner is resolved under the scene read lock, the same lock transactions
//! take for writing, so a route racing a replace sees either the pre-replace
//! owner or no owner. Delivery happens after the lock is released and never
//! waits on the owner's queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uif_core::{Scene, SessionId};

use crate::protocol::{Event, ServerMessage, WireMessage};
use crate::session::{Delivery, SessionManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Never registered, or dropped by a replace/remove/disconnect
    UnknownEventId,
    /// Owner resolved but its connection closed before delivery
    SessionGone,
    /// Owner's outbound queue is full; it is not reading its socket
    Backlogged,
    Unencodable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered(SessionId),
    Dropped(DropReason),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub delivered: u64,
    pub dropped: u64,
}

pub struct EventRouter {
    scene: Arc<RwLock<Scene>>,
    sessions: Arc<SessionManager>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl EventRouter {
    pub fn new(scene: Arc<RwLock<Scene>>, sessions: Arc<SessionManager>) -> Self {
        Self {
            scene,
            sessions,
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Deliver `event` to its owner. Never fails: unroutable events are dropped.
    pub async fn route(&self, event: &Event) -> RouteOutcome {
        let owner = {
            let scene = self.scene.read().await;
            scene.lookup(event.id()).copied()
        };

        let Some(sub) = owner else {
            log::debug!("Dropping event for unknown id {:?}", event.id());
            return self.drop_event(DropReason::UnknownEventId);
        };

        if sub.kind != event.kind() {
            log::debug!(
                "Event {:?} arrived as {:?} but object {} registered {:?}",
                event.id(),
                event.kind(),
                sub.node_id,
                sub.kind
            );
        }

        let payload = match ServerMessage::Event(event.clone()).encode() {
            Ok(p) => Arc::new(p),
            Err(e) => {
                log::error!("Failed to encode event {:?}: {e}", event.id());
                return self.drop_event(DropReason::Unencodable);
            }
        };

        match self.sessions.deliver(sub.session, payload).await {
            Delivery::Queued => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                log::trace!("Event {:?} -> session {}", event.id(), sub.session);
                RouteOutcome::Delivered(sub.session)
            }
            Delivery::Backlogged => {
                log::warn!(
                    "Session {} is not keeping up, dropping event {:?}",
                    sub.session,
                    event.id()
                );
                self.drop_event(DropReason::Backlogged)
            }
            Delivery::Gone => {
                log::debug!(
                    "Session {} went away before event {:?} could be delivered",
                    sub.session,
                    event.id()
                );
                self.drop_event(DropReason::SessionGone)
            }
        }
    }

    fn drop_event(&self, reason: DropReason) -> RouteOutcome {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        RouteOutcome::Dropped(reason)
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use uif_core::{EditCommand, Node, ROOT_ID};

    fn addr() -> SocketAddr {
        "127.0.0.1:40001".parse().unwrap()
    }

    fn setup() -> (Arc<RwLock<Scene>>, Arc<SessionManager>, EventRouter) {
        setup_with_capacity(8)
    }

    fn setup_with_capacity(
        outbound_capacity: usize,
    ) -> (Arc<RwLock<Scene>>, Arc<SessionManager>, EventRouter) {
        let scene = Arc::new(RwLock::new(Scene::new()));
        let sessions = Arc::new(SessionManager::new(outbound_capacity));
        let router = EventRouter::new(scene.clone(), sessions.clone());
        (scene, sessions, router)
    }

    #[tokio::test]
    async fn test_routes_only_to_owner() {
        let (scene, sessions, router) = setup();
        let (owner, mut owner_rx) = sessions.open(addr()).await;
        let (_other, mut other_rx) = sessions.open(addr()).await;

        scene
            .write()
            .await
            .apply(
                owner,
                &[EditCommand::AppendChild {
                    parent_id: ROOT_ID,
                    object_id: 13,
                    node: Node::text_input("", "E1"),
                }],
            )
            .unwrap();

        let outcome = router.route(&Event::text_changed("E1", "hi")).await;
        assert_eq!(outcome, RouteOutcome::Delivered(owner));
        assert_eq!(
            owner_rx.recv().await.unwrap().as_str(),
            r#"{"TextChanged":{"id":"E1","text":"hi"}}"#
        );
        assert!(other_rx.try_recv().is_err());
        assert_eq!(router.stats().delivered, 1);
    }

    #[tokio::test]
    async fn test_unknown_id_dropped() {
        let (_scene, _sessions, router) = setup();
        let outcome = router.route(&Event::clicked("nope")).await;
        assert_eq!(outcome, RouteOutcome::Dropped(DropReason::UnknownEventId));
        assert_eq!(router.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_replaced_subscription_dropped() {
        let (scene, sessions, router) = setup();
        let (owner, _rx) = sessions.open(addr()).await;
        {
            let mut scene = scene.write().await;
            scene
                .apply(
                    owner,
                    &[EditCommand::AppendChild {
                        parent_id: ROOT_ID,
                        object_id: 5,
                        node: Node::button("Go", "B1"),
                    }],
                )
                .unwrap();
            scene
                .apply(
                    owner,
                    &[EditCommand::ReplaceNode {
                        object_id: 5,
                        node: Node::label("done"),
                    }],
                )
                .unwrap();
        }
        let outcome = router.route(&Event::clicked("B1")).await;
        assert_eq!(outcome, RouteOutcome::Dropped(DropReason::UnknownEventId));
    }

    #[tokio::test]
    async fn test_closed_session_dropped() {
        let (scene, sessions, router) = setup();
        let (owner, rx) = sessions.open(addr()).await;
        scene
            .write()
            .await
            .apply(
                owner,
                &[EditCommand::AppendChild {
                    parent_id: ROOT_ID,
                    object_id: 5,
                    node: Node::button("Go", "B1"),
                }],
            )
            .unwrap();
        sessions.close(owner).await;
        drop(rx);

        let outcome = router.route(&Event::clicked("B1")).await;
        assert_eq!(outcome, RouteOutcome::Dropped(DropReason::SessionGone));
    }

    #[tokio::test]
    async fn test_full_session_does_not_stall_others() {
        let (scene, sessions, router) = setup_with_capacity(1);
        let (slow, _slow_rx) = sessions.open(addr()).await;
        let (fast, mut fast_rx) = sessions.open(addr()).await;
        {
            let mut scene = scene.write().await;
            scene
                .apply(
                    slow,
                    &[EditCommand::AppendChild {
                        parent_id: ROOT_ID,
                        object_id: 1,
                        node: Node::button("A", "A"),
                    }],
                )
                .unwrap();
            scene
                .apply(
                    fast,
                    &[EditCommand::AppendChild {
                        parent_id: ROOT_ID,
                        object_id: 2,
                        node: Node::button("B", "B"),
                    }],
                )
                .unwrap();
        }

        let outcomes = tokio::time::timeout(std::time::Duration::from_millis(500), async {
            let first = router.route(&Event::clicked("A")).await;
            let second = router.route(&Event::clicked("A")).await;
            let third = router.route(&Event::clicked("B")).await;
            (first, second, third)
        })
        .await
        .expect("routing waited on a session that is not reading");

        assert_eq!(outcomes.0, RouteOutcome::Delivered(slow));
        assert_eq!(outcomes.1, RouteOutcome::Dropped(DropReason::Backlogged));
        assert_eq!(outcomes.2, RouteOutcome::Delivered(fast));
        assert_eq!(
            fast_rx.recv().await.unwrap().as_str(),
            r#"{"Clicked":{"id":"B"}}"#
        );
        assert_eq!(router.stats(), RouterStats { delivered: 2, dropped: 1 });
    }
}
