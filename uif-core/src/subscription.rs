//! Event-id index: which session and node own each client-chosen event id.
//!
//! Event ids are opaque and untrusted. A second node registering an id that is
//! already owned takes it over (latest installer wins); the earlier node's entry
//! is forgotten so that replacing or removing it later cannot evict the new owner.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::node::{EventKind, ObjectId};

/// Server-assigned identity of one connection. Unlike `client_id`, always unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub session: SessionId,
    pub node_id: ObjectId,
    pub kind: EventKind,
}

/// Pre-images of every key mutated since `begin`, keyed by first touch.
#[derive(Debug, Clone, Default)]
struct Journal {
    by_event: HashMap<String, Option<Subscription>>,
    by_node: HashMap<ObjectId, Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionIndex {
    by_event: HashMap<String, Subscription>,
    by_node: HashMap<ObjectId, String>,
    journal: Option<Journal>,
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `event_id` for `node_id`. Returns the displaced owner, if any.
    pub fn register(
        &mut self,
        event_id: &str,
        node_id: ObjectId,
        kind: EventKind,
        session: SessionId,
    ) -> Option<Subscription> {
        self.save_node(node_id);
        if let Some(previous_id) = self.by_node.remove(&node_id) {
            if previous_id != event_id {
                self.save_event(&previous_id);
                self.by_event.remove(&previous_id);
            }
        }

        self.save_event(event_id);
        let displaced = self.by_event.insert(
            event_id.to_string(),
            Subscription {
                session,
                node_id,
                kind,
            },
        );
        self.by_node.insert(node_id, event_id.to_string());

        match displaced {
            Some(old) if old.node_id != node_id => {
                self.save_node(old.node_id);
                self.by_node.remove(&old.node_id);
                log::warn!(
                    "Event id {event_id:?} moved from object {} to object {node_id}",
                    old.node_id
                );
                Some(old)
            }
            _ => None,
        }
    }

    /// Drop whatever `node_id` registered. Returns the event id it owned.
    pub fn unregister_for(&mut self, node_id: ObjectId) -> Option<String> {
        if !self.by_node.contains_key(&node_id) {
            return None;
        }
        self.save_node(node_id);
        let event_id = self.by_node.remove(&node_id)?;
        if self
            .by_event
            .get(&event_id)
            .is_some_and(|s| s.node_id == node_id)
        {
            self.save_event(&event_id);
            self.by_event.remove(&event_id);
        }
        Some(event_id)
    }

    pub fn lookup(&self, event_id: &str) -> Option<&Subscription> {
        self.by_event.get(event_id)
    }

    /// Event id currently owned by `node_id`.
    pub fn event_for(&self, node_id: ObjectId) -> Option<&str> {
        self.by_node.get(&node_id).map(String::as_str)
    }

    /// Forget every subscription owned by `session`. Returns how many were dropped.
    pub fn drop_session(&mut self, session: SessionId) -> usize {
        let owned: Vec<(String, ObjectId)> = self
            .by_event
            .iter()
            .filter(|(_, sub)| sub.session == session)
            .map(|(event_id, sub)| (event_id.clone(), sub.node_id))
            .collect();
        for (event_id, node_id) in &owned {
            self.save_event(event_id);
            self.save_node(*node_id);
            self.by_event.remove(event_id);
            self.by_node.remove(node_id);
        }
        owned.len()
    }

    /// Start recording pre-images so that [`rollback`](Self::rollback) can undo
    /// every change made from here on.
    pub(crate) fn begin(&mut self) {
        self.journal = Some(Journal::default());
    }

    pub(crate) fn commit(&mut self) {
        self.journal = None;
    }

    /// Restore the index to its state at `begin`.
    pub(crate) fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for (event_id, before) in journal.by_event {
            match before {
                Some(sub) => {
                    self.by_event.insert(event_id, sub);
                }
                None => {
                    self.by_event.remove(&event_id);
                }
            }
        }
        for (node_id, before) in journal.by_node {
            match before {
                Some(event_id) => {
                    self.by_node.insert(node_id, event_id);
                }
                None => {
                    self.by_node.remove(&node_id);
                }
            }
        }
    }

    fn save_event(&mut self, event_id: &str) {
        if let Some(journal) = self.journal.as_mut() {
            if !journal.by_event.contains_key(event_id) {
                journal
                    .by_event
                    .insert(event_id.to_string(), self.by_event.get(event_id).copied());
            }
        }
    }

    fn save_node(&mut self, node_id: ObjectId) {
        if let Some(journal) = self.journal.as_mut() {
            journal
                .by_node
                .entry(node_id)
                .or_insert_with(|| self.by_node.get(&node_id).cloned());
        }
    }

    pub fn len(&self) -> usize {
        self.by_event.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_event.is_empty()
    }
}
