//! Atomic transaction application.
//!
//! A transaction is applied in place while the tree and the subscription index
//! journal the pre-image of every entry they touch. If any edit fails, both are
//! rolled back from their journals, so the tree and the index always change
//! together and a rejected transaction leaves no trace. The cost is proportional
//! to what the transaction touches, not to the size of the tree.

use serde::{Deserialize, Serialize};

use crate::edit::EditCommand;
use crate::error::{Rejection, TreeError};
use crate::node::{Node, ObjectId};
use crate::subscription::{SessionId, Subscription, SubscriptionIndex};
use crate::tree::ObjectTree;

/// Successful application of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Scene revision after the transaction
    pub revision: u64,
    /// Number of edits applied
    pub edits: usize,
}

/// Tree plus its derived subscription index.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    tree: ObjectTree,
    subscriptions: SubscriptionIndex,
    revision: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> &ObjectTree {
        &self.tree
    }

    pub fn subscriptions(&self) -> &SubscriptionIndex {
        &self.subscriptions
    }

    /// Incremented once per non-empty applied transaction.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, id: ObjectId) -> Result<&Node, TreeError> {
        self.tree.get(id)
    }

    pub fn lookup(&self, event_id: &str) -> Option<&Subscription> {
        self.subscriptions.lookup(event_id)
    }

    /// Apply `edits` in order, all-or-nothing, on behalf of `session`.
    pub fn apply(&mut self, session: SessionId, edits: &[EditCommand]) -> Result<Ack, Rejection> {
        if edits.is_empty() {
            return Ok(Ack {
                revision: self.revision,
                edits: 0,
            });
        }

        self.tree.begin();
        self.subscriptions.begin();
        for (index, edit) in edits.iter().enumerate() {
            if let Err(error) = self.apply_edit(session, edit) {
                self.tree.rollback();
                self.subscriptions.rollback();
                return Err(Rejection { index, error });
            }
        }
        self.tree.commit();
        self.subscriptions.commit();
        self.revision += 1;

        Ok(Ack {
            revision: self.revision,
            edits: edits.len(),
        })
    }

    fn apply_edit(&mut self, session: SessionId, edit: &EditCommand) -> Result<(), TreeError> {
        match edit {
            EditCommand::AppendChild {
                parent_id,
                object_id,
                node,
            } => {
                self.tree.insert(*parent_id, *object_id, node.clone())?;
                self.install(session, *object_id, node);
            }
            EditCommand::ReplaceNode { object_id, node } => {
                self.tree.replace(*object_id, node.clone())?;
                self.subscriptions.unregister_for(*object_id);
                self.install(session, *object_id, node);
            }
            EditCommand::RemoveChild { object_id } => {
                for (id, _) in self.tree.remove(*object_id)? {
                    self.subscriptions.unregister_for(id);
                }
            }
        }
        Ok(())
    }

    fn install(&mut self, session: SessionId, object_id: ObjectId, node: &Node) {
        if let Some((event_id, kind)) = node.subscription() {
            self.subscriptions.register(event_id, object_id, kind, session);
        }
    }

    /// Forget the subscriptions of a disconnected session. Its nodes stay in the tree.
    pub fn drop_session(&mut self, session: SessionId) -> usize {
        self.subscriptions.drop_session(session)
    }
}
