//! Authoritative object tree.
//!
//! ```text
//!            ROOT (0xFFFFFFFF, virtual)
//!             │
//!        ┌────┴─────┐
//!       10          20        root_children: [10, 20]
//!        │
//!       11                    entries[10].children: [11]
//!      ┌─┴─┐
//!     12   13
//! ```
//!
//! Nodes are only appended under an existing parent, never re-parented,
//! so the structure cannot form cycles.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::edit::EditCommand;
use crate::error::TreeError;
use crate::node::{Node, ObjectId, ROOT_ID};

#[derive(Debug, Clone)]
struct Entry {
    node: Node,
    parent: ObjectId,
    children: Vec<ObjectId>,
}

/// One step of a depth-first traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visit<'a> {
    pub id: ObjectId,
    pub parent: ObjectId,
    /// 0 for top-level nodes
    pub depth: usize,
    pub node: &'a Node,
}

/// Pre-images of everything mutated since `begin`, keyed by first touch.
#[derive(Debug, Clone, Default)]
struct Journal {
    entries: HashMap<ObjectId, Option<Entry>>,
    root_children: Option<Vec<ObjectId>>,
}

/// Mapping from identifier to (node, parent, ordered children).
#[derive(Debug, Clone, Default)]
pub struct ObjectTree {
    entries: HashMap<ObjectId, Entry>,
    root_children: Vec<ObjectId>,
    journal: Option<Journal>,
}

impl ObjectTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes (the virtual root is not counted).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` is a live node.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: ObjectId) -> Result<&Node, TreeError> {
        self.entries
            .get(&id)
            .map(|e| &e.node)
            .ok_or(TreeError::UnknownTarget { object_id: id })
    }

    pub fn parent_of(&self, id: ObjectId) -> Option<ObjectId> {
        self.entries.get(&id).map(|e| e.parent)
    }

    /// Ordered children of `id`. Accepts the virtual root.
    pub fn children(&self, id: ObjectId) -> &[ObjectId] {
        if id == ROOT_ID {
            return &self.root_children;
        }
        self.entries
            .get(&id)
            .map(|e| e.children.as_slice())
            .unwrap_or(&[])
    }

    /// Append `node` as the last child of `parent_id`.
    pub fn insert(&mut self, parent_id: ObjectId, id: ObjectId, node: Node) -> Result<(), TreeError> {
        if id == ROOT_ID {
            return Err(TreeError::ReservedId { object_id: id });
        }
        if self.contains(id) {
            return Err(TreeError::DuplicateId { object_id: id });
        }

        if parent_id != ROOT_ID && !self.contains(parent_id) {
            return Err(TreeError::UnknownParent { parent_id });
        }

        self.touch(parent_id);
        self.touch(id);
        if parent_id == ROOT_ID {
            self.root_children.push(id);
        } else if let Some(parent) = self.entries.get_mut(&parent_id) {
            parent.children.push(id);
        }

        self.entries.insert(
            id,
            Entry {
                node,
                parent: parent_id,
                children: Vec::new(),
            },
        );
        Ok(())
    }

    /// Swap the content of `id` in place. Returns the previous node.
    pub fn replace(&mut self, id: ObjectId, node: Node) -> Result<Node, TreeError> {
        if self.contains(id) {
            self.touch(id);
        }
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(TreeError::UnknownTarget { object_id: id })?;
        Ok(std::mem::replace(&mut entry.node, node))
    }

    /// Detach `id` and drop its subtree. Returns the removed nodes in pre-order;
    /// their identifiers are free for reuse afterwards.
    pub fn remove(&mut self, id: ObjectId) -> Result<Vec<(ObjectId, Node)>, TreeError> {
        let parent = self
            .parent_of(id)
            .ok_or(TreeError::UnknownTarget { object_id: id })?;

        self.touch(parent);
        let siblings = if parent == ROOT_ID {
            &mut self.root_children
        } else {
            match self.entries.get_mut(&parent) {
                Some(p) => &mut p.children,
                None => return Err(TreeError::UnknownTarget { object_id: id }),
            }
        };
        siblings.retain(|child| *child != id);

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            self.touch(current);
            if let Some(entry) = self.entries.remove(&current) {
                stack.extend(entry.children.iter().rev());
                removed.push((current, entry.node));
            }
        }
        Ok(removed)
    }

    /// Start recording pre-images so that [`rollback`](Self::rollback) can undo
    /// every mutation made from here on.
    pub(crate) fn begin(&mut self) {
        self.journal = Some(Journal::default());
    }

    /// Keep the mutations made since `begin`.
    pub(crate) fn commit(&mut self) {
        self.journal = None;
    }

    /// Restore the tree to its state at `begin`.
    pub(crate) fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        if let Some(root_children) = journal.root_children {
            self.root_children = root_children;
        }
        for (id, before) in journal.entries {
            match before {
                Some(entry) => {
                    self.entries.insert(id, entry);
                }
                None => {
                    self.entries.remove(&id);
                }
            }
        }
    }

    fn touch(&mut self, id: ObjectId) {
        let Some(journal) = self.journal.as_mut() else {
            return;
        };
        if id == ROOT_ID {
            if journal.root_children.is_none() {
                journal.root_children = Some(self.root_children.clone());
            }
        } else if !journal.entries.contains_key(&id) {
            journal.entries.insert(id, self.entries.get(&id).cloned());
        }
    }

    /// Depth-first traversal from the virtual root, in child order.
    pub fn traverse(&self) -> Traverse<'_> {
        let stack = self
            .root_children
            .iter()
            .rev()
            .map(|id| (*id, ROOT_ID, 0))
            .collect();
        Traverse { tree: self, stack }
    }

    /// Identifiers in depth-first order.
    pub fn ids(&self) -> Vec<ObjectId> {
        self.traverse().map(|v| v.id).collect()
    }

    /// The whole tree as an AppendChild sequence that rebuilds it from empty.
    pub fn to_edits(&self) -> Vec<EditCommand> {
        self.traverse()
            .map(|v| EditCommand::AppendChild {
                parent_id: v.parent,
                object_id: v.id,
                node: v.node.clone(),
            })
            .collect()
    }

    /// Indented text dump, one node per line.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        for visit in self.traverse() {
            let _ = writeln!(
                out,
                "{:indent$}[{}] {}",
                "",
                visit.id,
                visit.node.describe(),
                indent = visit.depth * 2
            );
        }
        out
    }
}

/// Iterator returned by [`ObjectTree::traverse`].
pub struct Traverse<'a> {
    tree: &'a ObjectTree,
    stack: Vec<(ObjectId, ObjectId, usize)>,
}

impl<'a> Iterator for Traverse<'a> {
    type Item = Visit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        while let Some((id, parent, depth)) = self.stack.pop() {
            let Some(entry) = tree.entries.get(&id) else {
                continue;
            };
            self.stack
                .extend(entry.children.iter().rev().map(|child| (*child, id, depth + 1)));
            return Some(Visit {
                id,
                parent,
                depth,
                node: &entry.node,
            });
        }
        None
    }
}
