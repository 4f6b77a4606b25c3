use serde::{Deserialize, Serialize};

use crate::node::{Node, ObjectId};

/// A single structural edit. Externally tagged on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditCommand {
    AppendChild {
        parent_id: ObjectId,
        object_id: ObjectId,
        node: Node,
    },
    ReplaceNode {
        object_id: ObjectId,
        node: Node,
    },
    /// Detaches `object_id` and its whole subtree.
    RemoveChild {
        object_id: ObjectId,
    },
}

impl EditCommand {
    /// The identifier this edit targets (the new id for appends).
    pub fn object_id(&self) -> ObjectId {
        match self {
            EditCommand::AppendChild { object_id, .. }
            | EditCommand::ReplaceNode { object_id, .. }
            | EditCommand::RemoveChild { object_id } => *object_id,
        }
    }
}

/// Ordered batch of edits submitted by one client. Applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Advisory label for attribution only.
    pub client_id: String,
    #[serde(default)]
    pub edits: Vec<EditCommand>,
}

impl Transaction {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            edits: Vec::new(),
        }
    }

    pub fn with_edits(client_id: impl Into<String>, edits: Vec<EditCommand>) -> Self {
        Self {
            client_id: client_id.into(),
            edits,
        }
    }

    pub fn push(&mut self, edit: EditCommand) -> &mut Self {
        self.edits.push(edit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ROOT_ID;

    #[test]
    fn test_decode_hello_transaction() {
        let json = r#"{
            "client_id": "hello",
            "edits": [
                { "AppendChild": {
                    "parent_id": 4294967295,
                    "object_id": 10,
                    "node": { "TextNode": { "text": "Hello, World" } }
                } }
            ]
        }"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.client_id, "hello");
        assert_eq!(
            tx.edits,
            vec![EditCommand::AppendChild {
                parent_id: ROOT_ID,
                object_id: 10,
                node: Node::TextNode {
                    text: "Hello, World".into()
                },
            }]
        );
    }

    #[test]
    fn test_replace_wire_shape() {
        let edit = EditCommand::ReplaceNode {
            object_id: 3,
            node: Node::label("hi"),
        };
        assert_eq!(
            serde_json::to_string(&edit).unwrap(),
            r#"{"ReplaceNode":{"object_id":3,"node":{"Label":{"text":"hi"}}}}"#
        );
        assert_eq!(edit.object_id(), 3);
    }

    #[test]
    fn test_remove_wire_shape() {
        let edit: EditCommand = serde_json::from_str(r#"{"RemoveChild":{"object_id":7}}"#).unwrap();
        assert_eq!(edit, EditCommand::RemoveChild { object_id: 7 });
    }

    #[test]
    fn test_object_id_out_of_range_rejected() {
        let json = r#"{"ReplaceNode":{"object_id":4294967296,"node":{"TextNode":{"text":""}}}}"#;
        assert!(serde_json::from_str::<EditCommand>(json).is_err());
    }

    #[test]
    fn test_missing_edits_defaults_empty() {
        let tx: Transaction = serde_json::from_str(r#"{"client_id":"gouif2"}"#).unwrap();
        assert!(tx.is_empty());
    }
}
