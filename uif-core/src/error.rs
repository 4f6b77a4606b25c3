use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::ObjectId;

/// Structural validation failures. Recoverable: the client may retry.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeError {
    #[error("parent {parent_id} does not exist")]
    UnknownParent { parent_id: ObjectId },
    #[error("object {object_id} already exists")]
    DuplicateId { object_id: ObjectId },
    #[error("object {object_id} does not exist")]
    UnknownTarget { object_id: ObjectId },
    #[error("object id {object_id} is reserved for the virtual root")]
    ReservedId { object_id: ObjectId },
}

/// Why a transaction was discarded: the position of the failing edit and its error.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("edit #{index} rejected: {error}")]
pub struct Rejection {
    pub index: usize,
    pub error: TreeError,
}
