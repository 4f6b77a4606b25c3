//! # uif-core: authoritative UI object tree
//!
//! Holds the tree of UI objects that clients build through incremental edits,
//! and the index that maps client-chosen event ids back to the session that
//! installed them. No I/O and no locking: callers serialize access.
//!
//! ## Modules
//!
//! - [`node`]: node variants and identifiers
//! - [`edit`]: edit commands and transactions (wire types)
//! - [`tree`]: the object tree store and traversal
//! - [`subscription`]: event-id → (session, node) index
//! - [`transaction`]: atomic application of transactions
//! - [`error`]: structural validation errors

pub mod edit;
pub mod error;
pub mod node;
pub mod subscription;
pub mod transaction;
pub mod tree;

pub use edit::{EditCommand, Transaction};
pub use error::{Rejection, TreeError};
pub use node::{EventKind, Node, ObjectId, ROOT_ID};
pub use subscription::{SessionId, Subscription, SubscriptionIndex};
pub use transaction::{Ack, Scene};
pub use tree::{ObjectTree, Traverse, Visit};
