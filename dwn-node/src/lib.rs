// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message handlers of a decentralized web node.
//!
//! The node accepts signed messages addressed to a target DID and persists
//! record state as a content-addressed lineage of updates. The write
//! pipeline validates the envelope, verifies the signature against the
//! author's resolved DID document, resolves the record lineage, authorizes
//! the write (owner-only or through the protocol engine) and finally runs
//! conflict resolution against the current tip before committing.
//!
//! ```no_run
//! use dwn_core::MemoryDidResolver;
//! use dwn_node::{Dwn, Message};
//! use dwn_store::MemoryStore;
//!
//! # async fn example(message: Message) {
//! let resolver = MemoryDidResolver::new();
//! let store = MemoryStore::new();
//! let node = Dwn::new(resolver, store);
//!
//! let reply = node
//!     .process_message("did:example:alice", message)
//!     .await
//!     .unwrap();
//! assert_eq!(reply.status.code, 202);
//! # }
//! ```

pub mod authorization;
pub mod error;
pub mod message;
pub mod node;
pub mod protocols;
pub mod records;
pub mod test_utils;

pub use error::{MessageError, Status, StoreFailure};
pub use message::{AuthPayload, Message, Reply};
pub use node::Dwn;
