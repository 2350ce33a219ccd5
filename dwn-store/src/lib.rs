// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenanted, tag-indexed message persistence.
//!
//! The store is content-addressed and append-ish: messages are added under
//! their CID and never modified, only their index tags change (the write
//! handler flips the tip flag after a successful supersede). Queries are
//! conjunctions of equality predicates over the indexed tags.

mod memory;
mod traits;

pub use memory::MemoryStore;
pub use traits::{filter_matches, Filter, IndexTags, MessageStore, TagValue};
