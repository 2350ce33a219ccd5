// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::BTreeMap;
use std::fmt::{Debug, Display};
use std::future::Future;

use dwn_core::Cid;
use serde::{Deserialize, Serialize};

/// A single indexed tag value.
///
/// Tags are either text (identifiers, schema URIs, DIDs) or flags (the tip
/// marker). Conversions exist for both so call sites can write
/// `("schema", value.into())`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Flag(bool),
    Text(String),
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::Flag(value)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Text(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Text(value)
    }
}

/// Index tags recorded alongside a message.
pub type IndexTags = BTreeMap<String, TagValue>;

/// A conjunction of equality predicates over index tags.
pub type Filter = BTreeMap<String, TagValue>;

/// Whether the given tags satisfy every predicate of the filter.
pub fn filter_matches(tags: &IndexTags, filter: &Filter) -> bool {
    filter
        .iter()
        .all(|(key, value)| tags.get(key) == Some(value))
}

/// Interface for storing, querying and deleting messages, tenanted by the
/// DWN owner the message was addressed to.
pub trait MessageStore<M>: Clone {
    type Error: Display + Debug;

    /// Opens the store for use.
    fn open(&mut self) -> impl Future<Output = Result<(), Self::Error>>;

    /// Flushes and closes the store.
    fn close(&mut self) -> impl Future<Output = Result<(), Self::Error>>;

    /// Inserts a message under its CID together with its index tags.
    ///
    /// Returns `true` when the insert occurred, or `false` when the message
    /// already existed and no insertion occurred.
    fn put(
        &mut self,
        tenant: &str,
        cid: &Cid,
        message: &M,
        tags: IndexTags,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Gets a single message by CID.
    fn get(
        &self,
        tenant: &str,
        cid: &Cid,
    ) -> impl Future<Output = Result<Option<M>, Self::Error>>;

    /// Finds all messages whose tags satisfy the filter, ordered by CID text
    /// form for determinism.
    fn query(
        &self,
        tenant: &str,
        filter: &Filter,
    ) -> impl Future<Output = Result<Vec<(Cid, M)>, Self::Error>>;

    /// Removes a single message.
    ///
    /// Returns `true` when the removal occurred and `false` when the message
    /// was not found in the store.
    fn delete(
        &mut self,
        tenant: &str,
        cid: &Cid,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Overwrites a single index tag of an already stored message.
    ///
    /// Returns `true` when the message was found and the tag written.
    fn set_tag(
        &mut self,
        tenant: &str,
        cid: &Cid,
        tag: &str,
        value: TagValue,
    ) -> impl Future<Output = Result<bool, Self::Error>>;

    /// Drops all messages across all tenants.
    fn clear(&mut self) -> impl Future<Output = Result<(), Self::Error>>;
}
