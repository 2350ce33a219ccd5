// SPDX-License-Identifier: MIT OR Apache-2.0

//! The message processing pipeline.
//!
//! [`Dwn`] owns the injected collaborators (DID resolver, message store) and
//! dispatches inbound messages to their handlers. A write runs through a
//! fixed pipeline: signature verification, self-validation, lineage
//! resolution, authorization, the immutable-field contract, conflict
//! resolution against the current tip and finally the commit. The pipeline
//! stops at the first failure; nothing is committed before the final store
//! calls, so cancelling a handler mid-flight leaves the store untouched.
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use dwn_core::DidResolver;
use dwn_store::{Filter, IndexTags, MessageStore};

use crate::authorization::authorize_protocol_write;
use crate::error::{MessageError, ProcessError, StoreFailure};
use crate::message::{claimed_author, Message, Reply};
use crate::protocols::{ProtocolsConfigure, ProtocolsQuery};
use crate::records::lineage::{self, supersedes, verify_lineage_child};
use crate::records::query::{dedupe_tips, sort_entries, CollectionsQuery};
use crate::records::write::{verify_immutable_fields, CollectionsWrite};

type RecordLocks = Arc<Mutex<HashMap<(String, String), Arc<Mutex<()>>>>>;

/// A decentralized web node.
pub struct Dwn<R, S> {
    resolver: R,
    store: S,

    /// Exclusive logical locks per `(tenant, recordId)`, spanning lineage
    /// resolution through commit. Readers do not take these.
    write_locks: RecordLocks,
}

impl<R, S> Dwn<R, S>
where
    R: DidResolver,
    S: MessageStore<Message>,
{
    pub fn new(resolver: R, store: S) -> Self {
        Self {
            resolver,
            store,
            write_locks: Default::default(),
        }
    }

    /// Parses and processes a raw JSON message envelope addressed to
    /// `target`.
    pub async fn process_json(
        &self,
        target: &str,
        raw: serde_json::Value,
    ) -> Result<Reply, StoreFailure> {
        match serde_json::from_value::<Message>(raw) {
            Ok(message) => self.process_message(target, message).await,
            Err(err) => Ok(Reply::from(MessageError::BadRequest(format!(
                "invalid message envelope: {err}"
            )))),
        }
    }

    /// Processes a message addressed to `target`.
    ///
    /// Rejections come back as replies with a 4xx status; only a broken
    /// store escapes as an error.
    pub async fn process_message(
        &self,
        target: &str,
        message: Message,
    ) -> Result<Reply, StoreFailure> {
        let result = match message {
            Message::CollectionsWrite(message) => {
                self.handle_collections_write(target, message).await
            }
            Message::CollectionsQuery(message) => {
                self.handle_collections_query(target, message).await
            }
            Message::ProtocolsConfigure(message) => {
                self.handle_protocols_configure(target, message).await
            }
            Message::ProtocolsQuery(message) => {
                self.handle_protocols_query(target, message).await
            }
        };

        match result {
            Ok(reply) => Ok(reply),
            Err(ProcessError::Rejected(error)) => {
                debug!(tenant = target, %error, "message rejected");
                Ok(Reply::from(error))
            }
            Err(ProcessError::Store(detail)) => Err(StoreFailure(detail)),
        }
    }

    async fn handle_collections_write(
        &self,
        target: &str,
        message: CollectionsWrite,
    ) -> Result<Reply, ProcessError> {
        let author = self.verify_author(&message.authorization).await?;
        message.validate_integrity()?;

        let lock = self.record_lock(target, &message.record_id).await;
        let _guard = lock.lock().await;

        let lineage = lineage::resolve(&self.store, target, &message.record_id).await?;
        verify_lineage_child(&self.store, target, &message, &author, lineage.as_ref()).await?;

        match &message.descriptor.protocol {
            Some(_) => {
                authorize_protocol_write(&self.store, target, &message, &author).await?;
            }
            None => {
                if author != target {
                    return Err(MessageError::Unauthorized(format!(
                        "{author} is not the owner {target}"
                    ))
                    .into());
                }
            }
        }

        if let Some(lineage) = &lineage {
            verify_immutable_fields(&message.descriptor, &lineage.root.descriptor)?;
        }

        let cid = message.cid()?;
        if let Some(lineage) = &lineage {
            // Re-submitting the current tip is an idempotent no-op.
            if cid == lineage.tip_cid {
                return Ok(Reply::accepted());
            }

            if !supersedes(
                (message.descriptor.date_modified.as_str(), &cid),
                (lineage.tip.descriptor.date_modified.as_str(), &lineage.tip_cid),
            ) {
                return Err(MessageError::Conflict.into());
            }
        }

        // Commit: the new tip lands first, then the stale flag is cleared. A
        // reader in between sees two flagged siblings and resolves them with
        // the conflict ordering.
        let tags = write_index_tags(&message, &author);
        let record_id = message.record_id.clone();
        let mut store = self.store.clone();
        store
            .put(target, &cid, &Message::CollectionsWrite(message), tags)
            .await
            .map_err(|err| ProcessError::Store(err.to_string()))?;

        if let Some(lineage) = &lineage {
            store
                .set_tag(target, &lineage.tip_cid, "isLatestTip", false.into())
                .await
                .map_err(|err| ProcessError::Store(err.to_string()))?;
        }

        debug!(tenant = target, record_id, %cid, "write accepted");
        Ok(Reply::accepted())
    }

    async fn handle_collections_query(
        &self,
        target: &str,
        message: CollectionsQuery,
    ) -> Result<Reply, ProcessError> {
        let author = self.verify_author(&message.authorization).await?;
        message.validate_integrity()?;

        if author != target {
            return Err(MessageError::Unauthorized(format!(
                "{author} is not the owner {target}"
            ))
            .into());
        }

        let filter = message.descriptor.filter.to_store_filter();
        let entries = self
            .store
            .query(target, &filter)
            .await
            .map_err(|err| ProcessError::Store(err.to_string()))?;

        let entries: Vec<_> = entries
            .into_iter()
            .filter_map(|(cid, message)| match message {
                Message::CollectionsWrite(write) => Some((cid, write)),
                _ => None,
            })
            .collect();

        let mut entries = dedupe_tips(entries);
        sort_entries(&mut entries, message.descriptor.date_sort);

        Ok(Reply::ok(
            entries
                .into_iter()
                .map(|(_, message)| Message::CollectionsWrite(message))
                .collect(),
        ))
    }

    async fn handle_protocols_configure(
        &self,
        target: &str,
        message: ProtocolsConfigure,
    ) -> Result<Reply, ProcessError> {
        let author = self.verify_author(&message.authorization).await?;
        message.validate_integrity()?;

        if author != target {
            return Err(MessageError::Unauthorized(format!(
                "only the owner {target} may configure protocols"
            ))
            .into());
        }

        let cid = message.cid()?;
        let mut tags = IndexTags::new();
        tags.insert("method".to_string(), "ProtocolsConfigure".into());
        tags.insert("protocol".to_string(), message.descriptor.protocol.as_str().into());
        tags.insert("author".to_string(), author.as_str().into());

        let protocol = message.descriptor.protocol.clone();
        let mut store = self.store.clone();
        store
            .put(target, &cid, &Message::ProtocolsConfigure(message), tags)
            .await
            .map_err(|err| ProcessError::Store(err.to_string()))?;

        debug!(tenant = target, protocol, "protocol configured");
        Ok(Reply::accepted())
    }

    async fn handle_protocols_query(
        &self,
        target: &str,
        message: ProtocolsQuery,
    ) -> Result<Reply, ProcessError> {
        let author = self.verify_author(&message.authorization).await?;
        message.validate_integrity()?;

        if author != target {
            return Err(MessageError::Unauthorized(format!(
                "{author} is not the owner {target}"
            ))
            .into());
        }

        let mut filter = Filter::new();
        filter.insert("method".to_string(), "ProtocolsConfigure".into());
        if let Some(query_filter) = &message.descriptor.filter {
            filter.insert("protocol".to_string(), query_filter.protocol.as_str().into());
        }

        let entries = self
            .store
            .query(target, &filter)
            .await
            .map_err(|err| ProcessError::Store(err.to_string()))?;

        Ok(Reply::ok(
            entries.into_iter().map(|(_, message)| message).collect(),
        ))
    }

    /// Verifies the single signature and returns the author DID.
    async fn verify_author(
        &self,
        authorization: &dwn_core::GeneralJws,
    ) -> Result<String, ProcessError> {
        let author = claimed_author(authorization)?;
        authorization
            .verify(&self.resolver)
            .await
            .map_err(MessageError::Signature)?;
        Ok(author)
    }

    async fn record_lock(&self, tenant: &str, record_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().await;
        locks
            .entry((tenant.to_string(), record_id.to_string()))
            .or_default()
            .clone()
    }
}

/// Index tags of an accepted write; the new version always lands flagged as
/// the tip.
fn write_index_tags(message: &CollectionsWrite, author: &str) -> IndexTags {
    let mut tags = IndexTags::new();
    tags.insert("method".to_string(), "CollectionsWrite".into());
    tags.insert("recordId".to_string(), message.record_id.as_str().into());
    tags.insert("schema".to_string(), message.descriptor.schema.as_str().into());
    tags.insert(
        "dataFormat".to_string(),
        message.descriptor.data_format.as_str().into(),
    );
    tags.insert(
        "recipient".to_string(),
        message.descriptor.recipient.as_str().into(),
    );
    tags.insert("author".to_string(), author.into());
    tags.insert("isLatestTip".to_string(), true.into());

    if let Some(context_id) = &message.context_id {
        tags.insert("contextId".to_string(), context_id.as_str().into());
    }
    if let Some(protocol) = &message.descriptor.protocol {
        tags.insert("protocol".to_string(), protocol.as_str().into());
    }
    if let Some(parent_id) = &message.descriptor.parent_id {
        tags.insert("parentId".to_string(), parent_id.as_str().into());
    }

    tags
}
