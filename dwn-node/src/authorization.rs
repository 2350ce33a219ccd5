// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol-based write authorization.
//!
//! A protocol-scoped write by someone other than the owner is authorized by
//! walking the record's ancestor chain within its context against the
//! installed protocol definition: every ancestor must sit at a permitted
//! structural level, and the record's own definition must carry an allow
//! rule granting `write` to the author.
use tracing::debug;

use dwn_store::{Filter, MessageStore};

use crate::error::{MessageError, ProcessError};
use crate::message::Message;
use crate::protocols::{max_depth, Action, ProtocolDefinition, RecordDefinition};
use crate::records::write::CollectionsWrite;

/// Decides whether `author` may write `message` into `tenant`'s store.
///
/// Every protocol-scoped write passes through here, owner writes included:
/// the record must fit the protocol structure no matter who wrote it. Only
/// the allow-rule evaluation is waived for the owner.
pub async fn authorize_protocol_write<S>(
    store: &S,
    tenant: &str,
    message: &CollectionsWrite,
    author: &str,
) -> Result<(), ProcessError>
where
    S: MessageStore<Message>,
{
    let protocol = message
        .descriptor
        .protocol
        .as_deref()
        .expect("protocol authorization runs on protocol-scoped messages");

    let definition = fetch_definition(store, tenant, protocol).await?;

    let ancestors = fetch_ancestors(store, tenant, message, &definition).await?;

    // Walk the chain from the context root down to the inbound message,
    // matching each element's schema onto a label permitted at that level.
    let mut level = Some(&definition.records);
    let mut labels: Vec<&str> = Vec::with_capacity(ancestors.len() + 1);
    let mut rule_node: Option<&RecordDefinition> = None;

    for (depth, element) in ancestors.iter().chain([message]).enumerate() {
        let schema = &element.descriptor.schema;

        let candidates: Vec<&str> = definition
            .labels
            .iter()
            .filter(|(_, label)| &label.schema == schema)
            .map(|(name, _)| name.as_str())
            .collect();
        if candidates.is_empty() {
            return Err(MessageError::SchemaNotAllowed(schema.clone()).into());
        }

        // Multiple labels may share a schema; the structural position
        // decides which one applies.
        let node = level.and_then(|records| {
            candidates
                .iter()
                .find_map(|label| records.get_key_value(*label))
        });
        let Some((label, node)) = node else {
            return Err(MessageError::StructureLevelNotAllowed {
                schema: schema.clone(),
                level: depth,
            }
            .into());
        };

        labels.push(label.as_str());
        level = node.records.as_ref();
        rule_node = Some(node);
    }

    // The owner needs no allow rule, only a structurally valid record.
    if author == tenant {
        return Ok(());
    }

    let rule_node = rule_node.expect("the chain contains at least the inbound message");
    let Some(rules) = &rule_node.allow else {
        return Err(MessageError::NoAllowRule(author.to_string()).into());
    };

    if let Some(anyone) = &rules.anyone {
        if anyone.to.contains(&Action::Write) {
            debug!(protocol, author, "write allowed to anyone");
            return Ok(());
        }
    }

    if let Some(recipient_rule) = &rules.recipient {
        if recipient_rule.to.contains(&Action::Write) {
            let ancestor = ancestor_at_path(&recipient_rule.of, &labels, &ancestors)?;
            if ancestor.descriptor.recipient != author {
                return Err(MessageError::UnexpectedAuthor(author.to_string()).into());
            }
            debug!(protocol, author, path = %recipient_rule.of, "write allowed to ancestor recipient");
            return Ok(());
        }
    }

    Err(MessageError::NoAllowRule(author.to_string()).into())
}

/// The newest installed configuration of the protocol.
async fn fetch_definition<S>(
    store: &S,
    tenant: &str,
    protocol: &str,
) -> Result<ProtocolDefinition, ProcessError>
where
    S: MessageStore<Message>,
{
    let mut filter = Filter::new();
    filter.insert("method".to_string(), "ProtocolsConfigure".into());
    filter.insert("protocol".to_string(), protocol.into());

    let entries = store
        .query(tenant, &filter)
        .await
        .map_err(|err| ProcessError::Store(err.to_string()))?;

    entries
        .into_iter()
        .filter_map(|(cid, message)| match message {
            Message::ProtocolsConfigure(configure) => Some((cid, configure)),
            _ => None,
        })
        .max_by(|(left_cid, left), (right_cid, right)| {
            (&left.descriptor.date_created, left_cid.to_text())
                .cmp(&(&right.descriptor.date_created, right_cid.to_text()))
        })
        .map(|(_, configure)| configure.descriptor.definition)
        .ok_or_else(|| MessageError::NoProtocolDefinition(protocol.to_string()).into())
}

/// The context ancestor chain of the message, oldest first.
///
/// Ancestors are resolved through `parentId` lookups within the message's
/// `(protocol, contextId)`, bounded by the definition tree depth so that a
/// malformed parent link can not walk forever.
async fn fetch_ancestors<S>(
    store: &S,
    tenant: &str,
    message: &CollectionsWrite,
    definition: &ProtocolDefinition,
) -> Result<Vec<CollectionsWrite>, ProcessError>
where
    S: MessageStore<Message>,
{
    let bound = max_depth(&definition.records);

    let mut chain: Vec<CollectionsWrite> = Vec::new();
    let mut parent_id = message.descriptor.parent_id.clone();

    while let Some(record_id) = parent_id {
        if chain.len() >= bound {
            return Err(MessageError::StructureLevelNotAllowed {
                schema: message.descriptor.schema.clone(),
                level: chain.len(),
            }
            .into());
        }

        let mut filter = Filter::new();
        filter.insert("method".to_string(), "CollectionsWrite".into());
        filter.insert(
            "protocol".to_string(),
            message.descriptor.protocol.clone().unwrap_or_default().into(),
        );
        if let Some(context_id) = &message.context_id {
            filter.insert("contextId".to_string(), context_id.as_str().into());
        }
        filter.insert("recordId".to_string(), record_id.as_str().into());
        filter.insert("isLatestTip".to_string(), true.into());

        let entries = store
            .query(tenant, &filter)
            .await
            .map_err(|err| ProcessError::Store(err.to_string()))?;

        let parent = entries
            .into_iter()
            .find_map(|(_, message)| match message {
                Message::CollectionsWrite(write) => Some(write),
                _ => None,
            })
            .ok_or_else(|| MessageError::ParentMissing(record_id.clone()))?;

        parent_id = parent.descriptor.parent_id.clone();
        chain.push(parent);
    }

    chain.reverse();
    Ok(chain)
}

/// Resolves a slash-separated label path to the ancestor it names.
fn ancestor_at_path<'a>(
    path: &str,
    labels: &[&str],
    ancestors: &'a [CollectionsWrite],
) -> Result<&'a CollectionsWrite, MessageError> {
    let segments: Vec<&str> = path.split('/').collect();

    // Only ancestors may be named; the final element of `labels` is the
    // inbound message itself.
    if segments.len() > ancestors.len() {
        return Err(MessageError::RecipientPathTooLong);
    }

    for (segment, label) in segments.iter().zip(labels.iter()) {
        if segment != label {
            return Err(MessageError::SchemaMismatch(segment.to_string()));
        }
    }

    Ok(&ancestors[segments.len() - 1])
}
