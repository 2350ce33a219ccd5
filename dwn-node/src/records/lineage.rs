// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lineage resolution.
//!
//! Given a `(tenant, recordId)` pair the resolver locates the lineage root
//! and the current tip. The tip is normally the single message flagged
//! `isLatestTip`; when a store without multi-key atomicity briefly exposes
//! two flagged siblings, the conflict ordering picks one.
use std::collections::HashSet;

use dwn_core::Cid;
use dwn_store::{Filter, MessageStore};

use crate::error::{MessageError, ProcessError};
use crate::message::Message;
use crate::records::write::CollectionsWrite;

/// A resolved record lineage.
#[derive(Debug)]
pub struct Lineage {
    pub root: CollectionsWrite,

    pub tip_cid: Cid,
    pub tip: CollectionsWrite,

    /// CIDs of every version in the lineage; a candidate child's
    /// `lineageParent` must be one of these.
    pub members: HashSet<Cid>,
}

/// Total order of lineage versions: `dateModified` first, CID text form as
/// the tiebreak.
pub fn supersedes(
    candidate: (&str, &Cid),
    incumbent: (&str, &Cid),
) -> bool {
    (candidate.0, candidate.1.to_text()) > (incumbent.0, incumbent.1.to_text())
}

/// Resolves the lineage of a record, or `None` when no version exists yet.
pub async fn resolve<S>(
    store: &S,
    tenant: &str,
    record_id: &str,
) -> Result<Option<Lineage>, ProcessError>
where
    S: MessageStore<Message>,
{
    let mut filter = Filter::new();
    filter.insert("method".to_string(), "CollectionsWrite".into());
    filter.insert("recordId".to_string(), record_id.into());

    let entries = store
        .query(tenant, &filter)
        .await
        .map_err(|err| ProcessError::Store(err.to_string()))?;

    let versions: Vec<(Cid, CollectionsWrite)> = entries
        .into_iter()
        .filter_map(|(cid, message)| match message {
            Message::CollectionsWrite(write) => Some((cid, write)),
            _ => None,
        })
        .collect();

    if versions.is_empty() {
        return Ok(None);
    }

    let root = versions
        .iter()
        .find(|(_, message)| message.is_lineage_root())
        .map(|(_, message)| message.clone())
        .ok_or_else(|| MessageError::LineageRootMissing(record_id.to_string()))?;

    // Prefer the flagged tip; a transient double-flag or a missing flag both
    // fall back to the conflict ordering over the affected versions.
    let mut tip_filter = filter.clone();
    tip_filter.insert("isLatestTip".to_string(), true.into());
    let flagged = store
        .query(tenant, &tip_filter)
        .await
        .map_err(|err| ProcessError::Store(err.to_string()))?;

    let candidates: Vec<(Cid, CollectionsWrite)> = if flagged.is_empty() {
        versions.clone()
    } else {
        flagged
            .into_iter()
            .filter_map(|(cid, message)| match message {
                Message::CollectionsWrite(write) => Some((cid, write)),
                _ => None,
            })
            .collect()
    };

    let (tip_cid, tip) = candidates
        .into_iter()
        .reduce(|current, candidate| {
            if supersedes(
                (candidate.1.descriptor.date_modified.as_str(), &candidate.0),
                (current.1.descriptor.date_modified.as_str(), &current.0),
            ) {
                candidate
            } else {
                current
            }
        })
        .expect("lineage has at least one version");

    let members = versions.iter().map(|(cid, _)| *cid).collect();

    Ok(Some(Lineage {
        root,
        tip_cid,
        tip,
        members,
    }))
}

/// Checks a candidate child against the resolved lineage state.
///
/// A child needs an existing root and a `lineageParent` which is a member of
/// the lineage; the author of a new version must match the author of the
/// version it supersedes, no matter what the protocol would otherwise allow.
pub async fn verify_lineage_child<S>(
    store: &S,
    tenant: &str,
    candidate: &CollectionsWrite,
    author: &str,
    lineage: Option<&Lineage>,
) -> Result<(), ProcessError>
where
    S: MessageStore<Message>,
{
    let Some(lineage_parent) = &candidate.descriptor.lineage_parent else {
        return Ok(());
    };

    let Some(lineage) = lineage else {
        return Err(MessageError::LineageRootMissing(candidate.record_id.clone()).into());
    };

    if !lineage.members.contains(lineage_parent) {
        return Err(MessageError::BadLineageParent(candidate.record_id.clone()).into());
    }

    let parent_version = store
        .get(tenant, lineage_parent)
        .await
        .map_err(|err| ProcessError::Store(err.to_string()))?;
    let Some(Message::CollectionsWrite(parent_version)) = parent_version else {
        return Err(MessageError::BadLineageParent(candidate.record_id.clone()).into());
    };

    let parent_author = parent_version.author()?;
    if parent_author != author {
        return Err(MessageError::AuthorMismatchOnUpdate {
            author: author.to_string(),
            parent_author,
        }
        .into());
    }

    Ok(())
}
