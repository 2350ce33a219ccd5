// SPDX-License-Identifier: MIT OR Apache-2.0

//! CollectionsQuery messages.
//!
//! Queries run over the tag index and only surface the current tip of every
//! matched record. Readers never take the write lock; a transiently
//! double-flagged lineage is de-duplicated with the same ordering the write
//! handler uses for conflict resolution.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use dwn_core::{time, Cid, GeneralJws, SignInput};
use dwn_store::Filter;

use crate::error::MessageError;
use crate::message::AuthPayload;
use crate::records::lineage::supersedes;
use crate::records::write::CollectionsWrite;

/// Equality filters over the indexed record tags.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RecordsFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_format: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl RecordsFilter {
    /// The store filter: the given predicates plus the tip marker.
    pub fn to_store_filter(&self) -> Filter {
        let mut filter = Filter::new();
        filter.insert("method".to_string(), "CollectionsWrite".into());
        filter.insert("isLatestTip".to_string(), true.into());

        let fields = [
            ("recordId", &self.record_id),
            ("contextId", &self.context_id),
            ("protocol", &self.protocol),
            ("schema", &self.schema),
            ("parentId", &self.parent_id),
            ("dataFormat", &self.data_format),
            ("recipient", &self.recipient),
        ];
        for (tag, value) in fields {
            if let Some(value) = value {
                filter.insert(tag.to_string(), value.as_str().into());
            }
        }

        filter
    }
}

/// Result ordering over descriptor timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DateSort {
    CreatedAscending,
    CreatedDescending,
    ModifiedAscending,
    ModifiedDescending,
}

/// Signed body of a CollectionsQuery message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct QueryDescriptor {
    /// Always `"CollectionsQuery"`.
    pub method: String,

    pub date_created: String,

    pub filter: RecordsFilter,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_sort: Option<DateSort>,
}

/// A complete CollectionsQuery message envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CollectionsQuery {
    pub descriptor: QueryDescriptor,
    pub authorization: GeneralJws,
}

impl CollectionsQuery {
    pub fn create(
        signer: &SignInput<'_>,
        filter: RecordsFilter,
        date_sort: Option<DateSort>,
    ) -> Result<Self, MessageError> {
        let descriptor = QueryDescriptor {
            method: "CollectionsQuery".to_string(),
            date_created: time::now(),
            filter,
            date_sort,
        };

        let authorization = AuthPayload {
            descriptor_cid: Cid::of_value(&descriptor)?,
            record_id: None,
            context_id: None,
        }
        .sign(signer);

        Ok(Self {
            descriptor,
            authorization,
        })
    }

    pub fn author(&self) -> Result<String, MessageError> {
        crate::message::claimed_author(&self.authorization)
    }

    pub fn validate_integrity(&self) -> Result<(), MessageError> {
        if self.descriptor.method != "CollectionsQuery" {
            return Err(MessageError::BadRequest(format!(
                "descriptor method must be CollectionsQuery, got {}",
                self.descriptor.method
            )));
        }

        let payload = AuthPayload::decode(&self.authorization)?;
        if payload.descriptor_cid != Cid::of_value(&self.descriptor)? {
            return Err(MessageError::DescriptorCidMismatch);
        }

        Ok(())
    }
}

/// Keeps exactly one version per record.
///
/// A reader can observe two tip-flagged siblings between the two commit
/// steps of a concurrent write; the conflict ordering decides which one the
/// query surfaces.
pub fn dedupe_tips(entries: Vec<(Cid, CollectionsWrite)>) -> Vec<(Cid, CollectionsWrite)> {
    let mut tips: BTreeMap<String, (Cid, CollectionsWrite)> = BTreeMap::new();

    for (cid, message) in entries {
        let replaces = match tips.get(&message.record_id) {
            Some((current_cid, current)) => supersedes(
                (message.descriptor.date_modified.as_str(), &cid),
                (current.descriptor.date_modified.as_str(), current_cid),
            ),
            None => true,
        };

        if replaces {
            tips.insert(message.record_id.clone(), (cid, message));
        }
    }

    tips.into_values().collect()
}

/// Sorts entries per the requested ordering; ties fall back to the CID text
/// form so results are stable.
pub fn sort_entries(entries: &mut [(Cid, CollectionsWrite)], date_sort: Option<DateSort>) {
    let date_sort = date_sort.unwrap_or(DateSort::CreatedAscending);

    entries.sort_by(|(left_cid, left), (right_cid, right)| {
        let (left_date, right_date) = match date_sort {
            DateSort::CreatedAscending | DateSort::CreatedDescending => {
                (&left.descriptor.date_created, &right.descriptor.date_created)
            }
            DateSort::ModifiedAscending | DateSort::ModifiedDescending => {
                (&left.descriptor.date_modified, &right.descriptor.date_modified)
            }
        };

        let ordering = (left_date, left_cid.to_text()).cmp(&(right_date, right_cid.to_text()));
        match date_sort {
            DateSort::CreatedAscending | DateSort::ModifiedAscending => ordering,
            DateSort::CreatedDescending | DateSort::ModifiedDescending => ordering.reverse(),
        }
    });
}
