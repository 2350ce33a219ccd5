// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol definitions and their configuration messages.
//!
//! A protocol is a named tree of record definitions: which schemas may
//! appear at which structural level of a context, and who besides the owner
//! may write them. Owners install a protocol with a `ProtocolsConfigure`
//! message; the authorization engine reads the definition back out of the
//! store when a foreign write arrives.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use dwn_core::{time, Cid, GeneralJws, SignInput};

use crate::error::MessageError;
use crate::message::AuthPayload;

/// A protocol definition: schema labels plus the tree of record definitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolDefinition {
    pub labels: BTreeMap<String, LabelDefinition>,
    pub records: BTreeMap<String, RecordDefinition>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelDefinition {
    pub schema: String,
}

/// One node of the record tree.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordDefinition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow: Option<AllowRules>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<BTreeMap<String, RecordDefinition>>,
}

/// Who may act on records at this node, besides the owner.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllowRules {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anyone: Option<AnyoneRule>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<RecipientRule>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnyoneRule {
    pub to: Vec<Action>,
}

/// Grants actions to the recipient of an ancestor record.
///
/// `of` is a slash-separated path of labels naming the ancestor within the
/// context chain, e.g. `"ask/offer"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipientRule {
    pub of: String,
    pub to: Vec<Action>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Write,
    Query,
}

/// Greatest nesting depth of a record tree; bounds ancestor chain walks.
pub fn max_depth(records: &BTreeMap<String, RecordDefinition>) -> usize {
    records
        .values()
        .map(|definition| {
            1 + definition
                .records
                .as_ref()
                .map(max_depth)
                .unwrap_or_default()
        })
        .max()
        .unwrap_or_default()
}

/// Signed body of a ProtocolsConfigure message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ConfigureDescriptor {
    /// Always `"ProtocolsConfigure"`.
    pub method: String,

    pub protocol: String,

    pub definition: ProtocolDefinition,

    pub date_created: String,
}

/// Installs a protocol definition on a target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ProtocolsConfigure {
    pub descriptor: ConfigureDescriptor,
    pub authorization: GeneralJws,
}

impl ProtocolsConfigure {
    pub fn create(
        signer: &SignInput<'_>,
        protocol: &str,
        definition: ProtocolDefinition,
        date_created: Option<String>,
    ) -> Result<Self, MessageError> {
        let descriptor = ConfigureDescriptor {
            method: "ProtocolsConfigure".to_string(),
            protocol: protocol.to_string(),
            definition,
            date_created: date_created.unwrap_or_else(time::now),
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

    /// Content identifier of this message.
    pub fn cid(&self) -> Result<Cid, MessageError> {
        Ok(Cid::of_value(self)?)
    }

    pub fn validate_integrity(&self) -> Result<(), MessageError> {
        if self.descriptor.method != "ProtocolsConfigure" {
            return Err(MessageError::BadRequest(format!(
                "descriptor method must be ProtocolsConfigure, got {}",
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

/// Signed body of a ProtocolsQuery message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ProtocolsQueryDescriptor {
    /// Always `"ProtocolsQuery"`.
    pub method: String,

    pub date_created: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<ProtocolsQueryFilter>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProtocolsQueryFilter {
    pub protocol: String,
}

/// Reads back the protocol configurations installed on a target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ProtocolsQuery {
    pub descriptor: ProtocolsQueryDescriptor,
    pub authorization: GeneralJws,
}

impl ProtocolsQuery {
    pub fn create(
        signer: &SignInput<'_>,
        filter: Option<ProtocolsQueryFilter>,
    ) -> Result<Self, MessageError> {
        let descriptor = ProtocolsQueryDescriptor {
            method: "ProtocolsQuery".to_string(),
            date_created: time::now(),
            filter,
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
        if self.descriptor.method != "ProtocolsQuery" {
            return Err(MessageError::BadRequest(format!(
                "descriptor method must be ProtocolsQuery, got {}",
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
