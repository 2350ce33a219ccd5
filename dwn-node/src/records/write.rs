// SPDX-License-Identifier: MIT OR Apache-2.0

//! CollectionsWrite messages.
//!
//! A record is a lineage of CollectionsWrite messages sharing one
//! `recordId`. The first message is the lineage root: its `recordId` is
//! derived deterministically from the immutable subset of the descriptor, so
//! independent writers converge on the same identifier for the same record.
//! Every later message inherits the `recordId` and points at a previous
//! version through `lineageParent`.
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use dwn_core::cbor::EncodeError;
use dwn_core::{time, Cid, GeneralJws, SignInput};

use crate::error::MessageError;
use crate::message::AuthPayload;

/// Signed body of a CollectionsWrite message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct WriteDescriptor {
    /// Always `"CollectionsWrite"`.
    pub method: String,

    /// DID of the intended recipient. Immutable.
    pub recipient: String,

    /// Protocol identifier, present iff the record is protocol-scoped.
    /// Immutable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    /// Schema identifier. Immutable.
    pub schema: String,

    /// `recordId` of the structural parent record within the same protocol
    /// context. Immutable. Not to be confused with `lineageParent`, which
    /// points at a previous version of *this* record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// CID of the record's payload bytes.
    pub data_cid: Cid,

    /// MIME-like format of the payload. Immutable.
    pub data_format: String,

    /// Set at the lineage root, identical across the lineage. Immutable.
    pub date_created: String,

    /// Timestamp of this version; drives conflict resolution.
    pub date_modified: String,

    /// CID of the previous version of this record. Absent on the lineage
    /// root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineage_parent: Option<Cid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_published: Option<String>,
}

/// A complete CollectionsWrite message envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CollectionsWrite {
    pub record_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,

    pub descriptor: WriteDescriptor,

    pub authorization: GeneralJws,

    /// Payload bytes, base64url without padding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoded_data: Option<String>,
}

/// Immutable subset of the descriptor the root `recordId` is derived from.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordIdInput<'a> {
    author: &'a str,
    data_format: &'a str,
    date_created: &'a str,
    recipient: &'a str,
    schema: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    protocol: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<&'a str>,
}

/// Envelope without payload data, the input of the message CID.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeRef<'a> {
    record_id: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    context_id: Option<&'a str>,

    descriptor: &'a WriteDescriptor,

    authorization: &'a GeneralJws,
}

/// Deterministic `recordId` of a lineage root with the given descriptor and
/// author.
pub fn entry_id(descriptor: &WriteDescriptor, author: &str) -> Result<String, EncodeError> {
    let input = RecordIdInput {
        author,
        data_format: &descriptor.data_format,
        date_created: &descriptor.date_created,
        recipient: &descriptor.recipient,
        schema: &descriptor.schema,
        protocol: descriptor.protocol.as_deref(),
        parent_id: descriptor.parent_id.as_deref(),
    };
    Ok(Cid::of_value(&input)?.to_text())
}

/// Deterministic `contextId` of a context root: the hash of its (single
/// entry) ancestor chain of record ids.
pub fn context_root_id(record_id: &str) -> Result<String, EncodeError> {
    Ok(Cid::of_value(&vec![record_id])?.to_text())
}

/// Inputs for creating a lineage root.
pub struct WriteOptions<'a> {
    pub signer: SignInput<'a>,
    pub recipient: String,
    pub schema: String,
    pub data: Vec<u8>,
    pub data_format: String,
    pub protocol: Option<String>,
    pub parent_id: Option<String>,

    /// `contextId` of the structural parent; required iff `parent_id` is
    /// given.
    pub parent_context_id: Option<String>,

    pub published: Option<bool>,
    pub date_published: Option<String>,
    pub date_created: Option<String>,
    pub date_modified: Option<String>,
}

impl<'a> WriteOptions<'a> {
    pub fn new(signer: SignInput<'a>, recipient: &str, schema: &str, data: &[u8]) -> Self {
        Self {
            signer,
            recipient: recipient.to_string(),
            schema: schema.to_string(),
            data: data.to_vec(),
            data_format: "application/json".to_string(),
            protocol: None,
            parent_id: None,
            parent_context_id: None,
            published: None,
            date_published: None,
            date_created: None,
            date_modified: None,
        }
    }
}

/// Inputs for creating a lineage child on top of an existing version.
pub struct ChildOptions<'a> {
    pub signer: SignInput<'a>,

    /// Replacement payload; the parent's payload is kept when absent.
    pub data: Option<Vec<u8>>,

    pub published: Option<bool>,
    pub date_published: Option<String>,
    pub date_modified: Option<String>,
}

impl CollectionsWrite {
    /// Builds and signs the lineage root of a new record.
    pub fn create_root(options: WriteOptions<'_>) -> Result<Self, CreateError> {
        let author = author_of_kid(&options.signer.kid)?;

        let date_created = options.date_created.unwrap_or_else(time::now);
        let date_modified = options
            .date_modified
            .unwrap_or_else(|| date_created.clone());
        let date_published = match options.published {
            Some(true) => Some(options.date_published.unwrap_or_else(time::now)),
            _ => None,
        };

        let descriptor = WriteDescriptor {
            method: "CollectionsWrite".to_string(),
            recipient: options.recipient,
            protocol: options.protocol,
            schema: options.schema,
            parent_id: options.parent_id,
            data_cid: Cid::of_bytes(&options.data),
            data_format: options.data_format,
            date_created,
            date_modified,
            lineage_parent: None,
            published: options.published,
            date_published,
        };

        let record_id = entry_id(&descriptor, &author)?;
        let context_id = match (&descriptor.protocol, &descriptor.parent_id) {
            (Some(_), None) => Some(context_root_id(&record_id)?),
            (Some(_), Some(_)) => Some(
                options
                    .parent_context_id
                    .ok_or(CreateError::MissingParentContext)?,
            ),
            (None, _) => None,
        };

        let authorization = AuthPayload {
            descriptor_cid: Cid::of_value(&descriptor)?,
            record_id: Some(record_id.clone()),
            context_id: context_id.clone(),
        }
        .sign(&options.signer);

        Ok(Self {
            record_id,
            context_id,
            descriptor,
            authorization,
            encoded_data: Some(URL_SAFE_NO_PAD.encode(&options.data)),
        })
    }

    /// Builds and signs a new version on top of `parent`.
    ///
    /// `recordId`, the immutable fields and (unless overridden) the
    /// visibility flags are inherited from the parent version.
    pub fn create_lineage_child(
        parent: &CollectionsWrite,
        options: ChildOptions<'_>,
    ) -> Result<Self, CreateError> {
        let published = options.published.or(parent.descriptor.published);
        let date_published = match published {
            Some(true) => options
                .date_published
                .or_else(|| parent.descriptor.date_published.clone())
                .or_else(|| Some(time::now())),
            _ => None,
        };

        let (data_cid, encoded_data) = match &options.data {
            Some(data) => (Cid::of_bytes(data), Some(URL_SAFE_NO_PAD.encode(data))),
            None => (parent.descriptor.data_cid, parent.encoded_data.clone()),
        };

        let descriptor = WriteDescriptor {
            method: "CollectionsWrite".to_string(),
            recipient: parent.descriptor.recipient.clone(),
            protocol: parent.descriptor.protocol.clone(),
            schema: parent.descriptor.schema.clone(),
            parent_id: parent.descriptor.parent_id.clone(),
            data_cid,
            data_format: parent.descriptor.data_format.clone(),
            date_created: parent.descriptor.date_created.clone(),
            date_modified: options.date_modified.unwrap_or_else(time::now),
            lineage_parent: Some(parent.cid().map_err(CreateError::Parent)?),
            published,
            date_published,
        };

        let authorization = AuthPayload {
            descriptor_cid: Cid::of_value(&descriptor)?,
            record_id: Some(parent.record_id.clone()),
            context_id: parent.context_id.clone(),
        }
        .sign(&options.signer);

        Ok(Self {
            record_id: parent.record_id.clone(),
            context_id: parent.context_id.clone(),
            descriptor,
            authorization,
            encoded_data,
        })
    }

    /// Content identifier of this message (payload excluded, see
    /// [`crate::message::Message::cid`]).
    pub fn cid(&self) -> Result<Cid, MessageError> {
        let envelope = EnvelopeRef {
            record_id: &self.record_id,
            context_id: self.context_id.as_deref(),
            descriptor: &self.descriptor,
            authorization: &self.authorization,
        };
        Ok(Cid::of_value(&envelope)?)
    }

    /// Whether this message is a lineage root.
    pub fn is_lineage_root(&self) -> bool {
        self.descriptor.lineage_parent.is_none()
    }

    /// Author DID claimed by the authorization's `kid`.
    pub fn author(&self) -> Result<String, MessageError> {
        crate::message::claimed_author(&self.authorization)
    }

    /// Self-contained validation, run on every inbound message after its
    /// signature has been checked and before any store access.
    pub fn validate_integrity(&self) -> Result<(), MessageError> {
        if self.descriptor.method != "CollectionsWrite" {
            return Err(MessageError::BadRequest(format!(
                "descriptor method must be CollectionsWrite, got {}",
                self.descriptor.method
            )));
        }

        let author = self.author()?;

        for date in [&self.descriptor.date_created, &self.descriptor.date_modified] {
            time::parse(date).map_err(|err| MessageError::BadRequest(err.to_string()))?;
        }

        if self.is_lineage_root() {
            if self.descriptor.date_created != self.descriptor.date_modified {
                return Err(MessageError::RootDateMismatch {
                    date_created: self.descriptor.date_created.clone(),
                    date_modified: self.descriptor.date_modified.clone(),
                });
            }

            let expected = entry_id(&self.descriptor, &author)?;
            if expected != self.record_id {
                return Err(MessageError::RecordIdMismatch {
                    expected,
                    actual: self.record_id.clone(),
                });
            }
        }

        match &self.descriptor.protocol {
            Some(_) => {
                let Some(context_id) = &self.context_id else {
                    return Err(MessageError::BadRequest(
                        "contextId is required for protocol-scoped records".to_string(),
                    ));
                };

                if self.descriptor.parent_id.is_none() {
                    let expected = context_root_id(&self.record_id)?;
                    if &expected != context_id {
                        return Err(MessageError::ContextIdMismatch {
                            expected,
                            actual: context_id.clone(),
                        });
                    }
                }
            }
            None => {
                if self.context_id.is_some() {
                    return Err(MessageError::BadRequest(
                        "contextId is only allowed for protocol-scoped records".to_string(),
                    ));
                }
                if self.descriptor.parent_id.is_some() {
                    return Err(MessageError::BadRequest(
                        "parentId is only allowed for protocol-scoped records".to_string(),
                    ));
                }
            }
        }

        if let Some(encoded_data) = &self.encoded_data {
            let data = URL_SAFE_NO_PAD
                .decode(encoded_data)
                .map_err(|_| MessageError::BadRequest("encodedData is not base64url".to_string()))?;
            if Cid::of_bytes(&data) != self.descriptor.data_cid {
                return Err(MessageError::DataCidMismatch);
            }
        }

        let payload = AuthPayload::decode(&self.authorization)?;
        if payload.record_id.as_deref() != Some(&self.record_id) {
            return Err(MessageError::AuthzRecordIdMismatch(self.record_id.clone()));
        }
        if payload.context_id != self.context_id {
            return Err(MessageError::AuthzContextIdMismatch(self.context_id.clone()));
        }
        if payload.descriptor_cid != Cid::of_value(&self.descriptor)? {
            return Err(MessageError::DescriptorCidMismatch);
        }

        Ok(())
    }

    /// Decoded payload bytes, if the message carries data inline.
    pub fn data(&self) -> Result<Option<Vec<u8>>, MessageError> {
        match &self.encoded_data {
            Some(encoded_data) => URL_SAFE_NO_PAD
                .decode(encoded_data)
                .map(Some)
                .map_err(|_| MessageError::BadRequest("encodedData is not base64url".to_string())),
            None => Ok(None),
        }
    }
}

/// Checks the immutable-field contract of a candidate version against the
/// lineage root.
pub fn verify_immutable_fields(
    candidate: &WriteDescriptor,
    root: &WriteDescriptor,
) -> Result<(), MessageError> {
    if candidate.date_created != root.date_created {
        return Err(MessageError::ImmutableField("dateCreated"));
    }
    if candidate.schema != root.schema {
        return Err(MessageError::ImmutableField("schema"));
    }
    if candidate.data_format != root.data_format {
        return Err(MessageError::ImmutableField("dataFormat"));
    }
    if candidate.recipient != root.recipient {
        return Err(MessageError::ImmutableField("recipient"));
    }
    if candidate.protocol != root.protocol {
        return Err(MessageError::ImmutableField("protocol"));
    }
    if candidate.parent_id != root.parent_id {
        return Err(MessageError::ImmutableField("parentId"));
    }
    Ok(())
}

fn author_of_kid(kid: &str) -> Result<String, CreateError> {
    match kid.split_once('#') {
        Some((did, _)) => Ok(did.to_string()),
        None => Err(CreateError::InvalidKid(kid.to_string())),
    }
}

/// Errors which can occur while building messages.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("kid {0} is not a DID URL fragment")]
    InvalidKid(String),

    #[error("parentContextId is required when parentId is given")]
    MissingParentContext,

    #[error("could not compute parent message cid: {0}")]
    Parent(MessageError),

    #[error(transparent)]
    Encoding(#[from] EncodeError),
}

#[cfg(test)]
mod tests {
    use dwn_core::{Cid, PrivateKey, SignInput};

    use crate::error::MessageError;

    use super::{entry_id, ChildOptions, CollectionsWrite, WriteOptions};

    fn signer(private_key: &PrivateKey) -> SignInput<'_> {
        SignInput {
            kid: "did:example:alice#key-1".to_string(),
            private_key,
        }
    }

    fn root(private_key: &PrivateKey) -> CollectionsWrite {
        CollectionsWrite::create_root(WriteOptions::new(
            signer(private_key),
            "did:example:alice",
            "test/email",
            b"{\"subject\":\"hello\"}",
        ))
        .unwrap()
    }

    #[test]
    fn roots_validate_and_recompute() {
        let private_key = PrivateKey::new();
        let message = root(&private_key);

        message.validate_integrity().unwrap();
        assert!(message.is_lineage_root());
        assert_eq!(
            entry_id(&message.descriptor, "did:example:alice").unwrap(),
            message.record_id
        );
    }

    #[test]
    fn tampered_record_id_is_caught() {
        let private_key = PrivateKey::new();
        let mut message = root(&private_key);
        message.record_id = Cid::of_bytes(b"some other record").to_text();

        assert!(matches!(
            message.validate_integrity(),
            Err(MessageError::RecordIdMismatch { .. })
        ));
    }

    #[test]
    fn tampered_data_is_caught() {
        let private_key = PrivateKey::new();
        let mut message = root(&private_key);
        message.encoded_data = Some("c29tZXRoaW5nIGVsc2U".to_string());

        assert!(matches!(
            message.validate_integrity(),
            Err(MessageError::DataCidMismatch)
        ));
    }

    #[test]
    fn children_inherit_the_record() {
        let private_key = PrivateKey::new();
        let parent = root(&private_key);

        let child = CollectionsWrite::create_lineage_child(
            &parent,
            ChildOptions {
                signer: signer(&private_key),
                data: Some(b"{\"subject\":\"hello again\"}".to_vec()),
                published: None,
                date_published: None,
                date_modified: None,
            },
        )
        .unwrap();

        child.validate_integrity().unwrap();
        assert!(!child.is_lineage_root());
        assert_eq!(child.record_id, parent.record_id);
        assert_eq!(child.descriptor.lineage_parent, Some(parent.cid().unwrap()));
        assert_eq!(child.descriptor.date_created, parent.descriptor.date_created);
        assert_ne!(child.descriptor.data_cid, parent.descriptor.data_cid);
    }

    #[test]
    fn root_dates_must_agree() {
        let private_key = PrivateKey::new();
        let mut options = WriteOptions::new(
            signer(&private_key),
            "did:example:alice",
            "test/email",
            b"data",
        );
        options.date_created = Some("2022-04-29T10:30:00.123456Z".to_string());
        options.date_modified = Some("2022-04-29T10:30:00.123457Z".to_string());

        let message = CollectionsWrite::create_root(options).unwrap();
        assert!(matches!(
            message.validate_integrity(),
            Err(MessageError::RootDateMismatch { .. })
        ));
    }
}
