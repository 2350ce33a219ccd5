// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message envelope and method dispatch.
//!
//! Inbound messages are JSON envelopes whose `descriptor.method` decides the
//! handler. The envelope is parsed strictly: unknown fields and unknown
//! methods are rejected before any handler runs.
use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};

use dwn_core::{Cid, GeneralJws, SignInput};

use crate::error::{MessageError, Status};
use crate::protocols::{ProtocolsConfigure, ProtocolsQuery};
use crate::records::query::CollectionsQuery;
use crate::records::write::CollectionsWrite;

/// A message, dispatched by `descriptor.method`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Message {
    CollectionsWrite(CollectionsWrite),
    CollectionsQuery(CollectionsQuery),
    ProtocolsConfigure(ProtocolsConfigure),
    ProtocolsQuery(ProtocolsQuery),
}

impl Message {
    /// The method string carried in the descriptor.
    pub fn method(&self) -> &str {
        match self {
            Message::CollectionsWrite(_) => "CollectionsWrite",
            Message::CollectionsQuery(_) => "CollectionsQuery",
            Message::ProtocolsConfigure(_) => "ProtocolsConfigure",
            Message::ProtocolsQuery(_) => "ProtocolsQuery",
        }
    }

    /// Content identifier of the message.
    ///
    /// Payload data is not part of the identifier: it is already bound
    /// through `descriptor.dataCid`, and excluding it keeps the identifier
    /// stable when payloads are pruned from storage.
    pub fn cid(&self) -> Result<Cid, MessageError> {
        match self {
            Message::CollectionsWrite(message) => message.cid(),
            Message::CollectionsQuery(message) => Ok(Cid::of_value(message)?),
            Message::ProtocolsConfigure(message) => message.cid(),
            Message::ProtocolsQuery(message) => Ok(Cid::of_value(message)?),
        }
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        let method = value
            .get("descriptor")
            .and_then(|descriptor| descriptor.get("method"))
            .and_then(|method| method.as_str())
            .ok_or_else(|| SerdeError::custom("descriptor.method missing"))?
            .to_string();

        match method.as_str() {
            "CollectionsWrite" => serde_json::from_value(value)
                .map(Message::CollectionsWrite)
                .map_err(SerdeError::custom),
            "CollectionsQuery" => serde_json::from_value(value)
                .map(Message::CollectionsQuery)
                .map_err(SerdeError::custom),
            "ProtocolsConfigure" => serde_json::from_value(value)
                .map(Message::ProtocolsConfigure)
                .map_err(SerdeError::custom),
            "ProtocolsQuery" => serde_json::from_value(value)
                .map(Message::ProtocolsQuery)
                .map_err(SerdeError::custom),
            other => Err(SerdeError::custom(format!("unknown method {other}"))),
        }
    }
}

/// Payload of the authorization JWS: the fields of the outer envelope every
/// signature is bound to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct AuthPayload {
    pub descriptor_cid: Cid,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

impl AuthPayload {
    /// Signs the payload, producing the `authorization` member of a message.
    pub fn sign(&self, signer: &SignInput<'_>) -> GeneralJws {
        let bytes = serde_json::to_vec(self)
            .expect("JSON encoding of an authorization payload never fails");
        dwn_core::jws::sign(&bytes, std::slice::from_ref(signer))
    }

    /// Decodes the payload out of an authorization JWS.
    pub fn decode(authorization: &GeneralJws) -> Result<Self, MessageError> {
        let bytes = authorization
            .decode_payload()
            .map_err(|err| MessageError::BadRequest(err.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|err| {
            MessageError::BadRequest(format!("authorization payload is malformed: {err}"))
        })
    }
}

/// Author DID taken from the `kid` of the single expected signature.
///
/// This is the *claimed* author; the claim only becomes trustworthy after
/// the signature itself verified against the resolved key.
pub fn claimed_author(authorization: &GeneralJws) -> Result<String, MessageError> {
    if authorization.signatures.len() != 1 {
        return Err(MessageError::BadRequest(
            "expected exactly one signature in authorization".to_string(),
        ));
    }

    let protected = authorization
        .protected(0)
        .map_err(|err| MessageError::BadRequest(err.to_string()))?;
    match protected.kid.split_once('#') {
        Some((did, _)) => Ok(did.to_string()),
        None => Err(MessageError::BadRequest(format!(
            "kid {} is not a DID URL fragment",
            protected.kid
        ))),
    }
}

/// Reply to a processed message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub status: Status,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<Message>>,
}

impl Reply {
    /// `202`, the write was accepted (or was an idempotent no-op).
    pub fn accepted() -> Self {
        Self {
            status: Status::accepted(),
            entries: None,
        }
    }

    /// `200` with the matched entries.
    pub fn ok(entries: Vec<Message>) -> Self {
        Self {
            status: Status::ok(),
            entries: Some(entries),
        }
    }
}

impl From<MessageError> for Reply {
    fn from(error: MessageError) -> Self {
        Self {
            status: error.status(),
            entries: None,
        }
    }
}
