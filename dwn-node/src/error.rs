// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rejection reasons and reply status codes.
//!
//! Every pipeline step returns a result instead of throwing: a rejected
//! message becomes a reply with a 4xx status and the store stays untouched,
//! while store I/O failures escape the handler as [`StoreFailure`].
use thiserror::Error;

use dwn_core::cbor::EncodeError;
use dwn_core::JwsError;

/// Reply status, `202` for accepted writes, `200` for queries.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Status {
    pub code: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Status {
    pub fn ok() -> Self {
        Self {
            code: 200,
            detail: None,
        }
    }

    pub fn accepted() -> Self {
        Self {
            code: 202,
            detail: None,
        }
    }
}

/// Why an inbound message was rejected.
///
/// Every variant maps onto a reply status: the message is refused, nothing
/// is committed, the caller may correct and resend.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("{0} is an immutable property")]
    ImmutableField(&'static str),

    #[error("actual CID of data and dataCid in descriptor mismatch")]
    DataCidMismatch,

    #[error("recordId {actual} does not match deterministic recordId {expected}")]
    RecordIdMismatch { expected: String, actual: String },

    #[error("contextId {actual} does not match deterministic contextId {expected}")]
    ContextIdMismatch { expected: String, actual: String },

    #[error("recordId {0} does not match recordId in authorization payload")]
    AuthzRecordIdMismatch(String),

    #[error("contextId {0:?} does not match contextId in authorization payload")]
    AuthzContextIdMismatch(Option<String>),

    #[error("provided descriptorCid does not match expected CID of descriptor")]
    DescriptorCidMismatch,

    #[error("dateModified {date_modified} of a lineage root must match dateCreated {date_created}")]
    RootDateMismatch {
        date_created: String,
        date_modified: String,
    },

    #[error("unable to find the lineage root of record {0}")]
    LineageRootMissing(String),

    #[error("expecting lineageParent to be {0}")]
    BadLineageParent(String),

    #[error("unable to find protocol definition for {0}")]
    NoProtocolDefinition(String),

    #[error("record with schema '{0}' not allowed in protocol")]
    SchemaNotAllowed(String),

    #[error("record with schema '{schema}' not allowed in structure level {level}")]
    StructureLevelNotAllowed { schema: String, level: usize },

    #[error("no allow rule defined for requester {0}")]
    NoAllowRule(String),

    #[error("path to expected recipient is longer than actual length of ancestor message chain")]
    RecipientPathTooLong,

    #[error("mismatching record schema at path segment '{0}'")]
    SchemaMismatch(String),

    #[error("unexpected inbound message author {0}")]
    UnexpectedAuthor(String),

    #[error("author {author} must match to author of lineage parent {parent_author}")]
    AuthorMismatchOnUpdate {
        author: String,
        parent_author: String,
    },

    #[error("no parent found with id {0}")]
    ParentMissing(String),

    #[error("signature verification failed: {0}")]
    Signature(#[from] JwsError),

    #[error("message failed authorization: {0}")]
    Unauthorized(String),

    #[error("a message with a newer or equal version exists for this record")]
    Conflict,

    #[error("{0}")]
    BadRequest(String),

    #[error("value encoding failed: {0}")]
    Encoding(String),
}

impl MessageError {
    /// Reply status code the rejection maps onto.
    pub fn code(&self) -> u16 {
        match self {
            MessageError::ImmutableField(_)
            | MessageError::DataCidMismatch
            | MessageError::RecordIdMismatch { .. }
            | MessageError::ContextIdMismatch { .. }
            | MessageError::AuthzRecordIdMismatch(_)
            | MessageError::AuthzContextIdMismatch(_)
            | MessageError::DescriptorCidMismatch
            | MessageError::RootDateMismatch { .. }
            | MessageError::LineageRootMissing(_)
            | MessageError::BadLineageParent(_)
            | MessageError::BadRequest(_)
            | MessageError::Encoding(_) => 400,

            MessageError::NoProtocolDefinition(_)
            | MessageError::SchemaNotAllowed(_)
            | MessageError::StructureLevelNotAllowed { .. }
            | MessageError::NoAllowRule(_)
            | MessageError::RecipientPathTooLong
            | MessageError::SchemaMismatch(_)
            | MessageError::UnexpectedAuthor(_)
            | MessageError::AuthorMismatchOnUpdate { .. }
            | MessageError::ParentMissing(_)
            | MessageError::Signature(_)
            | MessageError::Unauthorized(_) => 401,

            MessageError::Conflict => 409,
        }
    }

    pub fn status(&self) -> Status {
        Status {
            code: self.code(),
            detail: Some(self.to_string()),
        }
    }
}

impl From<EncodeError> for MessageError {
    fn from(value: EncodeError) -> Self {
        MessageError::Encoding(value.to_string())
    }
}

/// Internal pipeline error: either a recoverable rejection or a fatal store
/// failure.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Rejected(#[from] MessageError),

    #[error("critical store failure: {0}")]
    Store(String),
}

impl From<EncodeError> for ProcessError {
    fn from(value: EncodeError) -> Self {
        ProcessError::Rejected(value.into())
    }
}

/// Critical storage failure. This is usually a reason to give up on the
/// request entirely, the store contract was broken mid-pipeline.
#[derive(Debug, Error)]
#[error("critical store failure: {0}")]
pub struct StoreFailure(pub String);
