// SPDX-License-Identifier: MIT OR Apache-2.0

//! SHA2-256 content identifiers over canonical bytes.
//!
//! ## Example
//!
//! ```
//! use dwn_core::Cid;
//!
//! let bytes: &[u8] = b"A very important message.";
//! let cid = Cid::of_bytes(bytes);
//!
//! assert!(cid.to_text().starts_with("bafkrei"));
//! ```
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use multihash::Multihash;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::cbor::{self, EncodeError};

/// Multicodec code for DAG-CBOR content.
const DAG_CBOR: u64 = 0x71;

/// Multicodec code for raw binary content.
const RAW: u64 = 0x55;

/// Multihash code for SHA2-256.
const SHA2_256: u64 = 0x12;

/// CIDv1 over the SHA2-256 digest of a value's canonical bytes.
///
/// All comparisons and orderings operate on the multibase base32-lower text
/// form, which is also how a `Cid` appears on the wire in both JSON and CBOR.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cid(cid::Cid);

impl Cid {
    /// Content identifier of a structured value via its deterministic CBOR
    /// encoding.
    pub fn of_value<T: Serialize>(value: &T) -> Result<Self, EncodeError> {
        let bytes = cbor::to_canonical_vec(value)?;
        Ok(Self::from_digest(DAG_CBOR, &bytes))
    }

    /// Content identifier of opaque payload bytes.
    pub fn of_bytes(bytes: impl AsRef<[u8]>) -> Self {
        Self::from_digest(RAW, bytes.as_ref())
    }

    fn from_digest(codec: u64, bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let hash = Multihash::<64>::wrap(SHA2_256, &digest)
            .expect("a SHA2-256 digest always fits into a multihash");
        Self(cid::Cid::new_v1(codec, hash))
    }

    /// The multibase base32-lower text form.
    pub fn to_text(&self) -> String {
        self.0.to_string()
    }
}

impl From<&[u8]> for Cid {
    fn from(value: &[u8]) -> Self {
        Self::of_bytes(value)
    }
}

impl FromStr for Cid {
    type Err = CidError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self(cid::Cid::from_str(value)?))
    }
}

impl PartialOrd for Cid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_text().cmp(&other.to_text())
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cid").field(&self.to_text()).finish()
    }
}

impl Serialize for Cid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_text())
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse()
            .map_err(|err: CidError| serde::de::Error::custom(err.to_string()))
    }
}

/// Error types for `Cid` struct.
#[derive(Debug, Error)]
pub enum CidError {
    /// Text form could not be parsed back into a CID.
    #[error("invalid cid encoding: {0}")]
    InvalidEncoding(#[from] cid::Error),
}
