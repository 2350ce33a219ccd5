// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic CBOR encoding.
//!
//! Content identifiers are only stable when equal values produce equal bytes,
//! so every value which gets content-addressed is encoded with the RFC 8949
//! core deterministic profile: definite-length forms only and map keys sorted
//! by the bytewise order of their own encodings. Values pass through
//! [`ciborium::Value`] where maps are re-ordered before the final write.

use ciborium::de::Error as DeserializeError;
use ciborium::ser::Error as SerializeError;
use ciborium::value::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Encodes a value as deterministic CBOR.
pub fn to_canonical_vec<T: Serialize>(value: &T) -> Result<Vec<u8>, EncodeError> {
    let value = Value::serialized(value).map_err(|err| EncodeError::Value(err.to_string()))?;
    let value = into_canonical(value)?;

    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&value, &mut bytes).map_err(Into::<EncodeError>::into)?;
    Ok(bytes)
}

/// Decodes a value from CBOR bytes.
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    ciborium::de::from_reader(bytes).map_err(Into::into)
}

/// Re-orders every map in the value tree by the bytewise order of the encoded
/// keys. ciborium already emits definite-length forms and preferred integer
/// encodings, sorting is the only part left to us.
fn into_canonical(value: Value) -> Result<Value, EncodeError> {
    match value {
        Value::Map(entries) => {
            let mut entries = entries
                .into_iter()
                .map(|(key, value)| Ok((encoded_key(&key)?, key, into_canonical(value)?)))
                .collect::<Result<Vec<_>, EncodeError>>()?;
            entries.sort_by(|(left, _, _), (right, _, _)| left.cmp(right));

            Ok(Value::Map(
                entries.into_iter().map(|(_, key, value)| (key, value)).collect(),
            ))
        }
        Value::Array(items) => Ok(Value::Array(
            items
                .into_iter()
                .map(into_canonical)
                .collect::<Result<Vec<_>, EncodeError>>()?,
        )),
        Value::Tag(tag, inner) => Ok(Value::Tag(tag, Box::new(into_canonical(*inner)?))),
        other => Ok(other),
    }
}

fn encoded_key(key: &Value) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(key, &mut bytes).map_err(Into::<EncodeError>::into)?;
    Ok(bytes)
}

#[derive(Debug, Error)]
pub enum EncodeError {
    /// An error occurred while writing bytes.
    #[error("an error occurred while writing bytes: {0}")]
    Io(std::io::Error),

    /// An error indicating a value that cannot be serialized.
    #[error("an error occurred while serializing value: {0}")]
    Value(String),
}

impl From<SerializeError<std::io::Error>> for EncodeError {
    fn from(value: SerializeError<std::io::Error>) -> Self {
        match value {
            SerializeError::Io(err) => EncodeError::Io(err),
            SerializeError::Value(err) => EncodeError::Value(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// An error occurred while reading bytes.
    #[error("an error occurred while reading bytes: {0}")]
    Io(std::io::Error),

    /// An error occurred while parsing bytes.
    ///
    /// Contains the offset into the stream where the syntax error occurred.
    #[error("an error occurred while parsing bytes at position {0}")]
    Syntax(usize),

    /// An error occurred while processing a parsed value.
    #[error("an error occurred while processing a parsed value at position {0:?}: {1}")]
    Semantic(Option<usize>, String),

    /// The input caused serde to recurse too much.
    #[error("recursion limit exceeded while decoding")]
    RecursionLimitExceeded,
}

impl From<DeserializeError<std::io::Error>> for DecodeError {
    fn from(value: DeserializeError<std::io::Error>) -> Self {
        match value {
            DeserializeError::Io(err) => DecodeError::Io(err),
            DeserializeError::Syntax(offset) => DecodeError::Syntax(offset),
            DeserializeError::Semantic(offset, description) => {
                DecodeError::Semantic(offset, description)
            }
            DeserializeError::RecursionLimitExceeded => DecodeError::RecursionLimitExceeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use super::{from_slice, to_canonical_vec};

    #[test]
    fn map_keys_are_sorted() {
        // HashMap iteration order is arbitrary, the canonical encoding must
        // not depend on it.
        let mut map = HashMap::new();
        map.insert("zebra".to_string(), 1_u64);
        map.insert("aardvark".to_string(), 2_u64);
        map.insert("mid".to_string(), 3_u64);

        let bytes = to_canonical_vec(&map).unwrap();

        // Map header for 3 entries, then keys in bytewise order of their
        // encodings: the text header carries the length first, so "mid"
        // sorts before "zebra" sorts before "aardvark".
        assert_eq!(bytes[0], 0xa3);
        let aardvark = bytes.windows(8).position(|w| w == b"aardvark").unwrap();
        let mid = bytes.windows(3).position(|w| w == b"mid").unwrap();
        let zebra = bytes.windows(5).position(|w| w == b"zebra").unwrap();
        assert!(mid < zebra);
        assert!(zebra < aardvark);
    }

    #[test]
    fn shorter_keys_sort_first() {
        // RFC 8949 deterministic order compares the encoded key bytes, which
        // start with the length for short text strings.
        let mut map = HashMap::new();
        map.insert("aa".to_string(), 1_u64);
        map.insert("b".to_string(), 2_u64);

        let bytes = to_canonical_vec(&map).unwrap();
        assert_eq!(bytes, [0xa2, 0x61, b'b', 0x02, 0x62, b'a', b'a', 0x01]);
    }

    #[test]
    fn encoding_is_deterministic() {
        #[derive(Serialize)]
        struct Inner {
            right: Vec<u64>,
            left: String,
        }

        #[derive(Serialize)]
        struct Outer {
            z: Inner,
            a: u64,
        }

        let value = Outer {
            z: Inner {
                right: vec![1, 2, 3],
                left: "hello".to_string(),
            },
            a: 7,
        };

        let first = to_canonical_vec(&value).unwrap();
        let second = to_canonical_vec(&value).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn roundtrip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Record {
            schema: String,
            published: Option<bool>,
            parents: Vec<String>,
        }

        let record = Record {
            schema: "test/record".to_string(),
            published: Some(true),
            parents: vec!["one".to_string(), "two".to_string()],
        };

        let bytes = to_canonical_vec(&record).unwrap();
        let record_again: Record = from_slice(&bytes).unwrap();
        assert_eq!(record, record_again);
    }
}
