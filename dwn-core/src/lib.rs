// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core data types for decentralized web nodes.
//!
//! A decentralized web node (DWN) is a personal, addressable datastore which
//! accepts signed messages from decentralized identifiers (DIDs) and persists
//! record state as a content-addressed lineage of updates. This crate holds
//! the building blocks every layer above relies on: deterministic CBOR
//! encoding, content identifiers, ed25519 key material, the general JWS
//! envelope carried by every message and the DID resolution interface.

pub mod cbor;
pub mod cid;
pub mod did;
pub mod identity;
pub mod jws;
pub mod time;

pub use cid::{Cid, CidError};
pub use did::{
    DidDocument, DidResolutionResult, DidResolver, MemoryDidResolver, PublicKeyJwk, ResolverError,
    VerificationMethod,
};
pub use identity::{IdentityError, PrivateKey, PublicKey, Signature};
pub use jws::{GeneralJws, JwsError, Protected, SignInput, SignatureEntry};
