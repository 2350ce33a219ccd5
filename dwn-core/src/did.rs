// SPDX-License-Identifier: MIT OR Apache-2.0

//! DID resolution interface.
//!
//! Resolution itself is a collaborator concern: a node is handed something
//! implementing [`DidResolver`] and only relies on the returned document to
//! carry verification methods with Ed25519 JWKs. [`MemoryDidResolver`] is a
//! map-backed implementation for tests and single-process deployments.
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::{IdentityError, PublicKey};

/// Resolves a DID to its DID document.
pub trait DidResolver: Send + Sync {
    fn resolve(
        &self,
        did: &str,
    ) -> impl std::future::Future<Output = Result<DidResolutionResult, ResolverError>> + Send;
}

/// Outcome of a DID resolution.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidResolutionResult {
    pub did_document: DidDocument,

    #[serde(default)]
    pub did_document_metadata: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub did_resolution_metadata: serde_json::Map<String, serde_json::Value>,
}

/// DID document, reduced to the parts signature verification needs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    /// The DID this document describes.
    pub id: String,

    /// Verification methods (public keys).
    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,

    /// Authentication verification method references.
    #[serde(default)]
    pub authentication: Vec<String>,
}

impl DidDocument {
    /// Finds the verification method with the given id.
    pub fn verification_method(&self, id: &str) -> Option<&VerificationMethod> {
        self.verification_method.iter().find(|method| method.id == id)
    }
}

/// Verification method in a DID document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationMethod {
    pub id: String,

    #[serde(rename = "type")]
    pub method_type: String,

    pub controller: String,

    #[serde(rename = "publicKeyJwk", skip_serializing_if = "Option::is_none")]
    pub public_key_jwk: Option<PublicKeyJwk>,
}

/// Ed25519 public key in JWK form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyJwk {
    pub kty: String,
    pub crv: String,

    /// Public key bytes, base64url without padding.
    pub x: String,
}

impl PublicKeyJwk {
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self {
            kty: "OKP".to_string(),
            crv: "Ed25519".to_string(),
            x: URL_SAFE_NO_PAD.encode(public_key.as_bytes()),
        }
    }

    pub fn decode(&self) -> Result<PublicKey, IdentityError> {
        if self.kty != "OKP" || self.crv != "Ed25519" {
            return Err(IdentityError::InvalidKeyMaterial);
        }
        let bytes = URL_SAFE_NO_PAD
            .decode(&self.x)
            .map_err(|_| IdentityError::InvalidKeyMaterial)?;
        PublicKey::from_bytes(&bytes)
    }
}

/// Errors from DID resolution.
#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("invalid did: {0}")]
    InvalidDid(String),

    #[error("unsupported did method: {0}")]
    UnsupportedMethod(String),

    #[error("did not found: {0}")]
    NotFound(String),

    #[error("resolution failed: {0}")]
    ResolutionFailed(String),
}

/// Map-backed DID resolver.
///
/// Documents are registered up front; cloning shares the underlying map, so
/// a clone handed to a node observes documents registered later.
#[derive(Clone, Debug, Default)]
pub struct MemoryDidResolver {
    documents: Arc<RwLock<HashMap<String, DidDocument>>>,
}

impl MemoryDidResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, document: DidDocument) {
        let mut documents = self
            .documents
            .write()
            .expect("acquire exclusive write access on resolver");
        documents.insert(document.id.clone(), document);
    }
}

impl DidResolver for MemoryDidResolver {
    async fn resolve(&self, did: &str) -> Result<DidResolutionResult, ResolverError> {
        let documents = self
            .documents
            .read()
            .expect("acquire shared read access on resolver");

        match documents.get(did) {
            Some(document) => Ok(DidResolutionResult {
                did_document: document.clone(),
                ..Default::default()
            }),
            None => Err(ResolverError::NotFound(did.to_string())),
        }
    }
}
