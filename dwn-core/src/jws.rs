// SPDX-License-Identifier: MIT OR Apache-2.0

//! General JWS envelopes over message payloads.
//!
//! Every message carries an `authorization` in the general JWS form:
//!
//! ```json
//! { "payload": "<b64url>", "signatures": [{ "protected": "<b64url>", "signature": "<b64url>" }] }
//! ```
//!
//! The protected header names the signing algorithm and a `kid` which is a
//! DID URL fragment (`did#key-id`). Verification resolves the DID, picks the
//! verification method matching `kid` and checks the ed25519 signature over
//! the compact signing input `protected || '.' || payload`.
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::did::DidResolver;
use crate::identity::{PrivateKey, Signature};

/// General JWS structure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralJws {
    pub payload: String,
    pub signatures: Vec<SignatureEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignatureEntry {
    pub protected: String,
    pub signature: String,
}

/// Decoded protected header of a single signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Protected {
    pub alg: String,
    pub kid: String,
}

/// Key material and key id of one signer.
pub struct SignInput<'a> {
    /// DID URL fragment of the verification method (`did#key-id`).
    pub kid: String,
    pub private_key: &'a PrivateKey,
}

/// Signs payload bytes with each given signer.
pub fn sign(payload: &[u8], signers: &[SignInput<'_>]) -> GeneralJws {
    let payload = URL_SAFE_NO_PAD.encode(payload);

    let signatures = signers
        .iter()
        .map(|signer| {
            let protected = Protected {
                alg: "EdDSA".to_string(),
                kid: signer.kid.clone(),
            };
            let protected_bytes = serde_json::to_vec(&protected)
                .expect("JSON encoding of a protected header never fails");
            let protected = URL_SAFE_NO_PAD.encode(protected_bytes);

            let signing_input = format!("{protected}.{payload}");
            let signature = signer.private_key.sign(signing_input.as_bytes());

            SignatureEntry {
                protected,
                signature: URL_SAFE_NO_PAD.encode(signature.to_bytes()),
            }
        })
        .collect();

    GeneralJws {
        payload,
        signatures,
    }
}

impl GeneralJws {
    /// Decoded payload bytes.
    pub fn decode_payload(&self) -> Result<Vec<u8>, JwsError> {
        URL_SAFE_NO_PAD
            .decode(&self.payload)
            .map_err(|_| JwsError::Malformed("payload is not base64url"))
    }

    /// Decoded protected header of the signature at `index`.
    pub fn protected(&self, index: usize) -> Result<Protected, JwsError> {
        let entry = self
            .signatures
            .get(index)
            .ok_or(JwsError::Malformed("no signature at given index"))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(&entry.protected)
            .map_err(|_| JwsError::Malformed("protected header is not base64url"))?;
        serde_json::from_slice(&bytes)
            .map_err(|_| JwsError::Malformed("protected header is not a JSON header"))
    }

    /// Verifies every signature against keys resolved from the signers' DIDs.
    ///
    /// Returns the author DID of each signature, in signature order.
    pub async fn verify<R: DidResolver>(&self, resolver: &R) -> Result<Vec<String>, JwsError> {
        let mut authors = Vec::with_capacity(self.signatures.len());

        for (index, entry) in self.signatures.iter().enumerate() {
            let protected = self.protected(index)?;
            let Some((did, _fragment)) = protected.kid.split_once('#') else {
                return Err(JwsError::UnknownKid(protected.kid));
            };
            let did = did.to_string();

            let resolution = resolver
                .resolve(&did)
                .await
                .map_err(|err| JwsError::UnresolvableDid(did.clone(), err.to_string()))?;

            let method = resolution
                .did_document
                .verification_method(&protected.kid)
                .ok_or_else(|| JwsError::UnknownKid(protected.kid.clone()))?;
            let jwk = method
                .public_key_jwk
                .as_ref()
                .ok_or_else(|| JwsError::UnknownKid(protected.kid.clone()))?;
            let public_key = jwk
                .decode()
                .map_err(|_| JwsError::BadSignature(protected.kid.clone()))?;

            let signature_bytes = URL_SAFE_NO_PAD
                .decode(&entry.signature)
                .map_err(|_| JwsError::Malformed("signature is not base64url"))?;
            let signature = Signature::from_bytes(&signature_bytes)
                .map_err(|_| JwsError::BadSignature(protected.kid.clone()))?;

            let signing_input = format!("{}.{}", entry.protected, self.payload);
            if !public_key.verify(signing_input.as_bytes(), &signature) {
                return Err(JwsError::BadSignature(protected.kid));
            }

            authors.push(did);
        }

        Ok(authors)
    }
}

/// Failure kinds of JWS verification.
#[derive(Debug, Error)]
pub enum JwsError {
    /// The envelope itself does not decode.
    #[error("malformed jws: {0}")]
    Malformed(&'static str),

    /// The signer's DID could not be resolved.
    #[error("could not resolve {0}: {1}")]
    UnresolvableDid(String, String),

    /// The resolved DID document has no usable verification method for the
    /// given kid.
    #[error("no verification method found for kid {0}")]
    UnknownKid(String),

    /// Signature check failed.
    #[error("signature does not verify against key {0}")]
    BadSignature(String),
}
