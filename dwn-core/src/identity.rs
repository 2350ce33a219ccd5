// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ed25519 key material used to sign and verify message envelopes.
use std::fmt;

use ed25519_dalek::{Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;

/// The length of an ed25519 key in bytes.
pub const KEY_LEN: usize = 32;

/// The length of an ed25519 signature in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Private ed25519 key used for signing.
#[derive(Clone, Debug)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    /// Generates a new private key using the systems random number generator
    /// (CSPRNG) as a seed.
    pub fn new() -> Self {
        let mut csprng = OsRng;
        Self(SigningKey::generate(&mut csprng))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(bytes.len(), KEY_LEN))?;
        Ok(Self(SigningKey::from_bytes(&bytes)))
    }

    pub fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    pub fn sign(&self, bytes: &[u8]) -> Signature {
        Signature(self.0.sign(bytes))
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

/// Public ed25519 key used for verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(bytes.len(), KEY_LEN))?;
        let key =
            VerifyingKey::from_bytes(&bytes).map_err(|_| IdentityError::InvalidKeyMaterial)?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        self.0.as_bytes()
    }

    /// Checks the signature over the given bytes.
    pub fn verify(&self, bytes: &[u8], signature: &Signature) -> bool {
        self.0.verify(bytes, &signature.0).is_ok()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Ed25519 signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let bytes: [u8; SIGNATURE_LEN] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(bytes.len(), SIGNATURE_LEN))?;
        Ok(Self(ed25519_dalek::Signature::from_bytes(&bytes)))
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0.to_bytes()
    }
}

/// Error types for key material.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Raw byte input has an invalid length.
    #[error("invalid length {0} bytes, expected {1} bytes")]
    InvalidLength(usize, usize),

    /// Bytes of the right length which do not form a valid key.
    #[error("bytes do not encode a valid ed25519 key")]
    InvalidKeyMaterial,
}

#[cfg(test)]
mod tests {
    use super::{IdentityError, PrivateKey, PublicKey, Signature};

    #[test]
    fn sign_and_verify() {
        let private_key = PrivateKey::new();
        let signature = private_key.sign(b"an important message");

        let public_key = private_key.public_key();
        assert!(public_key.verify(b"an important message", &signature));
        assert!(!public_key.verify(b"a different message", &signature));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let signature = PrivateKey::new().sign(b"message");
        let other = PrivateKey::new().public_key();
        assert!(!other.verify(b"message", &signature));
    }

    #[test]
    fn key_bytes_roundtrip() {
        let private_key = PrivateKey::new();
        let private_again = PrivateKey::from_bytes(&private_key.to_bytes()).unwrap();
        assert_eq!(
            private_key.public_key().as_bytes(),
            private_again.public_key().as_bytes()
        );

        let public_key = private_key.public_key();
        let public_again = PublicKey::from_bytes(public_key.as_bytes()).unwrap();
        assert_eq!(public_key, public_again);
    }

    #[test]
    fn invalid_lengths() {
        assert!(matches!(
            PublicKey::from_bytes(&[1, 2, 3]),
            Err(IdentityError::InvalidLength(3, 32))
        ));
        assert!(matches!(
            Signature::from_bytes(&[0; 12]),
            Err(IdentityError::InvalidLength(12, 64))
        ));
    }
}
