// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers for generating personas and messages in tests.
use dwn_core::{
    DidDocument, MemoryDidResolver, PrivateKey, PublicKeyJwk, SignInput, VerificationMethod,
};

/// A principal with a DID, a keypair and an advertised verification method.
pub struct Persona {
    pub did: String,
    pub kid: String,
    pub private_key: PrivateKey,
}

impl Persona {
    /// A fresh persona under `did:example:<name>`.
    pub fn new(name: &str) -> Self {
        let did = format!("did:example:{name}");
        Self {
            kid: format!("{did}#key-1"),
            did,
            private_key: PrivateKey::new(),
        }
    }

    pub fn signer(&self) -> SignInput<'_> {
        SignInput {
            kid: self.kid.clone(),
            private_key: &self.private_key,
        }
    }

    pub fn did_document(&self) -> DidDocument {
        DidDocument {
            id: self.did.clone(),
            verification_method: vec![VerificationMethod {
                id: self.kid.clone(),
                method_type: "JsonWebKey2020".to_string(),
                controller: self.did.clone(),
                public_key_jwk: Some(PublicKeyJwk::from_public_key(
                    &self.private_key.public_key(),
                )),
            }],
            authentication: vec![self.kid.clone()],
        }
    }

    /// Registers the persona's DID document with the resolver.
    pub fn register(&self, resolver: &MemoryDidResolver) {
        resolver.register(self.did_document());
    }
}

/// A resolver pre-loaded with the given personas.
pub fn resolver_for(personas: &[&Persona]) -> MemoryDidResolver {
    let resolver = MemoryDidResolver::new();
    for persona in personas {
        persona.register(&resolver);
    }
    resolver
}
