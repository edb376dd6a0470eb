/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the [Keypair] type as an object used to sign digests and access the public
//! key.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};

use super::basic::{CryptoHash, SignatureBytes, ValidatorId};

/// A wrapper around [SigningKey](ed25519_dalek::SigningKey) which implements a
/// [convenience method](Keypair::sign) for creating signatures over digests.
#[derive(Clone)]
pub struct Keypair(SigningKey);

impl Keypair {
    pub fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// Sign a 32-byte digest. Every signature in this protocol covers a digest, never a raw
    /// message.
    pub fn sign(&self, digest: &CryptoHash) -> SignatureBytes {
        SignatureBytes::new(self.0.sign(&digest.bytes()).to_bytes())
    }

    pub fn public(&self) -> VerifyingKey {
        self.0.verifying_key()
    }

    pub fn id(&self) -> ValidatorId {
        ValidatorId::from(&self.public())
    }
}
