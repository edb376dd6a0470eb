/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! "Inert" types, i.e., those that are sent around and inspected, but have no active behavior.
//! These types follow the newtype pattern and the API for using them is defined in this module.

use borsh::{BorshDeserialize, BorshSerialize};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::Add,
};

pub use sha2::Sha256 as CryptoHasher;

/// Consensus round number. Views are totally ordered and increase monotonically over the
/// lifetime of a node; view 0 is the distinguished genesis view.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct View(u64);

impl View {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn genesis() -> Self {
        Self(0)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }

    pub const fn is_genesis(&self) -> bool {
        self.0 == 0
    }

    pub fn next(&self) -> View {
        View(self.0 + 1)
    }
}

impl Display for View {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Add<u64> for View {
    type Output = View;

    fn add(self, rhs: u64) -> Self::Output {
        View(self.0.add(rhs))
    }
}

/// Epoch counter. An epoch is the span of views over which one validator set is in force.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Epoch(u64);

impl Epoch {
    pub const fn new(int: u64) -> Self {
        Self(int)
    }

    pub const fn int(&self) -> u64 {
        self.0
    }
}

impl Display for Epoch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// A SHA-256 digest. Vertex ids, signed digests, and certificate hashes are all values of this
/// type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshDeserialize, BorshSerialize)]
pub struct CryptoHash([u8; 32]);

impl CryptoHash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }
}

impl Display for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Debug for CryptoHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Signature represented in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SignatureBytes([u8; 64]);

impl SignatureBytes {
    pub const fn new(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 64] {
        self.0
    }
}

/// Milliseconds since the Unix epoch. Timestamps are part of the signed content of votes, not
/// metadata.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn new(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn millis(&self) -> u64 {
        self.0
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Single opaque transaction carried in a [vertex](crate::types::vertex::Vertex). Transaction
/// contents are the execution engine's business; the consensus core only moves them around.
#[derive(Clone, Debug, PartialEq, Eq, Hash, BorshDeserialize, BorshSerialize)]
pub struct Txn(Vec<u8>);

impl Txn {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> &Vec<u8> {
        &self.0
    }
}

/// Identity of a validator: the bytes of its Ed25519 verifying key.
///
/// Wire types carry `ValidatorId`s rather than [`VerifyingKey`]s so that they stay Borsh-
/// serializable, and so that signature maps keyed by validator have a canonical (ascending)
/// order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, BorshDeserialize, BorshSerialize,
)]
pub struct ValidatorId([u8; 32]);

impl ValidatorId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey, ed25519_dalek::SignatureError> {
        VerifyingKey::from_bytes(&self.0)
    }

    /// Verify that `signature` was created by this validator over `digest`. Returns `false` if
    /// the stored bytes are not a valid verifying key.
    pub fn verify(&self, digest: &CryptoHash, signature: &SignatureBytes) -> bool {
        let Ok(verifying_key) = self.verifying_key() else {
            return false;
        };
        let signature = Signature::from_bytes(&signature.bytes());
        verifying_key.verify(&digest.bytes(), &signature).is_ok()
    }
}

impl From<&VerifyingKey> for ValidatorId {
    fn from(verifying_key: &VerifyingKey) -> Self {
        Self(verifying_key.to_bytes())
    }
}
