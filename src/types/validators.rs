/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the [ValidatorSet] and [ValidationState] types and their associated methods.
//!
//! ## Quorum bound
//!
//! With `n` validators of which at most `f = floor((n - 1) / 3)` may be Byzantine, a quorum is
//! any `n - f` validators. Any two quorums of this size intersect in at least one correct
//! validator, which is the property that prevents two conflicting certificates from forming
//! for the same view.

use ed25519_dalek::{Signature, Verifier};
use std::collections::BTreeMap;

pub use ed25519_dalek::{SigningKey, VerifyingKey};

use super::basic::{CryptoHash, SignatureBytes, Timestamp, ValidatorId};
use super::certificates::{TimestampedSignature, TimestampedSignatures};

/// Identities of the validators of the active epoch.
///
/// The validator set maintains its members in ascending order of their ids and is immutable
/// for the epoch's duration; epoch changes replace the set wholesale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorSet {
    // Members are included here in ascending order of validator id.
    validators: Vec<(ValidatorId, VerifyingKey)>,
}

impl ValidatorSet {
    pub fn new(verifying_keys: impl IntoIterator<Item = VerifyingKey>) -> ValidatorSet {
        let mut validators: Vec<(ValidatorId, VerifyingKey)> = verifying_keys
            .into_iter()
            .map(|verifying_key| (ValidatorId::from(&verifying_key), verifying_key))
            .collect();
        validators.sort_by(|(left, _), (right, _)| left.cmp(right));
        validators.dedup_by(|(left, _), (right, _)| left == right);
        Self { validators }
    }

    pub fn contains(&self, validator: &ValidatorId) -> bool {
        self.position(validator).is_some()
    }

    pub fn verifying_key(&self, validator: &ValidatorId) -> Option<&VerifyingKey> {
        self.position(validator)
            .map(|pos| &self.validators[pos].1)
    }

    /// Get an iterator through validator ids which walks through them in ascending order.
    pub fn validators(&self) -> impl Iterator<Item = &ValidatorId> {
        self.validators.iter().map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The maximum number of Byzantine validators this set tolerates: `floor((n - 1) / 3)`.
    pub fn acceptable_faults(&self) -> usize {
        self.len().saturating_sub(1) / 3
    }

    /// The number of distinct signers a certificate over this set must carry:
    /// `n - acceptable_faults(n)`.
    pub fn threshold(&self) -> usize {
        self.len() - self.acceptable_faults()
    }

    fn position(&self, validator: &ValidatorId) -> Option<usize> {
        self.validators
            .binary_search_by(|(id, _)| id.cmp(validator))
            .ok()
    }
}

/// Accumulator of signatures against a fixed validator set, answering "is there a quorum yet".
///
/// A `ValidationState` is transient: one is created per certificate being assembled from
/// incoming votes, or per certificate being verified, and discarded afterwards. The `digest`
/// is the canonical hash being certified; [`add_signature`](Self::add_signature) verifies each
/// new signature against it. Signatures known to cover a different (e.g., timestamped) digest
/// are verified by the caller and folded in through the crate-internal pre-verified path.
#[derive(Clone, Debug)]
pub struct ValidationState {
    digest: CryptoHash,
    validator_set: ValidatorSet,
    signed: BTreeMap<ValidatorId, TimestampedSignature>,
}

impl ValidationState {
    pub fn new(digest: CryptoHash, validator_set: ValidatorSet) -> ValidationState {
        Self {
            digest,
            validator_set,
            signed: BTreeMap::new(),
        }
    }

    pub fn digest(&self) -> CryptoHash {
        self.digest
    }

    /// Add a signature to the accumulator, returning the updated [`complete`](Self::complete)
    /// result.
    ///
    /// The signature is accepted only if `validator` is a member of the validator set, and
    /// either a signature from `validator` was already recorded (replays are idempotent) or
    /// `signature` verifies against the canonical digest. Anything else is ignored and leaves
    /// the accumulator unchanged.
    pub fn add_signature(
        &mut self,
        validator: ValidatorId,
        timestamp: Timestamp,
        signature: SignatureBytes,
    ) -> bool {
        if let Some(verifying_key) = self.validator_set.verifying_key(&validator) {
            if !self.signed.contains_key(&validator) {
                let candidate = Signature::from_bytes(&signature.bytes());
                if verifying_key.verify(&self.digest.bytes(), &candidate).is_ok() {
                    self.signed
                        .insert(validator, TimestampedSignature::new(timestamp, signature));
                }
            }
        }
        self.complete()
    }

    /// Record a signature that the caller has already verified against whatever digest that
    /// signer actually covered. Membership and idempotence checks still apply.
    pub(crate) fn record_signature(
        &mut self,
        validator: ValidatorId,
        timestamp: Timestamp,
        signature: SignatureBytes,
    ) -> bool {
        if self.validator_set.contains(&validator) {
            self.signed
                .entry(validator)
                .or_insert_with(|| TimestampedSignature::new(timestamp, signature));
        }
        self.complete()
    }

    /// Whether the signatures accumulated so far form a quorum: at least
    /// [`threshold`](ValidatorSet::threshold) distinct members have signed.
    pub fn complete(&self) -> bool {
        self.signed.len() >= self.validator_set.threshold()
    }

    /// Extract the accumulated signature map, e.g., to place it into a newly formed
    /// certificate.
    pub fn signatures(&self) -> TimestampedSignatures {
        TimestampedSignatures::new(self.signed.clone())
    }
}
