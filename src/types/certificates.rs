/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the certificate types that aggregate votes into evidence of quorum
//! decisions: [`QuorumCertificate`], [`TimeoutCertificate`], and the [`HighQC`] triple that a
//! node maintains as its most advanced view of the chain.
//!
//! ## Signed content
//!
//! A quorum certificate carries one signature per voting validator, and each of those
//! signatures covers the digest of `(VoteData, timestamp)` *at that signer's timestamp* -- the
//! timestamp is signed material, so two signers of the same certificate generally signed two
//! different digests. A timeout certificate's signatures all cover the single canonical
//! [`VoteTimeout`](crate::pacemaker::types::VoteTimeout) digest derived from `(view, epoch)`;
//! there the timestamps are metadata.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::Digest;
use std::collections::{btree_map, BTreeMap};

use super::basic::*;
use super::vertex::Header;

/// A signature over some digest, together with the timestamp the signer attached when it
/// signed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct TimestampedSignature {
    pub timestamp: Timestamp,
    pub signature: SignatureBytes,
}

impl TimestampedSignature {
    pub fn new(timestamp: Timestamp, signature: SignatureBytes) -> Self {
        Self {
            timestamp,
            signature,
        }
    }
}

/// Map of validator to timestamped signature. The map is ordered by validator id, which makes
/// the Borsh encoding of a certificate canonical.
#[derive(Clone, Debug, PartialEq, Eq, Default, BorshDeserialize, BorshSerialize)]
pub struct TimestampedSignatures(BTreeMap<ValidatorId, TimestampedSignature>);

impl TimestampedSignatures {
    pub fn new(signatures: BTreeMap<ValidatorId, TimestampedSignature>) -> Self {
        Self(signatures)
    }

    pub const fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, validator: &ValidatorId) -> Option<&TimestampedSignature> {
        self.0.get(validator)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, ValidatorId, TimestampedSignature> {
        self.0.iter()
    }

    pub fn signers(&self) -> btree_map::Keys<'_, ValidatorId, TimestampedSignature> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What a vote was cast for: the proposed vertex's header, its parent's header, and -- when
/// certifying the proposed vertex would complete three unbroken, view-contiguous ancestors --
/// the header of the oldest of the three, which becomes committed.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct VoteData {
    pub proposed: Header,
    pub parent: Header,
    pub committed: Option<Header>,
}

impl VoteData {
    pub fn new(proposed: Header, parent: Header, committed: Option<Header>) -> Self {
        Self {
            proposed,
            parent,
            committed,
        }
    }

    /// The digest of this vote data alone. This is what a
    /// [`ValidationState`](crate::types::validators::ValidationState) certifies when assembling
    /// a quorum certificate.
    pub fn hash(&self) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(self.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }

    /// The digest a validator signs when voting: the hash of `(VoteData, timestamp)`.
    pub fn hash_with_timestamp(&self, timestamp: Timestamp) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(self.try_to_vec().unwrap());
        hasher.update(timestamp.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }
}

/// Proof that at least a quorum of validators voted for a given vertex.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct QuorumCertificate {
    pub vote_data: VoteData,
    pub signatures: TimestampedSignatures,
}

impl QuorumCertificate {
    pub fn new(vote_data: VoteData, signatures: TimestampedSignatures) -> Self {
        Self {
            vote_data,
            signatures,
        }
    }

    /// The quorum certificate that anchors the chain: proposed, parent, and committed headers
    /// are all `genesis_header`, and the signature map is empty. A genesis QC is valid with
    /// zero signatures.
    pub fn genesis(genesis_header: Header) -> QuorumCertificate {
        QuorumCertificate {
            vote_data: VoteData::new(
                genesis_header.clone(),
                genesis_header.clone(),
                Some(genesis_header),
            ),
            signatures: TimestampedSignatures::empty(),
        }
    }

    pub fn is_genesis(&self) -> bool {
        let committed_and_parent_and_proposed_are_the_same = self
            .vote_data
            .committed
            .as_ref()
            .is_some_and(|committed| {
                *committed == self.vote_data.proposed && self.vote_data.parent == self.vote_data.proposed
            });

        committed_and_parent_and_proposed_are_the_same && self.vote_data.proposed.view.is_genesis()
    }

    pub fn view(&self) -> View {
        self.vote_data.proposed.view
    }

    pub fn proposed(&self) -> &Header {
        &self.vote_data.proposed
    }

    pub fn parent(&self) -> &Header {
        &self.vote_data.parent
    }

    pub fn committed(&self) -> Option<&Header> {
        self.vote_data.committed.as_ref()
    }

    pub fn hash(&self) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(self.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }
}

/// Proof that at least a quorum of validators timed out a view.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct TimeoutCertificate {
    pub epoch: Epoch,
    pub view: View,
    pub signatures: TimestampedSignatures,
}

impl TimeoutCertificate {
    pub fn new(epoch: Epoch, view: View, signatures: TimestampedSignatures) -> Self {
        Self {
            epoch,
            view,
            signatures,
        }
    }

    pub fn hash(&self) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(self.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }
}

/// The most advanced certificates a node has observed: the highest quorum certificate, the
/// highest quorum certificate carrying a commit, and the highest timeout certificate, if any.
/// New proposals are anchored to the highest QC, and safety checks are bounded by the highest
/// committed QC.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct HighQC {
    pub highest_qc: QuorumCertificate,
    pub highest_committed_qc: QuorumCertificate,
    pub highest_tc: Option<TimeoutCertificate>,
}

impl HighQC {
    pub fn new(
        highest_qc: QuorumCertificate,
        highest_committed_qc: QuorumCertificate,
        highest_tc: Option<TimeoutCertificate>,
    ) -> Self {
        Self {
            highest_qc,
            highest_committed_qc,
            highest_tc,
        }
    }
}
