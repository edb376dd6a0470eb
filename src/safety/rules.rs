/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`SafetyRules`] gatekeeper.
//!
//! Every vote and proposal this node produces, and every certificate it chooses to trust,
//! passes through this module. The rules are built from two predicates over the durable
//! [`SafetyState`](crate::safety::state::SafetyState):
//!
//! - **Last-voted rule**: a vertex is votable only in a view strictly above the last view the
//!   node voted in. Voting twice in one view is how a node equivocates, so this rule is
//!   checked for votes and never for proposals.
//! - **Locking rule**: a vertex is acceptable only if its parent's view is at or above the
//!   locked view. Seeing a vertex whose grandparent view exceeds the current lock advances the
//!   lock to that grandparent view -- the pre-commit phase of the three-phase commit: two
//!   consecutive certificates over a vertex lock it, a third commits it.
//!
//! Rejections by either rule are expected steady-state outcomes under network races. They are
//! signaled by empty returns, never by errors.
//!
//! ## Commit rule
//!
//! A vote marks a vertex for commit exactly when certifying the proposed vertex would complete
//! three unbroken, view-contiguous ancestors: the proposed vertex has a direct parent, that
//! parent has a direct parent, and none of the three touches genesis. The oldest of the three
//! (the grandparent) is the one committed.

use std::collections::VecDeque;

use crate::logging::first_seven_base64_chars;
use crate::messages::{Proposal, Vote};
use crate::pacemaker::types::VoteTimeout;
use crate::types::{
    basic::{CryptoHash, Timestamp, ValidatorId, View},
    certificates::{HighQC, QuorumCertificate, TimeoutCertificate, VoteData},
    keypair::Keypair,
    validators::{ValidationState, ValidatorSet},
    vertex::{Header, VerifiedVertex},
};

use super::state::{PersistentSafetyStore, SafetyState};

const VERIFIED_CERTIFICATES_CACHE_MAX_SIZE: usize = 10;

/// Decides whether a vertex may be voted for or proposed, builds votes, and validates
/// certificates against the current validator set.
///
/// One instance exists per node, owned by the consensus actor. All state transitions go
/// through pure functions on `SafetyState`; the updated state is committed to the durable
/// store before any vote is returned to the caller.
pub struct SafetyRules<S: PersistentSafetyStore> {
    keypair: Keypair,
    validator_set: ValidatorSet,
    store: S,
    state: SafetyState,
    // Hashes of recently verified certificates, oldest first.
    verified_certificates: VecDeque<CryptoHash>,
}

impl<S: PersistentSafetyStore> SafetyRules<S> {
    pub fn new(
        keypair: Keypair,
        validator_set: ValidatorSet,
        initial_state: SafetyState,
        store: S,
    ) -> Self {
        Self {
            keypair,
            validator_set,
            store,
            state: initial_state,
            verified_certificates: VecDeque::new(),
        }
    }

    /// The identity this node signs as.
    pub fn author(&self) -> ValidatorId {
        self.keypair.id()
    }

    /// The current in-memory safety state. Equal to the last durably committed state except
    /// for lock advances made while signing proposals, which are re-derived after a restart.
    pub fn state(&self) -> &SafetyState {
        &self.state
    }

    fn check_last_voted(&self, vertex: &VerifiedVertex) -> bool {
        // ensure vertex does not violate earlier votes
        if vertex.view() <= self.state.last_voted_view() {
            log::warn!(
                "Safety warning: vertex {} at view {} violates earlier vote at view {}",
                first_seven_base64_chars(&vertex.id().bytes()),
                vertex.view(),
                self.state.last_voted_view()
            );
            false
        } else {
            true
        }
    }

    /// Check the locking rule for `vertex`. Returns the successor safety state on acceptance
    /// (with the lock advanced to the grandparent view when that view exceeds the current
    /// lock), or `None` on rejection.
    fn check_locked(&self, vertex: &VerifiedVertex) -> Option<SafetyState> {
        if vertex.parent_header().view < self.state.locked_view() {
            log::warn!(
                "Safety warning: vertex {} at view {} does not respect locked view {}",
                first_seven_base64_chars(&vertex.id().bytes()),
                vertex.view(),
                self.state.locked_view()
            );
            return None;
        }

        // pre-commit phase on the proposed vertex of consecutive certificates
        if vertex.grandparent_header().view > self.state.locked_view() {
            Some(self.state.with_locked_view(vertex.grandparent_header().view))
        } else {
            Some(self.state.clone())
        }
    }

    /// Create a signed proposal from a vertex, applying the locking rule (a proposer is not
    /// voting, so the last-voted rule does not apply). Returns `None` on rejection.
    ///
    /// The lock advance this may perform is in-memory only; the durable record is untouched
    /// until the node actually votes.
    pub fn sign_proposal(
        &mut self,
        vertex: &VerifiedVertex,
        highest_committed_qc: QuorumCertificate,
        highest_tc: Option<TimeoutCertificate>,
    ) -> Option<Proposal> {
        let next_state = self.check_locked(vertex)?;
        self.state = next_state;

        let signature = self.keypair.sign(&vertex.id());
        Some(Proposal::new(
            vertex.vertex().clone(),
            highest_committed_qc,
            signature,
            highest_tc,
        ))
    }

    /// Vote for a proposed vertex while ensuring that the safety invariants are upheld.
    ///
    /// On success the updated safety state -- with the vote recorded as the last vote -- is
    /// committed to the durable store *before* the vote is returned, so a crash between this
    /// call and the vote's broadcast can never lead to an inconsistent double vote.
    pub fn vote_for(
        &mut self,
        vertex: &VerifiedVertex,
        proposed_header: Header,
        timestamp: Timestamp,
        high_qc: HighQC,
    ) -> Option<Vote> {
        if !self.check_last_voted(vertex) {
            return None;
        }

        let next_state = self.check_locked(vertex)?;

        let vote = self.create_vote(vertex, proposed_header, timestamp, high_qc);

        self.state = next_state.with_last_vote(vote.clone());
        self.store.commit_state(&self.state);

        Some(vote)
    }

    /// Build a vote for `vertex` without applying the safety checks or recording it. Used by
    /// the pacemaker for timeout votes on the empty fallback vertex, which by construction
    /// cannot conflict with a vote already cast in the view (there is none).
    pub fn create_vote(
        &self,
        vertex: &VerifiedVertex,
        proposed_header: Header,
        timestamp: Timestamp,
        high_qc: HighQC,
    ) -> Vote {
        let vote_data = construct_vote_data(vertex, proposed_header);
        let vote_digest = vote_data.hash_with_timestamp(timestamp);
        let signature = self.keypair.sign(&vote_digest);
        Vote::new(self.author(), vote_data, timestamp, signature, high_qc)
    }

    /// Turn `vote` into a timeout vote by attaching a signature over the canonical
    /// `(view, epoch)` timeout digest, recording and committing the result as the last vote.
    /// Idempotent: a vote that is already a timeout vote is returned unchanged.
    pub fn timeout_vote(&mut self, vote: Vote) -> Vote {
        if vote.is_timeout() {
            // vote is already timed out
            return vote;
        }

        let vote_timeout = VoteTimeout::of(&vote);
        let timeout_signature = self.keypair.sign(&vote_timeout.hash());
        let timeout_vote = vote.with_timeout_signature(timeout_signature);

        self.state = self.state.with_last_vote(timeout_vote.clone());
        self.store.commit_state(&self.state);

        timeout_vote
    }

    /// The last vote cast, if it was cast in `view`.
    pub fn get_last_vote(&self, view: View) -> Option<Vote> {
        self.state
            .last_vote()
            .filter(|last_vote| last_vote.view() == view)
            .cloned()
    }

    /// A high QC is valid iff its highest QC and highest committed QC verify, and its highest
    /// TC (if present) verifies.
    pub fn verify_high_qc_against_validator_set(&mut self, high_qc: &HighQC) -> bool {
        self.verify_qc_against_validator_set(&high_qc.highest_qc)
            && self.verify_qc_against_validator_set(&high_qc.highest_committed_qc)
            && high_qc
                .highest_tc
                .as_ref()
                .map_or(true, |tc| self.verify_tc_against_validator_set(tc))
    }

    /// Check that `qc` carries a valid quorum of signatures from the current validator set.
    ///
    /// Each embedded signature is checked against that signer's timestamped digest; the checks
    /// are independent of one another, so their order (or parallelization) does not affect the
    /// result. Verified signatures are then folded into a fresh [`ValidationState`], which
    /// ignores non-members and counts distinct signers against the quorum threshold.
    ///
    /// A genesis QC verifies with zero signatures, and recently verified certificates are
    /// answered from a bounded cache.
    pub fn verify_qc_against_validator_set(&mut self, qc: &QuorumCertificate) -> bool {
        let qc_hash = qc.hash();

        if self.verified_certificates.contains(&qc_hash) {
            return true;
        }

        if qc.is_genesis() {
            // A genesis QC doesn't require any signatures
            return true;
        }

        let all_signatures_valid = qc.signatures.iter().all(|(validator, timestamped)| {
            let signer_digest = qc.vote_data.hash_with_timestamp(timestamped.timestamp);
            validator.verify(&signer_digest, &timestamped.signature)
        });
        if !all_signatures_valid {
            log::warn!(
                "QC {} for view {} contains invalid signatures",
                first_seven_base64_chars(&qc_hash.bytes()),
                qc.view()
            );
            return false;
        }

        let mut validation_state =
            ValidationState::new(qc.vote_data.hash(), self.validator_set.clone());
        for (validator, timestamped) in qc.signatures.iter() {
            validation_state.record_signature(
                *validator,
                timestamped.timestamp,
                timestamped.signature,
            );
        }

        let is_qc_valid = validation_state.complete();
        if is_qc_valid {
            self.add_verified_certificate_to_cache(qc_hash);
        }

        is_qc_valid
    }

    /// Check that `tc` carries a valid quorum of signatures over the canonical `(view, epoch)`
    /// timeout digest.
    pub fn verify_tc_against_validator_set(&mut self, tc: &TimeoutCertificate) -> bool {
        let tc_hash = tc.hash();

        if self.verified_certificates.contains(&tc_hash) {
            return true;
        }

        let timeout_digest = VoteTimeout::new(tc.view, tc.epoch).hash();

        let all_signatures_valid = tc
            .signatures
            .iter()
            .all(|(validator, timestamped)| validator.verify(&timeout_digest, &timestamped.signature));
        if !all_signatures_valid {
            log::warn!(
                "TC {} for view {} contains invalid signatures",
                first_seven_base64_chars(&tc_hash.bytes()),
                tc.view
            );
            return false;
        }

        let mut validation_state = ValidationState::new(timeout_digest, self.validator_set.clone());
        for (validator, timestamped) in tc.signatures.iter() {
            validation_state.record_signature(
                *validator,
                timestamped.timestamp,
                timestamped.signature,
            );
        }

        let is_tc_valid = validation_state.complete();
        if is_tc_valid {
            self.add_verified_certificate_to_cache(tc_hash);
        }

        is_tc_valid
    }

    fn add_verified_certificate_to_cache(&mut self, certificate_hash: CryptoHash) {
        if self.verified_certificates.len() >= VERIFIED_CERTIFICATES_CACHE_MAX_SIZE {
            self.verified_certificates.pop_front();
        }
        self.verified_certificates.push_back(certificate_hash);
    }
}

/// Build the [`VoteData`] for a vote on `vertex`, populating the commit header iff certifying
/// the vertex would complete three consecutive certificates.
fn construct_vote_data(vertex: &VerifiedVertex, proposed_header: Header) -> VoteData {
    let parent = vertex.parent_header().clone();

    let committed = if vertex.touches_genesis()
        || !vertex.has_direct_parent()
        || !vertex.parent_has_direct_parent()
    {
        None
    } else {
        Some(vertex.grandparent_header().clone())
    };

    VoteData::new(proposed_header, parent, committed)
}
