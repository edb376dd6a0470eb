/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for structured messages that are sent between validators: [`Proposal`] and
//! [`Vote`], and the [`ConsensusMessage`] enum an embedding node routes on.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::types::{
    basic::{Epoch, SignatureBytes, Timestamp, ValidatorId, View},
    certificates::{HighQC, QuorumCertificate, TimeoutCertificate, VoteData},
    vertex::Vertex,
};

/// The messages of the consensus protocol, as one tagged type. Timeout votes are not a variant
/// of their own: a [`Vote`] with its timeout signature attached *is* the timeout vote.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub enum ConsensusMessage {
    Proposal(Proposal),
    Vote(Vote),
}

impl ConsensusMessage {
    /// Returns the view number associated with a given [ConsensusMessage].
    pub fn view(&self) -> View {
        match self {
            ConsensusMessage::Proposal(proposal) => proposal.view(),
            ConsensusMessage::Vote(vote) => vote.view(),
        }
    }
}

impl From<Proposal> for ConsensusMessage {
    fn from(proposal: Proposal) -> Self {
        ConsensusMessage::Proposal(proposal)
    }
}

impl From<Vote> for ConsensusMessage {
    fn from(vote: Vote) -> Self {
        ConsensusMessage::Vote(vote)
    }
}

/// A leader's proposal for a view: the proposed vertex, the proposer's signature over the
/// vertex id, and the proposer's view of the highest committed QC and highest TC so that
/// lagging validators can catch up from the proposal alone.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Proposal {
    pub vertex: Vertex,
    pub highest_committed_qc: QuorumCertificate,
    pub signature: SignatureBytes,
    pub highest_tc: Option<TimeoutCertificate>,
}

impl Proposal {
    pub fn new(
        vertex: Vertex,
        highest_committed_qc: QuorumCertificate,
        signature: SignatureBytes,
        highest_tc: Option<TimeoutCertificate>,
    ) -> Self {
        Self {
            vertex,
            highest_committed_qc,
            signature,
            highest_tc,
        }
    }

    pub fn view(&self) -> View {
        self.vertex.view
    }
}

/// A validator's vote for a vertex. The signature covers the digest of
/// `(vote_data, timestamp)`. A vote becomes a timeout vote once the optional timeout
/// signature -- covering the canonical [`VoteTimeout`](crate::pacemaker::types::VoteTimeout)
/// digest -- is attached; attaching it again is a no-op.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Vote {
    pub author: ValidatorId,
    pub vote_data: VoteData,
    pub timestamp: Timestamp,
    pub signature: SignatureBytes,
    pub high_qc: HighQC,
    pub timeout_signature: Option<SignatureBytes>,
}

impl Vote {
    pub fn new(
        author: ValidatorId,
        vote_data: VoteData,
        timestamp: Timestamp,
        signature: SignatureBytes,
        high_qc: HighQC,
    ) -> Self {
        Self {
            author,
            vote_data,
            timestamp,
            signature,
            high_qc,
            timeout_signature: None,
        }
    }

    pub fn view(&self) -> View {
        self.vote_data.proposed.view
    }

    pub fn epoch(&self) -> Epoch {
        self.vote_data.proposed.ledger_header.epoch
    }

    pub fn is_timeout(&self) -> bool {
        self.timeout_signature.is_some()
    }

    pub fn with_timeout_signature(mut self, timeout_signature: SignatureBytes) -> Vote {
        if self.timeout_signature.is_none() {
            self.timeout_signature = Some(timeout_signature);
        }
        self
    }
}
