/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions for the 'vertex' type -- a proposed block -- and its associated methods.
//!
//! Vertices chain through the quorum certificate embedded in each of them, not through
//! pointers to other in-memory vertices: a vertex's parent is the vertex certified by its
//! `parent_qc`, and its grandparent is the parent header recorded inside that same QC's vote
//! data. [`VerifiedVertex`] pairs a vertex with its hash and exposes the chain-inspection
//! accessors that the safety rules are built on.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::Digest;

use super::basic::*;
use super::certificates::QuorumCertificate;

/// The slice of a vertex's execution result that consensus needs: the epoch the vertex
/// executed in, and whether it was the last vertex of that epoch. An end-of-epoch vertex
/// suppresses transaction proposals on top of it until the next validator set takes over.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct LedgerHeader {
    pub epoch: Epoch,
    pub end_of_epoch: bool,
}

impl LedgerHeader {
    pub fn new(epoch: Epoch, end_of_epoch: bool) -> Self {
        Self {
            epoch,
            end_of_epoch,
        }
    }
}

/// Consensus header naming an executed vertex: the view it was proposed in, its id, and the
/// result of executing it.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Header {
    pub view: View,
    pub vertex_id: CryptoHash,
    pub ledger_header: LedgerHeader,
}

impl Header {
    pub fn new(view: View, vertex_id: CryptoHash, ledger_header: LedgerHeader) -> Self {
        Self {
            view,
            vertex_id,
            ledger_header,
        }
    }
}

/// A proposed block: the view it is proposed in, the quorum certificate for its parent, an
/// ordered transaction list, and its author.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct Vertex {
    pub parent_qc: QuorumCertificate,
    pub view: View,
    pub txns: Vec<Txn>,
    pub author: ValidatorId,
}

impl Vertex {
    pub fn new(
        parent_qc: QuorumCertificate,
        view: View,
        txns: Vec<Txn>,
        author: ValidatorId,
    ) -> Vertex {
        Vertex {
            parent_qc,
            view,
            txns,
            author,
        }
    }

    /// The empty fallback vertex a view's timeout vote is cast on when no proposal was voted
    /// for in time. Authored on behalf of the view's leader and carries no transactions.
    pub fn new_timeout(parent_qc: QuorumCertificate, view: View, leader: ValidatorId) -> Vertex {
        Vertex::new(parent_qc, view, Vec::new(), leader)
    }

    pub fn hash(&self) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(self.parent_qc.try_to_vec().unwrap());
        hasher.update(self.view.try_to_vec().unwrap());
        hasher.update(self.txns.try_to_vec().unwrap());
        hasher.update(self.author.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }

    /// Header of this vertex's parent, i.e., the proposed header certified by `parent_qc`.
    pub fn parent_header(&self) -> &Header {
        self.parent_qc.proposed()
    }

    /// Header of this vertex's grandparent, i.e., the parent header recorded in `parent_qc`'s
    /// vote data.
    pub fn grandparent_header(&self) -> &Header {
        self.parent_qc.parent()
    }
}

/// A vertex together with its id. Constructing a `VerifiedVertex` hashes the vertex exactly
/// once; everything downstream (votes, proposals, the vertex store) refers to the id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedVertex {
    vertex: Vertex,
    id: CryptoHash,
}

impl VerifiedVertex {
    pub fn new(vertex: Vertex) -> VerifiedVertex {
        let id = vertex.hash();
        VerifiedVertex { vertex, id }
    }

    pub fn id(&self) -> CryptoHash {
        self.id
    }

    pub fn vertex(&self) -> &Vertex {
        &self.vertex
    }

    pub fn view(&self) -> View {
        self.vertex.view
    }

    pub fn parent_header(&self) -> &Header {
        self.vertex.parent_header()
    }

    pub fn grandparent_header(&self) -> &Header {
        self.vertex.grandparent_header()
    }

    /// Whether this vertex extends its parent without a view gap.
    pub fn has_direct_parent(&self) -> bool {
        self.vertex.view == self.parent_header().view + 1
    }

    /// Whether this vertex's parent extends the grandparent without a view gap.
    pub fn parent_has_direct_parent(&self) -> bool {
        self.parent_header().view == self.grandparent_header().view + 1
    }

    /// Whether this vertex, its parent, or its grandparent is at the genesis view. Vertices
    /// that touch genesis never mark anything for commit.
    pub fn touches_genesis(&self) -> bool {
        self.view().is_genesis()
            || self.parent_header().view.is_genesis()
            || self.grandparent_header().view.is_genesis()
    }
}
