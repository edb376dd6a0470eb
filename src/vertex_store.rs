/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The contract between the consensus core and the vertex store that keeps the uncommitted
//! part of the chain.
//!
//! The store, not the core, owns chain walks and durable block storage. The core only needs
//! three things from it: insertion of new vertices (which may fail recoverably when the parent
//! is not yet known locally), lookup of executed vertices by id, and the ancestor path from a
//! vertex back to the store's root -- the window of vertices whose transactions are pending
//! commit, used to bound transaction selection for new proposals.

use std::fmt;

use crate::types::{
    basic::{CryptoHash, View},
    vertex::{Header, LedgerHeader, VerifiedVertex},
};

/// A vertex the store has executed: the vertex itself plus the ledger header its execution
/// produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedVertex {
    vertex: VerifiedVertex,
    ledger_header: LedgerHeader,
}

impl PreparedVertex {
    pub fn new(vertex: VerifiedVertex, ledger_header: LedgerHeader) -> Self {
        Self {
            vertex,
            ledger_header,
        }
    }

    pub fn id(&self) -> CryptoHash {
        self.vertex.id()
    }

    pub fn view(&self) -> View {
        self.vertex.view()
    }

    pub fn vertex(&self) -> &VerifiedVertex {
        &self.vertex
    }

    pub fn ledger_header(&self) -> &LedgerHeader {
        &self.ledger_header
    }

    /// The consensus header naming this executed vertex.
    pub fn header(&self) -> Header {
        Header::new(self.view(), self.id(), self.ledger_header.clone())
    }
}

/// Notification that the vertex store finished inserting (and executing) a vertex. Insertion
/// is asynchronous from the pacemaker's point of view: the pacemaker requests an insertion,
/// and learns of its completion through this update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BFTInsertUpdate {
    inserted: PreparedVertex,
}

impl BFTInsertUpdate {
    pub fn new(inserted: PreparedVertex) -> Self {
        Self { inserted }
    }

    pub fn inserted(&self) -> &PreparedVertex {
        &self.inserted
    }
}

/// Why a vertex could not be inserted into the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InsertVertexError {
    /// The vertex's parent is not yet known locally. Recoverable: the store is lagging and
    /// will catch up through synchronization, after which insertion can be retried.
    MissingParent(CryptoHash),
}

impl fmt::Display for InsertVertexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertVertexError::MissingParent(parent_id) => {
                write!(f, "parent vertex {} is not in the store", parent_id)
            }
        }
    }
}

impl std::error::Error for InsertVertexError {}

/// The vertex store as seen by the consensus core.
pub trait VertexStore {
    /// Insert `vertex` into the store, scheduling its execution. Completion is signaled
    /// through a [`BFTInsertUpdate`]. Fails with [`InsertVertexError::MissingParent`] if the
    /// vertex's parent is unknown.
    fn insert_vertex(&mut self, vertex: VerifiedVertex) -> Result<(), InsertVertexError>;

    /// Look up an already-executed vertex by id.
    fn get_prepared_vertex(&self, id: &CryptoHash) -> Option<PreparedVertex>;

    /// The executed ancestors of the vertex identified by `id`, ordered from the store's root
    /// to the vertex itself.
    fn path_from_root(&self, id: &CryptoHash) -> Vec<PreparedVertex>;
}
