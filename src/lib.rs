/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The safety and liveness core of a chained BFT consensus protocol.
//!
//! This library contains the three components of a validator node that decide, round by round,
//! which proposed vertex the node may vote for, when a round has timed out, and whether an
//! aggregated certificate carries a valid quorum of signatures:
//! 1. The [`Pacemaker`](pacemaker::protocol::Pacemaker), which drives the node through views,
//!    schedules and reschedules local timeouts, and generates proposals when the node leads a
//!    view.
//! 2. The [`SafetyRules`](safety::rules::SafetyRules), the single authority on whether a vote or
//!    proposal may be produced, and on whether an externally received certificate may be trusted.
//!    It persists a small durable record before any vote leaves the node, which is what prevents
//!    a restarted node from voting inconsistently.
//! 3. The [`ValidationState`](types::validators::ValidationState) accumulator and
//!    [`ValidatorSet`](types::validators::ValidatorSet), which together implement the BFT quorum
//!    bound `threshold(n) = n - floor((n - 1) / 3)`.
//!
//! Everything else a complete node needs -- vertex storage and chain walks, transaction
//! execution, transaction selection, networking, and durable storage internals -- is reached
//! through the collaborator traits in [`vertex_store`], [`environment`], and
//! [`safety::state`]. All entry points are expected to be called from a single consensus event
//! loop; the library does no internal locking.
//!
//! ## Wire determinism
//!
//! [`Vote`](messages::Vote), [`QuorumCertificate`](types::certificates::QuorumCertificate),
//! [`TimeoutCertificate`](types::certificates::TimeoutCertificate), and
//! [`Proposal`](messages::Proposal) serialize with Borsh, and their signed content is exactly
//! the Borsh encoding of `(VoteData, timestamp)` (for votes) or of the canonical
//! [`VoteTimeout`](pacemaker::types::VoteTimeout) (for timeout signatures). Changing field order
//! or encoding breaks signature verification across implementations.

pub mod types;

pub mod messages;

pub mod environment;

pub mod vertex_store;

pub mod safety;

pub mod pacemaker;

pub(crate) mod logging;
