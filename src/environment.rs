/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The outbound collaborator contracts of the consensus core: message and timeout dispatch,
//! the time source, transaction selection, and the timeout backoff curve.
//!
//! Everything here is fire-and-forget from the core's point of view. The core never waits on a
//! dispatcher, and it never cancels a scheduled timeout -- a superseded timeout is simply
//! ignored when it fires.

use std::time::Duration;

use crate::messages::{Proposal, Vote};
use crate::pacemaker::types::{LocalTimeoutOccurrence, ScheduledLocalTimeout};
use crate::types::{
    basic::{Timestamp, Txn, View},
    validators::ValidatorSet,
};
use crate::vertex_store::PreparedVertex;

/// The outbound edges of the pacemaker: remote proposal broadcast, remote vote broadcast, the
/// scheduled-local-timeout queue, and the local timeout-occurrence notification.
pub trait Dispatch {
    /// Broadcast `proposal` to every member of `targets`.
    fn dispatch_proposal(&mut self, targets: &ValidatorSet, proposal: Proposal);

    /// Broadcast `vote` to every member of `targets`.
    fn dispatch_vote(&mut self, targets: &ValidatorSet, vote: Vote);

    /// Arrange for `timeout` to be delivered back to
    /// [`Pacemaker::process_local_timeout`](crate::pacemaker::protocol::Pacemaker::process_local_timeout)
    /// after `delay`.
    fn schedule_local_timeout(&mut self, timeout: ScheduledLocalTimeout, delay: Duration);

    /// Notify local listeners that a view timed out.
    fn notify_timeout_occurrence(&mut self, occurrence: LocalTimeoutOccurrence);
}

/// Source of vote timestamps.
pub trait TimeSource {
    fn current_time(&self) -> Timestamp;
}

/// Selects the transactions a new proposal should carry. `prepared_ancestors` is the executed
/// ancestor path from the store's root to the proposal's anchor; its transactions are pending
/// commit and must not be proposed again.
pub trait NextTxnsGenerator {
    fn generate_next_txns(&mut self, view: View, prepared_ancestors: &[PreparedVertex]) -> Vec<Txn>;
}

/// Maps the number of consecutive uncommitted views to the duration of the next local timeout.
/// Implementations must be non-decreasing in `uncommitted_views`; liveness under eventual
/// synchrony depends on it.
pub trait TimeoutCalculator {
    fn timeout(&self, uncommitted_views: u64) -> Duration;
}
