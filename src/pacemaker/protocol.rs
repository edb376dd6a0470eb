/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The [`Pacemaker`]: the component that drives the node through consensus views and
//! guarantees eventual progress.
//!
//! The pacemaker owns the latest [`ViewUpdate`] and is the only component that talks to the
//! vertex store and the outbound dispatchers. On entering a view it schedules a local timeout
//! and, if this node leads the view, asks the safety rules to sign a proposal anchored to the
//! highest known QC. When a view times out it broadcasts a timeout vote -- either by
//! converting the vote already cast in the view, or, if none was cast, by inserting an empty
//! fallback vertex and voting on it once the store reports the insertion -- and reschedules
//! the timeout with a recomputed (typically larger) delay. Timeouts are never cancelled:
//! every fired timeout first re-checks that its view still matches the current view, so
//! superseded timeouts are silent no-ops.
//!
//! All entry points must be called from the node's single consensus event loop.

use crate::environment::{Dispatch, NextTxnsGenerator, TimeSource, TimeoutCalculator};
use crate::logging::first_seven_base64_chars;
use crate::messages::Proposal;
use crate::safety::rules::SafetyRules;
use crate::safety::state::PersistentSafetyStore;
use crate::types::{
    basic::{CryptoHash, View},
    validators::ValidatorSet,
    vertex::{VerifiedVertex, Vertex},
};
use crate::vertex_store::{BFTInsertUpdate, InsertVertexError, PreparedVertex, VertexStore};

use super::types::{LocalTimeoutOccurrence, ScheduledLocalTimeout, ViewUpdate};

/// Drives view progression for one node.
///
/// Construct with [`new`](Self::new), call [`start`](Self::start) once, then feed it
/// [`ViewUpdate`]s, [`BFTInsertUpdate`]s, and fired [`ScheduledLocalTimeout`]s from the
/// consensus event loop.
pub struct Pacemaker<V, G, D, T, C, S>
where
    V: VertexStore,
    G: NextTxnsGenerator,
    D: Dispatch,
    T: TimeSource,
    C: TimeoutCalculator,
    S: PersistentSafetyStore,
{
    validator_set: ValidatorSet,
    vertex_store: V,
    safety_rules: SafetyRules<S>,
    txns_generator: G,
    dispatch: D,
    time_source: T,
    timeout_calculator: C,

    latest_view_update: ViewUpdate,
    is_view_timed_out: bool,
    timeout_vote_vertex_id: Option<CryptoHash>,

    timed_out_views: u64,
    timeout_votes_sent: u64,
}

impl<V, G, D, T, C, S> Pacemaker<V, G, D, T, C, S>
where
    V: VertexStore,
    G: NextTxnsGenerator,
    D: Dispatch,
    T: TimeSource,
    C: TimeoutCalculator,
    S: PersistentSafetyStore,
{
    pub fn new(
        validator_set: ValidatorSet,
        vertex_store: V,
        safety_rules: SafetyRules<S>,
        txns_generator: G,
        dispatch: D,
        time_source: T,
        timeout_calculator: C,
        initial_view_update: ViewUpdate,
    ) -> Self {
        Self {
            validator_set,
            vertex_store,
            safety_rules,
            txns_generator,
            dispatch,
            time_source,
            timeout_calculator,
            latest_view_update: initial_view_update,
            is_view_timed_out: false,
            timeout_vote_vertex_id: None,
            timed_out_views: 0,
            timeout_votes_sent: 0,
        }
    }

    pub fn current_view(&self) -> View {
        self.latest_view_update.current_view
    }

    pub fn latest_view_update(&self) -> &ViewUpdate {
        &self.latest_view_update
    }

    pub fn safety_rules(&self) -> &SafetyRules<S> {
        &self.safety_rules
    }

    pub fn safety_rules_mut(&mut self) -> &mut SafetyRules<S> {
        &mut self.safety_rules
    }

    /// Number of views in which at least one local timeout fired.
    pub fn timed_out_views(&self) -> u64 {
        self.timed_out_views
    }

    /// Number of local timeouts processed, counting repeat timeouts of the same view.
    pub fn timeout_votes_sent(&self) -> u64 {
        self.timeout_votes_sent
    }

    pub fn start(&mut self) {
        log::info!("Pacemaker start: view {}", self.current_view());
        self.start_view();
    }

    /// Adopt `view_update` and enter its view. Updates whose view is at or below the current
    /// view are stale and dropped silently.
    pub fn process_view_update(&mut self, view_update: ViewUpdate) {
        if view_update.current_view <= self.latest_view_update.current_view {
            log::trace!(
                "ViewUpdate: ignoring update to view {}, current is {}",
                view_update.current_view,
                self.latest_view_update.current_view
            );
            return;
        }

        self.latest_view_update = view_update;
        self.start_view();
    }

    /// Processes a vertex-insertion notification from the vertex store. Only relevant while
    /// waiting for the timeout vertex of the current, timed-out view to be inserted: when the
    /// inserted vertex matches the pending id, the deferred timeout vote is produced and
    /// broadcast. All other insertions are not the pacemaker's concern.
    pub fn process_bft_update(&mut self, update: &BFTInsertUpdate) {
        if !self.is_view_timed_out
            || self
                .timeout_vote_vertex_id
                .map_or(true, |pending| pending != update.inserted().id())
        {
            return;
        }

        self.create_and_send_timeout_vote(update.inserted().clone());
    }

    /// Processes a fired local timeout, broadcasting a timeout vote for the current view:
    /// either the previously sent vote converted into a timeout vote, or -- if no vote was
    /// sent in this view -- a vote on an empty fallback vertex, deferred until the vertex
    /// store reports that vertex inserted. The timeout is then unconditionally rescheduled
    /// with a recomputed delay.
    ///
    /// A timeout whose view no longer matches the current view was superseded by a view
    /// change and is a no-op.
    pub fn process_local_timeout(&mut self, scheduled_timeout: ScheduledLocalTimeout) {
        let view = scheduled_timeout.view();

        if view != self.latest_view_update.current_view {
            log::trace!(
                "LocalTimeout: ignoring timeout for view {}, current is {}",
                view,
                self.latest_view_update.current_view
            );
            return;
        }

        log::trace!("LocalTimeout: view {}, retry {}", view, scheduled_timeout.count());

        self.is_view_timed_out = true;
        if scheduled_timeout.count() == 0 {
            self.timed_out_views += 1;
        }
        self.timeout_votes_sent += 1;

        match self.safety_rules.get_last_vote(view) {
            // if there is a previously sent vote, we time it out and broadcast to all nodes
            Some(last_vote) => {
                let timeout_vote = self.safety_rules.timeout_vote(last_vote);
                self.dispatch.dispatch_vote(&self.validator_set, timeout_vote);
            }
            // otherwise, we insert an empty vertex and, once the store reports it inserted,
            // we send a timeout vote on it (see process_bft_update)
            None => self.create_timeout_vertex_and_send_vote(scheduled_timeout.view_update().clone()),
        }

        self.reschedule_timeout(scheduled_timeout);
    }

    fn start_view(&mut self) {
        self.is_view_timed_out = false;
        self.timeout_vote_vertex_id = None;

        let delay = self
            .timeout_calculator
            .timeout(self.latest_view_update.uncommitted_views_count());
        let scheduled_timeout = ScheduledLocalTimeout::new(self.latest_view_update.clone(), delay);
        self.dispatch.schedule_local_timeout(scheduled_timeout, delay);

        if self.safety_rules.author() == self.latest_view_update.leader {
            let view = self.latest_view_update.current_view;
            if let Some(proposal) = self.generate_proposal(view) {
                log::trace!(
                    "Propose: view {}, vertex {}",
                    view,
                    first_seven_base64_chars(&proposal.vertex.hash().bytes())
                );
                self.dispatch.dispatch_proposal(&self.validator_set, proposal);
            }
        }
    }

    /// Build and sign this node's proposal for `view`, anchored to the vertex referenced by
    /// the highest QC. If that vertex ended its epoch the proposal carries no transactions;
    /// otherwise the transaction source picks the next batch, bounded by the executed ancestor
    /// path from the anchor back to the store's root so that transactions pending commit are
    /// not proposed again.
    fn generate_proposal(&mut self, view: View) -> Option<Proposal> {
        let high_qc = self.latest_view_update.high_qc.clone();
        let highest_qc = high_qc.highest_qc.clone();

        let next_txns = if highest_qc.proposed().ledger_header.end_of_epoch {
            Vec::new()
        } else {
            let prepared_ancestors = self
                .vertex_store
                .path_from_root(&highest_qc.proposed().vertex_id);
            self.txns_generator.generate_next_txns(view, &prepared_ancestors)
        };

        let proposed_vertex = VerifiedVertex::new(Vertex::new(
            highest_qc,
            view,
            next_txns,
            self.safety_rules.author(),
        ));
        self.safety_rules.sign_proposal(
            &proposed_vertex,
            high_qc.highest_committed_qc,
            high_qc.highest_tc,
        )
    }

    fn create_timeout_vertex_and_send_vote(&mut self, view_update: ViewUpdate) {
        if self.timeout_vote_vertex_id.is_some() {
            // the timeout vertex for this view is already inserted or being inserted
            return;
        }

        let highest_qc = self.latest_view_update.high_qc.highest_qc.clone();
        let blank_vertex = VerifiedVertex::new(Vertex::new_timeout(
            highest_qc,
            view_update.current_view,
            view_update.leader,
        ));
        self.timeout_vote_vertex_id = Some(blank_vertex.id());

        match self.vertex_store.get_prepared_vertex(&blank_vertex.id()) {
            // if the vertex is already there, send the vote immediately
            Some(prepared_vertex) => self.create_and_send_timeout_vote(prepared_vertex),
            // otherwise insert and wait for the store's insertion notification
            None => self.maybe_insert_vertex(blank_vertex),
        }
    }

    fn maybe_insert_vertex(&mut self, vertex: VerifiedVertex) {
        if let Err(InsertVertexError::MissingParent(parent_id)) =
            self.vertex_store.insert_vertex(vertex)
        {
            log::debug!(
                "could not insert timeout vertex: parent {} unknown",
                first_seven_base64_chars(&parent_id.bytes())
            );
            // the vertex store lags behind the pacemaker; clearing the pending id lets the
            // next timeout tick rebuild and re-insert the vertex
            self.timeout_vote_vertex_id = None;
        }
    }

    fn create_and_send_timeout_vote(&mut self, prepared_vertex: PreparedVertex) {
        let proposed_header = prepared_vertex.header();

        let base_vote = self.safety_rules.create_vote(
            prepared_vertex.vertex(),
            proposed_header,
            self.time_source.current_time(),
            self.latest_view_update.high_qc.clone(),
        );
        let timeout_vote = self.safety_rules.timeout_vote(base_vote);

        self.dispatch.dispatch_vote(&self.validator_set, timeout_vote);
    }

    fn reschedule_timeout(&mut self, scheduled_timeout: ScheduledLocalTimeout) {
        self.dispatch
            .notify_timeout_occurrence(LocalTimeoutOccurrence::new(scheduled_timeout.clone()));

        let delay = self
            .timeout_calculator
            .timeout(self.latest_view_update.uncommitted_views_count());
        let next_timeout = scheduled_timeout.next_retry(delay);
        self.dispatch.schedule_local_timeout(next_timeout, delay);
    }
}
