//! Tests for view progression: proposal generation on entering a view, timeout-vote handling,
//! the deferred empty-vertex timeout path, and unconditional timeout rescheduling.

mod common;

use std::time::Duration;

use chained_bft::pacemaker::types::ScheduledLocalTimeout;
use chained_bft::types::basic::{Txn, View};
use chained_bft::types::vertex::VerifiedVertex;
use log::LevelFilter;

use common::{
    expected_timeout_vertex, genesis_qc, header_for, high_qc, insert_update, keypairs, prepared,
    qc_certifying, test_node, vertex_extending, view_update,
};

#[test]
fn stale_view_updates_are_dropped_silently() {
    common::logging::setup_logger(LevelFilter::Trace);
    let validators = keypairs(4);
    let initial = view_update(View::new(3), &genesis_qc(), &validators[1]);
    let mut node = test_node(&validators[0], &validators, initial.clone());

    node.pacemaker.process_view_update(initial.clone());
    node.pacemaker
        .process_view_update(view_update(View::new(2), &genesis_qc(), &validators[1]));

    assert_eq!(node.pacemaker.current_view(), View::new(3));
    assert!(node.dispatch.record().scheduled_timeouts.is_empty());
}

#[test]
fn adopting_a_view_update_schedules_a_local_timeout() {
    let validators = keypairs(4);
    let initial = view_update(View::new(1), &genesis_qc(), &validators[1]);
    let mut node = test_node(&validators[0], &validators, initial);

    node.pacemaker
        .process_view_update(view_update(View::new(2), &genesis_qc(), &validators[1]));

    assert_eq!(node.pacemaker.current_view(), View::new(2));
    let record = node.dispatch.record();
    assert_eq!(record.scheduled_timeouts.len(), 1);
    let (scheduled, delay) = &record.scheduled_timeouts[0];
    assert_eq!(scheduled.view(), View::new(2));
    assert_eq!(scheduled.count(), 0);
    // two uncommitted views at backoff rate 2.0 on a 100ms base
    assert_eq!(*delay, Duration::from_millis(400));
    // the node is not the leader of view 2, so nothing was proposed
    assert!(record.proposals.is_empty());
}

#[test]
fn the_leader_proposes_on_entering_its_view() {
    let validators = keypairs(4);
    let me = &validators[0];
    let anchor = vertex_extending(genesis_qc(), View::new(1), &validators[1]);
    let anchor_qc = qc_certifying(&anchor, &validators);

    let initial = view_update(View::new(1), &genesis_qc(), &validators[1]);
    let mut node = test_node(me, &validators, initial);
    node.txn_source.record().next = vec![Txn::new(b"transfer".to_vec())];
    node.vertex_store.record().path = vec![prepared(anchor.clone())];

    node.pacemaker
        .process_view_update(view_update(View::new(2), &anchor_qc, me));

    let record = node.dispatch.record();
    assert_eq!(record.proposals.len(), 1);
    let proposal = &record.proposals[0];
    assert_eq!(proposal.view(), View::new(2));
    assert_eq!(proposal.vertex.parent_qc, anchor_qc);
    assert_eq!(proposal.vertex.txns, vec![Txn::new(b"transfer".to_vec())]);
    assert_eq!(proposal.vertex.author, me.id());

    // the signature covers the proposed vertex's id
    let proposed = VerifiedVertex::new(proposal.vertex.clone());
    assert!(me.id().verify(&proposed.id(), &proposal.signature));

    // transaction selection was bounded by the executed ancestor path of the anchor
    let requests = node.txn_source.record().requests.clone();
    assert_eq!(requests, vec![(View::new(2), 1)]);
}

#[test]
fn an_end_of_epoch_anchor_proposes_no_transactions() {
    let validators = keypairs(4);
    let me = &validators[0];

    let anchor = vertex_extending(genesis_qc(), View::new(1), &validators[1]);
    let mut anchor_header = header_for(&anchor);
    anchor_header.ledger_header.end_of_epoch = true;
    let anchor_qc = common::make_qc(
        &validators,
        &chained_bft::types::certificates::VoteData::new(
            anchor_header,
            anchor.parent_header().clone(),
            None,
        ),
    );

    let initial = view_update(View::new(1), &genesis_qc(), &validators[1]);
    let mut node = test_node(me, &validators, initial);
    node.txn_source.record().next = vec![Txn::new(b"should not appear".to_vec())];

    node.pacemaker
        .process_view_update(view_update(View::new(2), &anchor_qc, me));

    let record = node.dispatch.record();
    assert_eq!(record.proposals.len(), 1);
    assert!(record.proposals[0].vertex.txns.is_empty());
    // the transaction source was never consulted
    assert!(node.txn_source.record().requests.is_empty());
}

#[test]
fn a_timeout_with_a_previous_vote_rebroadcasts_it_as_a_timeout_vote() {
    let validators = keypairs(4);
    let me = &validators[0];
    let initial = view_update(View::new(1), &genesis_qc(), &validators[1]);
    let mut node = test_node(me, &validators, initial.clone());

    // the node voted in view 1 before the view timed out
    let vertex = vertex_extending(genesis_qc(), View::new(1), &validators[1]);
    let vote = node
        .pacemaker
        .safety_rules_mut()
        .vote_for(
            &vertex,
            header_for(&vertex),
            chained_bft::types::basic::Timestamp::new(5_000),
            high_qc(&genesis_qc()),
        )
        .unwrap();

    node.pacemaker
        .process_local_timeout(ScheduledLocalTimeout::new(initial, Duration::ZERO));

    let record = node.dispatch.record();
    assert_eq!(record.votes.len(), 1);
    let timeout_vote = &record.votes[0];
    assert!(timeout_vote.is_timeout());
    assert_eq!(timeout_vote.vote_data, vote.vote_data);
    // no fallback vertex was needed
    assert!(node.vertex_store.record().insert_attempts.is_empty());
    assert_eq!(node.pacemaker.timed_out_views(), 1);
}

#[test]
fn a_timeout_without_a_vote_defers_the_vote_until_the_vertex_is_inserted() {
    let validators = keypairs(4);
    let me = &validators[0];
    let initial = view_update(View::new(1), &genesis_qc(), &validators[1]);
    let mut node = test_node(me, &validators, initial.clone());

    node.pacemaker
        .process_local_timeout(ScheduledLocalTimeout::new(initial.clone(), Duration::ZERO));

    // the empty fallback vertex went into the store, but no vote left the node yet
    let expected = expected_timeout_vertex(&initial);
    {
        let store = node.vertex_store.record();
        assert_eq!(store.inserted.len(), 1);
        assert_eq!(store.inserted[0], expected);
        assert!(store.inserted[0].vertex().txns.is_empty());
    }
    assert!(node.dispatch.record().votes.is_empty());

    // the store reports the insertion complete; now the timeout vote goes out
    node.pacemaker.process_bft_update(&insert_update(expected.clone()));

    let record = node.dispatch.record();
    assert_eq!(record.votes.len(), 1);
    let timeout_vote = &record.votes[0];
    assert!(timeout_vote.is_timeout());
    assert_eq!(timeout_vote.view(), View::new(1));
    assert_eq!(timeout_vote.author, me.id());
    assert_eq!(timeout_vote.vote_data.proposed.vertex_id, expected.id());
}

#[test]
fn an_insertion_update_for_an_unrelated_vertex_is_ignored() {
    let validators = keypairs(4);
    let me = &validators[0];
    let initial = view_update(View::new(1), &genesis_qc(), &validators[1]);
    let mut node = test_node(me, &validators, initial.clone());

    node.pacemaker
        .process_local_timeout(ScheduledLocalTimeout::new(initial, Duration::ZERO));

    let unrelated = vertex_extending(genesis_qc(), View::new(1), &validators[2]);
    node.pacemaker.process_bft_update(&insert_update(unrelated));

    assert!(node.dispatch.record().votes.is_empty());
}

#[test]
fn an_already_prepared_timeout_vertex_is_voted_on_immediately() {
    let validators = keypairs(4);
    let me = &validators[0];
    let initial = view_update(View::new(1), &genesis_qc(), &validators[1]);
    let mut node = test_node(me, &validators, initial.clone());

    let expected = expected_timeout_vertex(&initial);
    node.vertex_store
        .record()
        .prepared
        .insert(expected.id(), prepared(expected.clone()));

    node.pacemaker
        .process_local_timeout(ScheduledLocalTimeout::new(initial, Duration::ZERO));

    let record = node.dispatch.record();
    assert_eq!(record.votes.len(), 1);
    assert!(record.votes[0].is_timeout());
    // nothing was inserted: the vertex was already in the store
    assert!(node.vertex_store.record().insert_attempts.is_empty());
}

#[test]
fn a_missing_parent_is_recoverable_and_retried_on_the_next_tick() {
    common::logging::setup_logger(LevelFilter::Trace);
    let validators = keypairs(4);
    let me = &validators[0];
    let initial = view_update(View::new(1), &genesis_qc(), &validators[1]);
    let mut node = test_node(me, &validators, initial.clone());
    node.vertex_store.record().parent_missing = true;

    node.pacemaker
        .process_local_timeout(ScheduledLocalTimeout::new(initial.clone(), Duration::ZERO));

    // insertion failed recoverably: no vote, no panic, one attempt made
    assert_eq!(node.vertex_store.record().insert_attempts.len(), 1);
    assert!(node.dispatch.record().votes.is_empty());

    // the store catches up; the next timeout tick re-inserts the vertex
    node.vertex_store.record().parent_missing = false;
    node.pacemaker
        .process_local_timeout(ScheduledLocalTimeout::new(initial.clone(), Duration::ZERO));

    let store = node.vertex_store.record();
    assert_eq!(store.insert_attempts.len(), 2);
    assert_eq!(store.inserted.len(), 1);
    assert_eq!(store.inserted[0], expected_timeout_vertex(&initial));
}

#[test]
fn stale_timeouts_are_ignored() {
    let validators = keypairs(4);
    let initial = view_update(View::new(2), &genesis_qc(), &validators[1]);
    let mut node = test_node(&validators[0], &validators, initial);

    let superseded = view_update(View::new(1), &genesis_qc(), &validators[1]);
    node.pacemaker
        .process_local_timeout(ScheduledLocalTimeout::new(superseded, Duration::ZERO));

    let record = node.dispatch.record();
    assert!(record.votes.is_empty());
    assert!(record.timeout_occurrences.is_empty());
    assert!(record.scheduled_timeouts.is_empty());
    assert_eq!(node.pacemaker.timed_out_views(), 0);
}

#[test]
fn every_processed_timeout_is_rescheduled_with_backoff() {
    let validators = keypairs(4);
    let me = &validators[0];
    let initial = view_update(View::new(1), &genesis_qc(), &validators[1]);
    let mut node = test_node(me, &validators, initial.clone());

    node.pacemaker
        .process_local_timeout(ScheduledLocalTimeout::new(initial, Duration::ZERO));

    let (first_retry, first_delay) = {
        let record = node.dispatch.record();
        assert_eq!(record.timeout_occurrences.len(), 1);
        assert_eq!(record.timeout_occurrences[0].view(), View::new(1));
        assert_eq!(record.scheduled_timeouts.len(), 1);
        let (scheduled, delay) = &record.scheduled_timeouts[0];
        (scheduled.clone(), *delay)
    };
    // one uncommitted view at backoff rate 2.0 on a 100ms base
    assert_eq!(first_delay, Duration::from_millis(200));
    assert_eq!(first_retry.count(), 1);

    // the rescheduled timeout fires too; it is a repeat, not a newly timed-out view
    node.pacemaker.process_local_timeout(first_retry);
    assert_eq!(node.pacemaker.timed_out_views(), 1);
    assert_eq!(node.pacemaker.timeout_votes_sent(), 2);
    assert_eq!(node.dispatch.record().scheduled_timeouts.len(), 2);
    assert_eq!(node.dispatch.record().scheduled_timeouts[1].0.count(), 2);
}
