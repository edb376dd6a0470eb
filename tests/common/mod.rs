//! In-memory collaborator implementations and chain-building helpers shared by the test
//! suites. The stubs record everything the consensus core hands them behind `Arc<Mutex<..>>`
//! handles, so tests keep a cloned handle and inspect it after driving the core.

#![allow(dead_code)]

pub(crate) mod logging;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand_core::OsRng;

use chained_bft::environment::{Dispatch, NextTxnsGenerator, TimeSource};
use chained_bft::messages::{Proposal, Vote};
use chained_bft::pacemaker::protocol::Pacemaker;
use chained_bft::pacemaker::types::{
    ExponentialTimeoutCalculator, LocalTimeoutOccurrence, PacemakerConfiguration,
    ScheduledLocalTimeout, ViewUpdate, VoteTimeout,
};
use chained_bft::safety::rules::SafetyRules;
use chained_bft::safety::state::{PersistentSafetyStore, SafetyState};
use chained_bft::types::basic::{CryptoHash, Epoch, Timestamp, Txn, View};
use chained_bft::types::certificates::{
    HighQC, QuorumCertificate, TimeoutCertificate, TimestampedSignature, TimestampedSignatures,
    VoteData,
};
use chained_bft::types::keypair::Keypair;
use chained_bft::types::validators::{SigningKey, ValidationState, ValidatorSet};
use chained_bft::types::vertex::{Header, LedgerHeader, VerifiedVertex, Vertex};
use chained_bft::vertex_store::{
    BFTInsertUpdate, InsertVertexError, PreparedVertex, VertexStore,
};

pub(crate) fn keypairs(n: usize) -> Vec<Keypair> {
    let mut csprg = OsRng {};
    (0..n)
        .map(|_| Keypair::new(SigningKey::generate(&mut csprg)))
        .collect()
}

pub(crate) fn validator_set(keypairs: &[Keypair]) -> ValidatorSet {
    ValidatorSet::new(keypairs.iter().map(|keypair| keypair.public()))
}

pub(crate) fn ledger_header() -> LedgerHeader {
    LedgerHeader::new(Epoch::new(1), false)
}

pub(crate) fn genesis_header() -> Header {
    Header::new(View::genesis(), CryptoHash::new([0u8; 32]), ledger_header())
}

pub(crate) fn genesis_qc() -> QuorumCertificate {
    QuorumCertificate::genesis(genesis_header())
}

pub(crate) fn header_for(vertex: &VerifiedVertex) -> Header {
    Header::new(vertex.view(), vertex.id(), ledger_header())
}

/// A vertex at `view` extending the vertex certified by `parent_qc`.
pub(crate) fn vertex_extending(
    parent_qc: QuorumCertificate,
    view: View,
    author: &Keypair,
) -> VerifiedVertex {
    VerifiedVertex::new(Vertex::new(parent_qc, view, Vec::new(), author.id()))
}

/// A quorum certificate over `vote_data`, with each signer covering its own timestamped
/// digest -- the same structure `SafetyRules` verifies.
pub(crate) fn make_qc(signers: &[Keypair], vote_data: &VoteData) -> QuorumCertificate {
    let mut signatures = BTreeMap::new();
    for (i, keypair) in signers.iter().enumerate() {
        let timestamp = Timestamp::new(1_000 + i as u64);
        let signature = keypair.sign(&vote_data.hash_with_timestamp(timestamp));
        signatures.insert(
            keypair.id(),
            TimestampedSignature::new(timestamp, signature),
        );
    }
    QuorumCertificate::new(vote_data.clone(), TimestampedSignatures::new(signatures))
}

/// A quorum certificate certifying `vertex`, as a quorum of `signers` would have produced
/// after voting for it.
pub(crate) fn qc_certifying(vertex: &VerifiedVertex, signers: &[Keypair]) -> QuorumCertificate {
    let vote_data = VoteData::new(
        header_for(vertex),
        vertex.parent_header().clone(),
        None,
    );
    make_qc(signers, &vote_data)
}

/// A timeout certificate for `(view, epoch)`, assembled through a `ValidationState` the way a
/// next leader aggregates incoming timeout votes.
pub(crate) fn make_tc(
    signers: &[Keypair],
    all_validators: &[Keypair],
    view: View,
    epoch: Epoch,
) -> TimeoutCertificate {
    let timeout_digest = VoteTimeout::new(view, epoch).hash();
    let mut validation_state =
        ValidationState::new(timeout_digest, validator_set(all_validators));
    for (i, keypair) in signers.iter().enumerate() {
        validation_state.add_signature(
            keypair.id(),
            Timestamp::new(2_000 + i as u64),
            keypair.sign(&timeout_digest),
        );
    }
    TimeoutCertificate::new(epoch, view, validation_state.signatures())
}

pub(crate) fn high_qc(highest_qc: &QuorumCertificate) -> HighQC {
    HighQC::new(highest_qc.clone(), genesis_qc(), None)
}

pub(crate) fn view_update(
    view: View,
    highest_qc: &QuorumCertificate,
    leader: &Keypair,
) -> ViewUpdate {
    ViewUpdate::new(view, high_qc(highest_qc), leader.id())
}

// ------------------------------------------------------------------------------------------
// Recording collaborator stubs.
// ------------------------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct DispatchRecord {
    pub proposals: Vec<Proposal>,
    pub votes: Vec<Vote>,
    pub scheduled_timeouts: Vec<(ScheduledLocalTimeout, Duration)>,
    pub timeout_occurrences: Vec<LocalTimeoutOccurrence>,
}

#[derive(Clone, Default)]
pub(crate) struct SharedDispatch(Arc<Mutex<DispatchRecord>>);

impl SharedDispatch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self) -> MutexGuard<'_, DispatchRecord> {
        self.0.lock().unwrap()
    }
}

impl Dispatch for SharedDispatch {
    fn dispatch_proposal(&mut self, _targets: &ValidatorSet, proposal: Proposal) {
        self.0.lock().unwrap().proposals.push(proposal);
    }

    fn dispatch_vote(&mut self, _targets: &ValidatorSet, vote: Vote) {
        self.0.lock().unwrap().votes.push(vote);
    }

    fn schedule_local_timeout(&mut self, timeout: ScheduledLocalTimeout, delay: Duration) {
        self.0
            .lock()
            .unwrap()
            .scheduled_timeouts
            .push((timeout, delay));
    }

    fn notify_timeout_occurrence(&mut self, occurrence: LocalTimeoutOccurrence) {
        self.0.lock().unwrap().timeout_occurrences.push(occurrence);
    }
}

#[derive(Default)]
pub(crate) struct VertexStoreRecord {
    pub prepared: HashMap<CryptoHash, PreparedVertex>,
    pub inserted: Vec<VerifiedVertex>,
    pub insert_attempts: Vec<CryptoHash>,
    /// When set, insertions fail as if the vertex's parent were unknown.
    pub parent_missing: bool,
    /// Canned answer for `path_from_root`.
    pub path: Vec<PreparedVertex>,
}

#[derive(Clone, Default)]
pub(crate) struct SharedVertexStore(Arc<Mutex<VertexStoreRecord>>);

impl SharedVertexStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self) -> MutexGuard<'_, VertexStoreRecord> {
        self.0.lock().unwrap()
    }
}

impl VertexStore for SharedVertexStore {
    fn insert_vertex(&mut self, vertex: VerifiedVertex) -> Result<(), InsertVertexError> {
        let mut record = self.0.lock().unwrap();
        record.insert_attempts.push(vertex.id());
        if record.parent_missing {
            return Err(InsertVertexError::MissingParent(
                vertex.parent_header().vertex_id,
            ));
        }
        record.inserted.push(vertex);
        Ok(())
    }

    fn get_prepared_vertex(&self, id: &CryptoHash) -> Option<PreparedVertex> {
        self.0.lock().unwrap().prepared.get(id).cloned()
    }

    fn path_from_root(&self, _id: &CryptoHash) -> Vec<PreparedVertex> {
        self.0.lock().unwrap().path.clone()
    }
}

#[derive(Default)]
pub(crate) struct TxnSourceRecord {
    pub next: Vec<Txn>,
    pub requests: Vec<(View, usize)>,
}

#[derive(Clone, Default)]
pub(crate) struct SharedTxnSource(Arc<Mutex<TxnSourceRecord>>);

impl SharedTxnSource {
    pub(crate) fn serving(next: Vec<Txn>) -> Self {
        let source = Self::default();
        source.0.lock().unwrap().next = next;
        source
    }

    pub(crate) fn record(&self) -> MutexGuard<'_, TxnSourceRecord> {
        self.0.lock().unwrap()
    }
}

impl NextTxnsGenerator for SharedTxnSource {
    fn generate_next_txns(&mut self, view: View, prepared_ancestors: &[PreparedVertex]) -> Vec<Txn> {
        let mut record = self.0.lock().unwrap();
        record.requests.push((view, prepared_ancestors.len()));
        record.next.clone()
    }
}

pub(crate) struct FixedTimeSource(pub Timestamp);

impl TimeSource for FixedTimeSource {
    fn current_time(&self) -> Timestamp {
        self.0
    }
}

#[derive(Clone, Default)]
pub(crate) struct SharedSafetyStore(Arc<Mutex<Vec<SafetyState>>>);

impl SharedSafetyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn committed(&self) -> Vec<SafetyState> {
        self.0.lock().unwrap().clone()
    }
}

impl PersistentSafetyStore for SharedSafetyStore {
    fn commit_state(&mut self, state: &SafetyState) {
        self.0.lock().unwrap().push(state.clone());
    }
}

// ------------------------------------------------------------------------------------------
// Assembled test node.
// ------------------------------------------------------------------------------------------

pub(crate) type TestPacemaker = Pacemaker<
    SharedVertexStore,
    SharedTxnSource,
    SharedDispatch,
    FixedTimeSource,
    ExponentialTimeoutCalculator,
    SharedSafetyStore,
>;

pub(crate) struct TestNode {
    pub pacemaker: TestPacemaker,
    pub dispatch: SharedDispatch,
    pub vertex_store: SharedVertexStore,
    pub txn_source: SharedTxnSource,
    pub safety_store: SharedSafetyStore,
}

pub(crate) fn test_node(
    me: &Keypair,
    validators: &[Keypair],
    initial_view_update: ViewUpdate,
) -> TestNode {
    let dispatch = SharedDispatch::new();
    let vertex_store = SharedVertexStore::new();
    let txn_source = SharedTxnSource::default();
    let safety_store = SharedSafetyStore::new();

    let safety_rules = SafetyRules::new(
        me.clone(),
        validator_set(validators),
        SafetyState::initial(),
        safety_store.clone(),
    );
    let timeout_calculator = ExponentialTimeoutCalculator::new(
        PacemakerConfiguration::builder()
            .base_timeout(Duration::from_millis(100))
            .rate(2.0)
            .max_exponent(6)
            .build(),
    );
    let pacemaker = Pacemaker::new(
        validator_set(validators),
        vertex_store.clone(),
        safety_rules,
        txn_source.clone(),
        dispatch.clone(),
        FixedTimeSource(Timestamp::new(1_700_000_000_000)),
        timeout_calculator,
        initial_view_update,
    );

    TestNode {
        pacemaker,
        dispatch,
        vertex_store,
        txn_source,
        safety_store,
    }
}

/// The empty fallback vertex the pacemaker builds when `view` times out under
/// `view_update` -- recomputed independently so tests can predict its id.
pub(crate) fn expected_timeout_vertex(view_update: &ViewUpdate) -> VerifiedVertex {
    VerifiedVertex::new(Vertex::new_timeout(
        view_update.high_qc.highest_qc.clone(),
        view_update.current_view,
        view_update.leader,
    ))
}

pub(crate) fn prepared(vertex: VerifiedVertex) -> PreparedVertex {
    PreparedVertex::new(vertex, ledger_header())
}

pub(crate) fn insert_update(vertex: VerifiedVertex) -> BFTInsertUpdate {
    BFTInsertUpdate::new(prepared(vertex))
}
