/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The durable safety record and the store it is committed to.
//!
//! [`SafetyState`] is the small piece of state that must survive a crash for the node to stay
//! safe: the view below which it refuses conflicting proposals (the lock), and the last vote
//! it cast. The state is a value -- transitions return a new `SafetyState` rather than
//! mutating in place -- and [`SafetyRules`](crate::safety::rules::SafetyRules) commits it to
//! the [`PersistentSafetyStore`] before any vote leaves the node. A restarted node reloaded
//! from the store can therefore never vote twice in one view with different contents.
//!
//! Invariants maintained across transitions:
//! 1. [`last_voted_view`](SafetyState::last_voted_view) strictly increases across successive
//!    accepted votes.
//! 2. [`locked_view`](SafetyState::locked_view) is monotonically non-decreasing.

use borsh::{BorshDeserialize, BorshSerialize};

use crate::messages::Vote;
use crate::types::basic::View;

/// The durable safety record: the locked view and the last vote cast. The last voted view is
/// derived from the last vote.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct SafetyState {
    locked_view: View,
    last_vote: Option<Vote>,
}

impl SafetyState {
    pub fn new(locked_view: View, last_vote: Option<Vote>) -> Self {
        Self {
            locked_view,
            last_vote,
        }
    }

    /// The state of a node that has never voted: locked at genesis, no last vote.
    pub fn initial() -> Self {
        Self::new(View::genesis(), None)
    }

    pub fn locked_view(&self) -> View {
        self.locked_view
    }

    /// The view of the last vote cast, or the genesis view if the node has never voted.
    pub fn last_voted_view(&self) -> View {
        self.last_vote
            .as_ref()
            .map(Vote::view)
            .unwrap_or_else(View::genesis)
    }

    pub fn last_vote(&self) -> Option<&Vote> {
        self.last_vote.as_ref()
    }

    /// The state with the lock advanced to `locked_view`.
    pub fn with_locked_view(&self, locked_view: View) -> SafetyState {
        SafetyState {
            locked_view,
            last_vote: self.last_vote.clone(),
        }
    }

    /// The state with `last_vote` recorded as the most recent vote.
    pub fn with_last_vote(&self, last_vote: Vote) -> SafetyState {
        SafetyState {
            locked_view: self.locked_view,
            last_vote: Some(last_vote),
        }
    }
}

/// Durable storage for the [`SafetyState`].
pub trait PersistentSafetyStore {
    /// Commit `state` to durable storage. Implementations must not return until the record is
    /// crash-safe: the safety rules release a vote only after this call returns. A store that
    /// cannot commit indicates a broken node, not a protocol condition.
    fn commit_state(&mut self, state: &SafetyState);
}
