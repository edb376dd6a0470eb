/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Definitions of types specific to the [`Pacemaker`](crate::pacemaker::protocol::Pacemaker):
//! the view-update and timeout bookkeeping types, the canonical [`VoteTimeout`] content that
//! timeout signatures cover, and the exponential timeout backoff.

use borsh::{BorshDeserialize, BorshSerialize};
use sha2::Digest;
use std::time::Duration;
use typed_builder::TypedBuilder;

use crate::environment::TimeoutCalculator;
use crate::messages::Vote;
use crate::types::{
    basic::{CryptoHash, CryptoHasher, Epoch, ValidatorId, View},
    certificates::HighQC,
};

/// The pacemaker's authoritative description of the current view: its number, its leader, and
/// the most advanced certificates justifying entry into it. Produced by the embedding node's
/// view-update logic; the pacemaker adopts updates in strictly increasing view order and
/// silently drops the rest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewUpdate {
    pub current_view: View,
    pub high_qc: HighQC,
    pub leader: ValidatorId,
}

impl ViewUpdate {
    pub fn new(current_view: View, high_qc: HighQC, leader: ValidatorId) -> Self {
        Self {
            current_view,
            high_qc,
            leader,
        }
    }

    /// How many views have passed since the last commit this node knows of. Input to the
    /// timeout backoff.
    pub fn uncommitted_views_count(&self) -> u64 {
        self.current_view
            .int()
            .saturating_sub(self.high_qc.highest_committed_qc.view().int())
    }
}

/// A local timeout in flight: the view update it was scheduled under, the delay it was
/// scheduled with, and how many times it has fired in this view. Timeouts are never cancelled;
/// a timeout whose view no longer matches the current view is ignored when it fires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduledLocalTimeout {
    view_update: ViewUpdate,
    delay: Duration,
    count: u32,
}

impl ScheduledLocalTimeout {
    pub fn new(view_update: ViewUpdate, delay: Duration) -> Self {
        Self {
            view_update,
            delay,
            count: 0,
        }
    }

    /// The follow-up timeout scheduled after this one fired, with the retry count bumped.
    pub fn next_retry(&self, delay: Duration) -> ScheduledLocalTimeout {
        ScheduledLocalTimeout {
            view_update: self.view_update.clone(),
            delay,
            count: self.count + 1,
        }
    }

    pub fn view(&self) -> View {
        self.view_update.current_view
    }

    pub fn view_update(&self) -> &ViewUpdate {
        &self.view_update
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Notification to local listeners that a view has timed out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalTimeoutOccurrence {
    scheduled: ScheduledLocalTimeout,
}

impl LocalTimeoutOccurrence {
    pub fn new(scheduled: ScheduledLocalTimeout) -> Self {
        Self { scheduled }
    }

    pub fn view(&self) -> View {
        self.scheduled.view()
    }

    pub fn leader(&self) -> ValidatorId {
        self.scheduled.view_update().leader
    }

    pub fn scheduled(&self) -> &ScheduledLocalTimeout {
        &self.scheduled
    }
}

/// The canonical content a timeout signature covers: the timed-out view and its epoch.
/// Deterministic Borsh encoding of this pair is what makes timeout signatures from different
/// validators aggregatable into one [`TimeoutCertificate`](crate::types::certificates::TimeoutCertificate).
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct VoteTimeout {
    pub view: View,
    pub epoch: Epoch,
}

impl VoteTimeout {
    pub fn new(view: View, epoch: Epoch) -> Self {
        Self { view, epoch }
    }

    pub fn of(vote: &Vote) -> VoteTimeout {
        VoteTimeout::new(vote.view(), vote.epoch())
    }

    pub fn hash(&self) -> CryptoHash {
        let mut hasher = CryptoHasher::new();
        hasher.update(self.try_to_vec().unwrap());
        CryptoHash::new(hasher.finalize().into())
    }
}

/// Parameters of the exponential timeout backoff.
#[derive(Clone, Debug, TypedBuilder)]
pub struct PacemakerConfiguration {
    /// Timeout of a view that follows directly on a commit.
    pub base_timeout: Duration,
    /// Growth factor per consecutive uncommitted view. Must be greater than 1.0.
    pub rate: f64,
    /// Number of uncommitted views after which the timeout stops growing.
    pub max_exponent: u32,
}

/// `timeout(u) = base_timeout * rate ^ min(u, max_exponent)`, where `u` is the number of
/// consecutive uncommitted views. Non-decreasing in `u`, which is what preserves liveness
/// under eventual synchrony: slow views earn the network progressively more time to converge,
/// up to a cap.
#[derive(Clone, Debug)]
pub struct ExponentialTimeoutCalculator {
    base_timeout: Duration,
    rate: f64,
    max_exponent: u32,
}

impl ExponentialTimeoutCalculator {
    /// # Panics
    /// Panics if `base_timeout` is zero, `rate` is not greater than 1.0, or the maximum
    /// timeout `base_timeout * rate ^ max_exponent` would overflow a `u64` of milliseconds.
    pub fn new(configuration: PacemakerConfiguration) -> Self {
        assert!(
            !configuration.base_timeout.is_zero(),
            "base_timeout must be greater than zero"
        );
        assert!(
            configuration.rate > 1.0,
            "rate must be greater than 1.0, but was {}",
            configuration.rate
        );
        let max_timeout = configuration.base_timeout.as_millis() as f64
            * configuration.rate.powi(configuration.max_exponent as i32);
        assert!(
            max_timeout <= u64::MAX as f64,
            "maximum timeout of {} ms is too large",
            max_timeout
        );

        Self {
            base_timeout: configuration.base_timeout,
            rate: configuration.rate,
            max_exponent: configuration.max_exponent,
        }
    }
}

impl TimeoutCalculator for ExponentialTimeoutCalculator {
    fn timeout(&self, uncommitted_views: u64) -> Duration {
        let exponent = uncommitted_views.min(self.max_exponent as u64) as i32;
        let millis = (self.base_timeout.as_millis() as f64 * self.rate.powi(exponent)) as u64;
        Duration::from_millis(millis)
    }
}
