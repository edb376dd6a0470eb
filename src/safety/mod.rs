/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The safety side of the protocol: the durable [`SafetyState`](state::SafetyState) record and
//! the [`SafetyRules`](rules::SafetyRules) gatekeeper that is the single authority on whether
//! a vote or proposal may be produced, and on whether an externally received certificate may
//! be trusted.

pub mod state;

pub mod rules;
