/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Types and traits that are used across multiple sub-protocols or components of the consensus
//! core.
//!
//! Types specific to single components can be found in the "types" submodules of their
//! components, e.g., [`crate::pacemaker::types`].

pub mod basic;

pub mod keypair;

pub mod certificates;

pub mod validators;

pub mod vertex;
