/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The liveness side of the protocol: the [`Pacemaker`](protocol::Pacemaker) that drives the
//! node through views, and the pacemaker-local types in [`types`].

pub mod types;

pub mod protocol;
