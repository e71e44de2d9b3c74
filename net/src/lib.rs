// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Value types shared by the representor plug provider.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

pub mod eth;
pub mod interface;
