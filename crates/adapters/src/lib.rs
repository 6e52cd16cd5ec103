// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lsf-adapters: the file-discovery and file-tailing side of the
//! pipeline — Prospector and Harvester.

pub mod harvester;
pub mod prospector;

pub use harvester::{Classification, Harvester};
pub use prospector::Prospector;
