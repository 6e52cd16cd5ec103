// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! lsf-storage: atomic persistence of the Registrar's Registry.
//!
//! The registry file is the agent's only durable output. It is never
//! written in place: every save goes to a temp file that is then renamed
//! over the target, so a crash mid-write can never leave a torn file
//! behind (see [`RegistryStore::save`]).

pub mod registry_store;

pub use registry_store::{RegistryStore, StorageError};
