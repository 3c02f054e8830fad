// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent account records live in a single embedded redb database under
//! the data directory. Key material is not stored here; it lives in the
//! keyring files owned by [`crate::pgp::KeyStore`].
//!
//! ## Storage Layout
//!
//! ```text
//! {DATA_DIR}/
//!   accounts.redb   # accounts + email index
//! ```

pub mod database;
pub mod paths;
pub mod repository;

pub use database::{AccountDatabase, AccountDbError, AccountDbResult};
pub use paths::StoragePaths;
pub use repository::{
    normalize_email, AccountError, AccountRepository, AccountResult, StoredAccount,
};
