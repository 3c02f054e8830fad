// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the account database.

pub mod accounts;

pub use accounts::{
    normalize_email, AccountError, AccountRepository, AccountResult, StoredAccount,
};
