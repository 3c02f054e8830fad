// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pursuemail - Secure Bulk Mail Dispatch Service
//!
//! Keeps a registry of recipient accounts and their OpenPGP public keys, and
//! sends messages to them over SMTP. Every message to a recipient with a key
//! on file is signed by the sender and encrypted for the recipient.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `dispatch` - Single and bulk fan-out with per-recipient encryption
//! - `mail` - Outbound SMTP transport (lettre)
//! - `pgp` - Keyring lookup, key import, sign-and-encrypt (Sequoia)
//! - `storage` - Account persistence (redb)

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod mail;
pub mod models;
pub mod pgp;
pub mod state;
pub mod storage;
