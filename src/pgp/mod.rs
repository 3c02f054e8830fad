// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # OpenPGP Key Store and Encryption Pipeline
//!
//! Keys live in two keyring files (public and private) inside the configured
//! GnuPG directory. The [`KeyStore`] reads them on demand, resolves an entity
//! by email (or display name as a fallback) and caches every resolved entity
//! for the lifetime of the process.
//!
//! ## Layout
//!
//! ```text
//! $GPG_DIR/
//!   pubring.gpg   # recipients' public keys (import target)
//!   secring.gpg   # sender identities' secret keys
//! ```
//!
//! ## Cache semantics
//!
//! Entries are never invalidated. A key re-imported for an identity that was
//! already resolved is not picked up until the process restarts. Identities
//! that failed to resolve are not cached, so a first-time import is seen on
//! the next lookup.

pub mod decrypt;
pub mod encrypt;
pub mod import;
pub mod keystore;

#[cfg(test)]
pub(crate) mod testing;

pub use decrypt::decrypt_verified;
pub use encrypt::MessageEncryptor;
pub use import::{GpgImporter, KeyImporter, NativeImporter};
pub use keystore::{
    KeyStore, KeyringPaths, RingKind, DEFAULT_PRIVATE_KEYRING, DEFAULT_PUBLIC_KEYRING,
};

use std::path::PathBuf;

/// Errors raised by key resolution, import and the encryption pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PgpError {
    #[error("no {kind} key found for {identity}")]
    KeyNotFound { identity: String, kind: RingKind },

    #[error("cannot read {kind} keyring {}: {reason}", path.display())]
    KeyringUnreadable {
        path: PathBuf,
        kind: RingKind,
        reason: String,
    },

    #[error("public key import failed: {0}")]
    ImportFailed(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
}

pub type PgpResult<T> = Result<T, PgpError>;
