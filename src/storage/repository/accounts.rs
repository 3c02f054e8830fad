// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account repository over the embedded database and the key store.
//!
//! Creation is all-or-nothing from the database's point of view: the write
//! transaction is opened first, the key import runs while it is held, and the
//! record is committed only after the import outcome is known. A key that was
//! imported for a failed creation stays in the keyring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::pgp::{KeyStore, PgpError};

use super::super::database::{AccountDatabase, AccountDbError};

/// Account record as persisted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct StoredAccount {
    /// Unique account identifier (UUID)
    pub id: String,
    /// Recipient address
    pub email: String,
    /// Whether a public key for `email` was resolvable when last checked
    pub has_public_key: bool,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("account not found: {0}")]
    NotFound(String),

    #[error("an account already exists for {0}")]
    Duplicate(String),

    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    #[error("public key import failed: {0}")]
    KeyImport(#[source] PgpError),

    #[error("account store unavailable: {0}")]
    Store(#[source] AccountDbError),
}

impl From<AccountDbError> for AccountError {
    fn from(err: AccountDbError) -> Self {
        match err {
            AccountDbError::NotFound(what) => AccountError::NotFound(what),
            AccountDbError::Duplicate(what) => AccountError::Duplicate(what),
            other => AccountError::Store(other),
        }
    }
}

pub type AccountResult<T> = Result<T, AccountError>;

/// Trim and validate an address.
pub fn normalize_email(raw: &str) -> AccountResult<String> {
    let email = raw.trim();
    email
        .parse::<lettre::Address>()
        .map_err(|e| AccountError::InvalidEmail(format!("{email:?}: {e}")))?;
    Ok(email.to_string())
}

/// Repository for account operations.
pub struct AccountRepository<'a> {
    db: &'a AccountDatabase,
    keys: &'a KeyStore,
}

impl<'a> AccountRepository<'a> {
    pub fn new(db: &'a AccountDatabase, keys: &'a KeyStore) -> Self {
        Self { db, keys }
    }

    /// Register `email`, importing `public_key` first when supplied.
    ///
    /// With a key payload the flag is true only if the import succeeded and
    /// the key now resolves for `email`. Without one the flag reflects
    /// whatever the public keyring already holds.
    pub fn create(&self, email: &str, public_key: Option<&[u8]>) -> AccountResult<StoredAccount> {
        let email = normalize_email(email)?;
        let insert = self.db.begin_insert(&email)?;

        if let Some(armored) = public_key {
            if let Err(e) = self.keys.import_public_key(armored) {
                tracing::warn!(email = %email, error = %e, "Rolling back account creation");
                if let Err(abort_err) = insert.abort() {
                    tracing::error!(error = %abort_err, "Failed to abort account transaction");
                }
                return Err(AccountError::KeyImport(e));
            }
        }
        let has_public_key = self.keys.has_public_key(&email);
        if public_key.is_some() && !has_public_key {
            tracing::warn!(
                email = %email,
                "Imported key does not resolve for the account address"
            );
        }

        let account = insert.commit(has_public_key)?;
        tracing::info!(
            account_id = %account.id,
            email = %account.email,
            has_public_key = account.has_public_key,
            "Account created"
        );
        Ok(account)
    }

    /// Get an account by ID.
    pub fn get(&self, id: &str) -> AccountResult<StoredAccount> {
        let account = self
            .db
            .get(id)?
            .ok_or_else(|| AccountError::NotFound(format!("Account {id}")))?;
        Ok(self.refresh(account))
    }

    /// Get every account whose id is in `ids`, skipping unknown ids.
    pub fn get_many(&self, ids: &[String]) -> AccountResult<Vec<StoredAccount>> {
        let accounts = self.db.get_many(ids)?;
        Ok(accounts.into_iter().map(|a| self.refresh(a)).collect())
    }

    /// Pick up keys imported after the account was created.
    fn refresh(&self, mut account: StoredAccount) -> StoredAccount {
        if account.has_public_key || !self.keys.has_public_key(&account.email) {
            return account;
        }

        account.has_public_key = true;
        match self.db.set_has_public_key(&account.id, true) {
            Ok(()) => tracing::info!(account_id = %account.id, "Public key now on file"),
            Err(e) => tracing::warn!(
                account_id = %account.id,
                error = %e,
                "Failed to persist refreshed key flag"
            ),
        }
        account
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pgp::testing::{self, KeyFixture, RejectingImporter};
    use crate::pgp::{GpgImporter, RingKind};

    struct Harness {
        db: AccountDatabase,
        keys: Arc<KeyStore>,
        _fixture: KeyFixture,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let fixture = KeyFixture::new();
            fixture.write_public_ring(&[]);
            Self::with_keys(fixture.store(), fixture)
        }

        fn with_keys(keys: Arc<KeyStore>, fixture: KeyFixture) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let db = AccountDatabase::open(&dir.path().join("accounts.redb")).unwrap();
            Self {
                db,
                keys,
                _fixture: fixture,
                _dir: dir,
            }
        }

        fn repo(&self) -> AccountRepository<'_> {
            AccountRepository::new(&self.db, &self.keys)
        }
    }

    #[test]
    fn create_without_key() {
        let h = Harness::new();
        let account = h.repo().create(" plain@example.com ", None).unwrap();

        assert_eq!(account.email, "plain@example.com");
        assert!(!account.has_public_key);
        assert_eq!(h.repo().get(&account.id).unwrap(), account);
    }

    #[test]
    fn create_with_key_sets_flag() {
        let h = Harness::new();
        let frank = testing::generate("Frank <frank@example.com>");

        let account = h
            .repo()
            .create("frank@example.com", Some(testing::armored_public(&frank).as_slice()))
            .unwrap();

        assert!(account.has_public_key);
        assert!(h.keys.has_public_key("frank@example.com"));
    }

    #[test]
    fn create_with_key_through_gpg_sets_flag() {
        let gpg_present = std::process::Command::new("gpg")
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success());
        if !gpg_present {
            eprintln!("gpg not installed; skipping");
            return;
        }

        let fixture = KeyFixture::new();
        let paths = fixture.paths();
        let importer = GpgImporter::new("gpg", paths.dir(), paths.ring(RingKind::Public));
        let keys = fixture.store_with(Arc::new(importer));
        let h = Harness::with_keys(keys, fixture);
        let frank = testing::generate("Frank <frank@example.com>");

        let account = h
            .repo()
            .create("frank@example.com", Some(testing::armored_public(&frank).as_slice()))
            .unwrap();

        assert!(account.has_public_key);
        assert!(h.repo().get(&account.id).unwrap().has_public_key);
    }

    #[test]
    fn key_for_other_address_leaves_flag_false() {
        let h = Harness::new();
        let frank = testing::generate("Frank <frank@example.com>");

        let account = h
            .repo()
            .create("gina@example.com", Some(testing::armored_public(&frank).as_slice()))
            .unwrap();

        assert!(!account.has_public_key);
    }

    #[test]
    fn malformed_key_persists_nothing() {
        let h = Harness::new();
        let result = h
            .repo()
            .create("x@example.com", Some(b"definitely not a key".as_slice()));

        assert!(matches!(
            result,
            Err(AccountError::KeyImport(PgpError::ImportFailed(_)))
        ));
        assert_eq!(h.db.count().unwrap(), 0);
        // The address can still be registered afterwards.
        h.repo().create("x@example.com", None).unwrap();
    }

    #[test]
    fn failing_importer_persists_nothing() {
        let fixture = KeyFixture::new();
        let keys = fixture.store_with(Arc::new(RejectingImporter));
        let h = Harness::with_keys(keys, fixture);

        let result = h.repo().create("x@example.com", Some(b"key".as_slice()));

        assert!(matches!(result, Err(AccountError::KeyImport(_))));
        assert_eq!(h.db.count().unwrap(), 0);
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let h = Harness::new();
        h.repo().create("dup@example.com", None).unwrap();

        let result = h.repo().create("dup@example.com", None);
        assert!(matches!(result, Err(AccountError::Duplicate(_))));
    }

    #[test]
    fn invalid_email_is_rejected() {
        let h = Harness::new();
        let result = h.repo().create("not-an-address", None);

        assert!(matches!(result, Err(AccountError::InvalidEmail(_))));
        assert_eq!(h.db.count().unwrap(), 0);
    }

    #[test]
    fn get_unknown_is_not_found() {
        let h = Harness::new();
        assert!(matches!(
            h.repo().get("00000000-0000-0000-0000-000000000000"),
            Err(AccountError::NotFound(_))
        ));
    }

    #[test]
    fn get_many_omits_unknown_ids() {
        let h = Harness::new();
        let a = h.repo().create("a@example.com", None).unwrap();
        let b = h.repo().create("b@example.com", None).unwrap();

        let ids = vec![a.id.clone(), "nope".to_string(), b.id.clone()];
        let found = h.repo().get_many(&ids).unwrap();

        assert_eq!(found, vec![a, b]);
    }

    #[test]
    fn later_import_refreshes_flag() {
        let h = Harness::new();
        let account = h.repo().create("late@example.com", None).unwrap();
        assert!(!account.has_public_key);

        let late = testing::generate("Late <late@example.com>");
        h.keys
            .import_public_key(&testing::armored_public(&late))
            .unwrap();

        assert!(h.repo().get(&account.id).unwrap().has_public_key);
        // Persisted, not just recomputed.
        assert!(h.db.get(&account.id).unwrap().unwrap().has_public_key);
    }
}
