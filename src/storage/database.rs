// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded account database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `accounts`: account id → serialized StoredAccount
//! - `account_email_index`: email → account id (one account per address)

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use uuid::Uuid;

use super::repository::accounts::StoredAccount;

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: account id → serialized StoredAccount (JSON bytes).
const ACCOUNTS: TableDefinition<&str, &[u8]> = TableDefinition::new("accounts");

/// Unique index: email address → account id.
const ACCOUNT_EMAIL_INDEX: TableDefinition<&str, &str> =
    TableDefinition::new("account_email_index");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AccountDbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Duplicate(String),
}

pub type AccountDbResult<T> = Result<T, AccountDbError>;

// =============================================================================
// AccountDatabase
// =============================================================================

/// Embedded ACID account database.
pub struct AccountDatabase {
    db: Database,
}

impl AccountDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> AccountDbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ACCOUNTS)?;
            let _ = write_txn.open_table(ACCOUNT_EMAIL_INDEX)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Start inserting an account for `email`.
    ///
    /// The returned [`AccountInsert`] holds the write transaction open: no
    /// record is visible until [`AccountInsert::commit`], and dropping it
    /// (or calling [`AccountInsert::abort`]) leaves the store untouched.
    pub fn begin_insert(&self, email: &str) -> AccountDbResult<AccountInsert> {
        let txn = self.db.begin_write()?;
        let taken = {
            let index = txn.open_table(ACCOUNT_EMAIL_INDEX)?;
            let existing = index.get(email)?.is_some();
            existing
        };
        if taken {
            txn.abort()?;
            return Err(AccountDbError::Duplicate(format!("Account for {email}")));
        }

        Ok(AccountInsert {
            txn,
            email: email.to_string(),
        })
    }

    /// Look up a single account by id.
    pub fn get(&self, id: &str) -> AccountDbResult<Option<StoredAccount>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS)?;
        match table.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Look up many accounts in one read transaction.
    ///
    /// Duplicate ids are collapsed and unknown ids are skipped; results keep
    /// the order of first appearance in `ids`.
    pub fn get_many(&self, ids: &[String]) -> AccountDbResult<Vec<StoredAccount>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS)?;

        let mut seen = HashSet::with_capacity(ids.len());
        let mut accounts = Vec::with_capacity(ids.len());
        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            if let Some(value) = table.get(id.as_str())? {
                accounts.push(serde_json::from_slice(value.value())?);
            }
        }
        Ok(accounts)
    }

    /// Update the key-availability flag of a stored account.
    pub fn set_has_public_key(&self, id: &str, has_public_key: bool) -> AccountDbResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ACCOUNTS)?;

            let existing_bytes = {
                let existing = table
                    .get(id)?
                    .ok_or_else(|| AccountDbError::NotFound(format!("Account {id}")))?;
                existing.value().to_vec()
            };

            let mut account: StoredAccount = serde_json::from_slice(&existing_bytes)?;
            account.has_public_key = has_public_key;

            let json = serde_json::to_vec(&account)?;
            table.insert(id, json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Number of stored accounts.
    pub fn count(&self) -> AccountDbResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ACCOUNTS)?;
        Ok(table.len()?)
    }
}

/// An account insert in progress.
pub struct AccountInsert {
    txn: WriteTransaction,
    email: String,
}

impl AccountInsert {
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Write the record and its index entry, then commit.
    pub fn commit(self, has_public_key: bool) -> AccountDbResult<StoredAccount> {
        let AccountInsert { txn, email } = self;
        let account = StoredAccount {
            id: Uuid::new_v4().to_string(),
            email,
            has_public_key,
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec(&account)?;

        {
            let mut accounts = txn.open_table(ACCOUNTS)?;
            accounts.insert(account.id.as_str(), json.as_slice())?;

            let mut index = txn.open_table(ACCOUNT_EMAIL_INDEX)?;
            index.insert(account.email.as_str(), account.id.as_str())?;
        }
        txn.commit()?;
        Ok(account)
    }

    pub fn abort(self) -> AccountDbResult<()> {
        self.txn.abort()?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> (AccountDatabase, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = AccountDatabase::open(&dir.path().join("test.redb")).unwrap();
        (db, dir)
    }

    #[test]
    fn insert_and_get_account() {
        let (db, _dir) = temp_db();
        let stored = db
            .begin_insert("alice@example.com")
            .unwrap()
            .commit(true)
            .unwrap();

        let retrieved = db.get(&stored.id).unwrap().unwrap();
        assert_eq!(retrieved, stored);
        assert!(retrieved.has_public_key);
    }

    #[test]
    fn aborted_insert_leaves_no_record() {
        let (db, _dir) = temp_db();
        db.begin_insert("alice@example.com").unwrap().abort().unwrap();

        assert_eq!(db.count().unwrap(), 0);
        // The address is still free.
        db.begin_insert("alice@example.com")
            .unwrap()
            .commit(false)
            .unwrap();
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn dropped_insert_leaves_no_record() {
        let (db, _dir) = temp_db();
        {
            let _insert = db.begin_insert("alice@example.com").unwrap();
        }
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let (db, _dir) = temp_db();
        db.begin_insert("bob@example.com")
            .unwrap()
            .commit(false)
            .unwrap();

        let result = db.begin_insert("bob@example.com");
        assert!(matches!(result, Err(AccountDbError::Duplicate(_))));
    }

    #[test]
    fn get_unknown_is_none() {
        let (db, _dir) = temp_db();
        assert!(db.get("missing").unwrap().is_none());
    }

    #[test]
    fn get_many_skips_unknown_and_duplicates() {
        let (db, _dir) = temp_db();
        let a = db.begin_insert("a@example.com").unwrap().commit(false).unwrap();
        let b = db.begin_insert("b@example.com").unwrap().commit(true).unwrap();

        let ids = vec![
            b.id.clone(),
            "missing".to_string(),
            a.id.clone(),
            b.id.clone(),
        ];
        let found = db.get_many(&ids).unwrap();

        assert_eq!(found, vec![b, a]);
    }

    #[test]
    fn set_has_public_key_persists() {
        let (db, _dir) = temp_db();
        let stored = db.begin_insert("c@example.com").unwrap().commit(false).unwrap();

        db.set_has_public_key(&stored.id, true).unwrap();

        let updated = db.get(&stored.id).unwrap().unwrap();
        assert!(updated.has_public_key);
        assert_eq!(updated.created_at, stored.created_at);
    }

    #[test]
    fn set_has_public_key_unknown_is_not_found() {
        let (db, _dir) = temp_db();
        let result = db.set_has_public_key("missing", true);
        assert!(matches!(result, Err(AccountDbError::NotFound(_))));
    }

    #[test]
    fn reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("accounts.redb");
        let id = {
            let db = AccountDatabase::open(&path).unwrap();
            db.begin_insert("d@example.com").unwrap().commit(false).unwrap().id
        };

        let db = AccountDatabase::open(&path).unwrap();
        assert_eq!(db.get(&id).unwrap().unwrap().email, "d@example.com");
    }
}
