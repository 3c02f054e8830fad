// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::dispatch::Dispatcher;
use crate::pgp::KeyStore;
use crate::storage::{AccountDatabase, AccountRepository};

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountDatabase>,
    pub keys: Arc<KeyStore>,
    pub dispatcher: Dispatcher,
    /// Sender used when a request omits `from`.
    pub default_from: Option<String>,
}

impl AppState {
    pub fn new(accounts: Arc<AccountDatabase>, dispatcher: Dispatcher) -> Self {
        let keys = Arc::clone(dispatcher.encryptor().key_store());
        Self {
            accounts,
            keys,
            dispatcher,
            default_from: None,
        }
    }

    pub fn with_default_from(mut self, from: Option<String>) -> Self {
        self.default_from = from;
        self
    }

    pub fn account_repo(&self) -> AccountRepository<'_> {
        AccountRepository::new(&self.accounts, &self.keys)
    }
}
