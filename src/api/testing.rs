// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Application state wired to temp storage and a recording transport.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sequoia_openpgp::Cert;
use tempfile::TempDir;

use crate::dispatch::Dispatcher;
use crate::mail::{MailTransport, OutboundEmail, TransportError};
use crate::pgp::testing::{self, KeyFixture};
use crate::pgp::MessageEncryptor;
use crate::state::AppState;
use crate::storage::AccountDatabase;

#[derive(Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<OutboundEmail>>,
    fail_for: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    pub(crate) fn fail_for(&self, address: &str) {
        self.fail_for.lock().unwrap().insert(address.to_string());
    }

    pub(crate) fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, email: &OutboundEmail, _timeout: Duration) -> Result<(), TransportError> {
        if self.fail_for.lock().unwrap().contains(&email.to) {
            return Err(TransportError::Smtp("550 rejected".to_string()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub(crate) struct TestApp {
    pub state: AppState,
    pub transport: Arc<RecordingTransport>,
    /// Owner of `robot@example.com`, the default sender.
    pub sender: Cert,
    /// Owner of `alice@example.com`, whose public key is on file.
    pub alice: Cert,
    pub fixture: KeyFixture,
    _dir: TempDir,
}

impl TestApp {
    pub(crate) fn new() -> Self {
        let (fixture, sender, alice) = testing::sender_and_recipient();
        let keys = fixture.store();

        let dir = tempfile::tempdir().unwrap();
        let db = AccountDatabase::open(&dir.path().join("accounts.redb")).unwrap();

        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = Dispatcher::new(
            Arc::new(MessageEncryptor::new(keys)),
            transport.clone(),
        );
        let state = AppState::new(Arc::new(db), dispatcher)
            .with_default_from(Some("robot@example.com".to_string()));

        Self {
            state,
            transport,
            sender,
            alice,
            fixture,
            _dir: dir,
        }
    }
}
