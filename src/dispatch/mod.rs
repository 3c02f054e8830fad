// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Dispatch Coordinator
//!
//! Sends one message template to one or many accounts, encrypting the body
//! for every account with a public key on file.
//!
//! ## Per-account attempt
//!
//! 1. Secure-only sends to an account without a key are refused before any
//!    work is done.
//! 2. The encrypt-or-plaintext decision is read once from the account's
//!    `has_public_key` snapshot and logged.
//! 3. Encryption failure ends the attempt; plaintext is never sent in its
//!    place.
//! 4. The transport is called exactly once, with the configured timeout.
//!
//! ## Bulk sends
//!
//! Every eligible account gets its own task in a `JoinSet`, with at most
//! `max_concurrency` attempts in flight per call. The coordinator waits for
//! every task before returning. Failures come back as an unordered set of
//! account keys (id, or address for ephemeral accounts); the reason for each
//! failure only appears in the logs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use lettre::message::Mailbox;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::mail::{MailTransport, OutboundEmail, TransportError};
use crate::models::Account;
use crate::pgp::{MessageEncryptor, PgpError};

/// Per-attempt send timeout.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum simultaneous attempts per bulk call.
pub const DEFAULT_MAX_CONCURRENCY: usize = 32;

/// Message content shared by every recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    pub from: String,
    pub subject: String,
    pub body: String,
}

/// How a successful attempt was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Encrypted,
    Plaintext,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{0} has no public key on file and the send is secure-only")]
    PolicyRejected(String),

    #[error("encryption failed: {0}")]
    Encryption(#[from] PgpError),

    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
}

impl DispatchError {
    /// Short reason tag for logs.
    pub fn reason(&self) -> &'static str {
        match self {
            DispatchError::PolicyRejected(_) => "policy",
            DispatchError::Encryption(_) => "encryption",
            DispatchError::Transport(_) => "transport",
        }
    }
}

/// Fans messages out to accounts.
#[derive(Clone)]
pub struct Dispatcher {
    encryptor: Arc<MessageEncryptor>,
    transport: Arc<dyn MailTransport>,
    send_timeout: Duration,
    max_concurrency: usize,
}

impl Dispatcher {
    pub fn new(encryptor: Arc<MessageEncryptor>, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            encryptor,
            transport,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn encryptor(&self) -> &Arc<MessageEncryptor> {
        &self.encryptor
    }

    /// Send to a single account, surfacing the first error.
    pub async fn dispatch_one(
        &self,
        account: &Account,
        template: &MessageTemplate,
        secure_only: bool,
    ) -> Result<Delivery, DispatchError> {
        if secure_only && !account.has_public_key {
            warn!(
                recipient = %account.email,
                reason = "policy",
                "Refusing secure-only send to recipient without a public key"
            );
            return Err(DispatchError::PolicyRejected(account.email.clone()));
        }

        let result = self.attempt(account, template).await;
        if let Err(e) = &result {
            warn!(
                account = account.dispatch_key(),
                recipient = %account.email,
                reason = e.reason(),
                error = %e,
                "Send failed"
            );
        }
        result
    }

    /// Send to every account and return the keys of those that did not
    /// receive the message.
    ///
    /// Accounts appearing more than once (same key) are attempted once.
    pub async fn dispatch_bulk(
        &self,
        accounts: Vec<Account>,
        template: MessageTemplate,
        secure_only: bool,
    ) -> HashSet<String> {
        let mut failed = HashSet::new();
        let mut seen = HashSet::with_capacity(accounts.len());
        let accounts: Vec<Account> = accounts
            .into_iter()
            .filter(|a| seen.insert(a.dispatch_key().to_string()))
            .collect();

        let (eligible, rejected): (Vec<Account>, Vec<Account>) = accounts
            .into_iter()
            .partition(|a| !secure_only || a.has_public_key);

        for account in rejected {
            warn!(
                account = account.dispatch_key(),
                recipient = %account.email,
                reason = "policy",
                "Excluded from secure-only bulk send"
            );
            failed.insert(account.dispatch_key().to_string());
        }

        info!(
            eligible = eligible.len(),
            rejected = failed.len(),
            secure_only,
            max_concurrency = self.max_concurrency,
            "Starting bulk dispatch"
        );

        let template = Arc::new(template);
        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut pending: HashSet<String> = HashSet::with_capacity(eligible.len());
        let mut tasks = JoinSet::new();

        for account in eligible {
            pending.insert(account.dispatch_key().to_string());
            let dispatcher = self.clone();
            let template = Arc::clone(&template);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                let outcome = dispatcher.attempt(&account, &template).await;
                (account, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((account, outcome)) => {
                    let key = account.dispatch_key().to_string();
                    pending.remove(&key);
                    if let Err(e) = outcome {
                        warn!(
                            account = %key,
                            recipient = %account.email,
                            reason = e.reason(),
                            error = %e,
                            "Bulk send failed for recipient"
                        );
                        failed.insert(key);
                    }
                }
                Err(e) => error!(error = %e, "Send task aborted"),
            }
        }

        // Tasks that panicked never reported back.
        for key in pending {
            warn!(account = %key, reason = "task", "Bulk send failed for recipient");
            failed.insert(key);
        }

        info!(failed = failed.len(), "Bulk dispatch finished");
        failed
    }

    async fn attempt(
        &self,
        account: &Account,
        template: &MessageTemplate,
    ) -> Result<Delivery, DispatchError> {
        let delivery = if account.has_public_key {
            Delivery::Encrypted
        } else {
            Delivery::Plaintext
        };
        debug!(
            recipient = %account.email,
            encrypted = delivery == Delivery::Encrypted,
            "Delivery mode chosen"
        );

        let body = match delivery {
            Delivery::Encrypted => self.encrypt_body(template, &account.email).await?,
            Delivery::Plaintext => template.body.clone(),
        };

        let email = OutboundEmail {
            from: template.from.clone(),
            to: account.email.clone(),
            subject: template.subject.clone(),
            body,
        };
        self.transport.send(&email, self.send_timeout).await?;

        debug!(recipient = %account.email, ?delivery, "Message handed to transport");
        Ok(delivery)
    }

    /// Keyring reads and public-key operations block, so they run off the
    /// async workers.
    async fn encrypt_body(
        &self,
        template: &MessageTemplate,
        recipient: &str,
    ) -> Result<String, DispatchError> {
        let encryptor = Arc::clone(&self.encryptor);
        let sender = sender_identity(&template.from);
        let recipient = recipient.to_string();
        let body = template.body.clone();

        let ciphertext = tokio::task::spawn_blocking(move || {
            encryptor.encrypt(&sender, &recipient, &body)
        })
        .await
        .map_err(|e| PgpError::EncryptionFailed(format!("encryption task failed: {e}")))??;
        Ok(ciphertext)
    }
}

/// Key lookup identity for a `From` value: the bare address of
/// `Name <addr>`, or the value itself when it does not parse.
fn sender_identity(from: &str) -> String {
    match from.parse::<Mailbox>() {
        Ok(mailbox) => mailbox.email.to_string(),
        Err(_) => from.trim().to_string(),
    }
}
