// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound mail transport.
//!
//! The dispatcher only sees [`MailTransport`]; connection setup, pooling and
//! authentication belong to the implementation.

pub mod smtp;

use std::time::Duration;

use async_trait::async_trait;

pub use smtp::{SmtpSettings, SmtpTls, SmtpTransport};

/// A fully prepared single-recipient message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    /// Plaintext or an armored PGP message.
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

/// Hands messages to the outside world.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Submit one message, giving up after `timeout`.
    async fn send(&self, email: &OutboundEmail, timeout: Duration) -> Result<(), TransportError>;
}
