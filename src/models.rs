// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response structures used by the REST API, plus the
//! [`Account`] value the dispatcher works on. API types derive `Serialize`,
//! `Deserialize` and `ToSchema` for JSON handling and OpenAPI documentation.
//!
//! ## Model Categories
//!
//! - **Accounts**: registered (or ad hoc) recipients
//! - **Sending**: single and bulk dispatch requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::storage::StoredAccount;

// =============================================================================
// Account
// =============================================================================

/// A recipient the dispatcher can send to.
///
/// Registered accounts carry an `id` and `created_at`; accounts built from a
/// bare address in a bulk request have neither.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct Account {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub email: String,
    /// Whether a public key for `email` is on file.
    pub has_public_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Account {
    /// An unpersisted account for a bare address.
    pub fn ephemeral(email: impl Into<String>, has_public_key: bool) -> Self {
        Self {
            id: None,
            email: email.into(),
            has_public_key,
            created_at: None,
        }
    }

    /// Identifier reported when a send to this account fails: the account id,
    /// or the address for ephemeral accounts.
    pub fn dispatch_key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.email)
    }
}

impl From<StoredAccount> for Account {
    fn from(stored: StoredAccount) -> Self {
        Self {
            id: Some(stored.id),
            email: stored.email,
            has_public_key: stored.has_public_key,
            created_at: Some(stored.created_at),
        }
    }
}

// =============================================================================
// Account API Models
// =============================================================================

/// Request to register a recipient.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateAccountRequest {
    /// Recipient address.
    pub email: String,
    /// ASCII-armored OpenPGP public key to import for this address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct CreateAccountResponse {
    pub id: String,
}

// =============================================================================
// Sending Models
// =============================================================================

/// Message content shared by every recipient of a send.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct EmailData {
    /// Sender address. Falls back to the server's configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub subject: String,
    /// Plaintext body; encrypted per recipient when a key is on file.
    pub body: String,
}

/// Request to send to one registered account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SendEmailRequest {
    pub email_data: EmailData,
    /// Refuse to send unless the recipient has a public key on file.
    #[serde(default)]
    pub secure_only: bool,
}

/// Request to send to many recipients, addressed either by account id or
/// by bare email address (never both).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SendBulkEmailRequest {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    pub email_data: EmailData,
    #[serde(default)]
    pub secure_only: bool,
}

impl SendBulkEmailRequest {
    /// A request naming no targets at all is valid and sends nothing.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.ids.is_empty() && !self.emails.is_empty() {
            return Err("Specify either ids or emails, not both");
        }
        Ok(())
    }
}

/// Recipients that did not receive a bulk message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SendBulkEmailResponse {
    /// Account ids, or addresses for recipients given by email.
    pub failed_emails: Vec<String>,
}
