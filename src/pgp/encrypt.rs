// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sign-then-encrypt pipeline producing ASCII-armored messages.

use std::fmt::Display;
use std::io::Write;
use std::sync::Arc;

use openpgp::policy::StandardPolicy;
use openpgp::serialize::stream::{
    Armorer, Encryptor2, LiteralWriter, Message, Recipient, Signer,
};
use openpgp::Cert;
use sequoia_openpgp as openpgp;

use super::{KeyStore, PgpError, PgpResult, RingKind};

/// Encrypts message bodies from a sender identity to a single recipient.
pub struct MessageEncryptor {
    keys: Arc<KeyStore>,
}

impl MessageEncryptor {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self { keys }
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.keys
    }

    /// Sign `plaintext` with the sender's private key and encrypt it for the
    /// recipient's public key.
    ///
    /// The returned text is a complete `PGP MESSAGE` armor block; the writer
    /// stack is finalized before this returns.
    pub fn encrypt(&self, sender: &str, recipient: &str, plaintext: &str) -> PgpResult<String> {
        let signer = self.keys.resolve(sender, RingKind::Private)?;
        let recipient = self.keys.resolve(recipient, RingKind::Public)?;
        seal(&signer, &recipient, plaintext.as_bytes())
    }
}

fn failed<E: Display>(err: E) -> PgpError {
    PgpError::EncryptionFailed(err.to_string())
}

fn seal(signer: &Cert, recipient: &Cert, plaintext: &[u8]) -> PgpResult<String> {
    let policy = StandardPolicy::new();

    let recipients: Vec<Recipient> = recipient
        .keys()
        .with_policy(&policy, None)
        .supported()
        .alive()
        .revoked(false)
        .for_transport_encryption()
        .map(Into::into)
        .collect();
    if recipients.is_empty() {
        return Err(PgpError::EncryptionFailed(format!(
            "{} has no usable encryption key",
            recipient.fingerprint()
        )));
    }

    let signing_key = signer
        .keys()
        .unencrypted_secret()
        .with_policy(&policy, None)
        .supported()
        .alive()
        .revoked(false)
        .for_signing()
        .next()
        .ok_or_else(|| {
            PgpError::EncryptionFailed(format!(
                "{} has no usable unencrypted signing key",
                signer.fingerprint()
            ))
        })?;
    let keypair = signing_key.key().clone().into_keypair().map_err(failed)?;

    let mut sink = Vec::new();
    let message = Message::new(&mut sink);
    let message = Armorer::new(message).build().map_err(failed)?;
    let message = Encryptor2::for_recipients(message, recipients)
        .build()
        .map_err(failed)?;
    let message = Signer::new(message, keypair).build().map_err(failed)?;
    let mut message = LiteralWriter::new(message).build().map_err(failed)?;
    message.write_all(plaintext).map_err(failed)?;
    message.finalize().map_err(failed)?;

    String::from_utf8(sink).map_err(failed)
}
