// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Decryption of messages produced by the encryption pipeline.

use std::fmt::Display;
use std::io::Read;

use openpgp::crypto::SessionKey;
use openpgp::packet::{PKESK, SKESK};
use openpgp::parse::stream::{
    DecryptionHelper, DecryptorBuilder, MessageLayer, MessageStructure, VerificationHelper,
};
use openpgp::parse::Parse;
use openpgp::policy::{Policy, StandardPolicy};
use openpgp::types::SymmetricAlgorithm;
use openpgp::{Cert, Fingerprint, KeyHandle};
use sequoia_openpgp as openpgp;

use super::{PgpError, PgpResult};

/// Decrypt `armored` with the recipient's secret key and require a valid
/// signature from `sender`.
pub fn decrypt_verified(recipient: &Cert, sender: &Cert, armored: &str) -> PgpResult<String> {
    let policy = StandardPolicy::new();
    let helper = Helper {
        recipient,
        sender,
        policy: &policy,
    };

    let mut decryptor = DecryptorBuilder::from_bytes(armored.as_bytes())
        .map_err(failed)?
        .with_policy(&policy, None, helper)
        .map_err(failed)?;

    let mut plaintext = Vec::new();
    decryptor.read_to_end(&mut plaintext).map_err(failed)?;
    String::from_utf8(plaintext).map_err(failed)
}

fn failed<E: Display>(err: E) -> PgpError {
    PgpError::DecryptionFailed(err.to_string())
}

struct Helper<'a> {
    recipient: &'a Cert,
    sender: &'a Cert,
    policy: &'a dyn Policy,
}

impl VerificationHelper for Helper<'_> {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(vec![self.sender.clone()])
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        let mut signed_by_sender = false;
        for layer in structure.into_iter() {
            if let MessageLayer::SignatureGroup { results } = layer {
                signed_by_sender |= results.iter().any(|result| result.is_ok());
            }
        }

        if signed_by_sender {
            Ok(())
        } else {
            Err(openpgp::Error::InvalidOperation(format!(
                "message is not signed by {}",
                self.sender.fingerprint()
            ))
            .into())
        }
    }
}

impl DecryptionHelper for Helper<'_> {
    fn decrypt<D>(
        &mut self,
        pkesks: &[PKESK],
        _skesks: &[SKESK],
        sym_algo: Option<SymmetricAlgorithm>,
        mut decrypt: D,
    ) -> openpgp::Result<Option<Fingerprint>>
    where
        D: FnMut(SymmetricAlgorithm, &SessionKey) -> bool,
    {
        for ka in self
            .recipient
            .keys()
            .unencrypted_secret()
            .with_policy(self.policy, None)
            .supported()
            .for_transport_encryption()
        {
            let mut keypair = ka.key().clone().into_keypair()?;
            for pkesk in pkesks {
                if let Some((algo, session_key)) = pkesk.decrypt(&mut keypair, sym_algo) {
                    if decrypt(algo, &session_key) {
                        return Ok(Some(self.recipient.fingerprint()));
                    }
                }
            }
        }

        Err(openpgp::Error::InvalidOperation(format!(
            "no secret key of {} opens this message",
            self.recipient.fingerprint()
        ))
        .into())
    }
}
