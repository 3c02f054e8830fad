// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Keyring fixtures shared by unit tests.

use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;

use openpgp::cert::CertBuilder;
use openpgp::serialize::{Serialize as _, SerializeInto as _};
use openpgp::Cert;
use sequoia_openpgp as openpgp;
use tempfile::TempDir;

use super::{KeyImporter, KeyStore, KeyringPaths, NativeImporter, PgpError, PgpResult, RingKind};

/// Generate a signing + encryption capable certificate for `userid`.
pub(crate) fn generate(userid: &str) -> Cert {
    let (cert, _revocation) = CertBuilder::general_purpose(None, Some(userid))
        .generate()
        .expect("generate test certificate");
    cert
}

pub(crate) fn armored_public(cert: &Cert) -> Vec<u8> {
    cert.armored().to_vec().expect("armor certificate")
}

/// Importer that always fails, for exercising rollback paths.
pub(crate) struct RejectingImporter;

impl KeyImporter for RejectingImporter {
    fn import(&self, _armored: &[u8]) -> PgpResult<()> {
        Err(PgpError::ImportFailed("rejected by test importer".to_string()))
    }
}

/// A throwaway GnuPG directory.
pub(crate) struct KeyFixture {
    _dir: TempDir,
    paths: KeyringPaths,
}

impl KeyFixture {
    pub(crate) fn new() -> Self {
        let dir = tempfile::tempdir().expect("create keyring dir");
        let paths = KeyringPaths::new(dir.path());
        Self { _dir: dir, paths }
    }

    pub(crate) fn paths(&self) -> &KeyringPaths {
        &self.paths
    }

    pub(crate) fn write_public_ring(&self, certs: &[&Cert]) {
        let file = File::create(self.paths.ring(RingKind::Public)).expect("create public ring");
        let mut out = BufWriter::new(file);
        for cert in certs {
            cert.serialize(&mut out).expect("write public cert");
        }
    }

    pub(crate) fn write_private_ring(&self, certs: &[&Cert]) {
        let file = File::create(self.paths.ring(RingKind::Private)).expect("create private ring");
        let mut out = BufWriter::new(file);
        for cert in certs {
            cert.as_tsk().serialize(&mut out).expect("write secret cert");
        }
    }

    /// A key store whose imports append to this fixture's public ring.
    pub(crate) fn store(&self) -> Arc<KeyStore> {
        let importer = NativeImporter::new(self.paths.ring(RingKind::Public));
        Arc::new(KeyStore::new(self.paths.clone(), Arc::new(importer)))
    }

    pub(crate) fn store_with(&self, importer: Arc<dyn KeyImporter>) -> Arc<KeyStore> {
        Arc::new(KeyStore::new(self.paths.clone(), importer))
    }
}

/// Sender `robot@example.com` (secret + public on file) and recipient
/// `alice@example.com` (public on file). Returns the fixture plus the
/// sender's and recipient's full certificates.
pub(crate) fn sender_and_recipient() -> (KeyFixture, Cert, Cert) {
    let fixture = KeyFixture::new();
    let sender = generate("Dispatch Robot <robot@example.com>");
    let alice = generate("Alice <alice@example.com>");
    fixture.write_private_ring(&[&sender]);
    fixture.write_public_ring(&[&sender, &alice]);
    (fixture, sender, alice)
}
