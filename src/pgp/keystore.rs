// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Keyring-backed key resolution with a process-lifetime cache.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use openpgp::cert::CertParser;
use openpgp::parse::Parse;
use openpgp::Cert;
use sequoia_openpgp as openpgp;

use super::{KeyImporter, PgpError, PgpResult};

/// Default public keyring file name inside the GnuPG directory.
pub const DEFAULT_PUBLIC_KEYRING: &str = "pubring.gpg";

/// Default private keyring file name inside the GnuPG directory.
pub const DEFAULT_PRIVATE_KEYRING: &str = "secring.gpg";

/// Which keyring a lookup is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RingKind {
    Public,
    Private,
}

impl fmt::Display for RingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingKind::Public => write!(f, "public"),
            RingKind::Private => write!(f, "private"),
        }
    }
}

/// Locations of the two keyring files.
#[derive(Debug, Clone)]
pub struct KeyringPaths {
    dir: PathBuf,
    public: PathBuf,
    private: PathBuf,
}

impl KeyringPaths {
    /// Keyrings with the default file names inside `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self::with_files(dir, DEFAULT_PUBLIC_KEYRING, DEFAULT_PRIVATE_KEYRING)
    }

    pub fn with_files(dir: impl AsRef<Path>, public: &str, private: &str) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            public: dir.join(public),
            private: dir.join(private),
            dir,
        }
    }

    /// The GnuPG home directory holding both rings.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ring(&self, kind: RingKind) -> &Path {
        match kind {
            RingKind::Public => &self.public,
            RingKind::Private => &self.private,
        }
    }
}

type EntityCache = RwLock<HashMap<String, Arc<Cert>>>;

/// Owner of every loaded key entity.
///
/// Callers get shared read-only handles (`Arc<Cert>`). Resolution is safe to
/// run from many tasks at once; two tasks racing on the same cold identity
/// both read the ring, and the first one to publish its entity wins.
pub struct KeyStore {
    paths: KeyringPaths,
    importer: Arc<dyn KeyImporter>,
    public: EntityCache,
    private: EntityCache,
    ring_reads: AtomicU64,
}

impl KeyStore {
    pub fn new(paths: KeyringPaths, importer: Arc<dyn KeyImporter>) -> Self {
        Self {
            paths,
            importer,
            public: RwLock::new(HashMap::new()),
            private: RwLock::new(HashMap::new()),
            ring_reads: AtomicU64::new(0),
        }
    }

    pub fn paths(&self) -> &KeyringPaths {
        &self.paths
    }

    /// Resolve the entity for `identity` from the `kind` keyring.
    ///
    /// The email pass scans every identity of every entity and keeps the
    /// **last** match. Only when no email matches is the ring scanned again
    /// by display name, where the first match is taken.
    pub fn resolve(&self, identity: &str, kind: RingKind) -> PgpResult<Arc<Cert>> {
        if let Some(cert) = self.cached(identity, kind) {
            tracing::trace!(identity, %kind, "Key served from cache");
            return Ok(cert);
        }

        let ring = self.load_ring(kind)?;
        let cert = find_by_email(&ring, identity)
            .or_else(|| find_by_name(&ring, identity))
            .ok_or_else(|| PgpError::KeyNotFound {
                identity: identity.to_string(),
                kind,
            })?;

        tracing::debug!(
            identity,
            %kind,
            fingerprint = %cert.fingerprint(),
            "Key loaded from keyring"
        );
        Ok(self.remember(identity, kind, cert.clone()))
    }

    /// Whether a public key for `email` can be resolved right now.
    pub fn has_public_key(&self, email: &str) -> bool {
        match self.resolve(email, RingKind::Public) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(email, error = %e, "No usable public key on file");
                false
            }
        }
    }

    /// Persist an armored public key into the public keyring.
    ///
    /// Does not touch the cache.
    pub fn import_public_key(&self, armored: &[u8]) -> PgpResult<()> {
        self.importer.import(armored)
    }

    /// Number of times a keyring file has been read from disk.
    pub fn ring_reads(&self) -> u64 {
        self.ring_reads.load(Ordering::Relaxed)
    }

    fn cache(&self, kind: RingKind) -> &EntityCache {
        match kind {
            RingKind::Public => &self.public,
            RingKind::Private => &self.private,
        }
    }

    fn cached(&self, identity: &str, kind: RingKind) -> Option<Arc<Cert>> {
        self.cache(kind).read().ok()?.get(identity).cloned()
    }

    fn remember(&self, identity: &str, kind: RingKind, cert: Cert) -> Arc<Cert> {
        let cert = Arc::new(cert);
        match self.cache(kind).write() {
            Ok(mut cache) => cache
                .entry(identity.to_string())
                .or_insert(cert)
                .clone(),
            Err(_) => cert,
        }
    }

    fn load_ring(&self, kind: RingKind) -> PgpResult<Vec<Cert>> {
        let path = self.paths.ring(kind);
        let unreadable = |reason: String| PgpError::KeyringUnreadable {
            path: path.to_path_buf(),
            kind,
            reason,
        };

        self.ring_reads.fetch_add(1, Ordering::Relaxed);
        let bytes = fs::read(path).map_err(|e| unreadable(e.to_string()))?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        let certs = CertParser::from_bytes(&bytes)
            .map_err(|e| unreadable(e.to_string()))?
            .collect::<openpgp::Result<Vec<Cert>>>()
            .map_err(|e| unreadable(e.to_string()))?;
        Ok(certs)
    }
}

fn find_by_email<'a>(ring: &'a [Cert], email: &str) -> Option<&'a Cert> {
    let mut found = None;
    for cert in ring {
        for uid in cert.userids() {
            if uid
                .userid()
                .email2()
                .ok()
                .flatten()
                .is_some_and(|candidate| candidate == email)
            {
                found = Some(cert);
            }
        }
    }
    found
}

fn find_by_name<'a>(ring: &'a [Cert], name: &str) -> Option<&'a Cert> {
    ring.iter().find(|cert| {
        cert.userids().any(|uid| {
            uid.userid()
                .name2()
                .ok()
                .flatten()
                .is_some_and(|candidate| candidate == name)
        })
    })
}
