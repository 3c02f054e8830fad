// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Public key import backends.
//!
//! Import is not transactional with the account database: a key that was
//! imported for an account whose record later failed to commit stays in the
//! keyring.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use openpgp::parse::Parse;
use openpgp::serialize::Serialize as _;
use openpgp::Cert;
use sequoia_openpgp as openpgp;
use tempfile::NamedTempFile;

use super::{PgpError, PgpResult};

/// Prefix of staged key files.
const STAGED_KEY_PREFIX: &str = "pubkey-import";

/// Persists armored public key material into the public keyring.
pub trait KeyImporter: Send + Sync {
    fn import(&self, armored: &[u8]) -> PgpResult<()>;
}

/// Imports by running the GnuPG executable against a staged temp file.
///
/// gpg is pointed at `public_ring` alone, so the key lands in the file the
/// key store reads rather than in gpg's default keybox.
#[derive(Debug, Clone)]
pub struct GpgImporter {
    program: PathBuf,
    homedir: PathBuf,
    public_ring: PathBuf,
    staging_dir: Option<PathBuf>,
}

impl GpgImporter {
    pub fn new(
        program: impl Into<PathBuf>,
        homedir: impl Into<PathBuf>,
        public_ring: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            homedir: homedir.into(),
            public_ring: public_ring.into(),
            staging_dir: None,
        }
    }

    /// Stage key files in `dir` instead of the system temp directory.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    fn stage(&self, armored: &[u8]) -> io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGED_KEY_PREFIX);
        let mut staged = match &self.staging_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        staged.write_all(armored)?;
        staged.flush()?;
        Ok(staged)
    }

    /// gpg creates a keybox for a missing `--keyring` file but keeps the
    /// classic packet format for an existing one, empty or not.
    fn ensure_ring(&self) -> io::Result<()> {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.public_ring)
            .map(drop)
    }

    fn run(&self, key_file: &Path) -> PgpResult<()> {
        self.ensure_ring().map_err(|e| {
            PgpError::ImportFailed(format!(
                "cannot create keyring {}: {e}",
                self.public_ring.display()
            ))
        })?;

        let output = Command::new(&self.program)
            .arg("--homedir")
            .arg(&self.homedir)
            .arg("--batch")
            .arg("--no-default-keyring")
            .arg("--keyring")
            .arg(&self.public_ring)
            .arg("--import")
            .arg(key_file)
            .output()
            .map_err(|e| {
                PgpError::ImportFailed(format!("could not run {}: {e}", self.program.display()))
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(PgpError::ImportFailed(format!(
            "{} exited with {}: {}",
            self.program.display(),
            output.status,
            stderr.trim()
        )))
    }
}

impl KeyImporter for GpgImporter {
    fn import(&self, armored: &[u8]) -> PgpResult<()> {
        let staged = self
            .stage(armored)
            .map_err(|e| PgpError::ImportFailed(format!("could not stage key: {e}")))?;

        let result = self.run(staged.path());

        let staged_path = staged.path().to_path_buf();
        if let Err(e) = staged.close() {
            tracing::warn!(
                path = %staged_path.display(),
                error = %e,
                "Failed to remove staged key file"
            );
        }

        match &result {
            Ok(()) => tracing::info!(
                program = %self.program.display(),
                keyring = %self.public_ring.display(),
                "Public key imported"
            ),
            Err(e) => tracing::warn!(error = %e, "Public key import failed"),
        }
        result
    }
}

/// Imports by parsing the key in-process and appending it to the ring file.
#[derive(Debug)]
pub struct NativeImporter {
    public_ring: PathBuf,
    write_lock: Mutex<()>,
}

impl NativeImporter {
    pub fn new(public_ring: impl Into<PathBuf>) -> Self {
        Self {
            public_ring: public_ring.into(),
            write_lock: Mutex::new(()),
        }
    }
}

impl KeyImporter for NativeImporter {
    fn import(&self, armored: &[u8]) -> PgpResult<()> {
        let cert = Cert::from_bytes(armored)
            .map_err(|e| PgpError::ImportFailed(format!("malformed public key: {e}")))?;
        // Never let secret material reach the public ring.
        let cert = cert.strip_secret_key_material();

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| PgpError::ImportFailed("import lock poisoned".to_string()))?;

        let mut ring = match fs::read(&self.public_ring) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(PgpError::ImportFailed(format!("cannot read keyring: {e}"))),
        };
        cert.serialize(&mut ring)
            .map_err(|e| PgpError::ImportFailed(format!("cannot serialize key: {e}")))?;

        write_atomic(&self.public_ring, &ring)
            .map_err(|e| PgpError::ImportFailed(format!("cannot write keyring: {e}")))?;

        tracing::info!(fingerprint = %cert.fingerprint(), "Public key imported");
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
