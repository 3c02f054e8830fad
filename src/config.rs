// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup; invalid values abort startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `127.0.0.1` |
//! | `PORT` | Server bind port | `9080` |
//! | `DATA_DIR` | Directory holding `accounts.redb` | `./data` |
//! | `GPG_DIR` | Keyring directory | `$HOME/.gnupg` |
//! | `PUBLIC_KEYRING` | Public keyring file name | `pubring.gpg` |
//! | `PRIVATE_KEYRING` | Private keyring file name | `secring.gpg` |
//! | `KEY_IMPORTER` | `gpg` (run GPG_PROGRAM) or `native` | `gpg` |
//! | `GPG_PROGRAM` | Key-management executable | `gpg` |
//! | `IMPORT_STAGING_DIR` | Where imported keys are staged | system temp dir |
//! | `SMTP_SERVER` | Relay as `host:port` | Required |
//! | `SMTP_LOGIN` | SMTP user name | Optional |
//! | `SMTP_PASSWORD` | SMTP password | Optional |
//! | `SMTP_TLS` | `starttls`, `tls` or `none` | `starttls` |
//! | `SMTP_POOL_SIZE` | Outbound connection pool bound | `5` |
//! | `SEND_TIMEOUT_SECS` | Per-attempt send timeout | `15` |
//! | `DISPATCH_CONCURRENCY` | Max simultaneous sends per dispatch | `32` |
//! | `DEFAULT_FROM` | Sender used when a message has no `from` | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::mail::{SmtpSettings, SmtpTls};
use crate::pgp::{
    GpgImporter, KeyImporter, KeyringPaths, NativeImporter, RingKind, DEFAULT_PRIVATE_KEYRING,
    DEFAULT_PUBLIC_KEYRING,
};
use crate::storage::StoragePaths;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const GPG_DIR_ENV: &str = "GPG_DIR";
pub const PUBLIC_KEYRING_ENV: &str = "PUBLIC_KEYRING";
pub const PRIVATE_KEYRING_ENV: &str = "PRIVATE_KEYRING";
pub const KEY_IMPORTER_ENV: &str = "KEY_IMPORTER";
pub const GPG_PROGRAM_ENV: &str = "GPG_PROGRAM";
pub const IMPORT_STAGING_DIR_ENV: &str = "IMPORT_STAGING_DIR";

pub const SMTP_SERVER_ENV: &str = "SMTP_SERVER";
pub const SMTP_LOGIN_ENV: &str = "SMTP_LOGIN";
pub const SMTP_PASSWORD_ENV: &str = "SMTP_PASSWORD";
pub const SMTP_TLS_ENV: &str = "SMTP_TLS";
pub const SMTP_POOL_SIZE_ENV: &str = "SMTP_POOL_SIZE";

pub const SEND_TIMEOUT_SECS_ENV: &str = "SEND_TIMEOUT_SECS";
pub const DISPATCH_CONCURRENCY_ENV: &str = "DISPATCH_CONCURRENCY";
pub const DEFAULT_FROM_ENV: &str = "DEFAULT_FROM";

/// Logging format: `json` for production, `pretty` for development.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 9080;
const DEFAULT_GPG_PROGRAM: &str = "gpg";
const DEFAULT_SMTP_POOL_SIZE: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Which backend persists imported public keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyImporterKind {
    Gpg,
    Native,
}

impl FromStr for KeyImporterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpg" => Ok(Self::Gpg),
            "native" => Ok(Self::Native),
            other => Err(format!("expected `gpg` or `native`, got {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(format!("expected `json` or `pretty`, got {other:?}")),
        }
    }
}

/// Everything the server needs at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub gpg_dir: PathBuf,
    pub public_keyring: String,
    pub private_keyring: String,
    pub key_importer: KeyImporterKind,
    pub gpg_program: PathBuf,
    pub import_staging_dir: Option<PathBuf>,
    pub smtp: SmtpSettings,
    pub send_timeout: Duration,
    pub dispatch_concurrency: usize,
    pub default_from: Option<String>,
    pub log_format: LogFormat,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let host = env.or_default(HOST_ENV, DEFAULT_HOST);
        let port: u16 = env.parsed(PORT_ENV, DEFAULT_PORT)?;
        let bind_addr = format!("{host}:{port}")
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: HOST_ENV,
                value: host.clone(),
                reason: e.to_string(),
            })?;

        let gpg_dir = match env.optional(GPG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => env
                .optional("HOME")
                .map(|home| PathBuf::from(home).join(".gnupg"))
                .ok_or(ConfigError::Missing(GPG_DIR_ENV))?,
        };

        let smtp = SmtpSettings {
            server: env.required(SMTP_SERVER_ENV)?,
            login: env.optional(SMTP_LOGIN_ENV),
            password: env.optional(SMTP_PASSWORD_ENV),
            tls: env.parsed(SMTP_TLS_ENV, SmtpTls::default())?,
            pool_size: env.parsed(SMTP_POOL_SIZE_ENV, DEFAULT_SMTP_POOL_SIZE)?,
        };

        let send_timeout_secs: u64 = env.parsed(
            SEND_TIMEOUT_SECS_ENV,
            crate::dispatch::DEFAULT_SEND_TIMEOUT.as_secs(),
        )?;
        let dispatch_concurrency: usize = env.parsed(
            DISPATCH_CONCURRENCY_ENV,
            crate::dispatch::DEFAULT_MAX_CONCURRENCY,
        )?;
        if dispatch_concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: DISPATCH_CONCURRENCY_ENV,
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            data_dir: PathBuf::from(env.or_default(DATA_DIR_ENV, crate::storage::paths::DATA_ROOT)),
            gpg_dir,
            public_keyring: env.or_default(PUBLIC_KEYRING_ENV, DEFAULT_PUBLIC_KEYRING),
            private_keyring: env.or_default(PRIVATE_KEYRING_ENV, DEFAULT_PRIVATE_KEYRING),
            key_importer: env.parsed(KEY_IMPORTER_ENV, KeyImporterKind::Gpg)?,
            gpg_program: PathBuf::from(env.or_default(GPG_PROGRAM_ENV, DEFAULT_GPG_PROGRAM)),
            import_staging_dir: env.optional(IMPORT_STAGING_DIR_ENV).map(PathBuf::from),
            smtp,
            send_timeout: Duration::from_secs(send_timeout_secs),
            dispatch_concurrency,
            default_from: env.optional(DEFAULT_FROM_ENV),
            log_format: env.parsed(LOG_FORMAT_ENV, LogFormat::Pretty)?,
        })
    }

    pub fn storage_paths(&self) -> StoragePaths {
        StoragePaths::new(&self.data_dir)
    }

    pub fn keyring_paths(&self) -> KeyringPaths {
        KeyringPaths::with_files(&self.gpg_dir, &self.public_keyring, &self.private_keyring)
    }

    /// The configured key import backend.
    pub fn key_importer(&self) -> Arc<dyn KeyImporter> {
        match self.key_importer {
            KeyImporterKind::Gpg => {
                let mut importer = GpgImporter::new(
                    &self.gpg_program,
                    &self.gpg_dir,
                    self.keyring_paths().ring(RingKind::Public),
                );
                if let Some(dir) = &self.import_staging_dir {
                    importer = importer.with_staging_dir(dir);
                }
                Arc::new(importer)
            }
            KeyImporterKind::Native => Arc::new(NativeImporter::new(
                self.keyring_paths().ring(RingKind::Public),
            )),
        }
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
                value,
            }),
            None => Ok(default),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    const MINIMAL: &[(&str, &str)] = &[
        ("SMTP_SERVER", "smtp.example.com:587"),
        ("HOME", "/home/mail"),
    ];

    #[test]
    fn defaults_apply() {
        let config = load(MINIMAL).unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:9080".parse().unwrap());
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.gpg_dir, PathBuf::from("/home/mail/.gnupg"));
        assert_eq!(config.public_keyring, "pubring.gpg");
        assert_eq!(config.private_keyring, "secring.gpg");
        assert_eq!(config.key_importer, KeyImporterKind::Gpg);
        assert_eq!(config.smtp.tls, SmtpTls::StartTls);
        assert_eq!(config.smtp.pool_size, 5);
        assert_eq!(config.send_timeout, Duration::from_secs(15));
        assert_eq!(config.dispatch_concurrency, 32);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.default_from.is_none());
    }

    #[test]
    fn smtp_server_is_required() {
        let result = load(&[("HOME", "/home/mail")]);
        assert!(matches!(result, Err(ConfigError::Missing("SMTP_SERVER"))));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let result = load(&[("SMTP_SERVER", "   "), ("HOME", "/home/mail")]);
        assert!(matches!(result, Err(ConfigError::Missing("SMTP_SERVER"))));
    }

    #[test]
    fn gpg_dir_needs_home_or_override() {
        let result = load(&[("SMTP_SERVER", "smtp.example.com")]);
        assert!(matches!(result, Err(ConfigError::Missing("GPG_DIR"))));

        let config =
            load(&[("SMTP_SERVER", "smtp.example.com"), ("GPG_DIR", "/srv/keys")]).unwrap();
        assert_eq!(
            config.keyring_paths().ring(RingKind::Public),
            PathBuf::from("/srv/keys/pubring.gpg")
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = MINIMAL.to_vec();
        vars.extend([
            ("HOST", "0.0.0.0"),
            ("PORT", "8025"),
            ("KEY_IMPORTER", "native"),
            ("SMTP_TLS", "none"),
            ("SMTP_POOL_SIZE", "12"),
            ("SEND_TIMEOUT_SECS", "3"),
            ("DISPATCH_CONCURRENCY", "4"),
            ("DEFAULT_FROM", "robot@example.com"),
            ("LOG_FORMAT", "JSON"),
        ]);
        let config = load(&vars).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8025".parse().unwrap());
        assert_eq!(config.key_importer, KeyImporterKind::Native);
        assert_eq!(config.smtp.tls, SmtpTls::None);
        assert_eq!(config.smtp.pool_size, 12);
        assert_eq!(config.send_timeout, Duration::from_secs(3));
        assert_eq!(config.dispatch_concurrency, 4);
        assert_eq!(config.default_from.as_deref(), Some("robot@example.com"));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for (name, value) in [
            ("PORT", "eighty"),
            ("SMTP_TLS", "ssl"),
            ("KEY_IMPORTER", "pgp"),
            ("SEND_TIMEOUT_SECS", "-1"),
            ("DISPATCH_CONCURRENCY", "0"),
            ("LOG_FORMAT", "xml"),
            ("HOST", "not a host"),
        ] {
            let mut vars = MINIMAL.to_vec();
            vars.push((name, value));
            let result = load(&vars);
            assert!(
                matches!(result, Err(ConfigError::Invalid { .. })),
                "{name}={value} should be rejected"
            );
        }
    }
}
