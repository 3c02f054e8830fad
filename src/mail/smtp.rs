// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pooled SMTP transport built on lettre.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::PoolConfig;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{MailTransport, OutboundEmail, TransportError};

/// How the relay connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpTls {
    #[default]
    StartTls,
    Tls,
    None,
}

impl SmtpTls {
    fn default_port(self) -> u16 {
        match self {
            SmtpTls::StartTls => 587,
            SmtpTls::Tls => 465,
            SmtpTls::None => 25,
        }
    }
}

impl FromStr for SmtpTls {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "starttls" => Ok(SmtpTls::StartTls),
            "tls" => Ok(SmtpTls::Tls),
            "none" => Ok(SmtpTls::None),
            other => Err(format!("unknown SMTP TLS mode {other:?}")),
        }
    }
}

impl fmt::Display for SmtpTls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmtpTls::StartTls => write!(f, "starttls"),
            SmtpTls::Tls => write!(f, "tls"),
            SmtpTls::None => write!(f, "none"),
        }
    }
}

/// Relay connection settings.
#[derive(Clone)]
pub struct SmtpSettings {
    /// `host` or `host:port`.
    pub server: String,
    pub login: Option<String>,
    pub password: Option<String>,
    pub tls: SmtpTls,
    pub pool_size: u32,
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("server", &self.server)
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tls", &self.tls)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl SmtpSettings {
    /// Split `server` into host and port, falling back to the mode's
    /// standard port.
    pub fn host_and_port(&self) -> Result<(String, u16), TransportError> {
        let server = self.server.trim();
        let invalid = |reason: &str| TransportError::InvalidAddress {
            address: server.to_string(),
            reason: reason.to_string(),
        };

        let (host, port) = match server.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| invalid("bad port"))?;
                (host, port)
            }
            None => (server, self.tls.default_port()),
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        Ok((host.to_string(), port))
    }
}

/// SMTP relay client with a bounded connection pool.
pub struct SmtpTransport {
    inner: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    pub fn new(settings: &SmtpSettings) -> Result<Self, TransportError> {
        let (host, port) = settings.host_and_port()?;

        let builder = match settings.tls {
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
                .map_err(|e| TransportError::Smtp(e.to_string()))?,
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
                .map_err(|e| TransportError::Smtp(e.to_string()))?,
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host),
        };
        let mut builder = builder
            .port(port)
            .pool_config(PoolConfig::new().max_size(settings.pool_size.max(1)));

        if let (Some(login), Some(password)) = (&settings.login, &settings.password) {
            builder = builder.credentials(Credentials::new(login.clone(), password.clone()));
        }

        tracing::info!(
            host = %host,
            port,
            tls = %settings.tls,
            pool_size = settings.pool_size,
            authenticated = settings.login.is_some(),
            "SMTP transport configured"
        );

        Ok(Self {
            inner: builder.build(),
        })
    }

    /// Probe the relay with a NOOP.
    pub async fn test_connection(&self) -> Result<bool, TransportError> {
        self.inner
            .test_connection()
            .await
            .map_err(|e| TransportError::Smtp(e.to_string()))
    }
}

fn mailbox(address: &str) -> Result<Mailbox, TransportError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| TransportError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

pub(crate) fn build_message(email: &OutboundEmail) -> Result<Message, TransportError> {
    Message::builder()
        .from(mailbox(&email.from)?)
        .to(mailbox(&email.to)?)
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(email.body.clone())
        .map_err(|e| TransportError::Build(e.to_string()))
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, email: &OutboundEmail, timeout: Duration) -> Result<(), TransportError> {
        let message = build_message(email)?;

        match tokio::time::timeout(timeout, self.inner.send(message)).await {
            Ok(Ok(response)) => {
                tracing::debug!(
                    to = %email.to,
                    code = %response.code(),
                    "Message accepted by relay"
                );
                Ok(())
            }
            Ok(Err(e)) => Err(TransportError::Smtp(e.to_string())),
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(server: &str, tls: SmtpTls) -> SmtpSettings {
        SmtpSettings {
            server: server.to_string(),
            login: None,
            password: None,
            tls,
            pool_size: 5,
        }
    }

    fn email(to: &str) -> OutboundEmail {
        OutboundEmail {
            from: "robot@example.com".to_string(),
            to: to.to_string(),
            subject: "Hello".to_string(),
            body: "Body".to_string(),
        }
    }

    #[test]
    fn tls_mode_parses_case_insensitively() {
        assert_eq!("STARTTLS".parse::<SmtpTls>().unwrap(), SmtpTls::StartTls);
        assert_eq!("tls".parse::<SmtpTls>().unwrap(), SmtpTls::Tls);
        assert_eq!(" none ".parse::<SmtpTls>().unwrap(), SmtpTls::None);
        assert!("ssl".parse::<SmtpTls>().is_err());
    }

    #[test]
    fn server_with_explicit_port() {
        let (host, port) = settings("smtp.example.com:2525", SmtpTls::StartTls)
            .host_and_port()
            .unwrap();
        assert_eq!(host, "smtp.example.com");
        assert_eq!(port, 2525);
    }

    #[test]
    fn server_without_port_uses_mode_default() {
        let s = settings("smtp.example.com", SmtpTls::Tls);
        assert_eq!(s.host_and_port().unwrap().1, 465);
        let s = settings("smtp.example.com", SmtpTls::None);
        assert_eq!(s.host_and_port().unwrap().1, 25);
    }

    #[test]
    fn server_with_bad_port_is_rejected() {
        let result = settings("smtp.example.com:smtp", SmtpTls::StartTls).host_and_port();
        assert!(matches!(result, Err(TransportError::InvalidAddress { .. })));
        let result = settings(":25", SmtpTls::StartTls).host_and_port();
        assert!(matches!(result, Err(TransportError::InvalidAddress { .. })));
    }

    #[test]
    fn debug_redacts_password() {
        let mut s = settings("smtp.example.com", SmtpTls::StartTls);
        s.password = Some("hunter2".to_string());
        assert!(!format!("{s:?}").contains("hunter2"));
    }

    #[test]
    fn build_message_rejects_bad_recipient() {
        let result = build_message(&email("not an address"));
        assert!(matches!(result, Err(TransportError::InvalidAddress { .. })));
    }

    #[test]
    fn build_message_keeps_body() {
        let message = build_message(&email("alice@example.com")).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("To: alice@example.com"));
        assert!(raw.contains("Subject: Hello"));
        assert!(raw.contains("Body"));
    }

    #[tokio::test]
    async fn silent_relay_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accept connections and never send a greeting.
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let transport =
            SmtpTransport::new(&settings(&format!("127.0.0.1:{port}"), SmtpTls::None)).unwrap();
        let result = transport
            .send(&email("alice@example.com"), Duration::from_millis(200))
            .await;

        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }

    #[tokio::test]
    async fn refused_connection_is_smtp_error() {
        // Grab a free port, then close it.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let transport =
            SmtpTransport::new(&settings(&format!("127.0.0.1:{port}"), SmtpTls::None)).unwrap();
        let result = transport
            .send(&email("alice@example.com"), Duration::from_secs(5))
            .await;

        assert!(matches!(result, Err(TransportError::Smtp(_))));
    }
}
