// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pursuemail_server::{
    api::router,
    config::{LogFormat, ServerConfig, DEFAULT_LOG_FILTER},
    dispatch::Dispatcher,
    mail::SmtpTransport,
    pgp::{KeyStore, MessageEncryptor},
    state::AppState,
    storage::AccountDatabase,
};

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn fail(message: &str, err: impl std::fmt::Display) -> ! {
    error!(error = %err, "{message}");
    process::exit(1);
}

#[tokio::main]
async fn main() {
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Logging is not up yet.
            eprintln!("Invalid configuration: {e}");
            process::exit(1);
        }
    };
    init_tracing(config.log_format);

    let db_path = config.storage_paths().accounts_db();
    let accounts = match AccountDatabase::open(&db_path) {
        Ok(db) => Arc::new(db),
        Err(e) => fail("Failed to open account database", e),
    };
    info!(path = %db_path.display(), "Account database opened");

    let keys = Arc::new(KeyStore::new(config.keyring_paths(), config.key_importer()));
    info!(
        gpg_dir = %config.gpg_dir.display(),
        importer = ?config.key_importer,
        "Key store configured"
    );

    let transport = match SmtpTransport::new(&config.smtp) {
        Ok(transport) => transport,
        Err(e) => fail("Failed to configure SMTP transport", e),
    };
    match transport.test_connection().await {
        Ok(true) => info!("SMTP relay reachable"),
        Ok(false) | Err(_) => warn!(
            server = %config.smtp.server,
            "SMTP relay not reachable at startup"
        ),
    }

    let dispatcher = Dispatcher::new(Arc::new(MessageEncryptor::new(keys)), Arc::new(transport))
        .with_send_timeout(config.send_timeout)
        .with_max_concurrency(config.dispatch_concurrency);

    let state = AppState::new(accounts, dispatcher).with_default_from(config.default_from.clone());
    let app = router(state);

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => fail("Failed to bind listener", e),
    };
    info!(addr = %config.bind_addr, "Pursuemail server listening (docs at /docs)");

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        fail("HTTP server failed", e);
    }
    info!("Server stopped");
}

async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
