//! rtrd - RPKI-to-Router cache server.
//!
//! Serves validated routing objects to router clients over plain TCP,
//! TLS and SSH, as full snapshots or serial-indexed diffs.

mod source;

use rtrd_server::{ssh, tls, Config, Server};
use rtrd_store::Store;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if RTRD_CONFIG is set, then env
    // overrides).
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("RTRD_CONFIG") {
                tracing::info!("loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            if std::env::var("RTRD_CONFIG").is_ok() {
                tracing::error!("failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::info!("using default configuration");
            Config::default()
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("configuration error: {}", e);
        return Err(e.into());
    }

    let store = Arc::new(match config.rtr.session_id {
        Some(id) => Store::with_session_id(config.rtr.keep_difference, id),
        None => Store::new(config.rtr.keep_difference),
    });

    tracing::info!("starting rtrd");
    tracing::info!("  session id: {}", store.session_id());
    tracing::info!(
        "  protocol version: {} (enforced: {})",
        config.rtr.base_protocol_version,
        config.rtr.enforce_version,
    );
    tracing::info!("  retained diffs: {}", config.rtr.keep_difference);

    let server = Arc::new(Server::new(config.rtr.server_config(), store.clone()));
    let mut listeners = Vec::new();

    if let Some(bind) = config.rtr.bind_addr.clone() {
        let listener = TcpListener::bind(&bind).await?;
        tracing::info!("  listening on {} (tcp)", bind);
        let server = server.clone();
        listeners.push(tokio::spawn(async move { server.serve_tcp(listener).await }));
    }

    if let Some(bind) = config.tls.bind_addr.clone() {
        let acceptor = tls::create_tls_acceptor(&config.tls)?;
        let listener = TcpListener::bind(&bind).await?;
        tracing::info!("  listening on {} (tls)", bind);
        let server = server.clone();
        listeners.push(tokio::spawn(async move {
            server.serve_tls(listener, acceptor).await
        }));
    }

    if let Some(bind) = config.ssh.bind_addr.clone() {
        let host_key = config
            .ssh
            .host_key_path
            .as_deref()
            .ok_or("ssh host_key_path not set")?;
        let ssh_config = ssh::create_ssh_config(host_key)?;
        let listener = TcpListener::bind(&bind).await?;
        tracing::info!("  listening on {} (ssh)", bind);
        let server = server.clone();
        listeners.push(tokio::spawn(async move {
            server.serve_ssh(listener, ssh_config).await
        }));
    }

    if listeners.is_empty() {
        tracing::warn!("no listeners configured");
    }

    match std::env::var("RTRD_OBJECTS_FILE") {
        Ok(path) if !path.is_empty() => {
            let interval = std::env::var("RTRD_POLL_INTERVAL")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            tracing::info!("  object file: {} (poll every {}s)", path, interval);
            tokio::spawn(source::watch_file(
                PathBuf::from(path),
                Duration::from_secs(interval),
                store.clone(),
                server.clone(),
            ));
        }
        _ => tracing::info!("  object file: none (RTRD_OBJECTS_FILE unset)"),
    }

    tokio::signal::ctrl_c().await.ok();
    tracing::info!("received shutdown signal, stopping server...");
    server.shutdown();
    for listener in listeners {
        let _ = listener.await;
    }

    tracing::info!("server stopped");
    Ok(())
}
