//! Multi-transport RTR server front end.
//!
//! One listener task per transport funnels accepted connections through
//! admission control into the shared client registry, then hands each
//! to the per-connection state machine in [`crate::client`].

use crate::client::{run_connection, ClientHandle, OUTBOUND_QUEUE};
use crate::error::ServerError;
use crate::ssh;
use parking_lot::RwLock;
use rtrd_store::PayloadSource;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_rustls::TlsAcceptor;

/// Runtime server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum concurrent clients (0 = unlimited).
    pub max_connections: usize,
    /// Highest protocol version served.
    pub base_version: u8,
    /// Refuse rather than downgrade version mismatches.
    pub enforce_version: bool,
    /// End of Data intervals, seconds.
    pub refresh_interval: u32,
    pub retry_interval: u32,
    pub expire_interval: u32,
    /// Never send Router Key PDUs.
    pub disable_bgpsec: bool,
    /// Never send ASPA PDUs.
    pub disable_aspa: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 0,
            base_version: 1,
            enforce_version: false,
            refresh_interval: 3600,
            retry_interval: 600,
            expire_interval: 7200,
            disable_bgpsec: false,
            disable_aspa: false,
        }
    }
}

/// The RTR server: client registry, admission control, notify fan-out.
pub struct Server {
    config: ServerConfig,
    max_connections: AtomicUsize,
    source: Arc<dyn PayloadSource>,
    clients: RwLock<Vec<ClientHandle>>,
    connected: AtomicUsize,
    next_client_id: AtomicU64,
    shutdown: broadcast::Sender<()>,
}

impl Server {
    pub fn new(config: ServerConfig, source: Arc<dyn PayloadSource>) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            max_connections: AtomicUsize::new(config.max_connections),
            config,
            source,
            clients: RwLock::new(Vec::new()),
            connected: AtomicUsize::new(0),
            next_client_id: AtomicU64::new(0),
            shutdown,
        }
    }

    /// The session id clients must present in serial queries.
    pub fn session_id(&self) -> u16 {
        self.source.session_id()
    }

    /// Number of currently connected clients.
    pub fn client_count(&self) -> usize {
        self.connected.load(Ordering::Acquire)
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections.load(Ordering::Acquire)
    }

    /// Adjusts the connection cap; when lowered below the current
    /// count, the oldest clients are disconnected first.
    pub fn set_max_connections(&self, max: usize) {
        let connected = self.client_count();
        if max > 0 && connected > max {
            let excess = connected - max;
            tracing::debug!("too many clients connected, disconnecting the oldest {}", excess);
            let victims: Vec<ClientHandle> =
                self.clients.read().iter().take(excess).cloned().collect();
            for handle in &victims {
                handle.disconnect();
            }
        }
        self.max_connections.store(max, Ordering::Release);
    }

    /// Stops all accept loops and disconnects every client.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
        let handles: Vec<ClientHandle> = self.clients.read().clone();
        for handle in &handles {
            handle.disconnect();
        }
    }

    /// Sends Serial Notify for the current serial, if there is one.
    pub fn notify_clients_latest(&self) {
        let session_id = self.source.session_id();
        if let Some(serial) = self.source.current_serial(session_id) {
            self.notify_clients(serial);
        }
    }

    /// Sends Serial Notify to every connected client, best effort.
    pub fn notify_clients(&self, serial: u32) {
        let session_id = self.source.session_id();
        let handles: Vec<ClientHandle> = self.clients.read().clone();
        tracing::debug!(
            "notifying {} clients of serial {} (session {})",
            handles.len(),
            serial,
            session_id
        );
        for handle in &handles {
            handle.notify(session_id, serial);
        }
    }

    /// Accept loop for plain TCP.
    pub async fn serve_tcp(self: &Arc<Self>, listener: TcpListener) -> Result<(), ServerError> {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        if !self.admit(peer, "tcp") {
                            continue;
                        }
                        let server = self.clone();
                        tokio::spawn(async move {
                            server.handle_connection(stream, peer).await;
                        });
                    }
                    Err(e) => {
                        tracing::error!("failed to accept tcp connection: {}", e);
                    }
                },
                _ = shutdown.recv() => break,
            }
        }
        Ok(())
    }

    /// Accept loop for TLS; the prepared acceptor performs the
    /// handshake on a task so a stalling peer cannot block accepts.
    pub async fn serve_tls(
        self: &Arc<Self>,
        listener: TcpListener,
        acceptor: TlsAcceptor,
    ) -> Result<(), ServerError> {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        if !self.admit(peer, "tls") {
                            continue;
                        }
                        let server = self.clone();
                        let acceptor = acceptor.clone();
                        tokio::spawn(async move {
                            match acceptor.accept(stream).await {
                                Ok(tls_stream) => {
                                    server.handle_connection(tls_stream, peer).await;
                                }
                                Err(e) => {
                                    tracing::warn!("[{}] TLS handshake failed: {}", peer, e);
                                }
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("failed to accept tls connection: {}", e);
                    }
                },
                _ = shutdown.recv() => break,
            }
        }
        Ok(())
    }

    /// Accept loop for SSH; connections reach the RTR handler only
    /// after requesting the `rpki-rtr` subsystem.
    pub async fn serve_ssh(
        self: &Arc<Self>,
        listener: TcpListener,
        config: Arc<russh::server::Config>,
    ) -> Result<(), ServerError> {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        if !self.admit(peer, "ssh") {
                            continue;
                        }
                        let server = self.clone();
                        let config = config.clone();
                        tokio::spawn(async move {
                            if let Err(e) = ssh::run_session(server, stream, peer, config).await {
                                tracing::warn!("[{}] ssh session failed: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("failed to accept ssh connection: {}", e);
                    }
                },
                _ = shutdown.recv() => break,
            }
        }
        Ok(())
    }

    /// Checks the connection cap. Refused connections are closed by
    /// dropping them.
    fn admit(&self, peer: SocketAddr, transport: &str) -> bool {
        let max = self.max_connections();
        let connected = self.client_count();
        if max > 0 && connected >= max {
            tracing::warn!(
                "could not accept {} connection from {} (not enough slots available: {})",
                transport,
                peer,
                max
            );
            return false;
        }
        tracing::info!(
            "accepted {} connection from {} ({}/{})",
            transport,
            peer,
            connected + 1,
            max
        );
        true
    }

    /// Registers the connection and runs it to completion.
    pub(crate) async fn handle_connection<S>(self: Arc<Self>, stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (shutdown, _) = broadcast::channel(1);
        let handle = ClientHandle {
            id: self.next_client_id.fetch_add(1, Ordering::Relaxed),
            peer,
            version: Arc::new(AtomicU8::new(0)),
            connected: Arc::new(AtomicBool::new(true)),
            tx,
            shutdown,
        };

        self.register(handle.clone());
        run_connection(
            stream,
            handle.clone(),
            rx,
            self.config.clone(),
            self.source.clone(),
        )
        .await;
        self.deregister(handle.id);
        tracing::info!("client disconnected: {}", peer);
    }

    fn register(&self, handle: ClientHandle) {
        let mut clients = self.clients.write();
        clients.push(handle);
        self.connected.fetch_add(1, Ordering::Release);
    }

    fn deregister(&self, id: u64) {
        let mut clients = self.clients.write();
        let before = clients.len();
        clients.retain(|handle| handle.id != id);
        if clients.len() < before {
            self.connected.fetch_sub(1, Ordering::Release);
        }
    }
}
