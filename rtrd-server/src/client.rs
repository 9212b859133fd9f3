//! Per-connection state machine.
//!
//! Every connection runs a reader task and a writer task. The reader
//! decodes queries, latches the protocol version and streams responses
//! into a bounded outbound queue; the writer drains that queue to the
//! socket. A single disconnect action flips the shared connected flag
//! and signals the shutdown channel, and both tasks exit at their next
//! suspension point.

use crate::server::ServerConfig;
use rtrd_protocol::{ErrorCode, Pdu, PduDecoder, PROTOCOL_VERSION_0, PROTOCOL_VERSION_2};
use rtrd_store::{Payload, PayloadSource};
use std::net::{IpAddr, SocketAddr};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};

/// Outbound queue depth per client.
///
/// A client's own responses await free slots (backpressure); broadcast
/// notifies are dropped for that client when the queue is full.
pub(crate) const OUTBOUND_QUEUE: usize = 256;

/// The server-side grip on a connected client.
#[derive(Clone)]
pub(crate) struct ClientHandle {
    pub id: u64,
    pub peer: SocketAddr,
    pub version: Arc<AtomicU8>,
    pub connected: Arc<AtomicBool>,
    pub tx: mpsc::Sender<Pdu>,
    pub shutdown: broadcast::Sender<()>,
}

impl ClientHandle {
    /// Marks the client gone and wakes both its tasks. Safe to call
    /// more than once; the signal is discarded if nobody listens.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        let _ = self.shutdown.send(());
    }

    /// Queues a Serial Notify, best effort.
    pub fn notify(&self, session_id: u16, serial: u32) {
        let pdu = Pdu::SerialNotify {
            version: self.version.load(Ordering::Acquire),
            session_id,
            serial,
        };
        match self.tx.try_send(pdu) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    "[{}] outbound queue full, dropping serial notify",
                    self.peer
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Drives one client connection to completion.
///
/// Returns once the client disconnected, was disconnected, or failed.
pub(crate) async fn run_connection<S>(
    stream: S,
    handle: ClientHandle,
    rx: mpsc::Receiver<Pdu>,
    config: ServerConfig,
    source: Arc<dyn PayloadSource>,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);

    let writer = tokio::spawn(write_loop(
        write_half,
        rx,
        handle.shutdown.subscribe(),
        handle.clone(),
    ));

    let mut conn = Connection::new(handle.clone(), config, source);
    conn.read_loop(read_half, handle.shutdown.subscribe()).await;

    handle.disconnect();
    let _ = writer.await;
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut rx: mpsc::Receiver<Pdu>,
    mut shutdown: broadcast::Receiver<()>,
    handle: ClientHandle,
) {
    loop {
        // Biased toward the queue: PDUs enqueued before a disconnect
        // (such as a final Error Report) still go out in FIFO order.
        tokio::select! {
            biased;
            pdu = rx.recv() => match pdu {
                Some(pdu) => {
                    if let Err(e) = writer.write_all(&pdu.to_bytes()).await {
                        tracing::debug!("[{}] write error: {}", handle.peer, e);
                        break;
                    }
                }
                None => break,
            },
            _ = shutdown.recv() => break,
        }
    }
    let _ = writer.shutdown().await;
    handle.disconnect();
}

struct Connection {
    peer: SocketAddr,
    config: ServerConfig,
    source: Arc<dyn PayloadSource>,
    tx: mpsc::Sender<Pdu>,
    version: Arc<AtomicU8>,
    version_set: bool,
    connected: Arc<AtomicBool>,
}

impl Connection {
    fn new(handle: ClientHandle, config: ServerConfig, source: Arc<dyn PayloadSource>) -> Self {
        let mut conn = Self {
            peer: handle.peer,
            tx: handle.tx,
            version: handle.version,
            version_set: false,
            connected: handle.connected,
            config,
            source,
        };
        if conn.config.enforce_version {
            conn.set_version(conn.config.base_version);
        }
        conn
    }

    fn version(&self) -> u8 {
        self.version.load(Ordering::Acquire)
    }

    fn set_version(&mut self, version: u8) {
        self.version_set = true;
        self.version.store(version, Ordering::Release);
    }

    async fn read_loop<R: AsyncRead + Unpin>(
        &mut self,
        mut reader: R,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut decoder = PduDecoder::new();
        let mut buf = [0u8; 8192];

        'conn: while self.connected.load(Ordering::Acquire) {
            let n = tokio::select! {
                result = reader.read(&mut buf) => match result {
                    Ok(0) => {
                        tracing::debug!("[{}] connection closed by client", self.peer);
                        break;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        tracing::debug!("[{}] read error: {}", self.peer, e);
                        break;
                    }
                },
                _ = shutdown.recv() => break,
            };
            decoder.extend(&buf[..n]);

            loop {
                match decoder.decode_pdu() {
                    Ok(Some(pdu)) => {
                        if self.handle_pdu(pdu).await.is_break() {
                            break 'conn;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        // The stream is untrusted; close without an
                        // Error Report.
                        tracing::error!("[{}] decode error: {}", self.peer, e);
                        break 'conn;
                    }
                }
            }
        }
    }

    async fn handle_pdu(&mut self, pdu: Pdu) -> ControlFlow<()> {
        tracing::debug!("[{}] received {}", self.peer, pdu);

        let announced = pdu.version();
        if (!self.version_set || announced == self.version()) && announced <= PROTOCOL_VERSION_2 {
            self.set_version(announced);
        } else {
            tracing::debug!(
                "[{}] bad version (received v{}, pinned v{})",
                self.peer,
                announced,
                self.version()
            );
            self.send_error(ErrorCode::BadProtocolVersion, "Bad protocol version")
                .await;
            return ControlFlow::Break(());
        }

        if self.config.enforce_version && self.version() != self.config.base_version {
            self.send_error(ErrorCode::BadProtocolVersion, "Bad protocol version")
                .await;
            return ControlFlow::Break(());
        }
        if self.version() > self.config.base_version {
            tracing::debug!(
                "[{}] downgrading from v{} to v{}",
                self.peer,
                self.version(),
                self.config.base_version
            );
            self.set_version(self.config.base_version);
        }
        if !pdu.is_legal_at(self.version()) {
            self.send_error(
                ErrorCode::BadProtocolVersion,
                "PDU type not available at this protocol version",
            )
            .await;
            return ControlFlow::Break(());
        }

        match pdu {
            Pdu::SerialQuery {
                session_id, serial, ..
            } => self.serial_query(session_id, serial).await,
            Pdu::ResetQuery { .. } => {
                self.reset_query().await;
                ControlFlow::Continue(())
            }
            Pdu::ErrorReport {
                error_code,
                message,
                ..
            } => {
                tracing::warn!(
                    "[{}] client error report (code {}): {}",
                    self.peer,
                    error_code,
                    message
                );
                ControlFlow::Continue(())
            }
            other => {
                tracing::debug!("[{}] ignoring {}", self.peer, other.type_name());
                ControlFlow::Continue(())
            }
        }
    }

    /// Serves a full snapshot, or No Data if nothing was installed yet.
    async fn reset_query(&mut self) {
        let session_id = self.source.session_id();
        let Some(serial) = self.source.current_serial(session_id) else {
            self.send_error(ErrorCode::NoDataAvailable, "No data available")
                .await;
            return;
        };
        match self.source.current_objects() {
            None => {
                self.send_error(ErrorCode::InternalError, "Unknown internal error")
                    .await;
            }
            Some(objects) => {
                self.send_objects(session_id, serial, &objects).await;
                tracing::debug!(
                    "[{}] sent snapshot (serial {}, session {})",
                    self.peer,
                    serial,
                    session_id
                );
            }
        }
    }

    /// Serves the diff since the client's serial, Cache Reset when the
    /// serial left the window, Corrupt Data when the session differs.
    async fn serial_query(&mut self, session_id: u16, serial: u32) -> ControlFlow<()> {
        let server_session = self.source.session_id();
        if session_id != server_session {
            tracing::debug!(
                "[{}] session mismatch (client {}, server {})",
                self.peer,
                session_id,
                server_session
            );
            self.send_error(
                ErrorCode::CorruptData,
                "Session ID mismatch: client is desynchronized",
            )
            .await;
            return ControlFlow::Break(());
        }

        let Some(current) = self.source.current_serial(server_session) else {
            self.send_error(ErrorCode::NoDataAvailable, "No data available")
                .await;
            return ControlFlow::Continue(());
        };

        match self.source.diff_since(serial) {
            None => {
                self.send_pdu(Pdu::CacheReset { version: 0 }).await;
                tracing::debug!("[{}] sent cache reset", self.peer);
            }
            Some(diff) => {
                self.send_objects(server_session, current, &diff).await;
                tracing::debug!(
                    "[{}] sent diff since {} ({} entries, serial {})",
                    self.peer,
                    serial,
                    diff.len(),
                    current
                );
            }
        }
        ControlFlow::Continue(())
    }

    /// Emits Cache Response, one PDU per object, End of Data.
    async fn send_objects(&mut self, session_id: u16, serial: u32, objects: &[Payload]) {
        self.send_pdu(Pdu::CacheResponse {
            version: 0,
            session_id,
        })
        .await;
        for object in objects {
            if let Some(pdu) = self.project(object) {
                self.send_pdu(pdu).await;
            }
        }
        self.send_pdu(Pdu::EndOfData {
            version: 0,
            session_id,
            serial,
            refresh: self.config.refresh_interval,
            retry: self.config.retry_interval,
            expire: self.config.expire_interval,
        })
        .await;
    }

    /// Projects an object onto its PDU, or `None` when the negotiated
    /// version or the server configuration suppresses it.
    fn project(&self, payload: &Payload) -> Option<Pdu> {
        match payload {
            Payload::Origin(origin) => Some(match origin.prefix {
                IpAddr::V4(prefix) => Pdu::Ipv4Prefix {
                    version: 0,
                    flags: origin.flag.to_wire(),
                    prefix_len: origin.prefix_len,
                    max_len: origin.max_len,
                    prefix,
                    asn: origin.asn,
                },
                IpAddr::V6(prefix) => Pdu::Ipv6Prefix {
                    version: 0,
                    flags: origin.flag.to_wire(),
                    prefix_len: origin.prefix_len,
                    max_len: origin.max_len,
                    prefix,
                    asn: origin.asn,
                },
            }),
            Payload::Key(_)
                if self.version() == PROTOCOL_VERSION_0 || self.config.disable_bgpsec =>
            {
                None
            }
            Payload::Key(key) => Some(Pdu::RouterKey {
                version: 0,
                flags: key.flag.to_wire(),
                ski: key.ski,
                asn: key.asn,
                spki: key.spki.clone(),
            }),
            Payload::Aspa(_)
                if self.version() < PROTOCOL_VERSION_2 || self.config.disable_aspa =>
            {
                None
            }
            Payload::Aspa(aspa) => Some(Pdu::Aspa {
                version: 0,
                flags: aspa.flag.to_wire(),
                afi_flags: aspa.afi.to_wire(),
                customer_asn: aspa.customer_asn,
                providers: aspa.providers.clone(),
            }),
        }
    }

    async fn send_error(&mut self, code: ErrorCode, message: &str) {
        self.send_pdu(Pdu::ErrorReport {
            version: 0,
            error_code: code.code(),
            pdu_copy: Vec::new(),
            message: message.to_string(),
        })
        .await;
    }

    /// Stamps the negotiated version and queues the PDU, waiting for a
    /// slot when the outbound queue is full.
    async fn send_pdu(&mut self, mut pdu: Pdu) {
        pdu.set_version(self.version());
        if self.tx.send(pdu).await.is_err() {
            self.connected.store(false, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{Server, ServerConfig};
    use rtrd_store::{Afi, Aspa, Flag, RouteOrigin, RouterKey, Store};
    use tokio::io::DuplexStream;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:12345".parse().unwrap()
    }

    fn vrp() -> Payload {
        Payload::Origin(RouteOrigin {
            prefix: "192.0.2.0".parse().unwrap(),
            prefix_len: 24,
            max_len: 24,
            asn: 64496,
            flag: Flag::Added,
        })
    }

    fn vrp6() -> Payload {
        Payload::Origin(RouteOrigin {
            prefix: "2001:db8::".parse().unwrap(),
            prefix_len: 32,
            max_len: 48,
            asn: 64497,
            flag: Flag::Added,
        })
    }

    fn router_key() -> Payload {
        Payload::Key(RouterKey {
            ski: [0xab; 20],
            asn: 64498,
            spki: vec![0x30, 0x59],
            flag: Flag::Added,
        })
    }

    fn aspa() -> Payload {
        Payload::Aspa(Aspa {
            afi: Afi::Ipv4,
            customer_asn: 64500,
            providers: vec![64501, 64502],
            flag: Flag::Added,
        })
    }

    fn spawn_server(config: ServerConfig, store: Arc<Store>) -> Arc<Server> {
        Arc::new(Server::new(config, store))
    }

    async fn connect(server: &Arc<Server>) -> DuplexStream {
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let server = server.clone();
        tokio::spawn(async move {
            server.handle_connection(server_side, test_addr()).await;
        });
        client_side
    }

    async fn read_pdu(stream: &mut DuplexStream, decoder: &mut PduDecoder) -> Pdu {
        loop {
            if let Some(pdu) = decoder.decode_pdu().unwrap() {
                return pdu;
            }
            let mut buf = [0u8; 1024];
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "unexpected end of stream");
            decoder.extend(&buf[..n]);
        }
    }

    async fn expect_eof(stream: &mut DuplexStream, decoder: &mut PduDecoder) {
        loop {
            assert!(decoder.decode_pdu().unwrap().is_none(), "unexpected PDU");
            let mut buf = [0u8; 1024];
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            decoder.extend(&buf[..n]);
        }
    }

    #[tokio::test]
    async fn test_reset_query_on_empty_store() {
        let store = Arc::new(Store::with_session_id(8, 0x1234));
        let server = spawn_server(ServerConfig::default(), store);
        let mut conn = connect(&server).await;
        let mut decoder = PduDecoder::new();

        conn.write_all(&Pdu::ResetQuery { version: 1 }.to_bytes())
            .await
            .unwrap();
        match read_pdu(&mut conn, &mut decoder).await {
            Pdu::ErrorReport { error_code, .. } => {
                assert_eq!(error_code, ErrorCode::NoDataAvailable.code());
            }
            other => panic!("expected error report, got {}", other),
        }

        // The connection stays open for a later retry.
        conn.write_all(&Pdu::ResetQuery { version: 1 }.to_bytes())
            .await
            .unwrap();
        assert!(matches!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::ErrorReport { .. }
        ));
    }

    #[tokio::test]
    async fn test_reset_query_streams_snapshot() {
        let store = Arc::new(Store::with_session_id(8, 0x1234));
        store.set_serial(42);
        store.install_snapshot(vec![vrp()]);
        let server = spawn_server(ServerConfig::default(), store);
        let mut conn = connect(&server).await;
        let mut decoder = PduDecoder::new();

        conn.write_all(&Pdu::ResetQuery { version: 1 }.to_bytes())
            .await
            .unwrap();

        assert_eq!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::CacheResponse {
                version: 1,
                session_id: 0x1234
            }
        );
        assert_eq!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::Ipv4Prefix {
                version: 1,
                flags: 1,
                prefix_len: 24,
                max_len: 24,
                prefix: "192.0.2.0".parse().unwrap(),
                asn: 64496,
            }
        );
        assert_eq!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::EndOfData {
                version: 1,
                session_id: 0x1234,
                serial: 42,
                refresh: 3600,
                retry: 600,
                expire: 7200,
            }
        );
    }

    #[tokio::test]
    async fn test_serial_query_streams_diff() {
        let store = Arc::new(Store::with_session_id(8, 0x1234));
        store.set_serial(10);
        store.install_snapshot(vec![vrp()]);
        store.install_snapshot(vec![vrp6()]);
        let server = spawn_server(ServerConfig::default(), store);
        let mut conn = connect(&server).await;
        let mut decoder = PduDecoder::new();

        conn.write_all(
            &Pdu::SerialQuery {
                version: 1,
                session_id: 0x1234,
                serial: 10,
            }
            .to_bytes(),
        )
        .await
        .unwrap();

        assert!(matches!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::CacheResponse { version: 1, session_id: 0x1234 }
        ));
        match read_pdu(&mut conn, &mut decoder).await {
            Pdu::Ipv6Prefix { flags, asn, .. } => {
                assert_eq!(flags, 1);
                assert_eq!(asn, 64497);
            }
            other => panic!("expected added prefix, got {}", other),
        }
        match read_pdu(&mut conn, &mut decoder).await {
            Pdu::Ipv4Prefix { flags, asn, .. } => {
                assert_eq!(flags, 0);
                assert_eq!(asn, 64496);
            }
            other => panic!("expected withdrawn prefix, got {}", other),
        }
        assert!(matches!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::EndOfData { serial: 11, .. }
        ));
    }

    #[tokio::test]
    async fn test_serial_query_out_of_window() {
        let store = Arc::new(Store::with_session_id(8, 0x1234));
        store.set_serial(20);
        store.install_snapshot(vec![vrp()]);
        store.install_snapshot(vec![vrp6()]);
        let server = spawn_server(ServerConfig::default(), store);
        let mut conn = connect(&server).await;
        let mut decoder = PduDecoder::new();

        conn.write_all(
            &Pdu::SerialQuery {
                version: 1,
                session_id: 0x1234,
                serial: 5,
            }
            .to_bytes(),
        )
        .await
        .unwrap();
        assert_eq!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::CacheReset { version: 1 }
        );

        // Still serving: the client falls back to a reset query.
        conn.write_all(&Pdu::ResetQuery { version: 1 }.to_bytes())
            .await
            .unwrap();
        assert!(matches!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::CacheResponse { .. }
        ));
    }

    #[tokio::test]
    async fn test_serial_query_session_mismatch() {
        let store = Arc::new(Store::with_session_id(8, 0x1234));
        store.set_serial(42);
        store.install_snapshot(vec![vrp()]);
        let server = spawn_server(ServerConfig::default(), store);
        let mut conn = connect(&server).await;
        let mut decoder = PduDecoder::new();

        conn.write_all(
            &Pdu::SerialQuery {
                version: 1,
                session_id: 0xdead,
                serial: 42,
            }
            .to_bytes(),
        )
        .await
        .unwrap();
        match read_pdu(&mut conn, &mut decoder).await {
            Pdu::ErrorReport { error_code, .. } => {
                assert_eq!(error_code, ErrorCode::CorruptData.code());
            }
            other => panic!("expected error report, got {}", other),
        }
        expect_eof(&mut conn, &mut decoder).await;
    }

    #[tokio::test]
    async fn test_version_downgrade() {
        let store = Arc::new(Store::with_session_id(8, 0x1234));
        store.set_serial(7);
        store.install_snapshot(vec![vrp()]);
        let server = spawn_server(ServerConfig::default(), store);
        let mut conn = connect(&server).await;
        let mut decoder = PduDecoder::new();

        // Client announces v2; server baseline is v1.
        conn.write_all(
            &Pdu::SerialQuery {
                version: 2,
                session_id: 0x1234,
                serial: 7,
            }
            .to_bytes(),
        )
        .await
        .unwrap();
        assert!(matches!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::CacheResponse { version: 1, .. }
        ));
        assert!(matches!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::EndOfData { version: 1, serial: 7, .. }
        ));
    }

    #[tokio::test]
    async fn test_version_enforcement() {
        let store = Arc::new(Store::with_session_id(8, 0x1234));
        let config = ServerConfig {
            enforce_version: true,
            ..ServerConfig::default()
        };
        let server = spawn_server(config, store);
        let mut conn = connect(&server).await;
        let mut decoder = PduDecoder::new();

        conn.write_all(&Pdu::ResetQuery { version: 2 }.to_bytes())
            .await
            .unwrap();
        match read_pdu(&mut conn, &mut decoder).await {
            Pdu::ErrorReport { error_code, .. } => {
                assert_eq!(error_code, ErrorCode::BadProtocolVersion.code());
            }
            other => panic!("expected error report, got {}", other),
        }
        expect_eof(&mut conn, &mut decoder).await;
    }

    #[tokio::test]
    async fn test_illegal_pdu_type_at_version() {
        let store = Arc::new(Store::with_session_id(8, 0x1234));
        let server = spawn_server(ServerConfig::default(), store);
        let mut conn = connect(&server).await;
        let mut decoder = PduDecoder::new();

        // A v0 client must not use Router Key.
        conn.write_all(
            &Pdu::RouterKey {
                version: 0,
                flags: 1,
                ski: [0; 20],
                asn: 1,
                spki: vec![0],
            }
            .to_bytes(),
        )
        .await
        .unwrap();
        match read_pdu(&mut conn, &mut decoder).await {
            Pdu::ErrorReport { error_code, .. } => {
                assert_eq!(error_code, ErrorCode::BadProtocolVersion.code());
            }
            other => panic!("expected error report, got {}", other),
        }
        expect_eof(&mut conn, &mut decoder).await;
    }

    #[tokio::test]
    async fn test_decode_error_closes_without_report() {
        let store = Arc::new(Store::with_session_id(8, 0x1234));
        let server = spawn_server(ServerConfig::default(), store);
        let mut conn = connect(&server).await;
        let mut decoder = PduDecoder::new();

        // Header with an impossible length.
        conn.write_all(&[1, 2, 0, 0, 0, 0, 0, 3]).await.unwrap();
        expect_eof(&mut conn, &mut decoder).await;
    }

    #[tokio::test]
    async fn test_router_key_suppressed_at_v0() {
        let store = Arc::new(Store::with_session_id(8, 0x1234));
        store.set_serial(1);
        store.install_snapshot(vec![vrp(), router_key()]);
        let server = spawn_server(ServerConfig::default(), store);
        let mut conn = connect(&server).await;
        let mut decoder = PduDecoder::new();

        conn.write_all(&Pdu::ResetQuery { version: 0 }.to_bytes())
            .await
            .unwrap();
        assert!(matches!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::CacheResponse { version: 0, .. }
        ));
        assert!(matches!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::Ipv4Prefix { version: 0, .. }
        ));
        // The router key is skipped; End of Data follows directly.
        assert!(matches!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::EndOfData { version: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_router_key_served_at_v1() {
        let store = Arc::new(Store::with_session_id(8, 0x1234));
        store.set_serial(1);
        store.install_snapshot(vec![router_key()]);
        let server = spawn_server(ServerConfig::default(), store);
        let mut conn = connect(&server).await;
        let mut decoder = PduDecoder::new();

        conn.write_all(&Pdu::ResetQuery { version: 1 }.to_bytes())
            .await
            .unwrap();
        assert!(matches!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::CacheResponse { .. }
        ));
        match read_pdu(&mut conn, &mut decoder).await {
            Pdu::RouterKey {
                version,
                flags,
                ski,
                asn,
                ..
            } => {
                assert_eq!(version, 1);
                assert_eq!(flags, 1);
                assert_eq!(ski, [0xab; 20]);
                assert_eq!(asn, 64498);
            }
            other => panic!("expected router key, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_aspa_only_served_at_v2() {
        let store = Arc::new(Store::with_session_id(8, 0x1234));
        store.set_serial(1);
        store.install_snapshot(vec![aspa()]);
        let config = ServerConfig {
            base_version: 2,
            ..ServerConfig::default()
        };
        let server = spawn_server(config, store.clone());

        // A v1 client never sees ASPA records.
        let mut conn = connect(&server).await;
        let mut decoder = PduDecoder::new();
        conn.write_all(&Pdu::ResetQuery { version: 1 }.to_bytes())
            .await
            .unwrap();
        assert!(matches!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::CacheResponse { version: 1, .. }
        ));
        assert!(matches!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::EndOfData { version: 1, .. }
        ));

        // A v2 client does.
        let mut conn = connect(&server).await;
        let mut decoder = PduDecoder::new();
        conn.write_all(&Pdu::ResetQuery { version: 2 }.to_bytes())
            .await
            .unwrap();
        assert!(matches!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::CacheResponse { version: 2, .. }
        ));
        match read_pdu(&mut conn, &mut decoder).await {
            Pdu::Aspa {
                version,
                customer_asn,
                providers,
                ..
            } => {
                assert_eq!(version, 2);
                assert_eq!(customer_asn, 64500);
                assert_eq!(providers, vec![64501, 64502]);
            }
            other => panic!("expected ASPA, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_disable_flags_suppress_objects() {
        let store = Arc::new(Store::with_session_id(8, 0x1234));
        store.set_serial(1);
        store.install_snapshot(vec![router_key(), aspa()]);
        let config = ServerConfig {
            base_version: 2,
            disable_bgpsec: true,
            disable_aspa: true,
            ..ServerConfig::default()
        };
        let server = spawn_server(config, store);
        let mut conn = connect(&server).await;
        let mut decoder = PduDecoder::new();

        conn.write_all(&Pdu::ResetQuery { version: 2 }.to_bytes())
            .await
            .unwrap();
        assert!(matches!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::CacheResponse { .. }
        ));
        assert!(matches!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::EndOfData { .. }
        ));
    }

    #[tokio::test]
    async fn test_client_error_report_keeps_connection() {
        let store = Arc::new(Store::with_session_id(8, 0x1234));
        let server = spawn_server(ServerConfig::default(), store);
        let mut conn = connect(&server).await;
        let mut decoder = PduDecoder::new();

        conn.write_all(
            &Pdu::ErrorReport {
                version: 1,
                error_code: 1,
                pdu_copy: Vec::new(),
                message: "client side trouble".to_string(),
            }
            .to_bytes(),
        )
        .await
        .unwrap();

        // No response to the report, and the connection still answers.
        conn.write_all(&Pdu::ResetQuery { version: 1 }.to_bytes())
            .await
            .unwrap();
        assert!(matches!(
            read_pdu(&mut conn, &mut decoder).await,
            Pdu::ErrorReport { .. }
        ));
    }
}
