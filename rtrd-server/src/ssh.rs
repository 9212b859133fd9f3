//! SSH transport.
//!
//! RTR over SSH (RFC 6810 section 7) runs as the `rpki-rtr` subsystem
//! of an SSH session. Only `session` channels are accepted; a request
//! for any other subsystem closes the channel. Once the subsystem is
//! granted, the channel's byte stream feeds the same connection
//! handler as the TCP and TLS transports.

use crate::error::ServerError;
use crate::server::Server;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpStream;

/// The subsystem name routers request, byte-exact per the RFC.
pub const SUBSYSTEM_NAME: &str = "rpki-rtr";

/// Builds a prepared SSH server configuration from an OpenSSH host key.
pub fn create_ssh_config(host_key_path: &Path) -> Result<Arc<russh::server::Config>, ServerError> {
    let key = russh::keys::load_secret_key(host_key_path, None).map_err(|e| {
        ServerError::SshConfig(format!(
            "cannot load host key {:?}: {}",
            host_key_path, e
        ))
    })?;
    let config = russh::server::Config {
        keys: vec![key],
        ..Default::default()
    };
    Ok(Arc::new(config))
}

/// Runs the SSH handshake and subsystem gate on an accepted socket.
pub(crate) async fn run_session(
    server: Arc<Server>,
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<russh::server::Config>,
) -> Result<(), ServerError> {
    let handler = SshSession {
        server,
        peer,
        channels: HashMap::new(),
    };
    let session = russh::server::run_stream(config, stream, handler).await?;
    session.await?;
    Ok(())
}

struct SshSession {
    server: Arc<Server>,
    peer: SocketAddr,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

#[async_trait::async_trait]
impl Handler for SshSession {
    type Error = russh::Error;

    // Which authentication methods are offered is decided by the
    // prepared configuration, not here.
    async fn auth_none(&mut self, _user: &str) -> Result<Auth, Self::Error> {
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if name == SUBSYSTEM_NAME {
            if let Some(channel) = self.channels.remove(&channel_id) {
                let _ = session.channel_success(channel_id);
                tracing::debug!("[{}] rpki-rtr subsystem established", self.peer);
                let server = self.server.clone();
                let peer = self.peer;
                tokio::spawn(async move {
                    server.handle_connection(channel.into_stream(), peer).await;
                });
                return Ok(());
            }
        }
        tracing::debug!("[{}] rejecting subsystem {:?}", self.peer, name);
        let _ = session.channel_failure(channel_id);
        let _ = session.close(channel_id);
        Ok(())
    }
}
