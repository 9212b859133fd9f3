//! Server error types.

use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] rtrd_protocol::ProtocolError),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("SSH configuration error: {0}")]
    SshConfig(String),

    #[error("SSH transport error: {0}")]
    Ssh(#[from] russh::Error),
}
