//! # rtrd-server
//!
//! Multi-transport server front end for the RTR protocol.
//!
//! This crate provides:
//! - Per-connection reader/writer tasks with a bounded outbound queue
//! - Protocol version negotiation, downgrade and enforcement
//! - Snapshot and diff streaming from a [`rtrd_store::PayloadSource`]
//! - Plain TCP, TLS and SSH (`rpki-rtr` subsystem) listeners
//! - Client registry with admission control and Serial Notify fan-out

mod client;
pub mod config;
pub mod error;
pub mod server;
pub mod ssh;
pub mod tls;

pub use config::{Config, ConfigError, RtrConfig, SshConfig, TlsConfig};
pub use error::ServerError;
pub use server::{Server, ServerConfig};
