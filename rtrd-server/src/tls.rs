//! TLS acceptor construction.
//!
//! Routers connect over TLS exactly like over plain TCP; the accept
//! loop only needs a prepared acceptor. All certificate plumbing lives
//! here: each configured file is scanned once for its PEM items, and
//! every failure names the file it came from.

use crate::config::TlsConfig;
use crate::error::ServerError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pemfile::Item;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// Builds a prepared acceptor from the configured PEM files.
pub fn create_tls_acceptor(config: &TlsConfig) -> Result<TlsAcceptor, ServerError> {
    let (Some(cert_path), Some(key_path)) = (&config.cert_path, &config.key_path) else {
        return Err(ServerError::TlsConfig(
            "TLS listener needs both cert_path and key_path".into(),
        ));
    };

    let certs: Vec<CertificateDer<'static>> = pem_items(cert_path)?
        .into_iter()
        .filter_map(|item| match item {
            Item::X509Certificate(cert) => Some(cert),
            _ => None,
        })
        .collect();
    if certs.is_empty() {
        return Err(file_error(cert_path, "contains no certificates"));
    }

    let key = pem_items(key_path)?
        .into_iter()
        .find_map(|item| match item {
            Item::Pkcs1Key(key) => Some(PrivateKeyDer::from(key)),
            Item::Pkcs8Key(key) => Some(PrivateKeyDer::from(key)),
            Item::Sec1Key(key) => Some(PrivateKeyDer::from(key)),
            _ => None,
        })
        .ok_or_else(|| file_error(key_path, "contains no private key"))?;

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::TlsConfig(format!("certificate chain rejected: {}", e)))?;

    Ok(TlsAcceptor::from(Arc::new(tls_config)))
}

/// Reads every PEM item out of one file.
fn pem_items(path: &Path) -> Result<Vec<Item>, ServerError> {
    let file = File::open(path).map_err(|e| file_error(path, &e.to_string()))?;
    rustls_pemfile::read_all(&mut BufReader::new(file))
        .map(|item| item.map_err(|e| file_error(path, &e.to_string())))
        .collect()
}

fn file_error(path: &Path, detail: &str) -> ServerError {
    ServerError::TlsConfig(format!("{}: {}", path.display(), detail))
}
