//! JSON object file supplier.
//!
//! Polls an exported JSON file of validated objects and installs each
//! changed version as a new snapshot, then notifies connected clients.
//! A file that fails to parse is logged and skipped; the previously
//! installed dataset stays in place.

use rtrd_server::Server;
use rtrd_store::{Afi, Aspa, Flag, Payload, RouteOrigin, RouterKey, Store};
use serde::Deserialize;
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

#[derive(Debug, Deserialize)]
struct ObjectFile {
    #[serde(default)]
    roas: Vec<RoaRecord>,
    #[serde(default)]
    bgpsec_keys: Vec<KeyRecord>,
    #[serde(default)]
    aspas: Vec<AspaRecord>,
}

#[derive(Debug, Deserialize)]
struct RoaRecord {
    prefix: String,
    #[serde(rename = "maxLength")]
    max_length: u8,
    asn: AsnField,
}

#[derive(Debug, Deserialize)]
struct KeyRecord {
    /// Hex-encoded 20 byte subject key identifier.
    ski: String,
    asn: AsnField,
    /// Hex-encoded DER subject public key info.
    pubkey: String,
}

#[derive(Debug, Deserialize)]
struct AspaRecord {
    customer_asid: u32,
    #[serde(default)]
    afi: u8,
    providers: Vec<u32>,
}

/// AS numbers appear both as plain numbers and as "AS64496" strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AsnField {
    Number(u32),
    Text(String),
}

impl AsnField {
    fn value(&self) -> Result<u32, SourceError> {
        match self {
            AsnField::Number(n) => Ok(*n),
            AsnField::Text(s) => s
                .trim_start_matches("AS")
                .parse()
                .map_err(|_| SourceError::BadAsn(s.clone())),
        }
    }
}

#[derive(Debug)]
pub enum SourceError {
    Io(std::io::Error),
    Json(serde_json::Error),
    BadPrefix(String),
    BadAsn(String),
    BadHex(String),
    BadSki(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Io(e) => write!(f, "cannot read object file: {}", e),
            SourceError::Json(e) => write!(f, "cannot parse object file: {}", e),
            SourceError::BadPrefix(p) => write!(f, "invalid prefix '{}'", p),
            SourceError::BadAsn(a) => write!(f, "invalid AS number '{}'", a),
            SourceError::BadHex(h) => write!(f, "invalid hex string '{}'", h),
            SourceError::BadSki(s) => write!(f, "SKI '{}' is not 20 bytes", s),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        SourceError::Io(e)
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Json(e)
    }
}

/// Reads and converts one object file.
pub fn load_file(path: &Path) -> Result<Vec<Payload>, SourceError> {
    let content = std::fs::read_to_string(path)?;
    let file: ObjectFile = serde_json::from_str(&content)?;
    payloads(&file)
}

fn payloads(file: &ObjectFile) -> Result<Vec<Payload>, SourceError> {
    let mut result = Vec::new();
    for roa in &file.roas {
        let (prefix, prefix_len) = parse_prefix(&roa.prefix)?;
        result.push(Payload::Origin(RouteOrigin {
            prefix,
            prefix_len,
            max_len: roa.max_length,
            asn: roa.asn.value()?,
            flag: Flag::Added,
        }));
    }
    for key in &file.bgpsec_keys {
        let ski_bytes = from_hex(&key.ski)?;
        let ski: [u8; 20] = ski_bytes
            .try_into()
            .map_err(|_| SourceError::BadSki(key.ski.clone()))?;
        result.push(Payload::Key(RouterKey {
            ski,
            asn: key.asn.value()?,
            spki: from_hex(&key.pubkey)?,
            flag: Flag::Added,
        }));
    }
    for aspa in &file.aspas {
        result.push(Payload::Aspa(Aspa {
            afi: Afi::from_wire(aspa.afi),
            customer_asn: aspa.customer_asid,
            providers: aspa.providers.clone(),
            flag: Flag::Added,
        }));
    }
    Ok(result)
}

fn parse_prefix(text: &str) -> Result<(IpAddr, u8), SourceError> {
    let (addr, len) = text
        .split_once('/')
        .ok_or_else(|| SourceError::BadPrefix(text.to_string()))?;
    let prefix: IpAddr = addr
        .parse()
        .map_err(|_| SourceError::BadPrefix(text.to_string()))?;
    let prefix_len: u8 = len
        .parse()
        .map_err(|_| SourceError::BadPrefix(text.to_string()))?;
    let max = if prefix.is_ipv4() { 32 } else { 128 };
    if prefix_len > max {
        return Err(SourceError::BadPrefix(text.to_string()));
    }
    Ok((prefix, prefix_len))
}

fn from_hex(text: &str) -> Result<Vec<u8>, SourceError> {
    if text.len() % 2 != 0 {
        return Err(SourceError::BadHex(text.to_string()));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16)
                .map_err(|_| SourceError::BadHex(text.to_string()))
        })
        .collect()
}

/// Polls `path` and installs a new snapshot whenever it changes.
pub async fn watch_file(path: PathBuf, interval: Duration, store: Arc<Store>, server: Arc<Server>) {
    let mut last_modified: Option<SystemTime> = None;
    loop {
        match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => {
                if last_modified != Some(modified) {
                    match load_file(&path) {
                        Ok(objects) => {
                            let count = objects.len();
                            store.install_snapshot(objects);
                            server.notify_clients_latest();
                            tracing::info!(
                                "installed {} objects from {} (serial {:?})",
                                count,
                                path.display(),
                                store.current_serial()
                            );
                            last_modified = Some(modified);
                        }
                        Err(e) => {
                            tracing::error!("skipping {}: {}", path.display(), e);
                            last_modified = Some(modified);
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!("cannot stat {}: {}", path.display(), e);
            }
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_file() {
        let json = r#"{
            "metadata": { "counts": 2 },
            "roas": [
                { "prefix": "192.0.2.0/24", "maxLength": 24, "asn": "AS64496" },
                { "prefix": "2001:db8::/32", "maxLength": 48, "asn": 64497 }
            ],
            "bgpsec_keys": [
                { "ski": "abababababababababababababababababababab",
                  "asn": 64498,
                  "pubkey": "3059" }
            ],
            "aspas": [
                { "customer_asid": 64500, "afi": 0, "providers": [64501, 64502] }
            ]
        }"#;
        let file: ObjectFile = serde_json::from_str(json).unwrap();
        let payloads = payloads(&file).unwrap();
        assert_eq!(payloads.len(), 4);

        match &payloads[0] {
            Payload::Origin(o) => {
                assert_eq!(o.prefix, "192.0.2.0".parse::<IpAddr>().unwrap());
                assert_eq!(o.prefix_len, 24);
                assert_eq!(o.asn, 64496);
            }
            other => panic!("expected VRP, got {}", other),
        }
        match &payloads[2] {
            Payload::Key(k) => {
                assert_eq!(k.ski, [0xab; 20]);
                assert_eq!(k.spki, vec![0x30, 0x59]);
            }
            other => panic!("expected router key, got {}", other),
        }
        match &payloads[3] {
            Payload::Aspa(a) => {
                assert_eq!(a.customer_asn, 64500);
                assert_eq!(a.providers, vec![64501, 64502]);
            }
            other => panic!("expected ASPA, got {}", other),
        }
    }

    #[test]
    fn test_bad_prefix_rejected() {
        assert!(parse_prefix("not-a-prefix").is_err());
        assert!(parse_prefix("192.0.2.0/33").is_err());
        assert!(parse_prefix("2001:db8::/129").is_err());
        assert!(parse_prefix("192.0.2.0/24").is_ok());
    }

    #[test]
    fn test_bad_asn_rejected() {
        let asn = AsnField::Text("ASmany".to_string());
        assert!(asn.value().is_err());
        let asn = AsnField::Text("AS64496".to_string());
        assert_eq!(asn.value().unwrap(), 64496);
    }

    #[test]
    fn test_hex_parsing() {
        assert_eq!(from_hex("3059").unwrap(), vec![0x30, 0x59]);
        assert!(from_hex("305").is_err());
        assert!(from_hex("30zz").is_err());
    }

    #[test]
    fn test_short_ski_rejected() {
        let json = r#"{ "bgpsec_keys": [ { "ski": "abab", "asn": 1, "pubkey": "3059" } ] }"#;
        let file: ObjectFile = serde_json::from_str(json).unwrap();
        assert!(matches!(payloads(&file), Err(SourceError::BadSki(_))));
    }
}
