//! RTR protocol data units.
//!
//! Every PDU starts with the same 8 byte header:
//!
//! ```text
//! +---------+----------+---------------+-----------------+
//! | version | pdu type | type-specific |     length      |
//! | 1 byte  |  1 byte  |    2 bytes    |     4 bytes     |
//! +---------+----------+---------------+-----------------+
//! | body (length - 8 bytes)                              |
//! +------------------------------------------------------+
//! ```
//!
//! All integers are network byte order and `length` covers the header.
//! The 2 byte type-specific field carries the session id for most types,
//! the error code for Error Report, and the flags byte (in its high
//! octet) for Router Key.

use crate::error::ProtocolError;
use crate::{HEADER_SIZE, MAX_PDU_SIZE, PROTOCOL_VERSION_1, PROTOCOL_VERSION_2};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

const TYPE_SERIAL_NOTIFY: u8 = 0;
const TYPE_SERIAL_QUERY: u8 = 1;
const TYPE_RESET_QUERY: u8 = 2;
const TYPE_CACHE_RESPONSE: u8 = 3;
const TYPE_IPV4_PREFIX: u8 = 4;
const TYPE_IPV6_PREFIX: u8 = 6;
const TYPE_END_OF_DATA: u8 = 7;
const TYPE_CACHE_RESET: u8 = 8;
const TYPE_ROUTER_KEY: u8 = 9;
const TYPE_ERROR_REPORT: u8 = 10;
const TYPE_ASPA: u8 = 11;

/// A single RTR protocol data unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdu {
    SerialNotify {
        version: u8,
        session_id: u16,
        serial: u32,
    },
    SerialQuery {
        version: u8,
        session_id: u16,
        serial: u32,
    },
    ResetQuery {
        version: u8,
    },
    CacheResponse {
        version: u8,
        session_id: u16,
    },
    Ipv4Prefix {
        version: u8,
        flags: u8,
        prefix_len: u8,
        max_len: u8,
        prefix: Ipv4Addr,
        asn: u32,
    },
    Ipv6Prefix {
        version: u8,
        flags: u8,
        prefix_len: u8,
        max_len: u8,
        prefix: Ipv6Addr,
        asn: u32,
    },
    EndOfData {
        version: u8,
        session_id: u16,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
    },
    CacheReset {
        version: u8,
    },
    /// The flags byte travels in the high octet of the header's
    /// session id slot; there is no separate body field for it.
    RouterKey {
        version: u8,
        flags: u8,
        ski: [u8; 20],
        asn: u32,
        spki: Vec<u8>,
    },
    ErrorReport {
        version: u8,
        error_code: u16,
        pdu_copy: Vec<u8>,
        message: String,
    },
    Aspa {
        version: u8,
        flags: u8,
        afi_flags: u8,
        customer_asn: u32,
        providers: Vec<u32>,
    },
}

impl Pdu {
    /// Returns the wire type id.
    pub fn type_id(&self) -> u8 {
        match self {
            Pdu::SerialNotify { .. } => TYPE_SERIAL_NOTIFY,
            Pdu::SerialQuery { .. } => TYPE_SERIAL_QUERY,
            Pdu::ResetQuery { .. } => TYPE_RESET_QUERY,
            Pdu::CacheResponse { .. } => TYPE_CACHE_RESPONSE,
            Pdu::Ipv4Prefix { .. } => TYPE_IPV4_PREFIX,
            Pdu::Ipv6Prefix { .. } => TYPE_IPV6_PREFIX,
            Pdu::EndOfData { .. } => TYPE_END_OF_DATA,
            Pdu::CacheReset { .. } => TYPE_CACHE_RESET,
            Pdu::RouterKey { .. } => TYPE_ROUTER_KEY,
            Pdu::ErrorReport { .. } => TYPE_ERROR_REPORT,
            Pdu::Aspa { .. } => TYPE_ASPA,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Pdu::SerialNotify { .. } => "Serial Notify",
            Pdu::SerialQuery { .. } => "Serial Query",
            Pdu::ResetQuery { .. } => "Reset Query",
            Pdu::CacheResponse { .. } => "Cache Response",
            Pdu::Ipv4Prefix { .. } => "IPv4 Prefix",
            Pdu::Ipv6Prefix { .. } => "IPv6 Prefix",
            Pdu::EndOfData { .. } => "End of Data",
            Pdu::CacheReset { .. } => "Cache Reset",
            Pdu::RouterKey { .. } => "Router Key",
            Pdu::ErrorReport { .. } => "Error Report",
            Pdu::Aspa { .. } => "ASPA",
        }
    }

    /// Returns the protocol version stamped on this PDU.
    pub fn version(&self) -> u8 {
        match self {
            Pdu::SerialNotify { version, .. }
            | Pdu::SerialQuery { version, .. }
            | Pdu::ResetQuery { version }
            | Pdu::CacheResponse { version, .. }
            | Pdu::Ipv4Prefix { version, .. }
            | Pdu::Ipv6Prefix { version, .. }
            | Pdu::EndOfData { version, .. }
            | Pdu::CacheReset { version }
            | Pdu::RouterKey { version, .. }
            | Pdu::ErrorReport { version, .. }
            | Pdu::Aspa { version, .. } => *version,
        }
    }

    /// Restamps the protocol version, done just before emission.
    pub fn set_version(&mut self, new: u8) {
        match self {
            Pdu::SerialNotify { version, .. }
            | Pdu::SerialQuery { version, .. }
            | Pdu::ResetQuery { version }
            | Pdu::CacheResponse { version, .. }
            | Pdu::Ipv4Prefix { version, .. }
            | Pdu::Ipv6Prefix { version, .. }
            | Pdu::EndOfData { version, .. }
            | Pdu::CacheReset { version }
            | Pdu::RouterKey { version, .. }
            | Pdu::ErrorReport { version, .. }
            | Pdu::Aspa { version, .. } => *version = new,
        }
    }

    /// Whether this PDU type may appear at the given protocol version.
    ///
    /// Router Key arrived with version 1, ASPA with version 2.
    pub fn is_legal_at(&self, version: u8) -> bool {
        if version > PROTOCOL_VERSION_2 {
            return false;
        }
        match self {
            Pdu::RouterKey { .. } => version >= PROTOCOL_VERSION_1,
            Pdu::Aspa { .. } => version >= PROTOCOL_VERSION_2,
            _ => true,
        }
    }

    /// Serializes the PDU, header included, into `buf`.
    pub fn write(&self, buf: &mut BytesMut) {
        match self {
            Pdu::SerialNotify {
                version,
                session_id,
                serial,
            } => {
                put_header(buf, *version, TYPE_SERIAL_NOTIFY, *session_id, 12);
                buf.put_u32(*serial);
            }
            Pdu::SerialQuery {
                version,
                session_id,
                serial,
            } => {
                put_header(buf, *version, TYPE_SERIAL_QUERY, *session_id, 12);
                buf.put_u32(*serial);
            }
            Pdu::ResetQuery { version } => {
                put_header(buf, *version, TYPE_RESET_QUERY, 0, 8);
            }
            Pdu::CacheResponse {
                version,
                session_id,
            } => {
                put_header(buf, *version, TYPE_CACHE_RESPONSE, *session_id, 8);
            }
            Pdu::Ipv4Prefix {
                version,
                flags,
                prefix_len,
                max_len,
                prefix,
                asn,
            } => {
                put_header(buf, *version, TYPE_IPV4_PREFIX, 0, 20);
                buf.put_u8(*flags);
                buf.put_u8(*prefix_len);
                buf.put_u8(*max_len);
                buf.put_u8(0);
                buf.put_slice(&prefix.octets());
                buf.put_u32(*asn);
            }
            Pdu::Ipv6Prefix {
                version,
                flags,
                prefix_len,
                max_len,
                prefix,
                asn,
            } => {
                put_header(buf, *version, TYPE_IPV6_PREFIX, 0, 32);
                buf.put_u8(*flags);
                buf.put_u8(*prefix_len);
                buf.put_u8(*max_len);
                buf.put_u8(0);
                buf.put_slice(&prefix.octets());
                buf.put_u32(*asn);
            }
            Pdu::EndOfData {
                version,
                session_id,
                serial,
                refresh,
                retry,
                expire,
            } => {
                // Version 0 carries the serial only (RFC 6810); later
                // versions append the three timer intervals (RFC 8210).
                if *version == crate::PROTOCOL_VERSION_0 {
                    put_header(buf, *version, TYPE_END_OF_DATA, *session_id, 12);
                    buf.put_u32(*serial);
                } else {
                    put_header(buf, *version, TYPE_END_OF_DATA, *session_id, 24);
                    buf.put_u32(*serial);
                    buf.put_u32(*refresh);
                    buf.put_u32(*retry);
                    buf.put_u32(*expire);
                }
            }
            Pdu::CacheReset { version } => {
                put_header(buf, *version, TYPE_CACHE_RESET, 0, 8);
            }
            Pdu::RouterKey {
                version,
                flags,
                ski,
                asn,
                spki,
            } => {
                put_header(
                    buf,
                    *version,
                    TYPE_ROUTER_KEY,
                    (*flags as u16) << 8,
                    32 + spki.len() as u32,
                );
                buf.put_slice(ski);
                buf.put_u32(*asn);
                buf.put_slice(spki);
            }
            Pdu::ErrorReport {
                version,
                error_code,
                pdu_copy,
                message,
            } => {
                // Some clients require NUL-terminated error text; the
                // terminator counts toward the text length field.
                let nul = usize::from(!message.is_empty());
                let length = 16 + pdu_copy.len() + message.len() + nul;
                put_header(buf, *version, TYPE_ERROR_REPORT, *error_code, length as u32);
                buf.put_u32(pdu_copy.len() as u32);
                buf.put_slice(pdu_copy);
                buf.put_u32((message.len() + nul) as u32);
                if !message.is_empty() {
                    buf.put_slice(message.as_bytes());
                    buf.put_u8(0);
                }
            }
            Pdu::Aspa {
                version,
                flags,
                afi_flags,
                customer_asn,
                providers,
            } => {
                put_header(
                    buf,
                    *version,
                    TYPE_ASPA,
                    0,
                    16 + 4 * providers.len() as u32,
                );
                buf.put_u8(*flags);
                buf.put_u8(*afi_flags);
                buf.put_u16(providers.len() as u16);
                buf.put_u32(*customer_asn);
                for provider in providers {
                    buf.put_u32(*provider);
                }
            }
        }
    }

    /// Serializes the PDU into a fresh byte buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.write(&mut buf);
        buf.freeze()
    }

    /// Decodes one PDU from the front of `buf`.
    ///
    /// Returns `Ok(Some(pdu))` and consumes its bytes if a complete PDU
    /// is available, `Ok(None)` if more data is needed, or `Err` on a
    /// structural violation. The length bounds are checked as soon as
    /// the header is in, before the body is buffered.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Pdu>, ProtocolError> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let version = buf[0];
        let pdu_type = buf[1];
        let slot = u16::from_be_bytes([buf[2], buf[3]]);
        let length = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);

        if length < HEADER_SIZE as u32 {
            return Err(ProtocolError::LengthBelowHeader(length));
        }
        if length > MAX_PDU_SIZE {
            return Err(ProtocolError::LengthTooLarge {
                size: length,
                max: MAX_PDU_SIZE,
            });
        }
        if buf.len() < length as usize {
            return Ok(None);
        }

        buf.advance(HEADER_SIZE);
        let body = buf.split_to(length as usize - HEADER_SIZE);

        match pdu_type {
            TYPE_SERIAL_NOTIFY => {
                expect_body(&body, 4, "Serial Notify")?;
                Ok(Some(Pdu::SerialNotify {
                    version,
                    session_id: slot,
                    serial: read_u32(&body, 0),
                }))
            }
            TYPE_SERIAL_QUERY => {
                expect_body(&body, 4, "Serial Query")?;
                Ok(Some(Pdu::SerialQuery {
                    version,
                    session_id: slot,
                    serial: read_u32(&body, 0),
                }))
            }
            TYPE_RESET_QUERY => {
                expect_body(&body, 0, "Reset Query")?;
                Ok(Some(Pdu::ResetQuery { version }))
            }
            TYPE_CACHE_RESPONSE => {
                expect_body(&body, 0, "Cache Response")?;
                Ok(Some(Pdu::CacheResponse {
                    version,
                    session_id: slot,
                }))
            }
            TYPE_IPV4_PREFIX => {
                expect_body(&body, 12, "IPv4 Prefix")?;
                let octets: [u8; 4] = body[4..8].try_into().unwrap();
                Ok(Some(Pdu::Ipv4Prefix {
                    version,
                    flags: body[0],
                    prefix_len: body[1],
                    max_len: body[2],
                    prefix: Ipv4Addr::from(octets),
                    asn: read_u32(&body, 8),
                }))
            }
            TYPE_IPV6_PREFIX => {
                expect_body(&body, 24, "IPv6 Prefix")?;
                let octets: [u8; 16] = body[4..20].try_into().unwrap();
                Ok(Some(Pdu::Ipv6Prefix {
                    version,
                    flags: body[0],
                    prefix_len: body[1],
                    max_len: body[2],
                    prefix: Ipv6Addr::from(octets),
                    asn: read_u32(&body, 20),
                }))
            }
            TYPE_END_OF_DATA => {
                if body.len() != 4 && body.len() != 16 {
                    return Err(ProtocolError::WrongBodyLength {
                        pdu: "End of Data",
                        len: body.len(),
                    });
                }
                let (refresh, retry, expire) = if body.len() == 16 {
                    (read_u32(&body, 4), read_u32(&body, 8), read_u32(&body, 12))
                } else {
                    (0, 0, 0)
                };
                Ok(Some(Pdu::EndOfData {
                    version,
                    session_id: slot,
                    serial: read_u32(&body, 0),
                    refresh,
                    retry,
                    expire,
                }))
            }
            TYPE_CACHE_RESET => {
                expect_body(&body, 0, "Cache Reset")?;
                Ok(Some(Pdu::CacheReset { version }))
            }
            TYPE_ROUTER_KEY => {
                if body.len() < 28 {
                    return Err(ProtocolError::RouterKeyTooShort(body.len()));
                }
                let ski: [u8; 20] = body[..20].try_into().unwrap();
                Ok(Some(Pdu::RouterKey {
                    version,
                    // Router Key reuses the session id slot: high octet
                    // is the flags byte, low octet is zero.
                    flags: (slot >> 8) as u8,
                    ski,
                    asn: read_u32(&body, 20),
                    spki: body[24..].to_vec(),
                }))
            }
            TYPE_ERROR_REPORT => {
                if body.len() < 8 {
                    return Err(ProtocolError::WrongBodyLength {
                        pdu: "Error Report",
                        len: body.len(),
                    });
                }
                // Embedded length fields are attacker controlled; all
                // arithmetic stays in usize and is checked.
                let copy_len = read_u32(&body, 0) as usize;
                let text_off = copy_len
                    .checked_add(8)
                    .filter(|&n| body.len() >= n)
                    .ok_or(ProtocolError::ErrorReportLengths)?;
                let text_len = read_u32(&body, copy_len + 4) as usize;
                let end = text_off
                    .checked_add(text_len)
                    .filter(|&n| body.len() >= n)
                    .ok_or(ProtocolError::ErrorReportLengths)?;
                let mut text = body[text_off..end].to_vec();
                if text.last() == Some(&0) {
                    text.pop();
                }
                Ok(Some(Pdu::ErrorReport {
                    version,
                    error_code: slot,
                    pdu_copy: body[4..copy_len + 4].to_vec(),
                    message: String::from_utf8_lossy(&text).into_owned(),
                }))
            }
            TYPE_ASPA => {
                if body.len() < 8 {
                    return Err(ProtocolError::WrongBodyLength {
                        pdu: "ASPA",
                        len: body.len(),
                    });
                }
                let count = u16::from_be_bytes([body[2], body[3]]);
                if body.len() - 8 != 4 * count as usize {
                    return Err(ProtocolError::AspaProviderCount {
                        count,
                        len: body.len(),
                    });
                }
                let providers = (0..count as usize)
                    .map(|i| read_u32(&body, 8 + 4 * i))
                    .collect();
                Ok(Some(Pdu::Aspa {
                    version,
                    flags: body[0],
                    afi_flags: body[1],
                    customer_asn: read_u32(&body, 4),
                    providers,
                }))
            }
            other => Err(ProtocolError::UnknownPduType(other)),
        }
    }
}

fn put_header(buf: &mut BytesMut, version: u8, pdu_type: u8, slot: u16, length: u32) {
    buf.reserve(length as usize);
    buf.put_u8(version);
    buf.put_u8(pdu_type);
    buf.put_u16(slot);
    buf.put_u32(length);
}

fn expect_body(body: &[u8], want: usize, pdu: &'static str) -> Result<(), ProtocolError> {
    if body.len() != want {
        return Err(ProtocolError::WrongBodyLength {
            pdu,
            len: body.len(),
        });
    }
    Ok(())
}

fn read_u32(body: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([body[off], body[off + 1], body[off + 2], body[off + 3]])
}

impl fmt::Display for Pdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pdu::SerialNotify {
                version,
                session_id,
                serial,
            } => write!(
                f,
                "Serial Notify v{} (session: {}): serial: {}",
                version, session_id, serial
            ),
            Pdu::SerialQuery {
                version,
                session_id,
                serial,
            } => write!(
                f,
                "Serial Query v{} (session: {}): serial: {}",
                version, session_id, serial
            ),
            Pdu::ResetQuery { version } => write!(f, "Reset Query v{}", version),
            Pdu::CacheResponse {
                version,
                session_id,
            } => write!(f, "Cache Response v{} (session: {})", version, session_id),
            Pdu::Ipv4Prefix {
                version,
                flags,
                prefix_len,
                max_len,
                prefix,
                asn,
            } => write!(
                f,
                "IPv4 Prefix v{} {}/{} (-> /{}), origin: AS{}, flags: {}",
                version, prefix, prefix_len, max_len, asn, flags
            ),
            Pdu::Ipv6Prefix {
                version,
                flags,
                prefix_len,
                max_len,
                prefix,
                asn,
            } => write!(
                f,
                "IPv6 Prefix v{} {}/{} (-> /{}), origin: AS{}, flags: {}",
                version, prefix, prefix_len, max_len, asn, flags
            ),
            Pdu::EndOfData {
                version,
                session_id,
                serial,
                refresh,
                retry,
                expire,
            } => write!(
                f,
                "End of Data v{} (session: {}): serial: {}, refresh: {}, retry: {}, expire: {}",
                version, session_id, serial, refresh, retry, expire
            ),
            Pdu::CacheReset { version } => write!(f, "Cache Reset v{}", version),
            Pdu::RouterKey {
                version,
                flags,
                asn,
                ..
            } => write!(f, "Router Key v{} AS{}, flags: {}", version, asn, flags),
            Pdu::ErrorReport {
                version,
                error_code,
                message,
                ..
            } => write!(
                f,
                "Error Report v{} (code: {}): {}",
                version, error_code, message
            ),
            Pdu::Aspa {
                version,
                flags,
                customer_asn,
                providers,
                ..
            } => write!(
                f,
                "ASPA v{} AS{} -> {:?}, flags: {}",
                version, customer_asn, providers, flags
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(pdu: &Pdu) -> Pdu {
        let mut buf = BytesMut::from(&pdu.to_bytes()[..]);
        let decoded = Pdu::decode(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty(), "decode left trailing bytes");
        decoded
    }

    #[test]
    fn test_serial_notify_wire_format() {
        let pdu = Pdu::SerialNotify {
            version: 1,
            session_id: 0x1234,
            serial: 42,
        };
        let bytes = pdu.to_bytes();
        assert_eq!(
            &bytes[..],
            &[1, 0, 0x12, 0x34, 0, 0, 0, 12, 0, 0, 0, 42][..]
        );
        assert_eq!(roundtrip(&pdu), pdu);
    }

    #[test]
    fn test_reset_query_wire_format() {
        let pdu = Pdu::ResetQuery { version: 1 };
        assert_eq!(&pdu.to_bytes()[..], &[1, 2, 0, 0, 0, 0, 0, 8][..]);
        assert_eq!(roundtrip(&pdu), pdu);
    }

    #[test]
    fn test_ipv4_prefix_wire_format() {
        let pdu = Pdu::Ipv4Prefix {
            version: 1,
            flags: 1,
            prefix_len: 24,
            max_len: 24,
            prefix: "192.0.2.0".parse().unwrap(),
            asn: 64496,
        };
        let bytes = pdu.to_bytes();
        assert_eq!(
            &bytes[..],
            &[
                1, 4, 0, 0, 0, 0, 0, 20, // header
                1, 24, 24, 0, // flags, lengths, zero
                192, 0, 2, 0, // prefix
                0, 0, 0xfb, 0xf0, // AS64496
            ][..]
        );
        assert_eq!(roundtrip(&pdu), pdu);
    }

    #[test]
    fn test_ipv6_prefix_roundtrip() {
        let pdu = Pdu::Ipv6Prefix {
            version: 2,
            flags: 0,
            prefix_len: 48,
            max_len: 64,
            prefix: "2001:db8::".parse().unwrap(),
            asn: 64511,
        };
        let bytes = pdu.to_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(roundtrip(&pdu), pdu);
    }

    #[test]
    fn test_end_of_data_v0_short_form() {
        let pdu = Pdu::EndOfData {
            version: 0,
            session_id: 7,
            serial: 100,
            refresh: 0,
            retry: 0,
            expire: 0,
        };
        let bytes = pdu.to_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(roundtrip(&pdu), pdu);
    }

    #[test]
    fn test_end_of_data_v1_carries_intervals() {
        let pdu = Pdu::EndOfData {
            version: 1,
            session_id: 7,
            serial: 100,
            refresh: 3600,
            retry: 600,
            expire: 7200,
        };
        let bytes = pdu.to_bytes();
        assert_eq!(bytes.len(), 24);
        let decoded = roundtrip(&pdu);
        assert_eq!(decoded, pdu);
        match decoded {
            Pdu::EndOfData {
                refresh,
                retry,
                expire,
                ..
            } => {
                assert_eq!((refresh, retry, expire), (3600, 600, 7200));
            }
            other => panic!("unexpected PDU: {}", other),
        }
    }

    #[test]
    fn test_router_key_flags_travel_in_session_slot() {
        let pdu = Pdu::RouterKey {
            version: 1,
            flags: 1,
            ski: [0xab; 20],
            asn: 64496,
            spki: vec![0x30, 0x59, 0x01, 0x02],
        };
        let bytes = pdu.to_bytes();
        assert_eq!(bytes[2], 1, "flags in high octet of the slot");
        assert_eq!(bytes[3], 0, "low octet of the slot stays zero");
        assert_eq!(bytes.len(), 36);
        assert_eq!(roundtrip(&pdu), pdu);
    }

    #[test]
    fn test_router_key_body_too_short() {
        // 27 byte body, one short of the fixed part.
        let mut buf = BytesMut::new();
        buf.put_slice(&[1, 9, 0, 0, 0, 0, 0, 35]);
        buf.put_slice(&[0u8; 27]);
        assert!(matches!(
            Pdu::decode(&mut buf),
            Err(ProtocolError::RouterKeyTooShort(27))
        ));
    }

    #[test]
    fn test_error_report_roundtrip() {
        let inner = Pdu::ResetQuery { version: 1 }.to_bytes();
        let pdu = Pdu::ErrorReport {
            version: 1,
            error_code: 2,
            pdu_copy: inner.to_vec(),
            message: "No data available".to_string(),
        };
        let bytes = pdu.to_bytes();
        // NUL terminator counted in the text length field.
        assert_eq!(*bytes.last().unwrap(), 0);
        assert_eq!(roundtrip(&pdu), pdu);
    }

    #[test]
    fn test_error_report_empty_message() {
        let pdu = Pdu::ErrorReport {
            version: 0,
            error_code: 1,
            pdu_copy: Vec::new(),
            message: String::new(),
        };
        let bytes = pdu.to_bytes();
        assert_eq!(bytes.len(), 16);
        assert_eq!(roundtrip(&pdu), pdu);
    }

    #[test]
    fn test_error_report_embedded_length_overflow() {
        // Encapsulated PDU length of u32::MAX must not overflow or
        // panic, just fail.
        let mut buf = BytesMut::new();
        buf.put_slice(&[1, 10, 0, 0, 0, 0, 0, 16]);
        buf.put_u32(u32::MAX);
        buf.put_u32(0);
        assert!(matches!(
            Pdu::decode(&mut buf),
            Err(ProtocolError::ErrorReportLengths)
        ));
    }

    #[test]
    fn test_error_report_text_length_overflow() {
        let mut buf = BytesMut::new();
        buf.put_slice(&[1, 10, 0, 0, 0, 0, 0, 16]);
        buf.put_u32(0);
        buf.put_u32(u32::MAX);
        assert!(matches!(
            Pdu::decode(&mut buf),
            Err(ProtocolError::ErrorReportLengths)
        ));
    }

    #[test]
    fn test_aspa_roundtrip() {
        let pdu = Pdu::Aspa {
            version: 2,
            flags: 1,
            afi_flags: 0,
            customer_asn: 64500,
            providers: vec![64501, 64502, 64503],
        };
        let bytes = pdu.to_bytes();
        assert_eq!(bytes.len(), 28);
        assert_eq!(roundtrip(&pdu), pdu);
    }

    #[test]
    fn test_aspa_provider_count_mismatch() {
        let mut buf = BytesMut::new();
        buf.put_slice(&[2, 11, 0, 0, 0, 0, 0, 20]);
        buf.put_u8(1); // flags
        buf.put_u8(0); // afi flags
        buf.put_u16(3); // claims three providers
        buf.put_u32(64500);
        buf.put_u32(64501); // but carries one
        assert!(matches!(
            Pdu::decode(&mut buf),
            Err(ProtocolError::AspaProviderCount { count: 3, .. })
        ));
    }

    #[test]
    fn test_length_below_header_rejected() {
        let mut buf = BytesMut::from(&[1u8, 2, 0, 0, 0, 0, 0, 7][..]);
        assert!(matches!(
            Pdu::decode(&mut buf),
            Err(ProtocolError::LengthBelowHeader(7))
        ));
    }

    #[test]
    fn test_length_above_maximum_rejected() {
        let over = MAX_PDU_SIZE + 1;
        let mut buf = BytesMut::new();
        buf.put_slice(&[1, 10, 0, 0]);
        buf.put_u32(over);
        assert!(matches!(
            Pdu::decode(&mut buf),
            Err(ProtocolError::LengthTooLarge { size, .. }) if size == over
        ));
    }

    #[test]
    fn test_wrong_body_length_rejected() {
        // Serial Query with a 5 byte body.
        let mut buf = BytesMut::new();
        buf.put_slice(&[1, 1, 0, 0, 0, 0, 0, 13]);
        buf.put_slice(&[0; 5]);
        assert!(matches!(
            Pdu::decode(&mut buf),
            Err(ProtocolError::WrongBodyLength {
                pdu: "Serial Query",
                len: 5
            })
        ));
    }

    #[test]
    fn test_unknown_pdu_type_rejected() {
        let mut buf = BytesMut::from(&[1u8, 5, 0, 0, 0, 0, 0, 8][..]);
        assert!(matches!(
            Pdu::decode(&mut buf),
            Err(ProtocolError::UnknownPduType(5))
        ));
    }

    #[test]
    fn test_incremental_decode() {
        let pdu = Pdu::SerialQuery {
            version: 1,
            session_id: 9,
            serial: 7,
        };
        let bytes = pdu.to_bytes();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&bytes[..5]);
        assert!(Pdu::decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&bytes[5..]);
        assert_eq!(Pdu::decode(&mut buf).unwrap().unwrap(), pdu);
    }

    #[test]
    fn test_version_restamp() {
        let mut pdu = Pdu::CacheResponse {
            version: 2,
            session_id: 1,
        };
        pdu.set_version(0);
        assert_eq!(pdu.version(), 0);
    }

    #[test]
    fn test_version_legality() {
        let key = Pdu::RouterKey {
            version: 1,
            flags: 1,
            ski: [0; 20],
            asn: 1,
            spki: Vec::new(),
        };
        assert!(!key.is_legal_at(0));
        assert!(key.is_legal_at(1));
        assert!(key.is_legal_at(2));

        let aspa = Pdu::Aspa {
            version: 2,
            flags: 1,
            afi_flags: 0,
            customer_asn: 1,
            providers: Vec::new(),
        };
        assert!(!aspa.is_legal_at(0));
        assert!(!aspa.is_legal_at(1));
        assert!(aspa.is_legal_at(2));

        let query = Pdu::ResetQuery { version: 0 };
        assert!(query.is_legal_at(0));
        assert!(!query.is_legal_at(3));
    }
}
