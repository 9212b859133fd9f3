//! Protocol error types and wire error codes.

use std::fmt;
use thiserror::Error;

/// Structural errors raised while decoding or encoding PDUs.
///
/// Any of these is fatal for the connection the bytes came from: the
/// stream is untrusted, so no Error Report PDU is sent in response.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("PDU length {0} is shorter than the 8 byte header")]
    LengthBelowHeader(u32),

    #[error("PDU length {size} exceeds maximum {max}")]
    LengthTooLarge { size: u32, max: u32 },

    #[error("wrong body length for {pdu} PDU: {len}")]
    WrongBodyLength { pdu: &'static str, len: usize },

    #[error("Router Key PDU body too short: {0} < 28")]
    RouterKeyTooShort(usize),

    #[error("Error Report PDU embedded lengths exceed the body")]
    ErrorReportLengths,

    #[error("ASPA provider count {count} does not match body length {len}")]
    AspaProviderCount { count: u16, len: usize },

    #[error("unknown PDU type {0}")]
    UnknownPduType(u8),
}

/// Error codes carried in Error Report PDUs.
///
/// These are part of the wire contract (RFC 6810 / RFC 8210 section 10)
/// and must remain stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    CorruptData,
    InternalError,
    NoDataAvailable,
    InvalidRequest,
    BadProtocolVersion,
    BadPduType,
    WithdrawalOfUnknownRecord,
    DuplicateAnnouncement,
}

impl ErrorCode {
    /// Returns the on-the-wire code.
    pub fn code(self) -> u16 {
        match self {
            ErrorCode::CorruptData => 0,
            ErrorCode::InternalError => 1,
            ErrorCode::NoDataAvailable => 2,
            ErrorCode::InvalidRequest => 3,
            ErrorCode::BadProtocolVersion => 4,
            ErrorCode::BadPduType => 5,
            ErrorCode::WithdrawalOfUnknownRecord => 6,
            ErrorCode::DuplicateAnnouncement => 7,
        }
    }

    /// Looks up a received code.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(ErrorCode::CorruptData),
            1 => Some(ErrorCode::InternalError),
            2 => Some(ErrorCode::NoDataAvailable),
            3 => Some(ErrorCode::InvalidRequest),
            4 => Some(ErrorCode::BadProtocolVersion),
            5 => Some(ErrorCode::BadPduType),
            6 => Some(ErrorCode::WithdrawalOfUnknownRecord),
            7 => Some(ErrorCode::DuplicateAnnouncement),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::CorruptData => write!(f, "Corrupt Data"),
            ErrorCode::InternalError => write!(f, "Internal Error"),
            ErrorCode::NoDataAvailable => write!(f, "No Data Available"),
            ErrorCode::InvalidRequest => write!(f, "Invalid Request"),
            ErrorCode::BadProtocolVersion => write!(f, "Unsupported Protocol Version"),
            ErrorCode::BadPduType => write!(f, "Unsupported PDU Type"),
            ErrorCode::WithdrawalOfUnknownRecord => write!(f, "Withdrawal of Unknown Record"),
            ErrorCode::DuplicateAnnouncement => write!(f, "Duplicate Announcement Received"),
        }
    }
}
