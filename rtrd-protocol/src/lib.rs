//! # rtrd-protocol
//!
//! Wire protocol implementation for the RPKI-to-Router protocol.
//!
//! This crate provides:
//! - PDU values for protocol versions 0 (RFC 6810), 1 (RFC 8210) and 2
//!   (the ASPA extension)
//! - Binary encoding and strict, incremental decoding
//! - Wire error codes and protocol error types

pub mod codec;
pub mod error;
pub mod pdu;

pub use codec::PduDecoder;
pub use error::{ErrorCode, ProtocolError};
pub use pdu::Pdu;

/// RFC 6810.
pub const PROTOCOL_VERSION_0: u8 = 0;
/// RFC 8210.
pub const PROTOCOL_VERSION_1: u8 = 1;
/// draft-ietf-sidrops-8210bis (ASPA).
pub const PROTOCOL_VERSION_2: u8 = 2;

/// Size of the common PDU header in bytes.
pub const HEADER_SIZE: usize = 8;

/// The size of the largest sensible PDU.
///
/// SKIs of router keys are theoretically unbounded; relying parties are
/// expected to have validated their length long before the data gets
/// here.
pub const MAX_PDU_SIZE: u32 = 262168;

/// Flags byte value announcing an object.
pub const FLAG_ANNOUNCE: u8 = 1;
/// Flags byte value withdrawing an object.
pub const FLAG_WITHDRAW: u8 = 0;
