//! Incremental PDU decoding for byte streams.

use crate::error::ProtocolError;
use crate::pdu::Pdu;
use bytes::BytesMut;

/// Buffers stream data and yields complete PDUs.
///
/// Feed socket reads with [`extend`](Self::extend), then drain with
/// [`decode_pdu`](Self::decode_pdu) until it returns `Ok(None)`.
pub struct PduDecoder {
    buffer: BytesMut,
}

impl PduDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next PDU from the buffer.
    pub fn decode_pdu(&mut self) -> Result<Option<Pdu>, ProtocolError> {
        Pdu::decode(&mut self.buffer)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for PduDecoder {
    fn default() -> Self {
        Self::new()
    }
}
