//! Wire format encoding and decoding.
//!
//! Implements the 24-byte RIPC header:
//! ```text
//! ┌──────────┬─────────┬─────────┬──────────┬──────────┬──────────────┐
//! │ Magic    │ Version │ Type    │ Corr ID  │ Length   │ Timestamp ns │
//! │ 4 bytes  │ 2 bytes │ 2 bytes │ 4 bytes  │ 4 bytes  │ 8 bytes      │
//! │ uint32 BE│ uint16BE│ uint16BE│ uint32 BE│ uint32 BE│ uint64 BE    │
//! └──────────┴─────────┴─────────┴──────────┴──────────┴──────────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. The header codec only checks
//! lengths; magic/version/type validation belongs to the caller.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Result, RipcError};

/// Header size in bytes (fixed, exactly 24).
pub const HEADER_SIZE: usize = 4 + 2 + 2 + 4 + 4 + 8;

/// Protocol magic, `"RIPC"` read as a big-endian u32.
pub const MAGIC: u32 = 0x5249_5043;

/// Protocol version.
pub const VERSION: u16 = 0x0001;

/// Largest payload an IPv4 UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Frame type discriminators.
pub mod frame_type {
    /// Request, client to agent.
    pub const REQUEST: u16 = 0x1000;
    /// Response, agent to client.
    pub const RESPONSE: u16 = 0x1001;
    /// Unsolicited event, agent to client.
    pub const EVENT: u16 = 0x1002;
}

/// Known frame kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Request,
    Response,
    Event,
}

impl FrameType {
    /// Wire value of this kind.
    #[inline]
    pub fn as_u16(self) -> u16 {
        match self {
            FrameType::Request => frame_type::REQUEST,
            FrameType::Response => frame_type::RESPONSE,
            FrameType::Event => frame_type::EVENT,
        }
    }

    /// Map a wire value to a kind, `None` for anything unknown.
    #[inline]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            frame_type::REQUEST => Some(FrameType::Request),
            frame_type::RESPONSE => Some(FrameType::Response),
            frame_type::EVENT => Some(FrameType::Event),
            _ => None,
        }
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireHeader {
    /// Protocol magic (expected [`MAGIC`]).
    pub magic: u32,
    /// Protocol version (expected [`VERSION`]).
    pub version: u16,
    /// Raw frame type (see [`frame_type`]).
    pub frame_type: u16,
    /// Correlation identifier matching a response to its request.
    pub correlation_id: u32,
    /// Payload length in bytes.
    pub payload_length: u32,
    /// Sender clock in nanoseconds. Diagnostic only.
    pub timestamp_ns: u64,
}

impl WireHeader {
    /// Create a header from raw field values.
    pub fn new(
        magic: u32,
        version: u16,
        frame_type: u16,
        correlation_id: u32,
        payload_length: u32,
        timestamp_ns: u64,
    ) -> Self {
        Self {
            magic,
            version,
            frame_type,
            correlation_id,
            payload_length,
            timestamp_ns,
        }
    }

    /// Request header with the fixed magic and version.
    pub fn request(correlation_id: u32, payload_length: u32, timestamp_ns: u64) -> Self {
        Self::new(
            MAGIC,
            VERSION,
            frame_type::REQUEST,
            correlation_id,
            payload_length,
            timestamp_ns,
        )
    }

    /// Response header with the fixed magic and version.
    pub fn response(correlation_id: u32, payload_length: u32, timestamp_ns: u64) -> Self {
        Self::new(
            MAGIC,
            VERSION,
            frame_type::RESPONSE,
            correlation_id,
            payload_length,
            timestamp_ns,
        )
    }

    /// Event header with the fixed magic and version.
    pub fn event(correlation_id: u32, payload_length: u32, timestamp_ns: u64) -> Self {
        Self::new(
            MAGIC,
            VERSION,
            frame_type::EVENT,
            correlation_id,
            payload_length,
            timestamp_ns,
        )
    }

    /// Serialize all six fields into `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`RipcError::BufferTooSmall`] if `buf` is shorter than
    /// [`HEADER_SIZE`]; nothing is written in that case.
    ///
    /// # Example
    ///
    /// ```
    /// use ripc_client::protocol::{WireHeader, HEADER_SIZE};
    ///
    /// let header = WireHeader::request(7, 12, 0);
    /// let mut buf = [0u8; HEADER_SIZE];
    /// header.write(&mut buf).unwrap();
    /// assert_eq!(&buf[0..4], b"RIPC");
    /// ```
    pub fn write(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < HEADER_SIZE {
            return Err(RipcError::BufferTooSmall {
                needed: HEADER_SIZE,
                actual: buf.len(),
            });
        }
        buf[0..4].copy_from_slice(&self.magic.to_be_bytes());
        buf[4..6].copy_from_slice(&self.version.to_be_bytes());
        buf[6..8].copy_from_slice(&self.frame_type.to_be_bytes());
        buf[8..12].copy_from_slice(&self.correlation_id.to_be_bytes());
        buf[12..16].copy_from_slice(&self.payload_length.to_be_bytes());
        buf[16..24].copy_from_slice(&self.timestamp_ns.to_be_bytes());
        Ok(())
    }

    /// Encode header to a fixed array.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        // The array is exactly HEADER_SIZE, so write cannot fail.
        let _ = self.write(&mut buf);
        buf
    }

    /// Parse the first [`HEADER_SIZE`] bytes of `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`RipcError::BufferTooSmall`] if fewer than 24 bytes are available.
    pub fn read(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(RipcError::BufferTooSmall {
                needed: HEADER_SIZE,
                actual: buf.len(),
            });
        }
        Ok(Self {
            magic: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            version: u16::from_be_bytes([buf[4], buf[5]]),
            frame_type: u16::from_be_bytes([buf[6], buf[7]]),
            correlation_id: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            payload_length: u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]),
            timestamp_ns: u64::from_be_bytes([
                buf[16], buf[17], buf[18], buf[19], buf[20], buf[21], buf[22], buf[23],
            ]),
        })
    }

    /// Magic and version both match this implementation.
    #[inline]
    pub fn is_compatible(&self) -> bool {
        self.magic == MAGIC && self.version == VERSION
    }

    /// Known frame kind, if any.
    #[inline]
    pub fn kind(&self) -> Option<FrameType> {
        FrameType::from_u16(self.frame_type)
    }
}

/// Write a header into an existing buffer (standalone function).
#[inline]
pub fn write_header(buf: &mut [u8], header: &WireHeader) -> Result<()> {
    header.write(buf)
}

/// Read a header from bytes (standalone function).
#[inline]
pub fn read_header(buf: &[u8]) -> Result<WireHeader> {
    WireHeader::read(buf)
}

/// Wall clock in Unix-epoch nanoseconds, for the header timestamp.
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_write_read_roundtrip() {
        let original = WireHeader::new(MAGIC, VERSION, frame_type::RESPONSE, 42, 100, 1_234_567);
        let encoded = original.encode();
        let decoded = WireHeader::read(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_header_roundtrip_extreme_values() {
        for header in [
            WireHeader::new(0, 0, 0, 0, 0, 0),
            WireHeader::new(u32::MAX, u16::MAX, u16::MAX, u32::MAX, u32::MAX, u64::MAX),
            WireHeader::event(1, 0, 1),
        ] {
            assert_eq!(WireHeader::read(&header.encode()).unwrap(), header);
        }
    }

    #[test]
    fn test_header_big_endian_byte_order() {
        let header = WireHeader::new(
            0x0102_0304,
            0x0506,
            0x0708,
            0x090A_0B0C,
            0x0D0E_0F10,
            0x1112_1314_1516_1718,
        );
        let bytes = header.encode();
        let expected: Vec<u8> = (1u8..=0x18).collect();
        assert_eq!(bytes.to_vec(), expected);
    }

    #[test]
    fn test_magic_spells_ripc() {
        let bytes = WireHeader::request(1, 0, 0).encode();
        assert_eq!(&bytes[0..4], b"RIPC");
        assert_eq!(&bytes[4..6], &[0x00, 0x01]);
        assert_eq!(&bytes[6..8], &[0x10, 0x00]);
    }

    #[test]
    fn test_header_size_is_exactly_24() {
        assert_eq!(HEADER_SIZE, 24);
        assert_eq!(WireHeader::request(1, 0, 0).encode().len(), 24);
    }

    #[test]
    fn test_write_rejects_short_buffer() {
        let header = WireHeader::request(1, 0, 0);
        let mut buf = [0xAAu8; 23];
        let err = header.write(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            RipcError::BufferTooSmall {
                needed: 24,
                actual: 23
            }
        ));
        // Nothing written on failure.
        assert!(buf.iter().all(|b| *b == 0xAA));
    }

    #[test]
    fn test_write_into_larger_buffer() {
        let header = WireHeader::response(9, 3, 77);
        let mut buf = [0u8; 32];
        header.write(&mut buf).unwrap();
        assert_eq!(WireHeader::read(&buf).unwrap(), header);
        assert!(buf[HEADER_SIZE..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_read_too_short_buffer() {
        let buf = [0u8; 23];
        assert!(WireHeader::read(&buf).is_err());
        assert!(read_header(&[]).is_err());
    }

    #[test]
    fn test_constructors_fill_constants() {
        let req = WireHeader::request(1, 2, 3);
        let rsp = WireHeader::response(1, 2, 3);
        let evt = WireHeader::event(1, 2, 3);

        for h in [req, rsp, evt] {
            assert!(h.is_compatible());
            assert_eq!(h.correlation_id, 1);
            assert_eq!(h.payload_length, 2);
            assert_eq!(h.timestamp_ns, 3);
        }
        assert_eq!(req.kind(), Some(FrameType::Request));
        assert_eq!(rsp.kind(), Some(FrameType::Response));
        assert_eq!(evt.kind(), Some(FrameType::Event));
    }

    #[test]
    fn test_no_semantic_validation_on_read() {
        let header = WireHeader::new(0xDEAD_BEEF, 9, 0x2000, 1, 0, 0);
        let decoded = WireHeader::read(&header.encode()).unwrap();
        assert!(!decoded.is_compatible());
        assert_eq!(decoded.kind(), None);
    }

    #[test]
    fn test_frame_type_mapping() {
        for kind in [FrameType::Request, FrameType::Response, FrameType::Event] {
            assert_eq!(FrameType::from_u16(kind.as_u16()), Some(kind));
        }
        assert_eq!(FrameType::from_u16(0x1003), None);
    }

    #[test]
    fn test_standalone_functions() {
        let header = WireHeader::event(5, 6, 7);
        let mut buf = [0u8; HEADER_SIZE];
        write_header(&mut buf, &header).unwrap();
        assert_eq!(read_header(&buf).unwrap(), header);
        assert_eq!(buf, header.encode());
    }

    #[test]
    fn test_now_ns_is_nonzero() {
        assert!(now_ns() > 0);
    }
}
