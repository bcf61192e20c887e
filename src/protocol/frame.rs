//! Frame struct with typed accessors.
//!
//! A frame is one header plus its payload, carried in exactly one datagram.
//! Frames are never split or reassembled, so parsing works on a whole
//! datagram at once. Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use ripc_client::protocol::{build_frame, Frame, FrameType, WireHeader};
//!
//! let header = WireHeader::response(42, 5, 0);
//! let datagram = Bytes::from(build_frame(&header, b"hello"));
//! let frame = Frame::parse(datagram).unwrap();
//!
//! assert_eq!(frame.kind(), FrameType::Response);
//! assert_eq!(frame.correlation_id(), 42);
//! assert_eq!(frame.payload(), b"hello");
//! ```

use bytes::Bytes;
use thiserror::Error;

use super::wire_format::{FrameType, WireHeader, HEADER_SIZE};

/// Reasons an incoming datagram is discarded.
///
/// These never reach a request caller; the client logs them and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Datagram shorter than a header.
    #[error("datagram of {0} bytes is shorter than the 24-byte header")]
    Truncated(usize),

    /// Magic or version does not match.
    #[error("header mismatch: magic={magic:#010x} version={version}")]
    Incompatible { magic: u32, version: u16 },

    /// Frame type is not one this protocol defines.
    #[error("unsupported frame type {0:#06x}")]
    UnsupportedType(u16),

    /// Declared payload length runs past the end of the datagram.
    #[error("declared payload of {declared} bytes exceeds the {available} bytes present")]
    LengthExceedsDatagram { declared: usize, available: usize },
}

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: WireHeader,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
    kind: FrameType,
}

impl Frame {
    /// Validate and split one datagram into header and payload.
    ///
    /// Checks, in order: minimum size, magic/version, known type, declared
    /// length. Bytes after the declared payload are ignored.
    pub fn parse(datagram: Bytes) -> Result<Self, FrameError> {
        let header =
            WireHeader::read(&datagram).map_err(|_| FrameError::Truncated(datagram.len()))?;

        if !header.is_compatible() {
            return Err(FrameError::Incompatible {
                magic: header.magic,
                version: header.version,
            });
        }

        let kind = header
            .kind()
            .ok_or(FrameError::UnsupportedType(header.frame_type))?;

        let declared = header.payload_length as usize;
        let available = datagram.len() - HEADER_SIZE;
        if declared > available {
            return Err(FrameError::LengthExceedsDatagram {
                declared,
                available,
            });
        }

        Ok(Self {
            header,
            payload: datagram.slice(HEADER_SIZE..HEADER_SIZE + declared),
            kind,
        })
    }

    /// Frame kind.
    #[inline]
    pub fn kind(&self) -> FrameType {
        self.kind
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the correlation ID.
    #[inline]
    pub fn correlation_id(&self) -> u32 {
        self.header.correlation_id
    }

    /// Check if this is a response.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.kind == FrameType::Response
    }

    /// Check if this is an event.
    #[inline]
    pub fn is_event(&self) -> bool {
        self.kind == FrameType::Event
    }
}

/// Build a complete frame as a single byte vector.
///
/// The header is written as given; callers are expected to have set
/// `payload_length` to `payload.len()`.
pub fn build_frame(header: &WireHeader, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}
