//! Protocol module - wire format and frame types.
//!
//! This module implements the binary framing of RIPC:
//! - 24-byte header encoding/decoding
//! - Frame assembly and whole-datagram validation

mod frame;
mod wire_format;

pub use frame::{build_frame, Frame, FrameError};
pub use wire_format::{
    frame_type, now_ns, read_header, write_header, FrameType, WireHeader, HEADER_SIZE, MAGIC,
    MAX_DATAGRAM_SIZE, VERSION,
};
