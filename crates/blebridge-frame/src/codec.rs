use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: frames-remaining (4) + compression flag (1) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Link-layer bytes reserved out of the MTU (ATT write overhead).
pub const LINK_RESERVE: usize = 3;

/// Total per-frame overhead subtracted from the MTU.
pub const FRAME_OVERHEAD: usize = LINK_RESERVE + HEADER_SIZE;

/// Default MTU before negotiation: the BLE minimum.
pub const DEFAULT_MTU: usize = 23;

/// The decoded fixed header of one frame.
///
/// Wire format, big-endian:
/// ```text
/// ┌──────────────────┬────────────┬──────────────────────┐
/// │ Frames remaining │ Compressed │ Payload               │
/// │ (4B BE)          │ (1B, 0|1) │ (≤ MTU − overhead)    │
/// └──────────────────┴────────────┴──────────────────────┘
/// ```
/// `frames_remaining == 0` marks the final frame of a message. The
/// compression flag is decided once per message and repeated on every
/// frame. There are no sequence numbers or checksums: the underlying
/// transports deliver in order with acknowledgment, and a frame lost
/// below this layer corrupts the reassembly silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frames still to come after this one.
    pub frames_remaining: u32,
    /// Whether the whole message was compressed before splitting.
    pub compressed: bool,
}

/// Encode one frame into the wire format.
pub fn encode_frame(header: FrameHeader, payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32(header.frames_remaining);
    dst.put_u8(header.compressed as u8);
    dst.put_slice(payload);
}

/// Decode the fixed header of one frame, returning it with the payload.
///
/// Fails with [`FrameError::TruncatedHeader`] when `raw` is shorter than
/// the header; nothing is read past the validated length.
pub fn decode_frame(raw: &[u8]) -> Result<(FrameHeader, &[u8])> {
    if raw.len() < HEADER_SIZE {
        return Err(FrameError::TruncatedHeader { len: raw.len() });
    }

    let frames_remaining = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
    let compressed = raw[4] != 0;

    Ok((
        FrameHeader {
            frames_remaining,
            compressed,
        },
        &raw[HEADER_SIZE..],
    ))
}
