//! Long-message transport for an MTU-limited wireless channel.
//!
//! This is the core value-add layer of blebridge. Application messages of
//! arbitrary size are split into frames that fit the negotiated MTU, each
//! framed with:
//! - A 4-byte big-endian count of frames still to come (0 = final frame)
//! - A 1-byte compression flag, repeated on every frame of a message
//!
//! Messages that would not fit a single frame are zlib-compressed as a
//! whole before splitting. One frame is in flight at a time; the peer
//! reassembles by concatenation, so frames must arrive in order.

pub mod codec;
pub mod compress;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, FrameHeader, DEFAULT_MTU, FRAME_OVERHEAD, HEADER_SIZE,
    LINK_RESERVE,
};
pub use compress::{compress, decompress};
pub use error::{FrameError, Result};
pub use reader::LongReader;
pub use writer::LongWriter;
