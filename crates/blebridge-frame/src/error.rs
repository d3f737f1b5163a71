/// Errors that can occur in the long-message transport.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame is shorter than the fixed header.
    #[error("frame too short for header ({len} bytes, need {})", crate::codec::HEADER_SIZE)]
    TruncatedHeader { len: usize },

    /// The negotiated MTU leaves no room for payload.
    #[error("mtu {mtu} too small (frame overhead is {})", crate::codec::FRAME_OVERHEAD)]
    MtuTooSmall { mtu: usize },

    /// Compressing a message failed at the stream level.
    #[error("compression failed: {0}")]
    Compress(#[source] std::io::Error),

    /// The received data is not a valid compressed stream.
    #[error("decompression failed: {0}")]
    Decompress(#[source] std::io::Error),

    /// The frame sink or delivery channel has no receiver left.
    #[error("frame channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
