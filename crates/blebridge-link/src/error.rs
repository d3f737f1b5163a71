/// Errors that can occur on the wireless side.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// No peer is connected.
    #[error("no connected peer")]
    NotConnected,

    /// Transport-level failure reported by the platform stack.
    #[error("wireless transport error: {0}")]
    Transport(String),

    /// Long-message transport error.
    #[error("frame error: {0}")]
    Frame(#[from] blebridge_frame::FrameError),

    /// Control message serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The manager worker thread could not be spawned.
    #[error("failed to spawn link manager worker: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;
