/// Errors that can occur in the IPC adapter.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] blebridge_transport::TransportError),

    /// The adapter worker thread could not be spawned.
    #[error("failed to spawn adapter worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The adapter worker is gone; the op queue has no consumer.
    #[error("adapter worker stopped")]
    WorkerStopped,
}

pub type Result<T> = std::result::Result<T, IpcError>;
