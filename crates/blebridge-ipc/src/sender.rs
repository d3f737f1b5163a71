use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use blebridge_transport::{connect_with_retry, LocalStream};
use tracing::{error, info, warn};

/// Outbound IPC channel: connects out to a socket the native engine
/// listens on.
///
/// Failures are converted to boolean or log-level outcomes here, at the
/// primitive boundary; callers detect a broken channel through a failed
/// write or a disconnect event, never through a panic.
pub struct SocketSender {
    path: PathBuf,
    attempts: u32,
    delay: Duration,
    stream: Option<LocalStream>,
}

impl SocketSender {
    pub fn new(path: impl Into<PathBuf>, attempts: u32, delay: Duration) -> Self {
        Self {
            path: path.into(),
            attempts,
            delay,
            stream: None,
        }
    }

    /// Connect with the configured bounded retries.
    ///
    /// Returns whether the channel is now connected. Exhausting the
    /// retries is reported, not thrown: the channel simply stays
    /// unusable until the next connect.
    pub fn connect(&mut self) -> bool {
        info!(path = ?self.path, "connecting socket sender");
        match connect_with_retry(&self.path, self.attempts, self.delay) {
            Ok(stream) => {
                self.stream = Some(stream);
                true
            }
            Err(err) => {
                error!(path = ?self.path, %err, "cannot connect socket sender");
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Perform a single blocking write of the whole buffer.
    ///
    /// An I/O failure is logged, not retried; returns whether the write
    /// succeeded.
    pub fn write(&mut self, data: &[u8]) -> bool {
        let Some(stream) = self.stream.as_mut() else {
            warn!(path = ?self.path, "write on unconnected socket sender");
            return false;
        };

        match stream.write_all(data).and_then(|()| stream.flush()) {
            Ok(()) => true,
            Err(err) => {
                error!(path = ?self.path, %err, "cannot write to socket sender");
                false
            }
        }
    }

    /// Close the channel, tolerating an already-closed socket.
    pub fn disconnect(&mut self) {
        info!(path = ?self.path, "disconnecting socket sender");
        if let Some(stream) = self.stream.take() {
            stream.shutdown();
        }
    }
}
