use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::error::Result;

/// A connected local stream — implements Read + Write.
///
/// Wraps a Unix domain socket stream. A receiver's read loop blocks on
/// `read`; [`LocalStream::shutdown`] from another thread fails that
/// pending read and lets the loop exit, which is the only cancellation
/// mechanism the bridge uses.
pub struct LocalStream {
    inner: UnixStream,
}

impl Read for LocalStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for LocalStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl LocalStream {
    pub(crate) fn from_unix(stream: UnixStream) -> Self {
        Self { inner: stream }
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self::from_unix(cloned))
    }

    /// Shut down both directions, failing any blocked read or write.
    ///
    /// Tolerates a socket that is already closed.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown(Shutdown::Both);
    }
}

impl std::fmt::Debug for LocalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStream").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (LocalStream, LocalStream) {
        let (a, b) = UnixStream::pair().expect("socketpair should succeed");
        (LocalStream::from_unix(a), LocalStream::from_unix(b))
    }

    #[test]
    fn read_write_roundtrip() {
        let (mut a, mut b) = pair();
        a.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        b.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn shutdown_unblocks_read() {
        let (mut a, b) = pair();
        let reader = std::thread::spawn(move || {
            let mut buf = [0u8; 16];
            a.read(&mut buf)
        });
        b.shutdown();
        let n = reader.join().unwrap().unwrap();
        assert_eq!(n, 0, "shutdown should surface as EOF");
    }

    #[test]
    fn shutdown_is_idempotent() {
        let (a, _b) = pair();
        a.shutdown();
        a.shutdown();
    }
}
