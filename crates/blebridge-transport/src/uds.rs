use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::stream::LocalStream;

/// A bound local server endpoint.
///
/// The native engine connects out to us on the reader channel, so the
/// bridge side binds and performs exactly one blocking [`accept`]: this
/// is a single-client rendezvous, not a listening server. The socket
/// file is removed on drop when it is still the one we created.
///
/// [`accept`]: LocalEndpoint::accept
pub struct LocalEndpoint {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl LocalEndpoint {
    /// Permission mode for created socket paths.
    const SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// `sockaddr_un.sun_path` is 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a local socket path.
    ///
    /// A pre-existing socket file at `path` is treated as stale and
    /// removed; any other kind of file fails the bind.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        // Remove stale sockets, but never remove non-socket files.
        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
            if metadata.file_type().is_socket() {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(|e| TransportError::Bind {
                    path: path.clone(),
                    source: e,
                })?;
            } else {
                return Err(TransportError::Bind {
                    path: path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a local socket",
                    ),
                });
            }
        }

        let listener = UnixListener::bind(&path).map_err(|e| TransportError::Bind {
            path: path.clone(),
            source: e,
        })?;

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(Self::SOCKET_MODE))
            .map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
        let created = std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
            path: path.clone(),
            source: e,
        })?;

        info!(?path, "listening on local socket");

        Ok(Self {
            listener,
            path,
            created_inode: Some((created.dev(), created.ino())),
        })
    }

    /// Accept the incoming connection (blocking).
    pub fn accept(&self) -> Result<LocalStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "accepted connection");
        Ok(LocalStream::from_unix(stream))
    }

    /// The path this endpoint is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LocalEndpoint {
    fn drop(&mut self) {
        if let Some((expected_dev, expected_ino)) = self.created_inode {
            if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
                if metadata.file_type().is_socket()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino
                {
                    debug!(path = ?self.path, "cleaning up socket file");
                    let _ = std::fs::remove_file(&self.path);
                } else {
                    debug!(path = ?self.path, "socket path identity changed; skipping cleanup");
                }
            }
        }
    }
}

/// Connect to a listening local socket (blocking, single attempt).
pub fn connect(path: impl AsRef<Path>) -> Result<LocalStream> {
    let path = path.as_ref();
    let stream = UnixStream::connect(path).map_err(|e| TransportError::Connect {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!(?path, "connected to local socket");
    Ok(LocalStream::from_unix(stream))
}

/// Connect with bounded retries, sleeping `delay` between attempts.
///
/// The native engine may come up after us; the reader/writer channels
/// retry for a while before giving up. Returns
/// [`TransportError::RetriesExhausted`] once all attempts fail.
pub fn connect_with_retry(
    path: impl AsRef<Path>,
    attempts: u32,
    delay: Duration,
) -> Result<LocalStream> {
    let path = path.as_ref();

    for attempt in 1..=attempts {
        debug!(?path, attempt, "attempting to connect to local socket");
        match UnixStream::connect(path) {
            Ok(stream) => {
                debug!(?path, attempt, "connected to local socket");
                return Ok(LocalStream::from_unix(stream));
            }
            Err(err) => {
                warn!(?path, attempt, %err, "connect failed, retrying after delay");
                if attempt < attempts {
                    std::thread::sleep(delay);
                }
            }
        }
    }

    Err(TransportError::RetriesExhausted {
        path: path.to_path_buf(),
        attempts,
        delay,
    })
}
