use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use blebridge_transport::{LocalEndpoint, LocalStream};
use bytes::Bytes;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, error, info};

/// Inbound IPC channel: binds a named endpoint and waits for the native
/// engine to connect.
///
/// This is a single-client rendezvous, not a listening server: one
/// blocking `accept`, then a dedicated read loop that forwards every
/// non-empty read to the registered delivery channel. The loop ends on
/// any I/O error or end-of-stream; [`disconnect`] forces that by
/// shutting the accepted stream down.
///
/// [`disconnect`]: SocketReceiver::disconnect
pub struct SocketReceiver {
    path: PathBuf,
    buffer_size: usize,
    delivery: Arc<Mutex<Option<Sender<Bytes>>>>,
    endpoint: Option<LocalEndpoint>,
    stream: Option<LocalStream>,
    read_loop: Option<JoinHandle<()>>,
}

impl SocketReceiver {
    pub fn new(path: impl Into<PathBuf>, buffer_size: usize) -> Self {
        Self {
            path: path.into(),
            buffer_size,
            delivery: Arc::new(Mutex::new(None)),
            endpoint: None,
            stream: None,
            read_loop: None,
        }
    }

    /// Bind, accept the single client, and start the read loop.
    ///
    /// Blocks until the native engine connects. Returns whether the
    /// channel came up; setup failures leave it unconnected for the
    /// owner's higher-level retry policy.
    pub fn connect(&mut self) -> bool {
        info!(path = ?self.path, "connecting socket receiver");

        let endpoint = match LocalEndpoint::bind(&self.path) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                error!(path = ?self.path, %err, "socket receiver bind failed");
                return false;
            }
        };

        debug!(path = ?self.path, "socket receiver begins to accept");
        let stream = match endpoint.accept() {
            Ok(stream) => stream,
            Err(err) => {
                error!(path = ?self.path, %err, "socket receiver accept failed");
                return false;
            }
        };

        let loop_stream = match stream.try_clone() {
            Ok(clone) => clone,
            Err(err) => {
                error!(path = ?self.path, %err, "cannot clone accepted stream");
                return false;
            }
        };

        debug!(path = ?self.path, "client connected to socket receiver");

        let delivery = Arc::clone(&self.delivery);
        let buffer_size = self.buffer_size;
        let handle = std::thread::Builder::new()
            .name("ipc-read-loop".into())
            .spawn(move || read_loop(loop_stream, buffer_size, delivery));
        match handle {
            Ok(handle) => {
                self.endpoint = Some(endpoint);
                self.stream = Some(stream);
                self.read_loop = Some(handle);
                true
            }
            Err(err) => {
                error!(%err, "cannot spawn read loop");
                false
            }
        }
    }

    /// Register the delivery channel inbound data is forwarded to.
    ///
    /// May be called before or after [`connect`]; replaces any earlier
    /// registration.
    ///
    /// [`connect`]: SocketReceiver::connect
    pub fn register(&self, delivery: Sender<Bytes>) {
        debug!(path = ?self.path, "registering inbound delivery channel");
        *self.delivery.lock() = Some(delivery);
    }

    /// Interrupt the read loop and close both sockets.
    pub fn disconnect(&mut self) {
        info!(path = ?self.path, "disconnecting socket receiver");

        if let Some(stream) = self.stream.take() {
            stream.shutdown();
        }
        if let Some(handle) = self.read_loop.take() {
            let _ = handle.join();
        }
        self.endpoint = None;
    }
}

fn read_loop(mut stream: LocalStream, buffer_size: usize, delivery: Arc<Mutex<Option<Sender<Bytes>>>>) {
    let mut buffer = vec![0u8; buffer_size];
    loop {
        let read = match stream.read(&mut buffer) {
            Ok(0) => {
                debug!("socket receiver reached end of stream");
                break;
            }
            Ok(n) => n,
            Err(err) => {
                debug!(%err, "socket receiver read failed, stopping loop");
                break;
            }
        };

        debug!(bytes = read, "received data from socket");
        let chunk = Bytes::copy_from_slice(&buffer[..read]);
        if let Some(sender) = delivery.lock().as_ref() {
            if sender.send(chunk).is_err() {
                debug!("inbound delivery channel closed, stopping loop");
                break;
            }
        }
    }
}
