use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{unbounded, Sender};
use tracing::{debug, info, warn};

use crate::error::{IpcError, Result};
use crate::receiver::SocketReceiver;
use crate::sender::SocketSender;

/// Completion events broadcast by the adapter worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterEvent {
    /// The control writer channel is connected.
    ControlReady,
    /// Reader and writer channels are connected; the native link is up.
    NativeReady,
    /// The worker has torn down all channels and stopped.
    Closed,
}

/// Configuration for the three native-engine channels.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Endpoint the engine listens on for outbound data.
    pub writer_socket: PathBuf,
    /// Endpoint we bind for inbound data; the engine connects to it.
    pub reader_socket: PathBuf,
    /// Endpoint the engine listens on for control messages.
    pub control_socket: PathBuf,
    /// Read-loop buffer size.
    pub buffer_size: usize,
    /// Outbound connect retry bound.
    pub connect_attempts: u32,
    /// Delay between outbound connect attempts.
    pub connect_retry_delay: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            writer_socket: PathBuf::from("./localBleWriter"),
            reader_socket: PathBuf::from("./localBleReader"),
            control_socket: PathBuf::from("./localBleControl"),
            buffer_size: 131_072,
            connect_attempts: 10,
            connect_retry_delay: Duration::from_millis(500),
        }
    }
}

enum Op {
    EstablishConnection,
    ConnectReader,
    ConnectWriter,
    Write(Bytes),
    RegisterRead(Sender<Bytes>),
    WriteControl(Bytes),
    Disconnect,
    Close,
}

/// The native engine's three channels behind one ordered op queue.
///
/// All socket operations run on a single worker thread, in strict
/// submission order — connect/read/write sequencing is deterministic
/// without locks around socket state. Every public method only enqueues
/// and is therefore safe to call from any thread; outcomes surface as
/// [`AdapterEvent`]s.
///
/// On spawn the worker connects the control writer first and reports
/// [`AdapterEvent::ControlReady`]. The data channels come up only on an
/// explicit [`establish_connection`]: reader, then writer, then
/// [`AdapterEvent::NativeReady`].
///
/// [`establish_connection`]: NativeAdapter::establish_connection
pub struct NativeAdapter {
    handle: AdapterHandle,
    worker: Option<JoinHandle<()>>,
}

/// Cheap cloneable front for enqueueing adapter ops from other threads.
#[derive(Clone)]
pub struct AdapterHandle {
    ops: Sender<Op>,
}

impl AdapterHandle {
    /// Connect the data reader, then the data writer.
    pub fn establish_connection(&self) {
        self.enqueue(Op::EstablishConnection);
    }

    /// Forward a message to the native engine over the data writer.
    pub fn write(&self, data: Bytes) {
        self.enqueue(Op::Write(data));
    }

    /// Register the channel every inbound native message is forwarded to.
    pub fn register_read(&self, delivery: Sender<Bytes>) {
        self.enqueue(Op::RegisterRead(delivery));
    }

    /// Forward a control message to the native engine.
    pub fn write_control(&self, data: Bytes) {
        self.enqueue(Op::WriteControl(data));
    }

    /// Disconnect the data channels, keeping the worker (and the control
    /// channel) alive for a later [`establish_connection`].
    ///
    /// [`establish_connection`]: AdapterHandle::establish_connection
    pub fn disconnect_native(&self) {
        self.enqueue(Op::Disconnect);
    }

    /// Stop the worker; teardown disconnects all three channels.
    pub fn close(&self) {
        self.enqueue(Op::Close);
    }

    fn enqueue(&self, op: Op) {
        if self.ops.send(op).is_err() {
            warn!("adapter worker stopped; op dropped");
        }
    }
}

impl NativeAdapter {
    /// Spawn the worker thread and begin connecting the control channel.
    pub fn spawn(config: AdapterConfig, events: Sender<AdapterEvent>) -> Result<Self> {
        let (ops_tx, ops_rx) = unbounded::<Op>();
        let chain = ops_tx.clone();

        let worker = std::thread::Builder::new()
            .name("native-adapter".into())
            .spawn(move || {
                let mut writer = SocketSender::new(
                    &config.writer_socket,
                    config.connect_attempts,
                    config.connect_retry_delay,
                );
                let mut control = SocketSender::new(
                    &config.control_socket,
                    config.connect_attempts,
                    config.connect_retry_delay,
                );
                let mut reader = SocketReceiver::new(&config.reader_socket, config.buffer_size);

                // The control channel comes up before anything else.
                if control.connect() {
                    info!("control writer is connected");
                    let _ = events.send(AdapterEvent::ControlReady);
                }

                while let Ok(op) = ops_rx.recv() {
                    match op {
                        Op::EstablishConnection => {
                            info!("establishing communication with native");
                            let _ = chain.send(Op::ConnectReader);
                        }
                        Op::ConnectReader => {
                            if reader.connect() {
                                info!("reader is connected");
                                let _ = chain.send(Op::ConnectWriter);
                            }
                        }
                        Op::ConnectWriter => {
                            if writer.connect() {
                                info!("writer is connected");
                                let _ = events.send(AdapterEvent::NativeReady);
                            }
                        }
                        Op::Write(data) => {
                            debug!(bytes = data.len(), "forwarding message to native");
                            writer.write(&data);
                        }
                        Op::RegisterRead(delivery) => {
                            reader.register(delivery);
                        }
                        Op::WriteControl(data) => {
                            debug!(bytes = data.len(), "control message to native");
                            control.write(&data);
                        }
                        Op::Disconnect => {
                            info!("disconnecting reader and writer");
                            reader.disconnect();
                            writer.disconnect();
                        }
                        Op::Close => break,
                    }
                }

                // Natural teardown: whatever stopped the loop, the
                // sockets are not leaked.
                reader.disconnect();
                writer.disconnect();
                control.disconnect();
                let _ = events.send(AdapterEvent::Closed);
            })
            .map_err(IpcError::Spawn)?;

        Ok(Self {
            handle: AdapterHandle { ops: ops_tx },
            worker: Some(worker),
        })
    }

    /// A cloneable handle for use from other threads.
    pub fn handle(&self) -> AdapterHandle {
        self.handle.clone()
    }

    /// Connect the data reader, then the data writer.
    pub fn establish_connection(&self) {
        self.handle.establish_connection();
    }

    /// Forward a message to the native engine over the data writer.
    pub fn write(&self, data: Bytes) {
        self.handle.write(data);
    }

    /// Register the channel every inbound native message is forwarded to.
    pub fn register_read(&self, delivery: Sender<Bytes>) {
        self.handle.register_read(delivery);
    }

    /// Forward a control message to the native engine.
    pub fn write_control(&self, data: Bytes) {
        self.handle.write_control(data);
    }

    /// Disconnect the data channels, keeping the worker (and the control
    /// channel) alive for a later reconnect.
    pub fn disconnect_native(&self) {
        self.handle.disconnect_native();
    }

    /// Stop the worker; teardown disconnects all three channels.
    pub fn close(&self) {
        self.handle.close();
    }

    /// Stop the worker and wait for its teardown to finish.
    pub fn close_and_join(mut self) {
        self.close();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for NativeAdapter {
    fn drop(&mut self) {
        // Best-effort stop; join is the explicit close_and_join path.
        let _ = self.handle.ops.send(Op::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blebridge_transport::{connect_with_retry, LocalEndpoint, LocalStream};
    use crossbeam_channel::Receiver;
    use std::io::{Read, Write};

    /// The native engine's side of the rendezvous: listens where the
    /// adapter connects out, connects where the adapter listens.
    struct FakeNative {
        control: LocalStream,
        writer: LocalStream,
        reader: LocalStream,
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("blebridge-adapter-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config_in(dir: &std::path::Path) -> AdapterConfig {
        AdapterConfig {
            writer_socket: dir.join("writer.sock"),
            reader_socket: dir.join("reader.sock"),
            control_socket: dir.join("control.sock"),
            buffer_size: 4096,
            connect_attempts: 20,
            connect_retry_delay: Duration::from_millis(25),
        }
    }

    fn start_bridge_pair(
        config: &AdapterConfig,
        events: Sender<AdapterEvent>,
        event_rx: &Receiver<AdapterEvent>,
    ) -> (NativeAdapter, FakeNative) {
        let control_endpoint = LocalEndpoint::bind(&config.control_socket).unwrap();
        let writer_endpoint = LocalEndpoint::bind(&config.writer_socket).unwrap();

        let adapter = NativeAdapter::spawn(config.clone(), events).unwrap();

        let control = control_endpoint.accept().unwrap();
        assert_eq!(
            event_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            AdapterEvent::ControlReady
        );

        adapter.establish_connection();
        // The adapter binds the reader socket and blocks in accept; the
        // native side connects into it, then accepts the data writer.
        let reader = connect_with_retry(&config.reader_socket, 40, Duration::from_millis(25))
            .unwrap();
        let writer = writer_endpoint.accept().unwrap();
        assert_eq!(
            event_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            AdapterEvent::NativeReady
        );

        (
            adapter,
            FakeNative {
                control,
                writer,
                reader,
            },
        )
    }

    #[test]
    fn connect_sequence_then_data_flows_both_ways() {
        let dir = temp_dir("full");
        let config = config_in(&dir);
        let (event_tx, event_rx) = unbounded();
        let (adapter, mut native) = start_bridge_pair(&config, event_tx, &event_rx);

        // Wireless → native: adapter write shows up on the engine's
        // accepted data stream.
        adapter.write(Bytes::from_static(b"to-engine"));
        let mut buf = [0u8; 9];
        native.writer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"to-engine");

        // Control messages travel the control stream.
        adapter.write_control(Bytes::from_static(b"{\"action\":\"x\"}"));
        let mut ctrl = [0u8; 14];
        native.control.read_exact(&mut ctrl).unwrap();
        assert_eq!(&ctrl, b"{\"action\":\"x\"}");

        // Native → wireless: data written by the engine reaches the
        // registered delivery channel.
        let (inbound_tx, inbound_rx) = unbounded();
        adapter.register_read(inbound_tx);
        native.reader.write_all(b"from-engine").unwrap();
        let inbound = inbound_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(inbound.as_ref(), b"from-engine");

        adapter.close_and_join();
        assert_eq!(
            event_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            AdapterEvent::Closed
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn writes_execute_in_submission_order() {
        let dir = temp_dir("order");
        let config = config_in(&dir);
        let (event_tx, event_rx) = unbounded();
        let (adapter, mut native) = start_bridge_pair(&config, event_tx, &event_rx);

        for i in 0..10u8 {
            adapter.write(Bytes::from(vec![i]));
        }

        let mut buf = [0u8; 10];
        native.writer.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);

        adapter.close_and_join();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn close_tears_down_without_native_data_channels() {
        let dir = temp_dir("close-early");
        let config = config_in(&dir);
        let control_endpoint = LocalEndpoint::bind(&config.control_socket).unwrap();
        let (event_tx, event_rx) = unbounded();

        let adapter = NativeAdapter::spawn(config, event_tx).unwrap();
        let _control = control_endpoint.accept().unwrap();
        assert_eq!(
            event_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            AdapterEvent::ControlReady
        );

        // Never establish the data channels; closing must still stop the
        // worker and release everything.
        adapter.close_and_join();
        assert_eq!(
            event_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            AdapterEvent::Closed
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
