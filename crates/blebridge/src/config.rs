use std::path::PathBuf;
use std::time::Duration;

use blebridge_ipc::AdapterConfig;
use blebridge_link::ConnectStyle;

/// Bridge configuration.
///
/// The defaults mirror the engine's shipped settings; a surrounding
/// application overrides fields from its own settings source (the CLI
/// exposes the common ones as flags). Socket addresses are opaque
/// strings as far as the engine contract goes.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Endpoint the engine listens on for data we forward to it.
    pub writer_socket: PathBuf,
    /// Endpoint we bind; the engine connects and writes outbound data.
    pub reader_socket: PathBuf,
    /// Endpoint the engine listens on for control messages.
    pub control_socket: PathBuf,
    /// Read-loop buffer size.
    pub buffer_size: usize,
    /// MTU requested during link negotiation.
    pub preferred_mtu: usize,
    /// IPC-side connect retry bound.
    pub ipc_connect_attempts: u32,
    /// Delay between IPC-side connect attempts.
    pub ipc_connect_retry_delay: Duration,
    /// Wireless-side connect retry bound (blocking transports).
    pub link_connect_attempts: u32,
    /// Delay between wireless-side connect attempts.
    pub link_connect_retry_delay: Duration,
    /// GATT service identifier, consumed by the platform transport.
    pub service_uuid: String,
    /// Characteristic the peer notifies inbound frames on.
    pub notify_characteristic: String,
    /// Characteristic outbound frames are written to.
    pub response_characteristic: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            writer_socket: PathBuf::from("./localBleWriter"),
            reader_socket: PathBuf::from("./localBleReader"),
            control_socket: PathBuf::from("./localBleControl"),
            buffer_size: 131_072,
            preferred_mtu: 512,
            ipc_connect_attempts: 10,
            ipc_connect_retry_delay: Duration::from_millis(500),
            link_connect_attempts: 5,
            link_connect_retry_delay: Duration::from_secs(2),
            service_uuid: "00001101-0000-1000-8000-00805f9b34fb".to_string(),
            notify_characteristic: "00001102-0000-1000-8000-00805f9b34fb".to_string(),
            response_characteristic: "00001104-0000-1000-8000-00805f9b34fb".to_string(),
        }
    }
}

impl BridgeConfig {
    /// The IPC adapter's slice of this configuration.
    pub fn adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            writer_socket: self.writer_socket.clone(),
            reader_socket: self.reader_socket.clone(),
            control_socket: self.control_socket.clone(),
            buffer_size: self.buffer_size,
            connect_attempts: self.ipc_connect_attempts,
            connect_retry_delay: self.ipc_connect_retry_delay,
        }
    }

    /// Connect discipline for a blocking stream transport.
    pub fn blocking_connect_style(&self) -> ConnectStyle {
        ConnectStyle::Blocking {
            max_attempts: self.link_connect_attempts,
            retry_delay: self.link_connect_retry_delay,
        }
    }
}
