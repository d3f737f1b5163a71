use std::time::Duration;

use bytes::Bytes;

use crate::device::DeviceCandidate;
use crate::error::Result;

/// Completions and notifications from a [`WirelessLink`] implementation.
///
/// Implementations push these into the event channel paired with the
/// link at construction; the [`LinkManager`](crate::manager::LinkManager)
/// consumes them on its worker thread.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Discovery produced a candidate.
    DeviceDiscovered(DeviceCandidate),
    /// An outbound connection attempt succeeded.
    Connected { device: DeviceCandidate },
    /// An outbound connection attempt failed.
    ConnectFailed { device: DeviceCandidate },
    /// The active connection dropped (read error or remote close).
    Disconnected { address: String },
    /// The link negotiated a new MTU.
    MtuNegotiated(usize),
    /// One frame arrived from the peer.
    FrameReceived(Bytes),
    /// The previous [`send_frame`](WirelessLink::send_frame) completed.
    FrameSent,
}

/// How a transport's connect attempts behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStyle {
    /// Stream-socket transport: the same candidate is retried up to
    /// `max_attempts`, `retry_delay` apart, before moving on.
    Blocking {
        max_attempts: u32,
        retry_delay: Duration,
    },
    /// Scanning transport: a single attempt per candidate; failure falls
    /// back to discovery.
    Scanning,
}

/// A wireless transport, written once against by the frame protocol and
/// the connection manager; BLE GATT and Classic-BT stream sockets are
/// the two production shapes.
///
/// All methods are invoked from the manager's worker thread only.
/// Operations are asynchronous: success of `connect`/`send_frame` means
/// "attempt started"; the outcome arrives as a [`LinkEvent`].
pub trait WirelessLink: Send {
    /// Start a discovery sweep; candidates arrive as
    /// [`LinkEvent::DeviceDiscovered`].
    fn start_discovery(&mut self) -> Result<()>;

    /// Cancel a running discovery sweep. Safe to call when idle.
    fn cancel_discovery(&mut self);

    /// Begin connecting to `device`; completion arrives as
    /// [`LinkEvent::Connected`] or [`LinkEvent::ConnectFailed`].
    fn connect(&mut self, device: &DeviceCandidate) -> Result<()>;

    /// Transmit one frame; [`LinkEvent::FrameSent`] acknowledges it.
    fn send_frame(&mut self, frame: Bytes) -> Result<()>;

    /// Tear down the active connection, if any.
    fn disconnect(&mut self);

    /// The retry discipline this transport expects.
    fn connect_style(&self) -> ConnectStyle;
}
