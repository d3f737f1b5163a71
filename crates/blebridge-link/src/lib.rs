//! Wireless side of the bridge.
//!
//! A [`WirelessLink`] implementation wraps the platform transport (BLE
//! GATT or a Bluetooth Classic stream socket) behind one interface:
//! discovery, connect, frame send, disconnect, with completions arriving
//! as [`LinkEvent`]s. The [`LinkManager`] drives it through the
//! Idle → Listening → Connecting → Connected state machine, keeps a
//! most-recently-connected-first candidate queue, and owns the long
//! reader/writer pair for the active peer.
//!
//! [`LoopbackLink`] is an in-process implementation used by tests and
//! the demo binary; real platform stacks live with the embedder.

pub mod control;
pub mod device;
pub mod error;
pub mod loopback;
pub mod manager;
pub mod transport;

pub use control::{ControlMessage, ACTION_DEVICE_CONNECTED, ACTION_DEVICE_DISCONNECTED};
pub use device::{CandidateQueue, DeviceCandidate};
pub use error::{LinkError, Result};
pub use loopback::LoopbackLink;
pub use manager::{LinkHandle, LinkManager, LinkState, ManagerEvent};
pub use transport::{ConnectStyle, LinkEvent, WirelessLink};
