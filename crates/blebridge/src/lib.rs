//! Transport bridge between a native engine reachable over local
//! byte-stream sockets and a wireless peer on an MTU-limited link.
//!
//! The pieces compose bottom-up: `blebridge-transport` (local sockets),
//! `blebridge-frame` (long-message fragmentation/reassembly),
//! `blebridge-ipc` (the serialized three-channel adapter) and
//! `blebridge-link` (discovery + connection management). This crate ties
//! them together as [`Bridge`] and carries the configuration surface.

pub mod bridge;
pub mod config;

pub use bridge::{Bridge, BridgeError, BridgeEvent};
pub use config::BridgeConfig;

pub use blebridge_frame::{LongReader, LongWriter};
pub use blebridge_ipc::{AdapterConfig, AdapterEvent, NativeAdapter};
pub use blebridge_link::{
    ConnectStyle, DeviceCandidate, LinkEvent, LinkHandle, LinkManager, LoopbackLink, WirelessLink,
};
