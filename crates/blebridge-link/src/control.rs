use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::device::DeviceCandidate;
use crate::error::Result;

/// Control action: a wireless peer connected.
pub const ACTION_DEVICE_CONNECTED: &str = "ON_DEVICE_CONNECTED";
/// Control action: the wireless peer disconnected.
pub const ACTION_DEVICE_DISCONNECTED: &str = "ON_DEVICE_DISCONNECTED";

/// Out-of-band control message carried unfragmented on the control
/// channel toward the native engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControlMessage {
    pub action: String,
    pub params: serde_json::Value,
}

impl ControlMessage {
    /// `{action: "ON_DEVICE_CONNECTED", params: {name, address}}`
    pub fn device_connected(device: &DeviceCandidate) -> Self {
        Self {
            action: ACTION_DEVICE_CONNECTED.to_string(),
            params: serde_json::json!({
                "name": device.name,
                "address": device.address,
            }),
        }
    }

    /// `{action: "ON_DEVICE_DISCONNECTED", params: {address}}`
    pub fn device_disconnected(address: &str) -> Self {
        Self {
            action: ACTION_DEVICE_DISCONNECTED.to_string(),
            params: serde_json::json!({ "address": address }),
        }
    }

    /// Serialize for the wire.
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}
