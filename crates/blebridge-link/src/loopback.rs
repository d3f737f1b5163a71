use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::device::DeviceCandidate;
use crate::error::{LinkError, Result};
use crate::transport::{ConnectStyle, LinkEvent, WirelessLink};

/// In-process wireless transport: two endpoints joined by channels.
///
/// Discovery "finds" the opposite endpoint immediately and frames sent
/// on one side arrive as [`LinkEvent::FrameReceived`] on the other.
/// Used by the integration tests and the demo binary; the real platform
/// stacks live with the embedder.
pub struct LoopbackLink {
    peer: DeviceCandidate,
    local_address: String,
    mtu: usize,
    events: Sender<LinkEvent>,
    peer_events: Sender<LinkEvent>,
    connected: Arc<AtomicBool>,
}

impl LoopbackLink {
    /// Create both endpoints, each paired with its event receiver.
    pub fn pair(mtu: usize) -> ((Self, Receiver<LinkEvent>), (Self, Receiver<LinkEvent>)) {
        let (tx_a, rx_a) = unbounded();
        let (tx_b, rx_b) = unbounded();
        let connected = Arc::new(AtomicBool::new(false));

        let a = Self {
            peer: DeviceCandidate::new("loop:b", Some("loopback-b")),
            local_address: "loop:a".to_string(),
            mtu,
            events: tx_a.clone(),
            peer_events: tx_b.clone(),
            connected: Arc::clone(&connected),
        };
        let b = Self {
            peer: DeviceCandidate::new("loop:a", Some("loopback-a")),
            local_address: "loop:b".to_string(),
            mtu,
            events: tx_b,
            peer_events: tx_a,
            connected,
        };

        ((a, rx_a), (b, rx_b))
    }

    fn send_event(&self, event: LinkEvent) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| LinkError::Transport("event channel closed".to_string()))
    }
}

impl WirelessLink for LoopbackLink {
    fn start_discovery(&mut self) -> Result<()> {
        debug!(peer = %self.peer.address, "loopback discovery");
        self.send_event(LinkEvent::DeviceDiscovered(self.peer.clone()))
    }

    fn cancel_discovery(&mut self) {}

    fn connect(&mut self, device: &DeviceCandidate) -> Result<()> {
        if device.address != self.peer.address {
            debug!(address = %device.address, "unknown loopback candidate");
            return self.send_event(LinkEvent::ConnectFailed {
                device: device.clone(),
            });
        }

        self.connected.store(true, Ordering::SeqCst);
        self.send_event(LinkEvent::Connected {
            device: device.clone(),
        })?;
        self.send_event(LinkEvent::MtuNegotiated(self.mtu))?;

        // The far side observes the incoming connection like a
        // peripheral would.
        let local = DeviceCandidate::new(&self.local_address, Some("loopback"));
        let _ = self.peer_events.send(LinkEvent::Connected { device: local });
        let _ = self.peer_events.send(LinkEvent::MtuNegotiated(self.mtu));
        Ok(())
    }

    fn send_frame(&mut self, frame: Bytes) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(LinkError::NotConnected);
        }
        self.peer_events
            .send(LinkEvent::FrameReceived(frame))
            .map_err(|_| LinkError::Transport("peer endpoint gone".to_string()))?;
        self.send_event(LinkEvent::FrameSent)
    }

    fn disconnect(&mut self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(LinkEvent::Disconnected {
                address: self.peer.address.clone(),
            });
            let _ = self.peer_events.send(LinkEvent::Disconnected {
                address: self.local_address.clone(),
            });
        }
    }

    fn connect_style(&self) -> ConnectStyle {
        ConnectStyle::Scanning
    }
}
