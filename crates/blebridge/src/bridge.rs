use std::sync::Arc;
use std::thread::JoinHandle;

use blebridge_frame::{LongReader, LongWriter};
use blebridge_ipc::{AdapterEvent, AdapterHandle, NativeAdapter};
use blebridge_link::{LinkEvent, LinkHandle, LinkManager, ManagerEvent, WirelessLink};
use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;

/// Notifications the bridge re-emits toward the embedding application.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    /// The control channel toward the engine is connected.
    ControlChannelReady,
    /// The engine's data channels are connected.
    NativeReady,
    /// A wireless discovery sweep started.
    ScanStarted,
    /// A wireless peer is connected and the frame path is up.
    PeerReady,
    /// Peer identity, as announced on the control channel too.
    PeerConnected {
        name: Option<String>,
        address: String,
    },
    /// The wireless peer dropped.
    PeerDisconnected { address: String },
    /// The link manager stopped on explicit request.
    Stopped,
}

/// Errors raised while assembling the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Ipc(#[from] blebridge_ipc::IpcError),

    #[error(transparent)]
    Link(#[from] blebridge_link::LinkError),
}

/// The assembled bridge: IPC adapter ⇄ frame protocol ⇄ link manager.
///
/// Data path: bytes the engine writes on the reader socket are submitted
/// to the [`LongWriter`] and leave as MTU-sized frames on the wireless
/// link; inbound frames reassemble in the [`LongReader`] and complete
/// messages are written back to the engine. Peer connect/disconnect
/// notifications travel the control socket as JSON, and the engine's
/// data channels are established once a peer is ready.
pub struct Bridge {
    adapter: NativeAdapter,
    manager: LinkManager,
    pumps: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Wire everything up and start the wireless side.
    ///
    /// `link` and `link_events` are the two halves of the wireless
    /// transport (the event receiver paired with the implementation at
    /// its construction). Returns the bridge and the application-facing
    /// event stream.
    pub fn start(
        config: &BridgeConfig,
        link: Box<dyn WirelessLink>,
        link_events: Receiver<LinkEvent>,
    ) -> Result<(Self, Receiver<BridgeEvent>), BridgeError> {
        let (frame_tx, frame_rx) = unbounded();
        let writer = Arc::new(LongWriter::new(frame_tx));
        let (delivery_tx, delivery_rx) = unbounded();
        let reader = Arc::new(LongReader::new(delivery_tx));

        debug!(
            service = %config.service_uuid,
            notify = %config.notify_characteristic,
            response = %config.response_characteristic,
            preferred_mtu = config.preferred_mtu,
            "bridge link parameters"
        );

        let (adapter_events_tx, adapter_events_rx) = unbounded();
        let adapter = NativeAdapter::spawn(config.adapter_config(), adapter_events_tx)?;

        let (manager_events_tx, manager_events_rx) = unbounded();
        let manager = LinkManager::spawn(
            link,
            link_events,
            writer,
            frame_rx,
            reader,
            manager_events_tx,
        )?;

        let (bridge_tx, bridge_rx) = unbounded();

        let pumps = vec![
            spawn_pump(
                "bridge-adapter-events",
                pump_adapter_events(
                    adapter_events_rx,
                    adapter.handle(),
                    manager.handle(),
                    bridge_tx.clone(),
                ),
            )?,
            spawn_pump(
                "bridge-manager-events",
                pump_manager_events(manager_events_rx, adapter.handle(), bridge_tx),
            )?,
            spawn_pump(
                "bridge-inbound-messages",
                pump_inbound_messages(delivery_rx, adapter.handle()),
            )?,
        ];

        manager.start();

        Ok((
            Self {
                adapter,
                manager,
                pumps,
            },
            bridge_rx,
        ))
    }

    /// The wireless-side handle (start/stop/send).
    pub fn link(&self) -> LinkHandle {
        self.manager.handle()
    }

    /// Stop both sides and wait for every worker to wind down.
    pub fn shutdown(self) {
        info!("shutting down bridge");
        self.manager.stop();
        self.adapter.close_and_join();
        self.manager.shutdown();
        for pump in self.pumps {
            let _ = pump.join();
        }
    }
}

fn spawn_pump(
    name: &str,
    body: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>, BridgeError> {
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|err| BridgeError::Link(blebridge_link::LinkError::Spawn(err)))
}

/// Adapter completions: hand the engine's inbound data stream to the
/// wireless side once the engine is up.
fn pump_adapter_events(
    events: Receiver<AdapterEvent>,
    adapter: AdapterHandle,
    link: LinkHandle,
    bridge: Sender<BridgeEvent>,
) -> impl FnOnce() + Send + 'static {
    move || {
        let mut forwarder: Option<JoinHandle<()>> = None;
        for event in events.iter() {
            match event {
                AdapterEvent::ControlReady => {
                    let _ = bridge.send(BridgeEvent::ControlChannelReady);
                }
                AdapterEvent::NativeReady => {
                    // Forward every message the engine writes to the
                    // wireless peer.
                    let (native_tx, native_rx) = unbounded::<Bytes>();
                    adapter.register_read(native_tx);
                    let link = link.clone();
                    let handle = std::thread::Builder::new()
                        .name("bridge-native-inbound".into())
                        .spawn(move || {
                            for message in native_rx.iter() {
                                link.send_message(message);
                            }
                        });
                    match handle {
                        Ok(handle) => forwarder = Some(handle),
                        Err(err) => warn!(%err, "cannot spawn native inbound forwarder"),
                    }
                    let _ = bridge.send(BridgeEvent::NativeReady);
                }
                AdapterEvent::Closed => break,
            }
        }
        drop(adapter);
        if let Some(handle) = forwarder {
            let _ = handle.join();
        }
    }
}

/// Link manager notifications: control messages go to the engine's
/// control channel, peer readiness triggers the native handshake.
fn pump_manager_events(
    events: Receiver<ManagerEvent>,
    adapter: AdapterHandle,
    bridge: Sender<BridgeEvent>,
) -> impl FnOnce() + Send + 'static {
    move || {
        for event in events.iter() {
            match event {
                ManagerEvent::ScanStarted => {
                    let _ = bridge.send(BridgeEvent::ScanStarted);
                }
                ManagerEvent::PeerReady => {
                    adapter.establish_connection();
                    let _ = bridge.send(BridgeEvent::PeerReady);
                }
                ManagerEvent::PeerConnected { name, address } => {
                    let _ = bridge.send(BridgeEvent::PeerConnected { name, address });
                }
                ManagerEvent::PeerDisconnected { address } => {
                    adapter.disconnect_native();
                    let _ = bridge.send(BridgeEvent::PeerDisconnected { address });
                }
                ManagerEvent::ControlMessage(message) => {
                    adapter.write_control(message);
                }
                ManagerEvent::Stopped => {
                    let _ = bridge.send(BridgeEvent::Stopped);
                }
            }
        }
    }
}

/// Reassembled wireless messages go to the engine's data writer.
fn pump_inbound_messages(
    messages: Receiver<Bytes>,
    adapter: AdapterHandle,
) -> impl FnOnce() + Send + 'static {
    move || {
        for message in messages.iter() {
            debug!(bytes = message.len(), "forwarding peer message to native");
            adapter.write(message);
        }
    }
}
