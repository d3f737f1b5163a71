use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use blebridge_frame::{LongReader, LongWriter};
use bytes::Bytes;
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::control::ControlMessage;
use crate::device::{CandidateQueue, DeviceCandidate};
use crate::error::{LinkError, Result};
use crate::transport::{ConnectStyle, LinkEvent, WirelessLink};

/// Connection manager state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Doing nothing; only an explicit start leaves this state.
    Idle,
    /// Holding a prioritized candidate list, no outbound attempt yet.
    Listening,
    /// One outbound attempt in flight.
    Connecting,
    /// One active peer, frames flowing.
    Connected,
}

/// Notifications emitted by the manager toward the bridge composition.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    /// A discovery sweep started.
    ScanStarted,
    /// A peer is connected and the frame path is ready.
    PeerReady,
    /// A peer connected (name when known).
    PeerConnected {
        name: Option<String>,
        address: String,
    },
    /// The active peer disconnected.
    PeerDisconnected { address: String },
    /// A serialized control message for the native control channel.
    ControlMessage(Bytes),
    /// The manager stopped on explicit request.
    Stopped,
}

enum LinkCommand {
    Start,
    Stop,
    SendMessage(Bytes),
}

/// Drives a [`WirelessLink`] through discovery, prioritized connects and
/// reconnects, and owns the long reader/writer pair for the active peer.
///
/// All link access happens on one worker thread that selects over
/// commands, link events and frames the [`LongWriter`] releases for
/// transmission; retry waits are deadline-based, so the loop never
/// blocks on anything but its channels.
pub struct LinkManager {
    handle: LinkHandle,
    worker: Option<JoinHandle<()>>,
}

/// Cheap cloneable front for driving the manager from other threads.
#[derive(Clone)]
pub struct LinkHandle {
    commands: Sender<LinkCommand>,
}

impl LinkHandle {
    /// Begin discovery / connection. No-op while already started.
    pub fn start(&self) {
        self.send(LinkCommand::Start);
    }

    /// Stop discovery and tear down the active peer. Terminal until the
    /// next [`start`](LinkHandle::start).
    pub fn stop(&self) {
        self.send(LinkCommand::Stop);
    }

    /// Queue an application message for the connected peer.
    pub fn send_message(&self, message: Bytes) {
        self.send(LinkCommand::SendMessage(message));
    }

    fn send(&self, command: LinkCommand) {
        if self.commands.send(command).is_err() {
            warn!("link manager worker stopped; command dropped");
        }
    }
}

impl LinkManager {
    /// Spawn the worker.
    ///
    /// `frames` is the receiver paired with `writer`'s sink; `reader`
    /// delivers reassembled messages to whatever channel it was built
    /// with.
    pub fn spawn(
        link: Box<dyn WirelessLink>,
        link_events: Receiver<LinkEvent>,
        writer: Arc<LongWriter>,
        frames: Receiver<Bytes>,
        reader: Arc<LongReader>,
        events: Sender<ManagerEvent>,
    ) -> Result<Self> {
        let (commands_tx, commands_rx) = unbounded();

        let worker = std::thread::Builder::new()
            .name("link-manager".into())
            .spawn(move || {
                let worker = Worker {
                    link,
                    writer,
                    reader,
                    events,
                    state: LinkState::Idle,
                    candidates: CandidateQueue::new(),
                    connecting: None,
                    connected: None,
                    attempts_left: 0,
                    retry_at: None,
                    failed_in_round: 0,
                    stopped_by_user: false,
                };
                worker.run(commands_rx, link_events, frames);
            })
            .map_err(LinkError::Spawn)?;

        Ok(Self {
            handle: LinkHandle {
                commands: commands_tx,
            },
            worker: Some(worker),
        })
    }

    /// A cloneable handle for use from other threads.
    pub fn handle(&self) -> LinkHandle {
        self.handle.clone()
    }

    /// Begin discovery / connection. No-op while already started.
    pub fn start(&self) {
        self.handle.start();
    }

    /// Stop discovery and tear down the active peer. Terminal until the
    /// next [`start`](LinkManager::start).
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Queue an application message for the connected peer.
    pub fn send_message(&self, message: Bytes) {
        self.handle.send_message(message);
    }

    /// Stop, release the command channel and wait for the worker.
    ///
    /// Other [`LinkHandle`] clones keep the worker alive; drop them too
    /// for the join to complete.
    pub fn shutdown(mut self) {
        self.stop();
        let worker = self.worker.take();
        drop(self);
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }
}

/// How long the worker sleeps in select when no retry is scheduled.
const IDLE_TICK: Duration = Duration::from_secs(1);

struct Worker {
    link: Box<dyn WirelessLink>,
    writer: Arc<LongWriter>,
    reader: Arc<LongReader>,
    events: Sender<ManagerEvent>,
    state: LinkState,
    candidates: CandidateQueue,
    connecting: Option<DeviceCandidate>,
    connected: Option<DeviceCandidate>,
    attempts_left: u32,
    retry_at: Option<Instant>,
    failed_in_round: usize,
    stopped_by_user: bool,
}

impl Worker {
    fn run(
        mut self,
        commands: Receiver<LinkCommand>,
        link_events: Receiver<LinkEvent>,
        frames: Receiver<Bytes>,
    ) {
        loop {
            let timeout = self
                .retry_at
                .map(|at| at.saturating_duration_since(Instant::now()))
                .unwrap_or(IDLE_TICK);

            select! {
                recv(commands) -> command => match command {
                    Ok(command) => self.handle_command(command),
                    Err(_) => break,
                },
                recv(link_events) -> event => match event {
                    Ok(event) => self.handle_link_event(event),
                    Err(_) => {
                        warn!("wireless link dropped its event channel");
                        break;
                    }
                },
                recv(frames) -> frame => match frame {
                    Ok(frame) => self.transmit(frame),
                    Err(_) => {
                        warn!("frame sink channel closed");
                        break;
                    }
                },
                default(timeout) => self.on_deadline(),
            }
        }

        self.link.cancel_discovery();
        self.link.disconnect();
    }

    fn handle_command(&mut self, command: LinkCommand) {
        match command {
            LinkCommand::Start => {
                if self.state != LinkState::Idle {
                    debug!(state = ?self.state, "start ignored; already running");
                    return;
                }
                info!("starting link manager");
                self.stopped_by_user = false;
                self.failed_in_round = 0;
                self.state = LinkState::Listening;
                if self.candidates.is_empty() {
                    self.begin_discovery();
                } else {
                    self.connect_next();
                }
            }
            LinkCommand::Stop => {
                info!("stopping link manager");
                self.stopped_by_user = true;
                self.link.cancel_discovery();
                self.link.disconnect();
                self.state = LinkState::Idle;
                self.connecting = None;
                self.retry_at = None;
                self.emit(ManagerEvent::Stopped);
            }
            LinkCommand::SendMessage(message) => {
                if self.state != LinkState::Connected {
                    warn!(state = ?self.state, "dropping message: no connected peer");
                    return;
                }
                if let Err(err) = self.writer.submit(&message) {
                    error!(%err, "failed to queue message for the peer");
                }
            }
        }
    }

    fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::DeviceDiscovered(candidate) => {
                debug!(address = %candidate.address, name = ?candidate.name, "device discovered");
                self.candidates.push_discovered(candidate);
                if self.state == LinkState::Listening {
                    self.connect_next();
                }
            }
            LinkEvent::Connected { device } => self.on_connected(device),
            LinkEvent::ConnectFailed { device } => {
                let current = self
                    .connecting
                    .as_ref()
                    .is_some_and(|c| c.address == device.address);
                if self.state != LinkState::Connecting || !current {
                    debug!(address = %device.address, "stale connect failure ignored");
                    return;
                }
                warn!(address = %device.address, "connection attempt failed");
                self.on_connect_failed();
            }
            LinkEvent::Disconnected { address } => self.on_disconnected(address),
            LinkEvent::MtuNegotiated(mtu) => {
                info!(mtu, "mtu negotiated");
                self.writer.set_mtu(mtu);
                self.reader.set_mtu(mtu);
            }
            LinkEvent::FrameReceived(frame) => {
                if let Err(err) = self.reader.on_frame(&frame) {
                    warn!(%err, "dropping malformed frame");
                }
            }
            LinkEvent::FrameSent => self.writer.on_frame_sent(),
        }
    }

    fn on_connected(&mut self, device: DeviceCandidate) {
        if self.state == LinkState::Idle || self.stopped_by_user {
            debug!(address = %device.address, "connection while stopped; dropping it");
            self.link.disconnect();
            return;
        }

        info!(address = %device.address, name = ?device.name, "peer connected");
        self.link.cancel_discovery();

        if let Some(previous) = self.connected.take() {
            if previous.address != device.address {
                debug!(address = %previous.address, "replacing previous peer");
            }
        }

        self.candidates.mark_connected(&device);
        self.connecting = None;
        self.retry_at = None;
        self.failed_in_round = 0;
        // Purge any partial reassembly left over from the previous peer.
        self.reader.reset();

        self.state = LinkState::Connected;
        self.emit_control(ControlMessage::device_connected(&device));
        self.emit(ManagerEvent::PeerConnected {
            name: device.name.clone(),
            address: device.address.clone(),
        });
        self.emit(ManagerEvent::PeerReady);
        self.connected = Some(device);
    }

    fn on_disconnected(&mut self, address: String) {
        info!(%address, "peer disconnected");
        self.emit_control(ControlMessage::device_disconnected(&address));
        self.emit(ManagerEvent::PeerDisconnected {
            address: address.clone(),
        });

        self.reader.reset();
        self.writer.reset();
        self.connected = None;

        if self.stopped_by_user || self.state == LinkState::Idle {
            return;
        }

        // Auto re-resolve: the MRU walk starts at the peer we just lost.
        self.state = LinkState::Listening;
        self.connect_next();
    }

    fn on_connect_failed(&mut self) {
        match self.link.connect_style() {
            ConnectStyle::Blocking { retry_delay, .. } if self.attempts_left > 1 => {
                self.attempts_left -= 1;
                debug!(
                    remaining = self.attempts_left,
                    "scheduling connect retry"
                );
                self.retry_at = Some(Instant::now() + retry_delay);
            }
            ConnectStyle::Blocking { .. } => self.advance_candidate(),
            ConnectStyle::Scanning => {
                self.connecting = None;
                self.begin_discovery();
            }
        }
    }

    fn begin_discovery(&mut self) {
        self.state = LinkState::Listening;
        self.emit(ManagerEvent::ScanStarted);
        if let Err(err) = self.link.start_discovery() {
            error!(%err, "failed to start discovery");
        }
    }

    fn connect_next(&mut self) {
        let Some(candidate) = self.candidates.next() else {
            self.begin_discovery();
            return;
        };

        // Discovery never runs concurrently with an outbound attempt.
        self.link.cancel_discovery();

        self.state = LinkState::Connecting;
        self.attempts_left = match self.link.connect_style() {
            ConnectStyle::Blocking { max_attempts, .. } => max_attempts,
            ConnectStyle::Scanning => 1,
        };
        self.connecting = Some(candidate);
        self.attempt_connect();
    }

    fn attempt_connect(&mut self) {
        let Some(candidate) = self.connecting.clone() else {
            return;
        };
        self.retry_at = None;

        info!(address = %candidate.address, "connecting to device");
        if let Err(err) = self.link.connect(&candidate) {
            warn!(address = %candidate.address, %err, "connect attempt failed to start");
            self.on_connect_failed();
        }
    }

    fn advance_candidate(&mut self) {
        self.connecting = None;
        self.failed_in_round += 1;

        if self.failed_in_round >= self.candidates.len() {
            debug!("candidate list exhausted; re-running discovery");
            self.failed_in_round = 0;
            self.begin_discovery();
        } else {
            self.connect_next();
        }
    }

    fn on_deadline(&mut self) {
        if let Some(at) = self.retry_at {
            if Instant::now() >= at && self.state == LinkState::Connecting {
                debug!("retry delay elapsed");
                self.attempt_connect();
            }
        }
    }

    fn transmit(&mut self, frame: Bytes) {
        if let Err(err) = self.link.send_frame(frame) {
            warn!(%err, "frame transmission failed");
        }
    }

    fn emit_control(&self, message: ControlMessage) {
        match message.to_bytes() {
            Ok(bytes) => self.emit(ManagerEvent::ControlMessage(bytes)),
            Err(err) => error!(%err, "cannot serialize control message"),
        }
    }

    fn emit(&self, event: ManagerEvent) {
        if self.events.send(event).is_err() {
            debug!("manager event channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blebridge_frame::{decode_frame, decompress};
    use parking_lot::Mutex;
    use std::collections::{HashSet, VecDeque};

    /// A transport whose discovery batches and connect outcomes are
    /// scripted by the test.
    struct ScriptedLink {
        events: Sender<LinkEvent>,
        style: ConnectStyle,
        fail: HashSet<String>,
        connects: Arc<Mutex<Vec<String>>>,
        sent: Arc<Mutex<Vec<Bytes>>>,
        discovery_batches: Arc<Mutex<VecDeque<Vec<DeviceCandidate>>>>,
    }

    impl WirelessLink for ScriptedLink {
        fn start_discovery(&mut self) -> Result<()> {
            if let Some(batch) = self.discovery_batches.lock().pop_front() {
                for candidate in batch {
                    let _ = self.events.send(LinkEvent::DeviceDiscovered(candidate));
                }
            }
            Ok(())
        }

        fn cancel_discovery(&mut self) {}

        fn connect(&mut self, device: &DeviceCandidate) -> Result<()> {
            self.connects.lock().push(device.address.clone());
            if self.fail.contains(&device.address) {
                let _ = self.events.send(LinkEvent::ConnectFailed {
                    device: device.clone(),
                });
            } else {
                let _ = self.events.send(LinkEvent::Connected {
                    device: device.clone(),
                });
                let _ = self.events.send(LinkEvent::MtuNegotiated(185));
            }
            Ok(())
        }

        fn send_frame(&mut self, frame: Bytes) -> Result<()> {
            self.sent.lock().push(frame);
            let _ = self.events.send(LinkEvent::FrameSent);
            Ok(())
        }

        fn disconnect(&mut self) {}

        fn connect_style(&self) -> ConnectStyle {
            self.style
        }
    }

    struct Harness {
        manager: LinkManager,
        events: Receiver<ManagerEvent>,
        delivered: Receiver<Bytes>,
        link_events: Sender<LinkEvent>,
        connects: Arc<Mutex<Vec<String>>>,
        sent: Arc<Mutex<Vec<Bytes>>>,
    }

    fn harness(
        style: ConnectStyle,
        fail: &[&str],
        batches: Vec<Vec<DeviceCandidate>>,
    ) -> Harness {
        let (link_tx, link_rx) = unbounded();
        let connects = Arc::new(Mutex::new(Vec::new()));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let link = ScriptedLink {
            events: link_tx.clone(),
            style,
            fail: fail.iter().map(|s| s.to_string()).collect(),
            connects: Arc::clone(&connects),
            sent: Arc::clone(&sent),
            discovery_batches: Arc::new(Mutex::new(batches.into())),
        };

        let (frame_tx, frame_rx) = unbounded();
        let writer = Arc::new(LongWriter::new(frame_tx));
        let (delivery_tx, delivery_rx) = unbounded();
        let reader = Arc::new(LongReader::new(delivery_tx));
        let (event_tx, event_rx) = unbounded();

        let manager = LinkManager::spawn(
            Box::new(link),
            link_rx,
            writer,
            frame_rx,
            reader,
            event_tx,
        )
        .unwrap();

        Harness {
            manager,
            events: event_rx,
            delivered: delivery_rx,
            link_events: link_tx,
            connects,
            sent,
        }
    }

    fn dev(address: &str) -> DeviceCandidate {
        DeviceCandidate::new(address, Some("peer"))
    }

    fn wait_for<F: Fn(&ManagerEvent) -> bool>(
        events: &Receiver<ManagerEvent>,
        pred: F,
    ) -> Vec<ManagerEvent> {
        let mut seen = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            match events.recv_timeout(Duration::from_millis(100)) {
                Ok(event) => {
                    let done = pred(&event);
                    seen.push(event);
                    if done {
                        return seen;
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(err) => panic!("event channel broke: {err}"),
            }
        }
        panic!("timed out waiting for event; saw {seen:?}");
    }

    #[test]
    fn blocking_style_retries_then_advances_to_next_candidate() {
        let style = ConnectStyle::Blocking {
            max_attempts: 5,
            retry_delay: Duration::from_millis(5),
        };
        let h = harness(style, &["aa"], vec![vec![dev("aa"), dev("bb")]]);
        h.manager.start();

        let seen = wait_for(&h.events, |event| {
            matches!(event, ManagerEvent::PeerConnected { address, .. } if address == "bb")
        });
        assert!(matches!(seen[0], ManagerEvent::ScanStarted));

        let connects = h.connects.lock().clone();
        assert_eq!(connects, ["aa", "aa", "aa", "aa", "aa", "bb"]);

        h.manager.shutdown();
    }

    #[test]
    fn scanning_style_failure_resumes_discovery() {
        let h = harness(
            ConnectStyle::Scanning,
            &["aa"],
            vec![vec![dev("aa")], vec![dev("bb")]],
        );
        h.manager.start();

        let seen = wait_for(&h.events, |event| {
            matches!(event, ManagerEvent::PeerConnected { address, .. } if address == "bb")
        });
        let scans = seen
            .iter()
            .filter(|event| matches!(event, ManagerEvent::ScanStarted))
            .count();
        assert_eq!(scans, 2, "failure falls back to a fresh sweep");
        assert_eq!(h.connects.lock().clone(), ["aa", "bb"]);

        h.manager.shutdown();
    }

    #[test]
    fn connection_emits_control_message_and_peer_ready() {
        let h = harness(ConnectStyle::Scanning, &[], vec![vec![dev("aa")]]);
        h.manager.start();

        let seen = wait_for(&h.events, |event| matches!(event, ManagerEvent::PeerReady));

        let control = seen
            .iter()
            .find_map(|event| match event {
                ManagerEvent::ControlMessage(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .expect("control message before peer ready");
        let value: serde_json::Value = serde_json::from_slice(&control).unwrap();
        assert_eq!(value["action"], "ON_DEVICE_CONNECTED");
        assert_eq!(value["params"]["address"], "aa");

        assert!(seen
            .iter()
            .any(|event| matches!(event, ManagerEvent::PeerConnected { address, .. } if address == "aa")));

        h.manager.shutdown();
    }

    #[test]
    fn disconnect_reconnects_most_recent_peer_first() {
        let h = harness(ConnectStyle::Scanning, &[], vec![vec![dev("aa")]]);
        h.manager.start();
        wait_for(&h.events, |event| matches!(event, ManagerEvent::PeerReady));

        h.link_events
            .send(LinkEvent::Disconnected {
                address: "aa".to_string(),
            })
            .unwrap();

        let seen = wait_for(&h.events, |event| matches!(event, ManagerEvent::PeerReady));
        let control = seen
            .iter()
            .find_map(|event| match event {
                ManagerEvent::ControlMessage(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .expect("disconnect control message");
        let value: serde_json::Value = serde_json::from_slice(&control).unwrap();
        assert_eq!(value["action"], "ON_DEVICE_DISCONNECTED");
        assert_eq!(value["params"]["address"], "aa");

        // The MRU walk tries the lost peer again without a new sweep.
        assert_eq!(h.connects.lock().clone(), ["aa", "aa"]);

        h.manager.shutdown();
    }

    #[test]
    fn stop_is_terminal_until_the_next_start() {
        let h = harness(ConnectStyle::Scanning, &[], vec![vec![dev("aa")]]);
        h.manager.start();
        wait_for(&h.events, |event| matches!(event, ManagerEvent::PeerReady));

        h.manager.stop();
        wait_for(&h.events, |event| matches!(event, ManagerEvent::Stopped));

        h.link_events
            .send(LinkEvent::Disconnected {
                address: "aa".to_string(),
            })
            .unwrap();
        wait_for(&h.events, |event| {
            matches!(event, ManagerEvent::PeerDisconnected { .. })
        });
        // No automatic reconnect after an explicit stop.
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(h.connects.lock().len(), 1);

        // A fresh start reuses the retained candidate list.
        h.manager.start();
        wait_for(&h.events, |event| matches!(event, ManagerEvent::PeerReady));
        assert_eq!(h.connects.lock().clone(), ["aa", "aa"]);

        h.manager.shutdown();
    }

    #[test]
    fn outbound_messages_fragment_through_the_link() {
        let h = harness(ConnectStyle::Scanning, &[], vec![vec![dev("aa")]]);
        h.manager.start();
        wait_for(&h.events, |event| matches!(event, ManagerEvent::PeerReady));

        let message: Vec<u8> = (0..2_000u32).flat_map(|i| i.to_be_bytes()).collect();
        h.manager.send_message(Bytes::from(message.clone()));

        // Frames drain one at a time as the scripted link acknowledges.
        let deadline = Instant::now() + Duration::from_secs(3);
        let frames = loop {
            let frames = h.sent.lock().clone();
            if let Some(last) = frames.last() {
                let (header, _) = decode_frame(last).unwrap();
                if header.frames_remaining == 0 {
                    break frames;
                }
            }
            assert!(Instant::now() < deadline, "frames did not drain");
            std::thread::sleep(Duration::from_millis(10));
        };

        let mut body = Vec::new();
        let mut compressed = false;
        for frame in &frames {
            let (header, payload) = decode_frame(frame).unwrap();
            compressed = header.compressed;
            body.extend_from_slice(payload);
        }
        assert!(compressed, "a message this large is compressed");
        assert_eq!(decompress(&body).unwrap(), message);

        h.manager.shutdown();
    }

    #[test]
    fn inbound_frames_reassemble_to_delivery() {
        let h = harness(ConnectStyle::Scanning, &[], vec![vec![dev("aa")]]);
        h.manager.start();
        wait_for(&h.events, |event| matches!(event, ManagerEvent::PeerReady));

        // Build the peer's frames with an independent writer at the same
        // negotiated MTU.
        let (peer_tx, peer_rx) = unbounded();
        let peer_writer = LongWriter::new(peer_tx);
        peer_writer.set_mtu(185);
        let message: Vec<u8> = (0..900u32).flat_map(|i| i.to_be_bytes()).collect();
        peer_writer.submit(&message).unwrap();

        while let Ok(frame) = peer_rx.try_recv() {
            h.link_events
                .send(LinkEvent::FrameReceived(frame))
                .unwrap();
            peer_writer.on_frame_sent();
        }

        let delivered = h.delivered.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(delivered.as_ref(), &message[..]);

        h.manager.shutdown();
    }

    #[test]
    fn messages_without_a_peer_are_dropped() {
        let h = harness(ConnectStyle::Scanning, &[], vec![]);
        h.manager.send_message(Bytes::from_static(b"nobody listens"));
        std::thread::sleep(Duration::from_millis(50));
        assert!(h.sent.lock().is_empty());
        h.manager.shutdown();
    }
}
