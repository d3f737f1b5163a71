use blebridge::{Bridge, BridgeConfig, LinkEvent, LoopbackLink, WirelessLink};
use crossbeam_channel::{select, unbounded};
use tracing::{info, warn};

use crate::cmd::RunArgs;
use crate::exit::{bridge_error, CliResult, CliError, INTERNAL, SUCCESS};

/// Run the bridge against an in-process loopback peer that echoes every
/// frame back, until Ctrl-C.
///
/// The engine side is real: connect the configured local sockets and
/// whatever the engine writes comes back to it through the full
/// fragmentation/reassembly path.
pub fn run(args: RunArgs) -> CliResult<i32> {
    let mut config = BridgeConfig::default();
    if let Some(path) = args.writer_socket {
        config.writer_socket = path;
    }
    if let Some(path) = args.reader_socket {
        config.reader_socket = path;
    }
    if let Some(path) = args.control_socket {
        config.control_socket = path;
    }
    if let Some(size) = args.buffer_size {
        config.buffer_size = size;
    }

    info!(
        writer = ?config.writer_socket,
        reader = ?config.reader_socket,
        control = ?config.control_socket,
        mtu = args.mtu,
        "starting bridge with loopback peer"
    );

    let ((link, link_events), (far_link, far_events)) = LoopbackLink::pair(args.mtu);
    spawn_echo_peer(far_link, far_events)?;

    let (bridge, events) = Bridge::start(&config, Box::new(link), link_events)
        .map_err(|err| bridge_error("starting bridge", err))?;

    let (stop_tx, stop_rx) = unbounded::<()>();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .map_err(|err| CliError::new(INTERNAL, format!("installing signal handler: {err}")))?;

    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(events) -> event => match event {
                Ok(event) => info!(?event, "bridge event"),
                Err(_) => break,
            },
        }
    }

    bridge.shutdown();
    Ok(SUCCESS)
}

/// The far side of the loopback: echo every received frame verbatim.
/// An echoed frame is a valid frame of the same message, so the bridge
/// reassembles exactly the message the engine sent.
fn spawn_echo_peer(
    mut link: LoopbackLink,
    events: crossbeam_channel::Receiver<LinkEvent>,
) -> CliResult<()> {
    std::thread::Builder::new()
        .name("loopback-echo-peer".into())
        .spawn(move || {
            for event in events.iter() {
                if let LinkEvent::FrameReceived(frame) = event {
                    if let Err(err) = link.send_frame(frame) {
                        warn!(%err, "echo peer cannot send");
                    }
                }
            }
        })
        .map(|_handle| ())
        .map_err(|err| CliError::new(INTERNAL, format!("spawning echo peer: {err}")))
}
