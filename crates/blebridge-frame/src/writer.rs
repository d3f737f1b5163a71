use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::{Bytes, BytesMut};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::codec::{encode_frame, FrameHeader, DEFAULT_MTU, FRAME_OVERHEAD, HEADER_SIZE};
use crate::compress::compress;
use crate::error::{FrameError, Result};

/// Fragments outgoing messages into MTU-sized frames.
///
/// Frames ready for transmission are handed to the sink channel one at a
/// time: the next frame is released only after [`on_frame_sent`] reports
/// the previous transmission complete. Messages queue behind each other
/// in FIFO order.
///
/// [`on_frame_sent`]: LongWriter::on_frame_sent
pub struct LongWriter {
    mtu: AtomicUsize,
    state: Mutex<SendState>,
    sink: Sender<Bytes>,
}

#[derive(Default)]
struct SendState {
    queue: VecDeque<Bytes>,
    in_flight: bool,
}

impl LongWriter {
    /// Create a writer delivering frames to `sink`, starting at the
    /// default MTU.
    pub fn new(sink: Sender<Bytes>) -> Self {
        Self {
            mtu: AtomicUsize::new(DEFAULT_MTU),
            state: Mutex::new(SendState::default()),
            sink,
        }
    }

    /// Update the negotiated MTU. Affects only future [`submit`] calls;
    /// frames already queued keep their original sizing.
    ///
    /// [`submit`]: LongWriter::submit
    pub fn set_mtu(&self, mtu: usize) {
        debug!(mtu, "new mtu value");
        self.mtu.store(mtu, Ordering::Relaxed);
    }

    /// The MTU currently used for fragmentation plans.
    pub fn mtu(&self) -> usize {
        self.mtu.load(Ordering::Relaxed)
    }

    /// Fragment `message` and queue its frames for transmission.
    ///
    /// A message that would not fit in a single frame is compressed as a
    /// whole first; the compression flag is repeated on every frame so
    /// the receiver never has to guess. If the writer is idle the first
    /// frame is delivered to the sink before this call returns.
    pub fn submit(&self, message: &[u8]) -> Result<()> {
        let mtu = self.mtu.load(Ordering::Relaxed);
        let max_payload = match mtu.checked_sub(FRAME_OVERHEAD) {
            Some(n) if n > 0 => n,
            _ => return Err(FrameError::MtuTooSmall { mtu }),
        };

        let need_compress = message.len() >= max_payload;
        debug!(
            size = message.len(),
            compress = need_compress,
            "submitting message"
        );

        let body = if need_compress {
            Bytes::from(compress(message)?)
        } else {
            Bytes::copy_from_slice(message)
        };

        let mut state = self.state.lock();
        if body.len() < max_payload {
            state.queue.push_back(make_frame(0, need_compress, &body));
        } else {
            let frame_count = body.len().div_ceil(max_payload);
            debug!(frames = frame_count, "splitting message into frames");
            for (index, chunk) in body.chunks(max_payload).enumerate() {
                let frames_remaining = (frame_count - 1 - index) as u32;
                state
                    .queue
                    .push_back(make_frame(frames_remaining, need_compress, chunk));
            }
        }

        self.pump(&mut state)
    }

    /// Transport-level send completion: release the next queued frame.
    pub fn on_frame_sent(&self) {
        let mut state = self.state.lock();
        state.in_flight = false;
        if let Err(err) = self.pump(&mut state) {
            warn!(%err, "failed to deliver next frame");
        }
    }

    /// Drop all queued frames and the in-flight marker.
    ///
    /// Used on peer disconnect: a partially sent message is abandoned,
    /// since a disconnect invalidates the whole stream anyway.
    pub fn reset(&self) {
        debug!("resetting writer queue");
        let mut state = self.state.lock();
        state.queue.clear();
        state.in_flight = false;
    }

    fn pump(&self, state: &mut SendState) -> Result<()> {
        if state.in_flight {
            return Ok(());
        }
        let Some(frame) = state.queue.pop_front() else {
            debug!("no pending frames");
            return Ok(());
        };
        state.in_flight = true;
        self.sink.send(frame).map_err(|_| FrameError::ChannelClosed)
    }
}

fn make_frame(frames_remaining: u32, compressed: bool, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_frame(
        FrameHeader {
            frames_remaining,
            compressed,
        },
        payload,
        &mut buf,
    );
    buf.freeze()
}
