use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::{Bytes, BytesMut};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::codec::{decode_frame, DEFAULT_MTU};
use crate::compress::decompress;
use crate::error::Result;

/// Cap on the reassembly buffer pre-allocation. The estimate derived
/// from the first frame's header is untrusted input; the buffer still
/// grows on demand past this.
const MAX_BUFFER_PREALLOC: usize = 1024 * 1024;

/// Reassembles incoming frames into complete messages.
///
/// One message is in flight at a time: the accumulation buffer is
/// allocated on the first frame of a message and dropped once the final
/// frame delivers. Completed (and, when flagged, decompressed) messages
/// are handed to the delivery channel.
///
/// Callers must serialize [`on_frame`] invocations; the transport
/// dispatch loop is the single caller in practice.
///
/// [`on_frame`]: LongReader::on_frame
pub struct LongReader {
    mtu: AtomicUsize,
    buf: Mutex<Option<BytesMut>>,
    delivery: Sender<Bytes>,
}

impl LongReader {
    /// Create a reader delivering reassembled messages to `delivery`,
    /// starting at the default MTU.
    pub fn new(delivery: Sender<Bytes>) -> Self {
        Self {
            mtu: AtomicUsize::new(DEFAULT_MTU),
            buf: Mutex::new(None),
            delivery,
        }
    }

    /// Update the negotiated MTU, used to size future reassembly buffers.
    pub fn set_mtu(&self, mtu: usize) {
        debug!(mtu, "new mtu value");
        self.mtu.store(mtu, Ordering::Relaxed);
    }

    /// Process one received frame.
    ///
    /// Returns an error only for a frame too short to carry the fixed
    /// header. A decompression failure on the final frame is logged and
    /// the whole message dropped — no delivery, no error escalation.
    pub fn on_frame(&self, raw: &[u8]) -> Result<()> {
        let (header, payload) = decode_frame(raw)?;

        let mut slot = self.buf.lock();
        if slot.is_none() {
            let estimate = self
                .mtu
                .load(Ordering::Relaxed)
                .saturating_mul(header.frames_remaining as usize + 1);
            let capacity = estimate.min(MAX_BUFFER_PREALLOC);
            debug!(capacity, frames = header.frames_remaining + 1, "allocating reassembly buffer");
            *slot = Some(BytesMut::with_capacity(capacity));
        }
        if let Some(buf) = slot.as_mut() {
            buf.extend_from_slice(payload);
        }

        if header.frames_remaining > 0 {
            debug!(
                appended = payload.len(),
                remaining = header.frames_remaining,
                "awaiting more frames"
            );
            return Ok(());
        }

        let Some(assembled) = slot.take() else {
            return Ok(());
        };
        drop(slot);

        let assembled = assembled.freeze();
        debug!(size = assembled.len(), compressed = header.compressed, "message complete");

        let message = if header.compressed {
            match decompress(&assembled) {
                Ok(raw) => Bytes::from(raw),
                Err(err) => {
                    warn!(%err, "dropping message: decompression failed");
                    return Ok(());
                }
            }
        } else {
            assembled
        };

        if self.delivery.send(message).is_err() {
            warn!("message delivery channel closed");
        }
        Ok(())
    }

    /// Discard any in-progress reassembly.
    ///
    /// Used on reconnect to purge the previous peer's partial state.
    pub fn reset(&self) {
        debug!("resetting reader buffer");
        *self.buf.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_frame, FrameHeader, FRAME_OVERHEAD, HEADER_SIZE};
    use crate::compress::compress;
    use crate::error::FrameError;
    use crate::writer::LongWriter;
    use crossbeam_channel::{unbounded, Receiver};

    fn reader() -> (LongReader, Receiver<Bytes>) {
        let (tx, rx) = unbounded();
        (LongReader::new(tx), rx)
    }

    fn frame(frames_remaining: u32, compressed: bool, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(
            FrameHeader {
                frames_remaining,
                compressed,
            },
            payload,
            &mut buf,
        );
        buf.to_vec()
    }

    #[test]
    fn single_frame_message_delivered() {
        let (reader, rx) = reader();
        reader.on_frame(&frame(0, false, b"hello")).unwrap();
        assert_eq!(rx.try_recv().unwrap().as_ref(), b"hello");
    }

    #[test]
    fn three_frames_reassemble_and_decompress_once() {
        let (reader, rx) = reader();
        let message = b"a message long enough to be worth splitting".repeat(4);
        let packed = compress(&message).unwrap();
        assert!(packed.len() > 30, "test wants three chunks");

        let third = packed.len().div_ceil(3);
        let chunks: Vec<&[u8]> = packed.chunks(third).collect();
        assert_eq!(chunks.len(), 3);

        reader.on_frame(&frame(2, true, chunks[0])).unwrap();
        reader.on_frame(&frame(1, true, chunks[1])).unwrap();
        assert!(rx.try_recv().is_err(), "no delivery before the final frame");
        reader.on_frame(&frame(0, true, chunks[2])).unwrap();

        assert_eq!(rx.try_recv().unwrap().as_ref(), &message[..]);
        assert!(rx.try_recv().is_err(), "exactly one delivery");
    }

    #[test]
    fn truncated_header_is_an_error() {
        let (reader, rx) = reader();
        let err = reader.on_frame(&[0, 0, 0]).unwrap_err();
        assert!(matches!(err, FrameError::TruncatedHeader { len: 3 }));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn decompression_failure_drops_message_silently() {
        let (reader, rx) = reader();
        reader.on_frame(&frame(0, true, b"not a zlib stream")).unwrap();
        assert!(rx.try_recv().is_err(), "corrupt message must not be delivered");

        // The buffer was discarded; the next message reassembles cleanly.
        reader.on_frame(&frame(0, false, b"fresh")).unwrap();
        assert_eq!(rx.try_recv().unwrap().as_ref(), b"fresh");
    }

    #[test]
    fn reset_on_idle_reader_is_a_noop() {
        let (reader, rx) = reader();
        reader.reset();
        reader.on_frame(&frame(0, false, b"still works")).unwrap();
        assert_eq!(rx.try_recv().unwrap().as_ref(), b"still works");
    }

    #[test]
    fn reset_mid_reassembly_discards_partial_state() {
        let (reader, rx) = reader();
        reader.on_frame(&frame(3, false, b"stale-")).unwrap();
        reader.reset();

        reader.on_frame(&frame(0, false, b"clean")).unwrap();
        assert_eq!(rx.try_recv().unwrap().as_ref(), b"clean");
    }

    #[test]
    fn empty_final_frame_delivers_empty_message() {
        let (reader, rx) = reader();
        reader.on_frame(&frame(0, false, b"")).unwrap();
        assert!(rx.try_recv().unwrap().is_empty());
    }

    /// End-to-end with the writer: fragment, feed every frame across,
    /// compare the reassembled message.
    #[test]
    fn writer_to_reader_roundtrip() {
        let sizes = [0usize, 1, 14, 15, 16, 100, 5_000, 70_000];
        let mtus = [23usize, 64, 185, 512];

        for &mtu in &mtus {
            for &size in &sizes {
                let message: Vec<u8> =
                    (0..size).map(|i| (i.wrapping_mul(31) ^ (i >> 8)) as u8).collect();

                let (frame_tx, frame_rx) = unbounded();
                let writer = LongWriter::new(frame_tx);
                writer.set_mtu(mtu);

                let (reader, delivered) = reader();
                reader.set_mtu(mtu);

                writer.submit(&message).unwrap();
                while let Ok(frame) = frame_rx.try_recv() {
                    assert!(frame.len() <= mtu - FRAME_OVERHEAD + HEADER_SIZE);
                    reader.on_frame(&frame).unwrap();
                    writer.on_frame_sent();
                }

                let out = delivered.try_recv().unwrap();
                assert_eq!(out.as_ref(), &message[..], "mtu={mtu} size={size}");
                assert!(delivered.try_recv().is_err());
            }
        }
    }

    /// The worked example: MTU 23 → max payload 15; a 50-byte message is
    /// compressed and split with descending counts.
    #[test]
    fn mtu23_scenario_counts_descend() {
        let (frame_tx, frame_rx) = unbounded();
        let writer = LongWriter::new(frame_tx);

        let message: Vec<u8> = (0..50u8).collect();
        let packed_len = compress(&message).unwrap().len();
        let expected = packed_len.div_ceil(23 - FRAME_OVERHEAD);

        writer.submit(&message).unwrap();

        let mut counts = Vec::new();
        while let Ok(frame) = frame_rx.try_recv() {
            let (header, _) = crate::codec::decode_frame(&frame).unwrap();
            assert!(header.compressed);
            counts.push(header.frames_remaining as usize);
            writer.on_frame_sent();
        }

        let want: Vec<usize> = (0..expected).rev().collect();
        assert_eq!(counts, want);
    }
}
