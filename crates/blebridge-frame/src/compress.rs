use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::debug;

use crate::error::{FrameError, Result};

/// Compress a whole message with zlib.
///
/// Deterministic and lossless; fails only on a stream-level failure,
/// never on input content.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len()), Compression::default());
    encoder.write_all(data).map_err(FrameError::Compress)?;
    let output = encoder.finish().map_err(FrameError::Compress)?;

    debug!(original = data.len(), compressed = output.len(), "compressed message");
    Ok(output)
}

/// Inverse of [`compress`]; fails when `data` is not a valid zlib stream.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut output = Vec::with_capacity(data.len().saturating_mul(2));
    decoder
        .read_to_end(&mut output)
        .map_err(FrameError::Decompress)?;

    debug!(original = data.len(), decompressed = output.len(), "decompressed message");
    Ok(output)
}
