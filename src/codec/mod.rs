//! Capture-format codec seam.
//!
//! The control plane treats the portable capture format as opaque: it only
//! ever hands a codec the visible flows on export and replays whatever the
//! codec yields on import. [`BinaryCodec`] is the default implementation.
//!
//! # Framing (BinaryCodec)
//!
//! One length-prefixed bincode frame per flow:
//!
//! ```text
//! [4 bytes: frame length (big-endian u32)]
//! [N bytes: bincode-serialized flow]
//! ```

use crate::flow::Flow;
use std::io::{Read, Write};
use thiserror::Error;

/// Maximum size of a single encoded flow (64 MB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Errors from capture-stream encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    /// A frame exceeded [`MAX_FRAME_SIZE`].
    #[error("frame too large: {0} bytes (max {MAX_FRAME_SIZE})")]
    FrameTooLarge(usize),
    /// The stream ended in the middle of a frame.
    #[error("truncated capture stream")]
    Truncated,
}

/// Portable capture-format codec.
pub trait CaptureCodec: Send + Sync {
    /// Serialize `flows` onto `out`, preserving order.
    fn write(&self, out: &mut dyn Write, flows: &[Flow]) -> Result<(), CodecError>;

    /// Deserialize a capture stream, yielding flows in stream order.
    fn read(&self, input: &mut dyn Read) -> Result<Vec<Flow>, CodecError>;
}

/// Default codec: length-prefixed bincode frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryCodec;

/// Read a frame length, distinguishing clean EOF (`None`) from a stream
/// cut off mid-prefix.
fn read_frame_len(input: &mut dyn Read) -> Result<Option<usize>, CodecError> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        let n = input.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(CodecError::Truncated);
        }
        filled += n;
    }
    Ok(Some(u32::from_be_bytes(buf) as usize))
}

impl CaptureCodec for BinaryCodec {
    fn write(&self, out: &mut dyn Write, flows: &[Flow]) -> Result<(), CodecError> {
        for flow in flows {
            let frame = bincode::serialize(flow)?;
            if frame.len() > MAX_FRAME_SIZE {
                return Err(CodecError::FrameTooLarge(frame.len()));
            }
            out.write_all(&(frame.len() as u32).to_be_bytes())?;
            out.write_all(&frame)?;
        }
        Ok(())
    }

    fn read(&self, input: &mut dyn Read) -> Result<Vec<Flow>, CodecError> {
        let mut flows = Vec::new();
        while let Some(len) = read_frame_len(input)? {
            if len > MAX_FRAME_SIZE {
                return Err(CodecError::FrameTooLarge(len));
            }
            let mut frame = vec![0u8; len];
            input
                .read_exact(&mut frame)
                .map_err(|_| CodecError::Truncated)?;
            flows.push(bincode::deserialize(&frame)?);
        }
        Ok(flows)
    }
}
