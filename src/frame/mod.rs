//! Snapshot framing: `marker[4] | payload_len u16 LE | payload`.
//!
//! The payload codec is chosen at build time. The default is the fixed-width
//! binary layout; the `keyed-frames` feature swaps in a self-describing
//! keyed document. The framing itself never changes.
use crate::config::{FRAME_HEADER_LEN, FRAME_MARKER, MAX_FRAME_LEN, MAX_PAYLOAD_LEN};
use crate::error::{FrameError, Result};
use crate::state::Snapshot;

#[cfg(not(feature = "keyed-frames"))]
mod binary;
mod decoder;
#[cfg(feature = "keyed-frames")]
mod keyed;

#[cfg(not(feature = "keyed-frames"))]
pub use binary::BinaryCodec as ActiveCodec;
pub use decoder::FrameDecoder;
#[cfg(feature = "keyed-frames")]
pub use keyed::KeyedCodec as ActiveCodec;

/// Payload encoding of one snapshot.
pub trait SnapshotCodec {
    /// Serialize into `out`, returning the number of bytes written.
    fn encode(snapshot: &Snapshot, out: &mut [u8]) -> Result<usize>;

    /// Parse a whole payload. Trailing bytes are an error.
    fn decode(payload: &[u8]) -> Result<Snapshot>;
}

/// Write the header and `payload` into `buf`. Returns total frame size.
pub fn build_frame(buf: &mut [u8], payload: &[u8]) -> Result<usize> {
    let len = payload.len();
    if len > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge { len });
    }
    let total = FRAME_HEADER_LEN + len;
    if buf.len() < total {
        return Err(FrameError::BufferTooSmall {
            needed: total,
            available: buf.len(),
        });
    }

    buf[..FRAME_MARKER.len()].copy_from_slice(&FRAME_MARKER);
    buf[FRAME_MARKER.len()..FRAME_HEADER_LEN].copy_from_slice(&(len as u16).to_le_bytes());
    buf[FRAME_HEADER_LEN..total].copy_from_slice(payload);
    Ok(total)
}

/// Payload length announced by a header, if `bytes` starts with one.
pub fn parse_header(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < FRAME_HEADER_LEN {
        return Err(FrameError::Incomplete);
    }
    if bytes[..FRAME_MARKER.len()] != FRAME_MARKER {
        return Err(FrameError::BadMarker);
    }
    let len = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
    if len > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge { len });
    }
    Ok(len)
}

/// Decode the frame at the start of `bytes`. Returns the snapshot and the
/// number of bytes the frame occupied.
pub fn decode_frame(bytes: &[u8]) -> Result<(Snapshot, usize)> {
    let len = parse_header(bytes)?;
    let total = FRAME_HEADER_LEN + len;
    if bytes.len() < total {
        return Err(FrameError::Incomplete);
    }
    let snapshot = ActiveCodec::decode(&bytes[FRAME_HEADER_LEN..total])?;
    Ok((snapshot, total))
}

/// One encoded frame, ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: heapless::Vec<u8, MAX_FRAME_LEN>,
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[FRAME_HEADER_LEN..]
    }

    pub fn payload_len(&self) -> usize {
        self.bytes.len() - FRAME_HEADER_LEN
    }
}

/// Snapshot to frame, with the build-time codec.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    encoded: u32,
    failures: u32,
}

impl FrameEncoder {
    pub const fn new() -> Self {
        Self {
            encoded: 0,
            failures: 0,
        }
    }

    pub fn encode(&mut self, snapshot: &Snapshot) -> Result<Frame> {
        match Self::encode_frame(snapshot) {
            Ok(frame) => {
                self.encoded = self.encoded.wrapping_add(1);
                Ok(frame)
            }
            Err(e) => {
                self.failures = self.failures.wrapping_add(1);
                error!("snapshot encode failed: {}", e);
                Err(e)
            }
        }
    }

    fn encode_frame(snapshot: &Snapshot) -> Result<Frame> {
        let mut payload = [0u8; MAX_PAYLOAD_LEN];
        let n = ActiveCodec::encode(snapshot, &mut payload)?;

        let mut buf = [0u8; MAX_FRAME_LEN];
        let total = build_frame(&mut buf, &payload[..n])?;

        let bytes = heapless::Vec::from_slice(&buf[..total]).map_err(|_| {
            FrameError::BufferTooSmall {
                needed: total,
                available: MAX_FRAME_LEN,
            }
        })?;
        Ok(Frame { bytes })
    }

    pub fn encoded(&self) -> u32 {
        self.encoded
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
