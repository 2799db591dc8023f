use core::mem::size_of;

use super::SnapshotCodec;
use crate::error::{FrameError, Result};
use crate::state::Snapshot;

/// Fixed-width payload: the `Snapshot` fields in declaration order, each an
/// IEEE-754 f32 in native byte order.
pub struct BinaryCodec;

impl BinaryCodec {
    pub const PAYLOAD_LEN: usize = size_of::<Snapshot>();
}

impl SnapshotCodec for BinaryCodec {
    fn encode(snapshot: &Snapshot, out: &mut [u8]) -> Result<usize> {
        let bytes = bytemuck::bytes_of(snapshot);
        if out.len() < bytes.len() {
            return Err(FrameError::BufferTooSmall {
                needed: bytes.len(),
                available: out.len(),
            });
        }
        out[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    fn decode(payload: &[u8]) -> Result<Snapshot> {
        if payload.len() != Self::PAYLOAD_LEN {
            return Err(FrameError::Decode);
        }
        Ok(bytemuck::pod_read_unaligned(payload))
    }
}

const _: () = assert!(BinaryCodec::PAYLOAD_LEN <= crate::config::MAX_PAYLOAD_LEN);
