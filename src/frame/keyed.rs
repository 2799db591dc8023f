use super::SnapshotCodec;
use crate::error::{FrameError, Result};
use crate::state::Snapshot;

/// Self-describing payload: a JSON object keyed by field name.
///
/// Bigger than the binary layout but readable by consumers that do not share
/// the struct definition.
pub struct KeyedCodec;

impl SnapshotCodec for KeyedCodec {
    fn encode(snapshot: &Snapshot, out: &mut [u8]) -> Result<usize> {
        serde_json_core::to_slice(snapshot, out).map_err(|_| FrameError::Encode)
    }

    fn decode(payload: &[u8]) -> Result<Snapshot> {
        match serde_json_core::from_slice::<Snapshot>(payload) {
            Ok((snapshot, used)) if used == payload.len() => Ok(snapshot),
            _ => Err(FrameError::Decode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_PAYLOAD_LEN;

    fn encoded(s: &Snapshot) -> ([u8; MAX_PAYLOAD_LEN], usize) {
        let mut out = [0u8; MAX_PAYLOAD_LEN];
        let n = KeyedCodec::encode(s, &mut out).unwrap();
        (out, n)
    }

    #[test]
    fn payload_is_keyed_by_field_name() {
        let mut s = Snapshot::new(42);
        s.pressure = 1000.5;
        let (out, n) = encoded(&s);
        let text = core::str::from_utf8(&out[..n]).unwrap();

        assert!(text.starts_with("{\"timestamp\":42"));
        assert!(text.contains("\"pressure\":1000.5"));
        assert!(text.contains("\"gps_alt\":-9999.9"));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let (mut out, n) = encoded(&Snapshot::new(0));
        out[n] = b'x';
        assert_eq!(KeyedCodec::decode(&out[..n + 1]), Err(FrameError::Decode));
    }

    #[test]
    fn small_buffer_fails_to_encode() {
        let mut out = [0u8; 16];
        assert_eq!(
            KeyedCodec::encode(&Snapshot::new(0), &mut out),
            Err(FrameError::Encode)
        );
    }
}
