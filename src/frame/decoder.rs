use heapless::Vec;

use super::{decode_frame, parse_header};
use crate::config::{FRAME_HEADER_LEN, FRAME_MARKER, MAX_FRAME_LEN};
use crate::error::FrameError;
use crate::state::Snapshot;

/// Receive side of the link: pulls snapshots back out of an unframed byte
/// stream.
///
/// Bytes before a marker are discarded. A candidate frame whose header or
/// payload does not check out is abandoned one byte past its marker, and a
/// truncated one is abandoned at the marker of the frame that cut it off.
#[derive(Default)]
pub struct FrameDecoder {
    buffer: Vec<u8, MAX_FRAME_LEN>,
    frames: u32,
    rejected: u32,
    skipped_bytes: u32,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte. Returns a snapshot when it completes a valid frame.
    pub fn push(&mut self, byte: u8) -> Option<Snapshot> {
        if self.buffer.push(byte).is_err() {
            // Only reachable if a frame was never resolved; start over.
            self.skipped_bytes = self.skipped_bytes.wrapping_add(self.buffer.len() as u32);
            self.buffer.clear();
            return None;
        }

        loop {
            self.align();
            match self.inner_marker() {
                Some(Inner::Marker(at)) => {
                    debug!("truncated frame, resyncing {} bytes in", at);
                    self.rejected = self.rejected.wrapping_add(1);
                    self.consume(at);
                    continue;
                }
                Some(Inner::Partial) => return None,
                None => {}
            }
            match decode_frame(&self.buffer) {
                Ok((snapshot, used)) => {
                    self.consume(used);
                    self.frames = self.frames.wrapping_add(1);
                    return Some(snapshot);
                }
                Err(FrameError::Incomplete) => return None,
                Err(e) => {
                    debug!("dropping candidate frame: {}", e);
                    self.rejected = self.rejected.wrapping_add(1);
                    self.consume(1);
                }
            }
        }
    }

    /// Feed a chunk, calling `on_frame` for every snapshot it completes.
    pub fn push_bytes(&mut self, data: &[u8], mut on_frame: impl FnMut(Snapshot)) {
        for &b in data {
            if let Some(snapshot) = self.push(b) {
                on_frame(snapshot);
            }
        }
    }

    /// Bytes held while waiting for the rest of a frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    pub fn skipped_bytes(&self) -> u32 {
        self.skipped_bytes
    }

    /// Drop everything before the first position that could start a marker.
    /// A partial marker at the tail is kept.
    fn align(&mut self) {
        let buf = self.buffer.as_slice();
        let start = (0..buf.len())
            .find(|&i| {
                let n = (buf.len() - i).min(FRAME_MARKER.len());
                buf[i..i + n] == FRAME_MARKER[..n]
            })
            .unwrap_or(buf.len());

        if start > 0 {
            self.skipped_bytes = self.skipped_bytes.wrapping_add(start as u32);
            self.consume(start);
        }
    }

    /// A marker starting inside the announced span of the current
    /// candidate. Payload samples never encode the marker pattern, so one
    /// there means the candidate was cut short and the next frame began.
    fn inner_marker(&self) -> Option<Inner> {
        let len = parse_header(&self.buffer).ok()?;
        let end = FRAME_HEADER_LEN + len;
        let buf = self.buffer.as_slice();
        let at = (1..end.min(buf.len())).find(|&i| {
            let n = (buf.len() - i).min(FRAME_MARKER.len());
            buf[i..i + n] == FRAME_MARKER[..n]
        })?;
        if buf.len() - at >= FRAME_MARKER.len() {
            Some(Inner::Marker(at))
        } else {
            Some(Inner::Partial)
        }
    }

    fn consume(&mut self, n: usize) {
        let remaining = self.buffer.len() - n;
        self.buffer.rotate_left(n);
        self.buffer.truncate(remaining);
    }
}

enum Inner {
    /// Whole marker at this offset.
    Marker(usize),
    /// The tail might be the start of one; wait for more bytes.
    Partial,
}
