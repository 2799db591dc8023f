use embedded_hal::blocking::serial::Write;
use heapless::Deque;

use crate::config::FRAME_HEADER_LEN;
use crate::frame::Frame;
use crate::sensors::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitOutcome {
    Sent,
    /// Not enough room for the whole frame; nothing was written.
    Dropped,
    /// The transport refused a write it had room for.
    Failed,
}

/// All-or-nothing handoff of one frame per cycle. A frame that does not fit
/// is dropped, never split and never queued for a later cycle.
#[derive(Debug, Default)]
pub struct TransmitGate {
    sent: u32,
    dropped: u32,
    failed: u32,
}

impl TransmitGate {
    pub const fn new() -> Self {
        Self {
            sent: 0,
            dropped: 0,
            failed: 0,
        }
    }

    pub fn transmit<T: Transport>(&mut self, transport: &mut T, frame: &Frame) -> TransmitOutcome {
        let needed = FRAME_HEADER_LEN + frame.payload_len();
        let available = transport.available_write_capacity();
        if available < needed {
            self.dropped = self.dropped.wrapping_add(1);
            debug!("frame dropped: need {} bytes, {} free", needed, available);
            return TransmitOutcome::Dropped;
        }

        if transport.write(frame.as_bytes()) {
            self.sent = self.sent.wrapping_add(1);
            TransmitOutcome::Sent
        } else {
            self.failed = self.failed.wrapping_add(1);
            warn!("transport rejected a {} byte frame", needed);
            TransmitOutcome::Failed
        }
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn failed(&self) -> u32 {
        self.failed
    }
}

/// Software TX queue in front of a blocking serial writer.
///
/// Frames land in the queue whole; `service` moves at most `max` bytes per
/// call to the wire so a slow link shows up as shrinking capacity.
pub struct BufferedTransport<W, const N: usize> {
    device: W,
    queue: Deque<u8, N>,
}

impl<W: Write<u8>, const N: usize> BufferedTransport<W, N> {
    pub fn new(device: W) -> Self {
        Self {
            device,
            queue: Deque::new(),
        }
    }

    /// Bytes queued but not yet written to the device.
    pub fn waiting(&self) -> usize {
        self.queue.len()
    }

    /// Push up to `max` queued bytes to the device. Blocks until they are
    /// written.
    pub fn service(&mut self, max: usize) -> Result<usize, W::Error> {
        let mut chunk = [0u8; 64];
        let mut written = 0;

        while written < max {
            let mut n = 0;
            while n < chunk.len() && written + n < max {
                match self.queue.pop_front() {
                    Some(b) => {
                        chunk[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            if n == 0 {
                break;
            }
            self.device.bwrite_all(&chunk[..n])?;
            written += n;
        }

        if written > 0 {
            self.device.bflush()?;
        }
        Ok(written)
    }

    pub fn device_mut(&mut self) -> &mut W {
        &mut self.device
    }
}

impl<W: Write<u8>, const N: usize> Transport for BufferedTransport<W, N> {
    fn available_write_capacity(&self) -> usize {
        N - self.queue.len()
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.available_write_capacity() {
            return false;
        }
        for &b in bytes {
            // Capacity was checked above.
            let _ = self.queue.push_back(b);
        }
        true
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::TRANSPORT_BUFFER_LEN;
    use crate::frame::FrameEncoder;
    use crate::state::Snapshot;
    use std::vec::Vec;

    /// Transport with a scripted amount of free space that records writes.
    pub struct MockTransport {
        pub capacity: usize,
        pub accept: bool,
        pub written: Vec<u8>,
        pub writes: u32,
    }

    impl MockTransport {
        pub fn with_capacity(capacity: usize) -> Self {
            Self {
                capacity,
                accept: true,
                written: Vec::new(),
                writes: 0,
            }
        }
    }

    impl Transport for MockTransport {
        fn available_write_capacity(&self) -> usize {
            self.capacity
        }

        fn write(&mut self, bytes: &[u8]) -> bool {
            self.writes += 1;
            if !self.accept {
                return false;
            }
            self.written.extend_from_slice(bytes);
            true
        }
    }

    /// Blocking serial sink for `BufferedTransport`.
    #[derive(Default)]
    pub struct SerialSink {
        pub bytes: Vec<u8>,
        pub flushes: u32,
    }

    impl Write<u8> for SerialSink {
        type Error = core::convert::Infallible;

        fn bwrite_all(&mut self, buffer: &[u8]) -> Result<(), Self::Error> {
            self.bytes.extend_from_slice(buffer);
            Ok(())
        }

        fn bflush(&mut self) -> Result<(), Self::Error> {
            self.flushes += 1;
            Ok(())
        }
    }

    fn frame() -> Frame {
        FrameEncoder::new().encode(&Snapshot::new(10)).unwrap()
    }

    #[test]
    fn never_writes_without_room_for_the_whole_frame() {
        let frame = frame();
        let needed = 4 + 2 + frame.payload_len();
        let mut gate = TransmitGate::new();

        for capacity in [0, 1, 6, needed - 1] {
            let mut transport = MockTransport::with_capacity(capacity);
            assert_eq!(gate.transmit(&mut transport, &frame), TransmitOutcome::Dropped);
            assert_eq!(transport.writes, 0);
        }
        assert_eq!(gate.dropped(), 4);
    }

    #[test]
    fn exact_fit_is_sent_whole() {
        let frame = frame();
        let mut transport = MockTransport::with_capacity(frame.len());
        let mut gate = TransmitGate::new();

        assert_eq!(gate.transmit(&mut transport, &frame), TransmitOutcome::Sent);
        assert_eq!(transport.written, frame.as_bytes());
        assert_eq!(gate.sent(), 1);
    }

    #[test]
    fn refused_write_is_counted() {
        let mut transport = MockTransport::with_capacity(4096);
        transport.accept = false;
        let mut gate = TransmitGate::new();

        assert_eq!(gate.transmit(&mut transport, &frame()), TransmitOutcome::Failed);
        assert_eq!(gate.failed(), 1);
    }

    #[test]
    fn buffered_transport_reports_backpressure() {
        let frame = frame();
        let mut transport: BufferedTransport<SerialSink, TRANSPORT_BUFFER_LEN> =
            BufferedTransport::new(SerialSink::default());
        let mut gate = TransmitGate::new();

        let filler = std::vec![0u8; TRANSPORT_BUFFER_LEN - frame.len() + 1];
        assert!(transport.write(&filler));
        assert_eq!(gate.transmit(&mut transport, &frame), TransmitOutcome::Dropped);
        assert_eq!(transport.waiting(), filler.len());

        transport.service(1).unwrap();
        assert_eq!(gate.transmit(&mut transport, &frame), TransmitOutcome::Sent);
        assert_eq!(transport.available_write_capacity(), 0);
    }

    #[test]
    fn service_drains_at_most_max() {
        let mut transport: BufferedTransport<SerialSink, 256> =
            BufferedTransport::new(SerialSink::default());
        let data: Vec<u8> = (0..200u8).collect();
        assert!(transport.write(&data));

        assert_eq!(transport.service(150).unwrap(), 150);
        assert_eq!(transport.waiting(), 50);
        assert_eq!(transport.service(1000).unwrap(), 50);
        assert_eq!(transport.service(1000).unwrap(), 0);

        let sink = transport.device_mut();
        assert_eq!(sink.bytes, data);
        assert_eq!(sink.flushes, 2);
    }

    #[test]
    fn oversized_write_is_refused_whole() {
        let mut transport: BufferedTransport<SerialSink, 16> =
            BufferedTransport::new(SerialSink::default());
        assert!(transport.write(&[1; 10]));
        assert!(!transport.write(&[2; 7]));
        assert_eq!(transport.waiting(), 10);
        assert_eq!(transport.available_write_capacity(), 6);
    }
}
