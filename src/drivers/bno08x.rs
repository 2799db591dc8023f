use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Read, Write};
use heapless::Deque;

use super::Error;
use crate::sensors::{EventKind, InertialEvent, InertialSensor};
use crate::state::{Quaternion, Vector3};

pub const DEFAULT_ADDRESS: u8 = 0x4A;
pub const ALT_ADDRESS: u8 = 0x4B;

// ── SHTP ──────────────────────────────────────────────────────────────────────
const HEADER_LEN: usize = 4;
const RX_BUFFER_LEN: usize = 256;
const TX_BUFFER_LEN: usize = HEADER_LEN + 17;
const CONTINUATION_BIT: u16 = 0x8000;

const CHANNEL_EXECUTABLE: u8 = 1;
const CHANNEL_CONTROL: u8 = 2;
const CHANNEL_REPORTS: u8 = 3;
const CHANNEL_WAKE_REPORTS: u8 = 4;

const EXEC_RESET: u8 = 0x01;
const EXEC_RESET_COMPLETE: u8 = 0x01;

// ── SH-2 ──────────────────────────────────────────────────────────────────────
const SET_FEATURE_COMMAND: u8 = 0xFD;
const PRODUCT_ID_REQUEST: u8 = 0xF9;
const PRODUCT_ID_RESPONSE: u8 = 0xF8;
const BASE_TIMESTAMP: u8 = 0xFB;
const TIMESTAMP_REBASE: u8 = 0xFA;

const REPORT_ACCELEROMETER: u8 = 0x01;
const REPORT_GYROSCOPE_CALIBRATED: u8 = 0x02;
const REPORT_MAGNETIC_FIELD_CALIBRATED: u8 = 0x03;
const REPORT_LINEAR_ACCELERATION: u8 = 0x04;
const REPORT_ROTATION_VECTOR: u8 = 0x05;
const REPORT_GYROSCOPE_UNCALIBRATED: u8 = 0x07;
const REPORT_GAME_ROTATION_VECTOR: u8 = 0x08;
const REPORT_GEOMAGNETIC_ROTATION_VECTOR: u8 = 0x09;
const REPORT_MAGNETIC_FIELD_UNCALIBRATED: u8 = 0x0F;

// Q points of the fixed-point report fields
const Q_ACCEL: u8 = 8;
const Q_GYRO: u8 = 9;
const Q_MAG: u8 = 4;
const Q_ROTATION: u8 = 14;

// Failed bring-up blocks at most RESET_SETTLE_MS + PROBE_POLLS * PROBE_POLL_MS.
const RESET_SETTLE_MS: u32 = 50;
const PROBE_POLL_MS: u32 = 5;
const PROBE_POLLS: usize = 10;
const EVENT_QUEUE_LEN: usize = 16;

/// Length of one report inside an input packet, by report id.
fn report_len(id: u8) -> Option<usize> {
    match id {
        BASE_TIMESTAMP | TIMESTAMP_REBASE => Some(5),
        REPORT_ACCELEROMETER
        | REPORT_GYROSCOPE_CALIBRATED
        | REPORT_MAGNETIC_FIELD_CALIBRATED
        | REPORT_LINEAR_ACCELERATION => Some(10),
        REPORT_GAME_ROTATION_VECTOR => Some(12),
        REPORT_ROTATION_VECTOR | REPORT_GEOMAGNETIC_ROTATION_VECTOR => Some(14),
        REPORT_GYROSCOPE_UNCALIBRATED | REPORT_MAGNETIC_FIELD_UNCALIBRATED => Some(16),
        _ => None,
    }
}

fn report_id(kind: EventKind) -> u8 {
    match kind {
        // Gravity removed, matching what the pipeline frames as acceleration.
        EventKind::Acceleration => REPORT_LINEAR_ACCELERATION,
        EventKind::Gyro => REPORT_GYROSCOPE_CALIBRATED,
        EventKind::Rotation => REPORT_ROTATION_VECTOR,
        EventKind::MagneticField => REPORT_MAGNETIC_FIELD_CALIBRATED,
    }
}

fn i16_at(r: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([r[at], r[at + 1]])
}

fn fixed(raw: i16, q: u8) -> f32 {
    raw as f32 / (1u32 << q) as f32
}

fn vector(r: &[u8], q: u8) -> Vector3 {
    Vector3::new(
        fixed(i16_at(r, 4), q),
        fixed(i16_at(r, 6), q),
        fixed(i16_at(r, 8), q),
    )
}

/// Decode one sensor report. `r` is exactly `report_len(r[0])` bytes:
/// id, sequence, status, delay, then little-endian fields.
fn decode_report(r: &[u8]) -> Option<InertialEvent> {
    match r[0] {
        REPORT_LINEAR_ACCELERATION => Some(InertialEvent::Acceleration(vector(r, Q_ACCEL))),
        REPORT_GYROSCOPE_CALIBRATED => Some(InertialEvent::Gyro(vector(r, Q_GYRO))),
        REPORT_MAGNETIC_FIELD_CALIBRATED => Some(InertialEvent::MagneticField(vector(r, Q_MAG))),
        REPORT_ROTATION_VECTOR => Some(InertialEvent::Rotation(Quaternion::new(
            fixed(i16_at(r, 10), Q_ROTATION),
            fixed(i16_at(r, 4), Q_ROTATION),
            fixed(i16_at(r, 6), Q_ROTATION),
            fixed(i16_at(r, 8), Q_ROTATION),
        ))),
        _ => None,
    }
}

/// BNO080/BNO085 over I²C, speaking SHTP.
///
/// Reports are pulled one packet at a time; a packet may carry several
/// reports, which are queued and handed out one per `next_event`.
pub struct Bno08x<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    sequence: [u8; 6],
    pending: Deque<InertialEvent, EVENT_QUEUE_LEN>,
    reset_seen: bool,
    product_id_seen: bool,
    packets: u32,
    overflowed_reports: u32,
}

impl<I2C, D, E> Bno08x<I2C, D>
where
    I2C: Read<Error = E> + Write<Error = E>,
    D: DelayMs<u32>,
{
    pub fn new(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
            sequence: [0; 6],
            pending: Deque::new(),
            reset_seen: false,
            product_id_seen: false,
            packets: 0,
            overflowed_reports: 0,
        }
    }

    /// Soft reset, then wait for the product ID to prove the hub is alive.
    pub fn reset_and_probe(&mut self) -> Result<(), Error<E>> {
        self.send(CHANNEL_EXECUTABLE, &[EXEC_RESET])?;
        self.delay.delay_ms(RESET_SETTLE_MS);

        self.product_id_seen = false;
        self.send(CHANNEL_CONTROL, &[PRODUCT_ID_REQUEST, 0])?;
        for _ in 0..PROBE_POLLS {
            if !self.receive()? {
                self.delay.delay_ms(PROBE_POLL_MS);
            }
            if self.product_id_seen {
                break;
            }
        }
        if !self.product_id_seen {
            return Err(Error::NotResponding);
        }

        // Our own reset is not news to the caller.
        self.reset_seen = false;
        self.pending.clear();
        Ok(())
    }

    /// Ask for `report` every `interval_us`.
    pub fn set_feature(&mut self, report: u8, interval_us: u32) -> Result<(), Error<E>> {
        let mut cmd = [0u8; 17];
        cmd[0] = SET_FEATURE_COMMAND;
        cmd[1] = report;
        // [2] flags, [3..5] change sensitivity
        cmd[5..9].copy_from_slice(&interval_us.to_le_bytes());
        // [9..13] batch interval, [13..17] sensor-specific config
        self.send(CHANNEL_CONTROL, &cmd)
    }

    pub fn packets(&self) -> u32 {
        self.packets
    }

    pub fn overflowed_reports(&self) -> u32 {
        self.overflowed_reports
    }

    fn send(&mut self, channel: u8, payload: &[u8]) -> Result<(), Error<E>> {
        let len = HEADER_LEN + payload.len();
        let mut buf = [0u8; TX_BUFFER_LEN];
        buf[..2].copy_from_slice(&(len as u16).to_le_bytes());
        buf[2] = channel;
        buf[3] = self.sequence[channel as usize];
        buf[HEADER_LEN..len].copy_from_slice(payload);
        self.sequence[channel as usize] = self.sequence[channel as usize].wrapping_add(1);

        self.i2c.write(self.address, &buf[..len]).map_err(Error::Bus)
    }

    /// Read one packet if the hub has one. `Ok(false)` when it had nothing.
    fn receive(&mut self) -> Result<bool, Error<E>> {
        let mut header = [0u8; HEADER_LEN];
        self.i2c.read(self.address, &mut header).map_err(Error::Bus)?;
        let len = (u16::from_le_bytes([header[0], header[1]]) & !CONTINUATION_BIT) as usize;
        if len <= HEADER_LEN {
            return Ok(false);
        }

        // The hub restarts the packet, header included, on every read.
        let n = len.min(RX_BUFFER_LEN);
        let mut buf = [0u8; RX_BUFFER_LEN];
        self.i2c.read(self.address, &mut buf[..n]).map_err(Error::Bus)?;
        self.packets = self.packets.wrapping_add(1);

        self.dispatch(buf[2], &buf[HEADER_LEN..n]);
        Ok(true)
    }

    fn dispatch(&mut self, channel: u8, payload: &[u8]) {
        match channel {
            CHANNEL_EXECUTABLE => {
                if payload.first() == Some(&EXEC_RESET_COMPLETE) {
                    self.reset_seen = true;
                }
            }
            CHANNEL_CONTROL => {
                if payload.first() == Some(&PRODUCT_ID_RESPONSE) {
                    self.product_id_seen = true;
                }
            }
            CHANNEL_REPORTS | CHANNEL_WAKE_REPORTS => self.parse_reports(payload),
            _ => {}
        }
    }

    fn parse_reports(&mut self, payload: &[u8]) {
        let mut i = 0;
        while i < payload.len() {
            let id = payload[i];
            let Some(len) = report_len(id) else {
                debug!("BNO08x: unknown report {}, rest of packet skipped", id);
                return;
            };
            if i + len > payload.len() {
                return;
            }
            if let Some(event) = decode_report(&payload[i..i + len]) {
                if self.pending.push_back(event).is_err() {
                    self.overflowed_reports = self.overflowed_reports.wrapping_add(1);
                }
            }
            i += len;
        }
    }
}

impl<I2C, D, E> InertialSensor for Bno08x<I2C, D>
where
    I2C: Read<Error = E> + Write<Error = E>,
    D: DelayMs<u32>,
{
    fn initialize(&mut self) -> bool {
        match self.reset_and_probe() {
            Ok(()) => true,
            Err(Error::NotResponding) => {
                warn!("BNO08x: no product ID response");
                false
            }
            Err(_) => {
                warn!("BNO08x: bus error during bring-up");
                false
            }
        }
    }

    fn subscribe(&mut self, kind: EventKind, interval_us: u32) -> bool {
        self.set_feature(report_id(kind), interval_us).is_ok()
    }

    fn was_reset(&mut self) -> bool {
        core::mem::take(&mut self.reset_seen)
    }

    fn next_event(&mut self) -> Option<InertialEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        match self.receive() {
            Ok(true) => self.pending.pop_front(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::vec::Vec;

    struct NoDelay;

    impl DelayMs<u32> for NoDelay {
        fn delay_ms(&mut self, _ms: u32) {}
    }

    /// Hub stand-in: serves queued packets and answers the product ID probe.
    #[derive(Default)]
    struct MockHub {
        packets: VecDeque<Vec<u8>>,
        writes: Vec<Vec<u8>>,
        answers_probe: bool,
        broken: bool,
    }

    impl Read for MockHub {
        type Error = ();

        fn read(&mut self, _address: u8, buf: &mut [u8]) -> Result<(), ()> {
            if self.broken {
                return Err(());
            }
            buf.fill(0);
            if buf.len() == HEADER_LEN {
                if let Some(p) = self.packets.front() {
                    buf.copy_from_slice(&p[..HEADER_LEN]);
                }
            } else if let Some(p) = self.packets.pop_front() {
                let n = p.len().min(buf.len());
                buf[..n].copy_from_slice(&p[..n]);
            }
            Ok(())
        }
    }

    impl Write for MockHub {
        type Error = ();

        fn write(&mut self, _address: u8, bytes: &[u8]) -> Result<(), ()> {
            if self.broken {
                return Err(());
            }
            self.writes.push(bytes.to_vec());
            if self.answers_probe && bytes[2] == CHANNEL_CONTROL && bytes[4] == PRODUCT_ID_REQUEST {
                let mut response = [0u8; 16];
                response[0] = PRODUCT_ID_RESPONSE;
                self.packets.push_back(packet(CHANNEL_CONTROL, &response));
            }
            Ok(())
        }
    }

    fn packet(channel: u8, payload: &[u8]) -> Vec<u8> {
        let len = (HEADER_LEN + payload.len()) as u16;
        let mut p = Vec::from(len.to_le_bytes());
        p.extend_from_slice(&[channel, 0]);
        p.extend_from_slice(payload);
        p
    }

    fn report(id: u8, fields: &[i16]) -> Vec<u8> {
        let mut r = Vec::from([id, 0, 0, 0]);
        for f in fields {
            r.extend_from_slice(&f.to_le_bytes());
        }
        r
    }

    fn imu(hub: MockHub) -> Bno08x<MockHub, NoDelay> {
        Bno08x::new(hub, NoDelay, DEFAULT_ADDRESS)
    }

    fn live_hub() -> MockHub {
        MockHub {
            answers_probe: true,
            ..Default::default()
        }
    }

    #[test]
    fn initialize_resets_and_probes() {
        let mut hub = live_hub();
        hub.packets
            .push_back(packet(CHANNEL_EXECUTABLE, &[EXEC_RESET_COMPLETE]));
        let mut imu = imu(hub);

        assert!(imu.initialize());
        assert_eq!(imu.i2c.writes[0], [5, 0, CHANNEL_EXECUTABLE, 0, EXEC_RESET]);
        assert_eq!(imu.i2c.writes[1][4], PRODUCT_ID_REQUEST);
        // Our own reset does not count as a device reset.
        assert!(!imu.was_reset());
    }

    #[test]
    fn silent_hub_fails_initialize() {
        assert!(!imu(MockHub::default()).initialize());

        let broken = MockHub {
            broken: true,
            ..Default::default()
        };
        assert!(!imu(broken).initialize());
    }

    /// Sums every requested delay.
    #[derive(Default)]
    struct Stopwatch {
        waited_ms: u32,
    }

    impl DelayMs<u32> for Stopwatch {
        fn delay_ms(&mut self, ms: u32) {
            self.waited_ms += ms;
        }
    }

    #[test]
    fn failed_bring_up_blocks_at_most_100ms() {
        let mut imu = Bno08x::new(MockHub::default(), Stopwatch::default(), DEFAULT_ADDRESS);
        assert!(!imu.initialize());
        assert!(imu.delay.waited_ms <= 100);

        let mut imu = Bno08x::new(live_hub(), Stopwatch::default(), DEFAULT_ADDRESS);
        assert!(imu.initialize());
        assert_eq!(imu.delay.waited_ms, RESET_SETTLE_MS);
    }

    #[test]
    fn subscribe_sends_set_feature() {
        let mut imu = imu(live_hub());
        assert!(imu.subscribe(EventKind::Gyro, 10_000));

        let w = &imu.i2c.writes[0];
        assert_eq!(w.len(), 21);
        assert_eq!(&w[..3], &[21, 0, CHANNEL_CONTROL]);
        assert_eq!(w[4], SET_FEATURE_COMMAND);
        assert_eq!(w[5], REPORT_GYROSCOPE_CALIBRATED);
        assert_eq!(&w[9..13], &10_000u32.to_le_bytes());
        assert!(w[13..].iter().all(|&b| b == 0));
    }

    #[test]
    fn packet_with_several_reports_is_queued() {
        let mut payload = Vec::from([BASE_TIMESTAMP, 0, 0, 0, 0]);
        payload.extend(report(REPORT_LINEAR_ACCELERATION, &[256, -512, 0]));
        payload.extend(report(REPORT_ROTATION_VECTOR, &[0, 0, 0, 16384, 0]));
        payload.extend(report(REPORT_MAGNETIC_FIELD_CALIBRATED, &[160, 0, -16]));

        let mut hub = live_hub();
        hub.packets.push_back(packet(CHANNEL_REPORTS, &payload));
        let mut imu = imu(hub);

        assert_eq!(
            imu.next_event(),
            Some(InertialEvent::Acceleration(Vector3::new(1.0, -2.0, 0.0)))
        );
        assert_eq!(
            imu.next_event(),
            Some(InertialEvent::Rotation(Quaternion::IDENTITY))
        );
        assert_eq!(
            imu.next_event(),
            Some(InertialEvent::MagneticField(Vector3::new(10.0, 0.0, -1.0)))
        );
        assert_eq!(imu.next_event(), None);
        assert_eq!(imu.packets(), 1);
    }

    #[test]
    fn gyro_uses_q9() {
        let mut hub = live_hub();
        hub.packets.push_back(packet(
            CHANNEL_REPORTS,
            &report(REPORT_GYROSCOPE_CALIBRATED, &[512, -256, 1024]),
        ));
        let mut imu = imu(hub);
        assert_eq!(
            imu.next_event(),
            Some(InertialEvent::Gyro(Vector3::new(1.0, -0.5, 2.0)))
        );
    }

    #[test]
    fn unknown_report_ends_the_packet() {
        let mut payload = report(REPORT_LINEAR_ACCELERATION, &[0, 0, 256]);
        payload.extend_from_slice(&[0x7E, 1, 2, 3]);
        payload.extend(report(REPORT_LINEAR_ACCELERATION, &[9, 9, 9]));

        let mut hub = live_hub();
        hub.packets.push_back(packet(CHANNEL_REPORTS, &payload));
        let mut imu = imu(hub);

        assert!(imu.next_event().is_some());
        assert_eq!(imu.next_event(), None);
    }

    #[test]
    fn device_reset_is_reported_once() {
        let mut hub = live_hub();
        hub.packets
            .push_back(packet(CHANNEL_EXECUTABLE, &[EXEC_RESET_COMPLETE]));
        let mut imu = imu(hub);

        assert_eq!(imu.next_event(), None);
        assert!(imu.was_reset());
        assert!(!imu.was_reset());
    }
}
