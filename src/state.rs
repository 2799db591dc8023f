//! Per-cycle telemetry record and the flags that qualify it.
//!
//! A `Snapshot` is built fresh every cycle, encoded, handed to the transport
//! and dropped. Nothing here survives into the next cycle.
use bytemuck::{Pod, Zeroable};

use crate::config::SENTINEL;

// ── Sample vectors ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub const IDENTITY: Self = Self::new(1.0, 0.0, 0.0, 0.0);

    pub const fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// Wire-format record: field order here *is* the fixed-width payload layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Zeroable, Pod)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(
    feature = "keyed-frames",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Snapshot {
    pub timestamp: f32, // ms since boot
    pub voltage_primary: f32,
    pub voltage_secondary: f32,
    pub temperature: f32, // °C
    pub pressure: f32,    // hPa
    pub altitude_estimate: f32,
    pub accel_x: f32, // m/s², gravity compensated
    pub accel_y: f32,
    pub accel_z: f32,
    pub gyro_x: f32, // rad/s
    pub gyro_y: f32,
    pub gyro_z: f32,
    pub mag_x: f32, // µT
    pub mag_y: f32,
    pub mag_z: f32,
    pub quat_w: f32,
    pub quat_x: f32,
    pub quat_y: f32,
    pub quat_z: f32,
    pub gps_lat: f32, // decimal degrees
    pub gps_lon: f32,
    pub gps_alt: f32, // m MSL
}

impl Snapshot {
    pub const FIELD_COUNT: usize = 22;

    /// A record with every field except `timestamp` at [`SENTINEL`].
    pub fn new(timestamp_ms: u32) -> Self {
        let mut s = Self::filled(SENTINEL);
        s.timestamp = timestamp_ms as f32;
        s
    }

    fn filled(v: f32) -> Self {
        bytemuck::cast([v; Self::FIELD_COUNT])
    }

    pub fn set_accel(&mut self, v: Vector3) {
        self.accel_x = v.x;
        self.accel_y = v.y;
        self.accel_z = v.z;
    }

    pub fn set_gyro(&mut self, v: Vector3) {
        self.gyro_x = v.x;
        self.gyro_y = v.y;
        self.gyro_z = v.z;
    }

    pub fn set_mag(&mut self, v: Vector3) {
        self.mag_x = v.x;
        self.mag_y = v.y;
        self.mag_z = v.z;
    }

    pub fn set_quat(&mut self, q: Quaternion) {
        self.quat_w = q.w;
        self.quat_x = q.x;
        self.quat_y = q.y;
        self.quat_z = q.z;
    }

    pub fn as_fields(&self) -> &[f32; Self::FIELD_COUNT] {
        bytemuck::cast_ref(self)
    }

    /// Fields that belong to the channel behind `flag`.
    pub fn channel_fields(&self, flag: StatusFlags) -> &[f32] {
        let f = self.as_fields();
        match flag {
            StatusFlags::BARO_OK => &f[3..6],
            StatusFlags::ACCEL_OK => &f[6..9],
            StatusFlags::GYRO_OK => &f[9..12],
            StatusFlags::MAG_OK => &f[12..15],
            StatusFlags::ROTATION_OK => &f[15..19],
            StatusFlags::GPS_OK => &f[19..22],
            _ => &[],
        }
    }
}

const _: () = assert!(core::mem::size_of::<Snapshot>() == Snapshot::FIELD_COUNT * 4);

// ── Status flags ──────────────────────────────────────────────────────────────

/// One bit per channel family; set only when that channel delivered a fresh
/// reading in the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusFlags(u8);

impl StatusFlags {
    pub const BARO_OK: Self = Self(0x01);
    pub const ACCEL_OK: Self = Self(0x02);
    pub const GYRO_OK: Self = Self(0x04);
    pub const ROTATION_OK: Self = Self(0x08);
    pub const GPS_OK: Self = Self(0x10);
    pub const MAG_OK: Self = Self(0x20);

    pub const INERTIAL: Self =
        Self(Self::ACCEL_OK.0 | Self::GYRO_OK.0 | Self::ROTATION_OK.0 | Self::MAG_OK.0);

    pub const CHANNELS: [Self; 6] = [
        Self::BARO_OK,
        Self::ACCEL_OK,
        Self::GYRO_OK,
        Self::ROTATION_OK,
        Self::GPS_OK,
        Self::MAG_OK,
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & 0x3F)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }
}

impl core::ops::BitOr for StatusFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for StatusFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_snapshot_is_all_sentinel() {
        let s = Snapshot::new(1234);
        assert_eq!(s.timestamp, 1234.0);
        assert!(s.as_fields()[1..].iter().all(|&v| v == SENTINEL));
    }

    #[test]
    fn snapshot_is_fixed_size() {
        assert_eq!(core::mem::size_of::<Snapshot>(), 88);
    }

    #[test]
    fn channel_fields_cover_expected_slots() {
        let mut s = Snapshot::new(0);
        s.set_quat(Quaternion::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(s.channel_fields(StatusFlags::ROTATION_OK), &[1.0, 2.0, 3.0, 4.0]);

        s.gps_lat = 45.5;
        assert_eq!(s.channel_fields(StatusFlags::GPS_OK)[0], 45.5);
        assert!(s.channel_fields(StatusFlags::INERTIAL).is_empty());
    }

    #[test]
    fn flags_combine_and_test() {
        let mut f = StatusFlags::empty();
        assert!(f.is_empty());
        f.insert(StatusFlags::BARO_OK);
        f |= StatusFlags::GPS_OK;
        assert!(f.contains(StatusFlags::BARO_OK | StatusFlags::GPS_OK));
        assert!(!f.contains(StatusFlags::ACCEL_OK));
        assert_eq!(f.bits(), 0x11);
        assert_eq!(StatusFlags::INERTIAL.count(), 4);
        assert_eq!(StatusFlags::from_bits_truncate(0xFF).bits(), 0x3F);
    }
}
