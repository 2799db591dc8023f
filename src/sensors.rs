//! Collaborator contracts the pipeline is written against.
//!
//! Hardware drivers implement these; the pipeline never names a concrete
//! chip. Every call is synchronous and bounded, and failure is reported as
//! absence (`None` / `false`), never as a fault that stops the cycle.
use crate::state::{Quaternion, Vector3};

/// "Try read now" access to one sensor family.
///
/// Implementations bound their own wait; a read that does not complete in
/// time returns `None`.
pub trait ChannelReader {
    type Sample;

    fn try_read(&mut self) -> Option<Self::Sample>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BaroSample {
    pub temperature_c: f32,
    pub pressure_hpa: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GnssFix {
    pub lat_deg: f32,
    pub lon_deg: f32,
    pub alt_msl_m: f32,
}

/// Raw ADC count from one supply rail.
pub type RawVoltage = u16;

// ── Inertial sensor ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    Acceleration,
    Gyro,
    Rotation,
    MagneticField,
}

impl EventKind {
    pub const ALL: [Self; 4] = [
        Self::Acceleration,
        Self::Gyro,
        Self::Rotation,
        Self::MagneticField,
    ];

    pub const fn index(self) -> usize {
        match self {
            Self::Acceleration => 0,
            Self::Gyro => 1,
            Self::Rotation => 2,
            Self::MagneticField => 3,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Acceleration => "accel",
            Self::Gyro => "gyro",
            Self::Rotation => "rotation",
            Self::MagneticField => "mag",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InertialEvent {
    Acceleration(Vector3),
    Gyro(Vector3),
    Rotation(Quaternion),
    MagneticField(Vector3),
}

impl InertialEvent {
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Acceleration(_) => EventKind::Acceleration,
            Self::Gyro(_) => EventKind::Gyro,
            Self::Rotation(_) => EventKind::Rotation,
            Self::MagneticField(_) => EventKind::MagneticField,
        }
    }
}

/// Event-driven IMU: reports arrive once subscribed, one per `next_event`.
pub trait InertialSensor {
    /// Bring the device up from scratch. `true` when it answered.
    fn initialize(&mut self) -> bool;

    /// Ask for periodic reports of `kind` every `interval_us`.
    fn subscribe(&mut self, kind: EventKind, interval_us: u32) -> bool;

    /// Whether the device reset itself since the last call. Clears on read.
    fn was_reset(&mut self) -> bool;

    /// Next pending report, if the device has one right now.
    fn next_event(&mut self) -> Option<InertialEvent>;
}

// ── Clock / transport ─────────────────────────────────────────────────────────

/// Monotonic millisecond clock. Wraps after ~49 days; compare with
/// `wrapping_sub`.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}

/// Outbound byte sink with a known amount of free space.
pub trait Transport {
    fn available_write_capacity(&self) -> usize;

    /// Accept all of `bytes` or none of them.
    fn write(&mut self, bytes: &[u8]) -> bool;
}
