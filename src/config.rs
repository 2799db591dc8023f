// Centralize all configuration constants

// ── Snapshot ─────────────────────────────────────────────────────────────────
/// Value carried by every field that no channel populated this cycle.
pub const SENTINEL: f32 = -9999.9;

// ── Barometer ────────────────────────────────────────────────────────────────
pub const SEALEVEL_PRESSURE_HPA: f32 = 1013.25;
pub const BARO_ALTITUDE_EXPONENT: f32 = 0.1903;

// ── Plausibility envelopes ───────────────────────────────────────────────────
pub const MAX_ACCEL_VALUE: f32 = 300.0; // m/s²
pub const MAX_GYRO_VALUE: f32 = 1000.0; // rad/s
pub const MAX_MAG_VALUE: f32 = 5000.0; // µT
pub const MAX_QUAT_VALUE: f32 = 100.0;

// ── Inertial poller ──────────────────────────────────────────────────────────
pub const IMU_READ_BUDGET_MS: u32 = 50;
pub const IMU_MAX_ATTEMPTS: u32 = 40;
pub const IMU_RESET_INTERVAL_MS: u32 = 5000;

// Report intervals requested from the IMU (µs)
pub const ROTATION_REPORT_INTERVAL_US: u32 = 10_000;
pub const ACCEL_REPORT_INTERVAL_US: u32 = 10_000;
pub const GYRO_REPORT_INTERVAL_US: u32 = 10_000;
pub const MAG_REPORT_INTERVAL_US: u32 = 20_000;

// ── GNSS ─────────────────────────────────────────────────────────────────────
pub const GNSS_READ_BUDGET_MS: u32 = 10;
/// Silence after which the GNSS link is declared lost.
pub const GNSS_LINK_TIMEOUT_MS: u32 = 2500;
/// Empty UART polls in a row before the reader gives up on this cycle.
pub const GNSS_IDLE_POLL_LIMIT: u32 = 20_000;
/// Receive pipe between the DMA task and the reader.
pub const GNSS_RX_PIPE_LEN: usize = 1024;

// ── Voltage rails ────────────────────────────────────────────────────────────
pub const ADC_SUPPLY_REF_V: f32 = 3.3;
pub const ADC_FULL_SCALE: f32 = 4096.0;

// ── Framing / transport ──────────────────────────────────────────────────────
pub const FRAME_MARKER: [u8; 4] = [0xFF, 0xFE, 0xFD, 0xFC];
pub const FRAME_HEADER_LEN: usize = FRAME_MARKER.len() + 2;

#[cfg(not(feature = "keyed-frames"))]
pub const MAX_PAYLOAD_LEN: usize = 128;
#[cfg(feature = "keyed-frames")]
pub const MAX_PAYLOAD_LEN: usize = 1024;

pub const MAX_FRAME_LEN: usize = FRAME_HEADER_LEN + MAX_PAYLOAD_LEN;

pub const TRANSPORT_BUFFER_LEN: usize = 2048;
pub const UART_DRAIN_PER_CYCLE: usize = 256;
pub const SERIAL_BAUD_RATE: u32 = 115_200;

// ── Firmware loop ────────────────────────────────────────────────────────────
pub const TELEMETRY_RATE_HZ: u64 = 50;
pub const HEARTBEAT_PERIOD_MS: u64 = 500;
pub const I2C_FREQUENCY_HZ: u32 = 400_000;

const _: () = assert!(MAX_PAYLOAD_LEN <= u16::MAX as usize);
