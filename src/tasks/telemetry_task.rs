use core::cell::RefCell;

use embassy_executor::task;
use embassy_stm32::adc::Adc;
use embassy_stm32::i2c::I2c;
use embassy_stm32::peripherals::{ADC1, I2C1, I2C3, PC0, PC1, UART4};
use embassy_stm32::usart::UartTx;
use embassy_time::{Delay, Duration, Instant, Ticker};

use telemetry_frontend::config::{TELEMETRY_RATE_HZ, TRANSPORT_BUFFER_LEN, UART_DRAIN_PER_CYCLE};
use telemetry_frontend::drivers::bno08x::Bno08x;
use telemetry_frontend::drivers::gps::NmeaReader;
use telemetry_frontend::drivers::spl06::Spl06;
use telemetry_frontend::inertial::ResetOutcome;
use telemetry_frontend::sensors::{ChannelReader, RawVoltage};
use telemetry_frontend::{BufferedTransport, Clock, InertialPoller, Pipeline, SnapshotAssembler, TransmitOutcome};

use crate::tasks::gps_task::PipeRx;

/// Milliseconds since boot from the embassy time driver.
#[derive(Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u32 {
        Instant::now().as_millis() as u32
    }
}

pub enum RailPin {
    Primary(PC0),
    Secondary(PC1),
}

/// One supply rail on the shared ADC1. Both rails borrow the converter; a
/// read that finds it busy reports the rail as absent.
pub struct AdcRail<'a> {
    adc: &'a RefCell<Adc<'static, ADC1>>,
    pin: RailPin,
}

impl<'a> AdcRail<'a> {
    pub fn new(adc: &'a RefCell<Adc<'static, ADC1>>, pin: RailPin) -> Self {
        Self { adc, pin }
    }
}

impl ChannelReader for AdcRail<'_> {
    type Sample = RawVoltage;

    fn try_read(&mut self) -> Option<RawVoltage> {
        let mut adc = self.adc.try_borrow_mut().ok()?;
        let raw = match &mut self.pin {
            RailPin::Primary(pin) => adc.read(pin),
            RailPin::Secondary(pin) => adc.read(pin),
        };
        Some(raw)
    }
}

/// Everything the telemetry task owns, wired up in `main`.
pub struct TelemetryParts {
    pub baro: Spl06<I2c<'static, I2C1>>,
    pub gnss: NmeaReader<PipeRx, EmbassyClock>,
    pub imu: Bno08x<I2c<'static, I2C3>, Delay>,
    pub adc: Adc<'static, ADC1>,
    pub rail_primary: PC0,
    pub rail_secondary: PC1,
    pub uplink: UartTx<'static, UART4>,
}

#[derive(Default)]
struct WindowStats {
    sent: u32,
    dropped: u32,
    unsent: u32,
    resets: u32,
    worst_attempts: u32,
}

/// Telemetry task: one acquire/frame/transmit cycle per tick, then a bounded
/// drain of the uplink queue.
#[task]
pub async fn telemetry_task(parts: TelemetryParts) {
    let adc = RefCell::new(parts.adc);
    let assembler = SnapshotAssembler::new(
        parts.baro,
        parts.gnss,
        AdcRail::new(&adc, RailPin::Primary(parts.rail_primary)),
        AdcRail::new(&adc, RailPin::Secondary(parts.rail_secondary)),
    );
    let transport: BufferedTransport<_, TRANSPORT_BUFFER_LEN> = BufferedTransport::new(parts.uplink);
    let mut pipeline = Pipeline::new(EmbassyClock, assembler, InertialPoller::new(parts.imu), transport);

    if !pipeline.begin() {
        defmt::warn!("IMU down at boot, retrying on the reset interval");
    }

    let mut stats = WindowStats::default();
    let mut ticker = Ticker::every(Duration::from_hz(TELEMETRY_RATE_HZ));

    loop {
        ticker.next().await;

        let report = pipeline.run_cycle();
        match report.outcome {
            Some(TransmitOutcome::Sent) => stats.sent += 1,
            Some(TransmitOutcome::Dropped) => stats.dropped += 1,
            Some(TransmitOutcome::Failed) | None => stats.unsent += 1,
        }
        if report.inertial.reset == ResetOutcome::Succeeded {
            stats.resets += 1;
        }
        stats.worst_attempts = stats.worst_attempts.max(report.inertial.attempts);

        if let Err(e) = pipeline.transport_mut().service(UART_DRAIN_PER_CYCLE) {
            defmt::warn!("uplink write failed: {}", e);
        }

        // ── Once per second ───────────────────────────────────────────────
        if pipeline.cycles() % TELEMETRY_RATE_HZ as u32 == 0 {
            defmt::info!(
                "t={}ms sent={} dropped={} unsent={} resets={} attempts<={} flags={} queued={}",
                report.timestamp_ms,
                stats.sent,
                stats.dropped,
                stats.unsent,
                stats.resets,
                stats.worst_attempts,
                report.flags,
                pipeline.transport_mut().waiting(),
            );
            stats = WindowStats::default();
        }
    }
}
