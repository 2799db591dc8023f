#![no_std]
#![no_main]

mod board;
mod tasks;

use embassy_executor::Spawner;
use embassy_stm32::adc::Adc;
use embassy_stm32::dma::NoDma;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::i2c::I2c;
use embassy_stm32::time::Hertz as TimeHertz;
use embassy_stm32::usart::{Config as UsartConfig, Uart};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_time::{Delay, Duration, Timer};
use {defmt_rtt as _, panic_probe as _};

use telemetry_frontend::config::{HEARTBEAT_PERIOD_MS, I2C_FREQUENCY_HZ, SERIAL_BAUD_RATE};
use telemetry_frontend::drivers::bno08x::{self, Bno08x};
use telemetry_frontend::drivers::gps::NmeaReader;
use telemetry_frontend::drivers::spl06::{self, Spl06};

use crate::board::Board;
use crate::tasks::gps_task::{gps_task, PipeRx};
use crate::tasks::telemetry_task::{telemetry_task, EmbassyClock, TelemetryParts};

// ── Interrupt bindings ────────────────────────────────────────────────────────
bind_interrupts!(struct Irqs {
    I2C1_EV  => embassy_stm32::i2c::EventInterruptHandler<peripherals::I2C1>;
    I2C1_ER  => embassy_stm32::i2c::ErrorInterruptHandler<peripherals::I2C1>;
    I2C3_EV  => embassy_stm32::i2c::EventInterruptHandler<peripherals::I2C3>;
    I2C3_ER  => embassy_stm32::i2c::ErrorInterruptHandler<peripherals::I2C3>;
    UART4    => embassy_stm32::usart::InterruptHandler<peripherals::UART4>;
    USART3   => embassy_stm32::usart::InterruptHandler<peripherals::USART3>;
});

// ── Main ──────────────────────────────────────────────────────────────────────
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // 1. Board init (168 MHz PLL)
    let board = Board::init();
    let p = board.p;
    defmt::info!("telemetry front-end booting");

    // 2. I2C1 @ 400 kHz: SPL06 baro (SCL=PB8, SDA=PB9)
    let i2c1 = I2c::new(
        p.I2C1,
        p.PB8, p.PB9,
        Irqs,
        NoDma, NoDma,
        TimeHertz(I2C_FREQUENCY_HZ),
        Default::default(),
    );

    // 3. I2C3 @ 400 kHz: BNO08x IMU (SCL=PA8, SDA=PC9)
    let i2c3 = I2c::new(
        p.I2C3,
        p.PA8, p.PC9,
        Irqs,
        NoDma, NoDma,
        TimeHertz(I2C_FREQUENCY_HZ),
        Default::default(),
    );

    // 4. GPS USART3 (TX=PB10, RX=PB11), DMA receive into the NMEA pipe
    let mut gps_config = UsartConfig::default();
    gps_config.baudrate = SERIAL_BAUD_RATE;
    let gps_uart = Uart::new(
        p.USART3, p.PB11, p.PB10,
        Irqs,
        p.DMA1_CH3, p.DMA1_CH1,
        gps_config,
    ).unwrap();
    let (_, gps_rx) = gps_uart.split();
    spawner.spawn(gps_task(gps_rx)).unwrap();

    // 5. Telemetry uplink UART4 (TX=PA0, RX=PA1), transmit only
    let mut uplink_config = UsartConfig::default();
    uplink_config.baudrate = SERIAL_BAUD_RATE;
    let uplink_uart = Uart::new(
        p.UART4, p.PA1, p.PA0,
        Irqs,
        NoDma, NoDma,
        uplink_config,
    ).unwrap();
    let (uplink_tx, _) = uplink_uart.split();

    // 6. ADC1: supply rails on PC0 / PC1
    let adc = Adc::new(p.ADC1, &mut Delay);

    // 7. Heartbeat LED (PC13)
    let mut led = Output::new(p.PC13, Level::High, Speed::Low);

    // 8. Baro bring-up, primary address first
    Timer::after(Duration::from_millis(100)).await;
    let mut baro = Spl06::new(i2c1, spl06::PRIMARY_ADDRESS);
    if baro.init(&mut Delay).is_err() {
        baro = Spl06::new(baro.release(), spl06::SECONDARY_ADDRESS);
        match baro.init(&mut Delay) {
            Ok(()) => defmt::info!("SPL06 on secondary address"),
            Err(_) => defmt::warn!("SPL06 not found, pressure channel stays empty"),
        }
    }

    // 9. Spawn telemetry (IMU bring-up happens inside the pipeline)
    spawner.spawn(telemetry_task(TelemetryParts {
        baro,
        gnss: NmeaReader::new(PipeRx, EmbassyClock),
        imu: Bno08x::new(i2c3, Delay, bno08x::DEFAULT_ADDRESS),
        adc,
        rail_primary: p.PC0,
        rail_secondary: p.PC1,
        uplink: uplink_tx,
    })).unwrap();

    // 10. Main task: LED heartbeat @ 1 Hz
    loop {
        led.toggle();
        Timer::after(Duration::from_millis(HEARTBEAT_PERIOD_MS)).await;
    }
}
