use core::convert::Infallible;

use embassy_executor::task;
use embassy_stm32::peripherals::{DMA1_CH1, USART3};
use embassy_stm32::usart::UartRx;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pipe::Pipe;

use telemetry_frontend::config::GNSS_RX_PIPE_LEN;

/// Raw NMEA bytes from the DMA receiver, waiting for the telemetry cycle.
pub static GNSS_PIPE: Pipe<CriticalSectionRawMutex, GNSS_RX_PIPE_LEN> = Pipe::new();

/// GPS task: DMA-receives NMEA bursts on USART3 and queues the bytes. When
/// the pipe is full the tail of the burst is lost and shows up as checksum
/// errors downstream.
#[task]
pub async fn gps_task(mut gps_rx: UartRx<'static, USART3, DMA1_CH1>) {
    let mut buf = [0u8; 256];

    loop {
        match gps_rx.read_until_idle(&mut buf).await {
            Ok(n) => {
                let _ = GNSS_PIPE.try_write(&buf[..n]);
            }
            Err(e) => defmt::debug!("GPS rx error: {}", e),
        }
    }
}

/// Non-blocking byte source over [`GNSS_PIPE`] for the NMEA reader.
pub struct PipeRx;

impl embedded_hal::serial::Read<u8> for PipeRx {
    type Error = Infallible;

    fn read(&mut self) -> nb::Result<u8, Infallible> {
        let mut byte = [0u8; 1];
        match GNSS_PIPE.try_read(&mut byte) {
            Ok(1) => Ok(byte[0]),
            _ => Err(nb::Error::WouldBlock),
        }
    }
}
