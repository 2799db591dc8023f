use embedded_hal::blocking::delay::DelayMs;
use embedded_hal::blocking::i2c::{Write, WriteRead};

use super::Error;
use crate::sensors::{BaroSample, ChannelReader};

/// SPL06-001 / DPS310: same register map, same compensation.
pub const PRIMARY_ADDRESS: u8 = 0x77;
pub const SECONDARY_ADDRESS: u8 = 0x76;

const REG_PRESS_DATA: u8 = 0x00;
const REG_TEMP_DATA: u8 = 0x03;
const REG_PRS_CFG: u8 = 0x06;
const REG_TMP_CFG: u8 = 0x07;
const REG_MEAS_CFG: u8 = 0x08;
const REG_CFG_REG: u8 = 0x09;
const REG_RESET: u8 = 0x0C;
const REG_CHIP_ID: u8 = 0x0D;
const REG_COEF: u8 = 0x10;

const CHIP_ID: u8 = 0x10;
const SOFT_RESET: u8 = 0x09;

// MEAS_CFG status bits
const COEF_RDY: u8 = 1 << 7;
const SENSOR_RDY: u8 = 1 << 6;
const TMP_RDY: u8 = 1 << 5;
const PRS_RDY: u8 = 1 << 4;
const MEAS_CONT_PRS_TMP: u8 = 0x07;

// 64 Hz, 16x oversampling on both channels
const PRS_CFG: u8 = 0x64;
const TMP_CFG: u8 = 0x80 | 0x64; // external (MEMS) temperature sensor
const CFG_SHIFT: u8 = 0x0C; // result shift, required above 8x oversampling

/// Scale factor for 16x oversampling (datasheet table 4)
const SCALE_16X: f32 = 253_952.0;

const RESET_SETTLE_MS: u32 = 40;
const READY_POLL_MS: u32 = 5;
const READY_POLLS: usize = 20;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spl06Coeffs {
    c0: i16,
    c1: i16,
    c00: i32,
    c10: i32,
    c01: i16,
    c11: i16,
    c20: i16,
    c21: i16,
    c30: i16,
}

fn sign_extend(value: i32, bits: u32) -> i32 {
    let shift = 32 - bits;
    (value << shift) >> shift
}

impl Spl06Coeffs {
    /// Unpack the 18-byte coefficient block starting at `REG_COEF`.
    pub fn from_bytes(buf: &[u8; 18]) -> Self {
        let b = |i: usize| buf[i] as i32;
        let be16 = |i: usize| i16::from_be_bytes([buf[i], buf[i + 1]]);
        Self {
            c0: sign_extend((b(0) << 4) | (b(1) >> 4), 12) as i16,
            c1: sign_extend(((b(1) & 0x0F) << 8) | b(2), 12) as i16,
            c00: sign_extend((b(3) << 12) | (b(4) << 4) | (b(5) >> 4), 20),
            c10: sign_extend(((b(5) & 0x0F) << 16) | (b(6) << 8) | b(7), 20),
            c01: be16(8),
            c11: be16(10),
            c20: be16(12),
            c21: be16(14),
            c30: be16(16),
        }
    }

    /// Raw 24-bit readings to °C and hPa.
    pub fn compensate(&self, p_raw: i32, t_raw: i32, k_p: f32, k_t: f32) -> BaroSample {
        let p_sc = p_raw as f32 / k_p;
        let t_sc = t_raw as f32 / k_t;

        let temperature_c = self.c0 as f32 * 0.5 + self.c1 as f32 * t_sc;

        let pressure_pa = self.c00 as f32
            + p_sc * (self.c10 as f32 + p_sc * (self.c20 as f32 + p_sc * self.c30 as f32))
            + t_sc * self.c01 as f32
            + t_sc * p_sc * (self.c11 as f32 + p_sc * self.c21 as f32);

        BaroSample {
            temperature_c,
            pressure_hpa: pressure_pa / 100.0,
        }
    }
}

pub struct Spl06<I2C> {
    i2c: I2C,
    address: u8,
    coeffs: Spl06Coeffs,
    k_p: f32,
    k_t: f32,
    ready: bool,
}

impl<I2C, E> Spl06<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            coeffs: Spl06Coeffs::default(),
            k_p: SCALE_16X,
            k_t: SCALE_16X,
            ready: false,
        }
    }

    pub fn init(&mut self, delay: &mut impl DelayMs<u32>) -> Result<(), Error<E>> {
        self.ready = false;
        self.write_reg(REG_RESET, SOFT_RESET)?;
        delay.delay_ms(RESET_SETTLE_MS);

        let id = self.read_id()?;
        if id != CHIP_ID {
            return Err(Error::BadChipId(id));
        }

        self.wait_for(COEF_RDY | SENSOR_RDY, delay)?;
        self.read_coeffs()?;

        self.write_reg(REG_PRS_CFG, PRS_CFG)?;
        self.write_reg(REG_TMP_CFG, TMP_CFG)?;
        self.write_reg(REG_CFG_REG, CFG_SHIFT)?;
        self.write_reg(REG_MEAS_CFG, MEAS_CONT_PRS_TMP)?;

        self.ready = true;
        Ok(())
    }

    pub fn read_id(&mut self) -> Result<u8, Error<E>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[REG_CHIP_ID], &mut buf)
            .map_err(Error::Bus)?;
        Ok(buf[0])
    }

    pub fn coeffs(&self) -> &Spl06Coeffs {
        &self.coeffs
    }

    /// Give the bus back, e.g. to probe the other address.
    pub fn release(self) -> I2C {
        self.i2c
    }

    /// Both a pressure and a temperature result are waiting.
    pub fn data_ready(&mut self) -> Result<bool, Error<E>> {
        let status = self.read_reg(REG_MEAS_CFG)?;
        Ok(status & (PRS_RDY | TMP_RDY) == PRS_RDY | TMP_RDY)
    }

    /// Read and compensate the latest results, ready or not.
    pub fn read(&mut self) -> Result<BaroSample, Error<E>> {
        let p_raw = self.read_24bits(REG_PRESS_DATA)?;
        let t_raw = self.read_24bits(REG_TEMP_DATA)?;
        Ok(self.coeffs.compensate(p_raw, t_raw, self.k_p, self.k_t))
    }

    fn wait_for(&mut self, bits: u8, delay: &mut impl DelayMs<u32>) -> Result<(), Error<E>> {
        for _ in 0..READY_POLLS {
            if self.read_reg(REG_MEAS_CFG)? & bits == bits {
                return Ok(());
            }
            delay.delay_ms(READY_POLL_MS);
        }
        Err(Error::Timeout)
    }

    fn read_coeffs(&mut self) -> Result<(), Error<E>> {
        let mut buf = [0u8; 18];
        self.i2c
            .write_read(self.address, &[REG_COEF], &mut buf)
            .map_err(Error::Bus)?;
        self.coeffs = Spl06Coeffs::from_bytes(&buf);
        Ok(())
    }

    fn read_24bits(&mut self, reg: u8) -> Result<i32, Error<E>> {
        let mut buf = [0u8; 3];
        self.i2c
            .write_read(self.address, &[reg], &mut buf)
            .map_err(Error::Bus)?;
        let val = ((buf[0] as i32) << 16) | ((buf[1] as i32) << 8) | (buf[2] as i32);
        Ok(sign_extend(val, 24))
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, Error<E>> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[reg], &mut buf)
            .map_err(Error::Bus)?;
        Ok(buf[0])
    }

    fn write_reg(&mut self, reg: u8, val: u8) -> Result<(), Error<E>> {
        self.i2c.write(self.address, &[reg, val]).map_err(Error::Bus)
    }
}

/// Never waits: no fresh result this cycle means no sample.
impl<I2C, E> ChannelReader for Spl06<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    type Sample = BaroSample;

    fn try_read(&mut self) -> Option<BaroSample> {
        if !self.ready {
            return None;
        }
        match self.data_ready() {
            Ok(true) => self.read().ok(),
            _ => None,
        }
    }
}
