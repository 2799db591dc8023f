//! Merges one reading per channel into a fresh `Snapshot` each cycle.
//!
//! Channels are read in a fixed order: voltage rails, barometer, GNSS, then
//! the inertial poller. A channel that fails leaves its fields at sentinel and
//! its status bit clear.
use libm::powf;

use crate::config::{
    ADC_FULL_SCALE, ADC_SUPPLY_REF_V, BARO_ALTITUDE_EXPONENT, SEALEVEL_PRESSURE_HPA,
};
use crate::inertial::{InertialPoller, PollReport};
use crate::sensors::{BaroSample, ChannelReader, Clock, GnssFix, InertialSensor, RawVoltage};
use crate::state::{Snapshot, StatusFlags};

/// International barometric formula against the fixed sea-level reference.
pub fn altitude_from_pressure(pressure_hpa: f32) -> f32 {
    44330.0 * (1.0 - powf(pressure_hpa / SEALEVEL_PRESSURE_HPA, BARO_ALTITUDE_EXPONENT))
}

/// Raw ADC count to volts at the pin.
pub fn scale_voltage(raw: RawVoltage) -> f32 {
    raw as f32 * ADC_SUPPLY_REF_V / ADC_FULL_SCALE
}

pub struct SnapshotAssembler<B, G, V> {
    baro: B,
    gnss: G,
    rail_primary: V,
    rail_secondary: V,
}

impl<B, G, V> SnapshotAssembler<B, G, V>
where
    B: ChannelReader<Sample = BaroSample>,
    G: ChannelReader<Sample = GnssFix>,
    V: ChannelReader<Sample = RawVoltage>,
{
    pub fn new(baro: B, gnss: G, rail_primary: V, rail_secondary: V) -> Self {
        Self {
            baro,
            gnss,
            rail_primary,
            rail_secondary,
        }
    }

    /// Build this cycle's snapshot. Always returns exactly one record and one
    /// flag set, however many channels came back empty.
    pub fn assemble<S: InertialSensor>(
        &mut self,
        clock: &impl Clock,
        inertial: &mut InertialPoller<S>,
    ) -> (Snapshot, StatusFlags, PollReport) {
        let mut snapshot = Snapshot::new(clock.now_ms());
        let mut flags = StatusFlags::empty();

        // Rails carry no status bit; a missing count leaves the sentinel.
        if let Some(raw) = self.rail_primary.try_read() {
            snapshot.voltage_primary = scale_voltage(raw);
        }
        if let Some(raw) = self.rail_secondary.try_read() {
            snapshot.voltage_secondary = scale_voltage(raw);
        }

        if let Some(baro) = self.baro.try_read() {
            snapshot.temperature = baro.temperature_c;
            snapshot.pressure = baro.pressure_hpa;
            snapshot.altitude_estimate = altitude_from_pressure(baro.pressure_hpa);
            flags |= StatusFlags::BARO_OK;
        }

        if let Some(fix) = self.gnss.try_read() {
            snapshot.gps_lat = fix.lat_deg;
            snapshot.gps_lon = fix.lon_deg;
            snapshot.gps_alt = fix.alt_msl_m;
            flags |= StatusFlags::GPS_OK;
        }

        let report = inertial.poll(clock, &mut snapshot);
        flags |= report.observed;

        (snapshot, flags, report)
    }

    pub fn baro_mut(&mut self) -> &mut B {
        &mut self.baro
    }

    pub fn gnss_mut(&mut self) -> &mut G {
        &mut self.gnss
    }
}
