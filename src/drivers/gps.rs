use core::str::FromStr;

use embedded_hal::serial::Read;

use crate::config::{GNSS_IDLE_POLL_LIMIT, GNSS_LINK_TIMEOUT_MS, GNSS_READ_BUDGET_MS};
use crate::sensors::{ChannelReader, Clock, GnssFix};

// ─── Link state (Betaflight-style, trimmed to what telemetry needs) ───
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GpsState {
    #[default]
    Unknown,
    ReceivingData,
    LostCommunication,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GpsCounters {
    pub sentences_rx: u16,    // checksum-valid sentences
    pub checksum_errors: u16, // checksum mismatches
    pub frame_errors: u16,    // overflows, UART errors
    pub gga_count: u16,       // GGA sentences received
    pub no_fix_count: u16,    // GGA without a usable fix
    pub timeouts: u16,        // link declared lost
}

/// One parsed GGA sentence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GgaFix {
    pub lat: f64,
    pub lon: f64,
    pub alt_msl: f32,
    pub fix_quality: u8,
    pub sats: u8,
}

impl GgaFix {
    pub fn to_gnss(self) -> GnssFix {
        GnssFix {
            lat_deg: self.lat as f32,
            lon_deg: self.lon as f32,
            alt_msl_m: self.alt_msl,
        }
    }
}

/// NMEA sentence assembler. Only GGA carries what the snapshot needs.
pub struct NmeaParser {
    buffer: heapless::String<128>,
    pub counters: GpsCounters,
}

impl Default for NmeaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl NmeaParser {
    pub fn new() -> Self {
        Self {
            buffer: heapless::String::new(),
            counters: GpsCounters::default(),
        }
    }

    /// Feed one byte. Returns a fix when it completes a valid GGA sentence
    /// that reports one.
    pub fn push_byte(&mut self, b: u8) -> Option<GgaFix> {
        if b == b'$' {
            self.buffer.clear();
        }

        if !b.is_ascii() || self.buffer.push(b as char).is_err() {
            self.counters.frame_errors = self.counters.frame_errors.wrapping_add(1);
            self.buffer.clear();
            return None;
        }

        if b != b'\n' {
            return None;
        }

        // Copy the buffer to avoid borrow conflict (self.buffer vs &mut self)
        let mut local: heapless::String<128> = heapless::String::new();
        let _ = local.push_str(self.buffer.as_str().trim());
        self.buffer.clear();
        self.parse_sentence(local.as_str())
    }

    fn parse_sentence(&mut self, s: &str) -> Option<GgaFix> {
        if s.len() < 6 || !s.starts_with('$') {
            return None; // too short to be valid
        }

        if !verify_checksum(s) {
            self.counters.checksum_errors = self.counters.checksum_errors.wrapping_add(1);
            return None;
        }
        self.counters.sentences_rx = self.counters.sentences_rx.wrapping_add(1);

        // Talker ID ($GP, $GN, $GL…) is ignored
        if &s[3..6] != "GGA" {
            return None;
        }
        self.counters.gga_count = self.counters.gga_count.wrapping_add(1);

        let fix = parse_gga(s);
        if fix.is_none() {
            self.counters.no_fix_count = self.counters.no_fix_count.wrapping_add(1);
        }
        fix
    }
}

// $xxGGA,time,lat,NS,lon,EW,qual,sats,hdop,alt,M,geoid,M,…*CS
fn parse_gga(s: &str) -> Option<GgaFix> {
    let body = s.split('*').next().unwrap_or(s);
    let mut parts = body.split(',');
    parts.next(); // ID
    parts.next(); // time

    let lat_raw = parts.next().unwrap_or("");
    let ns = parts.next().unwrap_or("");
    let lon_raw = parts.next().unwrap_or("");
    let ew = parts.next().unwrap_or("");
    let qual_str = parts.next().unwrap_or("");
    let sats_str = parts.next().unwrap_or("");
    parts.next(); // hdop
    let alt_str = parts.next().unwrap_or("");

    let fix_quality = u8::from_str(qual_str).ok()?;
    if fix_quality == 0 {
        return None;
    }

    let mut lat = coord_to_degrees(lat_raw)?;
    if ns == "S" {
        lat = -lat;
    }
    let mut lon = coord_to_degrees(lon_raw)?;
    if ew == "W" {
        lon = -lon;
    }

    Some(GgaFix {
        lat,
        lon,
        alt_msl: f32::from_str(alt_str).ok()?,
        fix_quality,
        sats: u8::from_str(sats_str).unwrap_or(0),
    })
}

/// `ddmm.mmmm` / `dddmm.mmmm` to decimal degrees.
fn coord_to_degrees(raw: &str) -> Option<f64> {
    let v = f64::from_str(raw).ok()?;
    let deg = (v / 100.0) as i32 as f64;
    let min = v - deg * 100.0;
    Some(deg + min / 60.0)
}

fn verify_checksum(s: &str) -> bool {
    if let Some((content, check_str)) = s.split_once('*') {
        let content = content.strip_prefix('$').unwrap_or(content);
        let mut calc = 0u8;
        for b in content.bytes() {
            calc ^= b;
        }
        // Only take first 2 hex chars (ignore trailing \r\n or garbage)
        let hex = if check_str.len() >= 2 { &check_str[..2] } else { check_str };
        if let Ok(val) = u8::from_str_radix(hex.trim(), 16) {
            return calc == val;
        }
    }
    false
}

/// GNSS channel: drains the receiver UART for at most
/// `GNSS_READ_BUDGET_MS` per cycle and reports a fix only if a fresh one
/// arrived in that window.
pub struct NmeaReader<R, C> {
    serial: R,
    clock: C,
    parser: NmeaParser,
    state: GpsState,
    last_sentence_ms: u32,
    last_fix: Option<GgaFix>,
}

impl<R: Read<u8>, C: Clock> NmeaReader<R, C> {
    pub fn new(serial: R, clock: C) -> Self {
        Self {
            serial,
            clock,
            parser: NmeaParser::new(),
            state: GpsState::Unknown,
            last_sentence_ms: 0,
            last_fix: None,
        }
    }

    pub fn state(&self) -> GpsState {
        self.state
    }

    pub fn counters(&self) -> &GpsCounters {
        &self.parser.counters
    }

    /// Most recent fix, fresh or not. Diagnostic only.
    pub fn last_fix(&self) -> Option<GgaFix> {
        self.last_fix
    }

    fn drain(&mut self) -> Option<GgaFix> {
        let start = self.clock.now_ms();
        let sentences_before = self.parser.counters.sentences_rx;
        let mut fresh = None;
        let mut idle_polls = 0;

        while self.clock.now_ms().wrapping_sub(start) < GNSS_READ_BUDGET_MS {
            match self.serial.read() {
                Ok(b) => {
                    idle_polls = 0;
                    if let Some(fix) = self.parser.push_byte(b) {
                        fresh = Some(fix);
                    }
                }
                // Bytes trickle in at line rate; keep waiting until a fix
                // lands or the window closes.
                Err(nb::Error::WouldBlock) => {
                    if fresh.is_some() || idle_polls >= GNSS_IDLE_POLL_LIMIT {
                        break;
                    }
                    idle_polls += 1;
                }
                Err(nb::Error::Other(_)) => {
                    self.parser.counters.frame_errors =
                        self.parser.counters.frame_errors.wrapping_add(1);
                }
            }
        }

        let now = self.clock.now_ms();
        if self.parser.counters.sentences_rx != sentences_before {
            self.last_sentence_ms = now;
        }
        self.update_link(now);
        fresh
    }

    fn update_link(&mut self, now_ms: u32) {
        let silent = now_ms.wrapping_sub(self.last_sentence_ms) > GNSS_LINK_TIMEOUT_MS;
        match self.state {
            GpsState::Unknown | GpsState::LostCommunication => {
                if self.parser.counters.sentences_rx > 0 && !silent {
                    info!("GPS receiving");
                    self.state = GpsState::ReceivingData;
                }
            }
            GpsState::ReceivingData => {
                if silent {
                    warn!("GPS link lost");
                    self.state = GpsState::LostCommunication;
                    self.parser.counters.timeouts = self.parser.counters.timeouts.wrapping_add(1);
                }
            }
        }
    }
}

impl<R: Read<u8>, C: Clock> ChannelReader for NmeaReader<R, C> {
    type Sample = GnssFix;

    fn try_read(&mut self) -> Option<GnssFix> {
        let fix = self.drain()?;
        self.last_fix = Some(fix);
        Some(fix.to_gnss())
    }
}
