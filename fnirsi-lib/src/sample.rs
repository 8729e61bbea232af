use crate::constants::{INTEGRATION_STEP_S, SAMPLES_PER_FRAME};
use chrono::{DateTime, Utc};
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// One packed 15-byte measurement as sent by the meter.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct SubRecordRaw {
    pub voltage: U32,  // 10 µV
    pub current: U32,  // 10 µA
    pub dp_mv: U16,    // millivolts
    pub dn_mv: U16,    // millivolts
    pub reserved: u8,
    pub temp_dc: U16,  // 0.1 °C
}

/// Full 64-byte data report.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct DataFrameRaw {
    pub preamble: u8,
    pub frame_type: u8,
    pub records: [SubRecordRaw; SAMPLES_PER_FRAME],
    pub unused: u8,
    pub checksum: u8,
}

/// A sub-record converted to physical units, before integration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubRecord {
    pub voltage_v: f64,
    pub current_a: f64,
    pub dp_v: f64,
    pub dn_v: f64,
    pub raw_temperature_c: f64,
}

impl From<SubRecordRaw> for SubRecord {
    fn from(raw: SubRecordRaw) -> Self {
        SubRecord {
            voltage_v: raw.voltage.get() as f64 / 100_000.0,
            current_a: raw.current.get() as f64 / 100_000.0,
            dp_v: raw.dp_mv.get() as f64 / 1_000.0,
            dn_v: raw.dn_mv.get() as f64 / 1_000.0,
            raw_temperature_c: raw.temp_dc.get() as f64 / 10.0,
        }
    }
}

/// One decoded measurement with the running totals at that instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub voltage_v: f64,
    pub current_a: f64,
    pub dp_v: f64,
    pub dn_v: f64,
    /// Exponentially smoothed temperature
    pub temperature_c: f64,
    /// Watt-seconds since session start
    pub energy_ws: f64,
    /// Amp-seconds since session start
    pub charge_as: f64,
}

/// Running totals after one integration step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integrated {
    pub energy_ws: f64,
    pub charge_as: f64,
    pub temperature_c: f64,
}

/// Cross-sample state of one session: energy, charge and smoothed temperature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    energy_ws: f64,
    charge_as: f64,
    temperature_c: Option<f64>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sub-sample into the totals.
    ///
    /// Every sub-sample counts as exactly 10 ms regardless of when the frame
    /// actually arrived. The first temperature seeds the EMA; afterwards
    /// `t = raw * (1 - alpha) + t * alpha`.
    pub fn integrate(&mut self, voltage_v: f64, current_a: f64, raw_temperature_c: f64, alpha: f64) -> Integrated {
        self.energy_ws += voltage_v * current_a * INTEGRATION_STEP_S;
        self.charge_as += current_a * INTEGRATION_STEP_S;

        let temperature_c = match self.temperature_c {
            None => raw_temperature_c,
            Some(prev) => raw_temperature_c * (1.0 - alpha) + prev * alpha,
        };
        self.temperature_c = Some(temperature_c);

        Integrated {
            energy_ws: self.energy_ws,
            charge_as: self.charge_as,
            temperature_c,
        }
    }

    pub fn energy_ws(&self) -> f64 {
        self.energy_ws
    }

    pub fn charge_as(&self) -> f64 {
        self.charge_as
    }

    pub fn temperature_c(&self) -> Option<f64> {
        self.temperature_c
    }
}
