use crate::checksum::{self, ChecksumMismatch};
use crate::constants::{DATA_FRAME_TYPE, DEFAULT_ALPHA, FRAME_LEN, SAMPLE_INTERVAL, SAMPLES_PER_FRAME};
use crate::sample::{Accumulator, DataFrameRaw, Sample, SubRecord};
use chrono::{DateTime, TimeDelta, Utc};
use zerocopy::FromBytes;

/// Result of decoding one frame. Only `Samples` touches the accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Four samples, oldest first
    Samples(Vec<Sample>),
    /// Not a measurement report
    Ignored { frame_type: u8 },
    /// Checksum verification is on and the trailer is wrong
    ChecksumMismatch { expected: u8, actual: u8 },
    /// Fewer bytes than a full report
    Truncated { len: usize },
}

impl Decoded {
    pub fn samples(&self) -> &[Sample] {
        match self {
            Decoded::Samples(samples) => samples,
            _ => &[],
        }
    }

    pub fn into_samples(self) -> Vec<Sample> {
        match self {
            Decoded::Samples(samples) => samples,
            _ => Vec::new(),
        }
    }
}

/// Stateless frame decoder; all cross-frame state lives in the [`Accumulator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decoder {
    pub verify_checksum: bool,
    pub alpha: f64,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            verify_checksum: false,
            alpha: DEFAULT_ALPHA,
        }
    }
}

impl Decoder {
    pub fn new(verify_checksum: bool, alpha: f64) -> Self {
        Self { verify_checksum, alpha }
    }

    /// Decode one HID report captured at `frame_timestamp`.
    ///
    /// Sub-record `i` is stamped `frame_timestamp - (4 - i) * 10ms`.
    pub fn decode(&self, frame: &[u8], frame_timestamp: DateTime<Utc>, acc: &mut Accumulator) -> Decoded {
        let Some(frame) = frame.get(..FRAME_LEN) else {
            return Decoded::Truncated { len: frame.len() };
        };
        let Ok(raw) = DataFrameRaw::ref_from_bytes(frame) else {
            return Decoded::Truncated { len: frame.len() };
        };

        if raw.frame_type != DATA_FRAME_TYPE {
            return Decoded::Ignored {
                frame_type: raw.frame_type,
            };
        }

        if self.verify_checksum {
            let mut full = [0u8; FRAME_LEN];
            full.copy_from_slice(frame);
            if let Err(ChecksumMismatch { expected, actual }) = checksum::verify(&full) {
                return Decoded::ChecksumMismatch { expected, actual };
            }
        }

        let step = TimeDelta::milliseconds(SAMPLE_INTERVAL.as_millis() as i64);
        let samples = raw
            .records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let rec = SubRecord::from(*record);
                let totals = acc.integrate(rec.voltage_v, rec.current_a, rec.raw_temperature_c, self.alpha);
                Sample {
                    timestamp: frame_timestamp - step * (SAMPLES_PER_FRAME - i) as i32,
                    voltage_v: rec.voltage_v,
                    current_a: rec.current_a,
                    dp_v: rec.dp_v,
                    dn_v: rec.dn_v,
                    temperature_c: totals.temperature_c,
                    energy_ws: totals.energy_ws,
                    charge_as: totals.charge_as,
                }
            })
            .collect();

        Decoded::Samples(samples)
    }
}
