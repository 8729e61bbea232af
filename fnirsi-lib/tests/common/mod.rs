//! Common test utilities: frame builders and a scripted transport

// Shared across test files; not every helper is used in every file
#![allow(dead_code)]

use bytes::Bytes;
use fnirsi_lib::checksum::seal;
use fnirsi_lib::constants::{DATA_FRAME_TYPE, FRAME_LEN, PREAMBLE, SAMPLES_PER_FRAME};
use fnirsi_lib::error::MeterError;
use fnirsi_lib::sample::{DataFrameRaw, Sample, SubRecordRaw};
use fnirsi_lib::sink::Sink;
use fnirsi_lib::transport::Transport;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use zerocopy::IntoBytes;
use zerocopy::byteorder::little_endian::{U16, U32};

/// Raw readings in device units
#[derive(Debug, Clone, Copy, Default)]
pub struct Reading {
    pub voltage: u32,
    pub current: u32,
    pub dp_mv: u16,
    pub dn_mv: u16,
    pub temp_dc: u16,
}

/// 12.00000 V, 0.50000 A, 25.0 °C
pub const TWELVE_VOLT_HALF_AMP: Reading = Reading {
    voltage: 1_200_000,
    current: 50_000,
    dp_mv: 0,
    dn_mv: 0,
    temp_dc: 250,
};

fn raw_record(r: Reading) -> SubRecordRaw {
    SubRecordRaw {
        voltage: U32::new(r.voltage),
        current: U32::new(r.current),
        dp_mv: U16::new(r.dp_mv),
        dn_mv: U16::new(r.dn_mv),
        reserved: 0,
        temp_dc: U16::new(r.temp_dc),
    }
}

/// Data frame with four sub-records and a valid checksum
pub fn data_frame(readings: [Reading; SAMPLES_PER_FRAME]) -> [u8; FRAME_LEN] {
    typed_frame(DATA_FRAME_TYPE, readings)
}

pub fn uniform_frame(reading: Reading) -> [u8; FRAME_LEN] {
    data_frame([reading; SAMPLES_PER_FRAME])
}

pub fn typed_frame(frame_type: u8, readings: [Reading; SAMPLES_PER_FRAME]) -> [u8; FRAME_LEN] {
    let raw = DataFrameRaw {
        preamble: PREAMBLE,
        frame_type,
        records: readings.map(raw_record),
        unused: 0,
        checksum: 0,
    };
    let mut frame = [0u8; FRAME_LEN];
    frame.copy_from_slice(raw.as_bytes());
    seal(&mut frame);
    frame
}

/// One scripted answer to `Transport::read`
#[derive(Debug, Clone)]
pub enum Step {
    Frame(Vec<u8>),
    Timeout,
    Fail(&'static str),
}

/// Transport that replays a read script and records every write.
///
/// Once the script runs out every read times out.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    pub script: VecDeque<Step>,
    pub writes: Vec<Vec<u8>>,
    pub written_at: Vec<Instant>,
    pub reads: usize,
    pub fail_writes_after: Option<usize>,
    /// Time every timed-out read pretends to wait
    pub timeout_delay: Duration,
}

impl ScriptedTransport {
    pub fn new(script: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn frames(frames: impl IntoIterator<Item = [u8; FRAME_LEN]>) -> Self {
        Self::new(frames.into_iter().map(|f| Step::Frame(f.to_vec())))
    }

    /// Written frames identified by their command byte
    pub fn written_codes(&self) -> Vec<u8> {
        self.writes.iter().map(|w| w[1]).collect()
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, frame: &[u8]) -> Result<(), MeterError> {
        if self.fail_writes_after.is_some_and(|n| self.writes.len() >= n) {
            return Err(MeterError::Protocol("write rejected".to_string()));
        }
        self.writes.push(frame.to_vec());
        self.written_at.push(Instant::now());
        Ok(())
    }

    fn read(&mut self, _timeout: Duration) -> Result<Option<Bytes>, MeterError> {
        self.reads += 1;
        match self.script.pop_front() {
            Some(Step::Frame(bytes)) => Ok(Some(Bytes::from(bytes))),
            Some(Step::Timeout) | None => {
                std::thread::sleep(self.timeout_delay);
                Ok(None)
            }
            Some(Step::Fail(reason)) => Err(MeterError::Protocol(reason.to_string())),
        }
    }
}

/// Sink that keeps every batch it receives
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub batches: Vec<Vec<Sample>>,
    pub flushes: usize,
    pub fail: bool,
}

impl CollectingSink {
    pub fn samples(&self) -> Vec<Sample> {
        self.batches.iter().flatten().copied().collect()
    }
}

impl Sink for CollectingSink {
    fn emit(&mut self, samples: &[Sample]) -> Result<(), MeterError> {
        if self.fail {
            return Err(MeterError::Sink(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed")));
        }
        self.batches.push(samples.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), MeterError> {
        self.flushes += 1;
        Ok(())
    }
}

/// Stop signal that fires on its `n`th poll
pub fn stop_after(n: usize) -> impl FnMut() -> bool {
    let mut polls = 0;
    move || {
        polls += 1;
        polls >= n
    }
}
