//! Destinations for decoded samples.

use crate::error::MeterError;
use crate::sample::Sample;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use strum_macros::Display;

/// Receives every non-empty batch of samples, in frame order, oldest first.
pub trait Sink {
    fn emit(&mut self, samples: &[Sample]) -> Result<(), MeterError>;

    fn flush(&mut self) -> Result<(), MeterError> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn emit(&mut self, samples: &[Sample]) -> Result<(), MeterError> {
        (**self).emit(samples)
    }

    fn flush(&mut self) -> Result<(), MeterError> {
        (**self).flush()
    }
}

pub const STREAM_HEADER: &str = "timestamp voltage_V current_A dp_V dn_V temp_C_ema energy_Ws capacity_As";

pub const CSV_HEADER: [&str; 9] = [
    "timestamp",
    "relative_s",
    "voltage_V",
    "current_A",
    "dp_V",
    "dn_V",
    "temp_C_ema",
    "energy_Ws",
    "capacity_As",
];

fn epoch_seconds(ts: DateTime<Utc>) -> f64 {
    ts.timestamp_micros() as f64 / 1_000_000.0
}

/// Whitespace-separated lines, one per sample, preceded by a header line.
pub struct StreamSink<W: Write> {
    out: W,
}

impl<W: Write> StreamSink<W> {
    pub fn new(mut out: W) -> Result<Self, MeterError> {
        writeln!(out, "{STREAM_HEADER}").map_err(MeterError::Sink)?;
        Ok(Self { out })
    }

    fn write_sample(&mut self, s: &Sample) -> io::Result<()> {
        writeln!(
            self.out,
            "{:.3} {:7.5} {:7.5} {:5.3} {:5.3} {:6.3} {:.6} {:.6}",
            epoch_seconds(s.timestamp),
            s.voltage_v,
            s.current_a,
            s.dp_v,
            s.dn_v,
            s.temperature_c,
            s.energy_ws,
            s.charge_as
        )
    }
}

impl<W: Write> Sink for StreamSink<W> {
    fn emit(&mut self, samples: &[Sample]) -> Result<(), MeterError> {
        for s in samples {
            self.write_sample(s).map_err(MeterError::Sink)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), MeterError> {
        self.out.flush().map_err(MeterError::Sink)
    }
}

impl<W: Write> Drop for StreamSink<W> {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}

/// CSV rows with an extra column of seconds since the first sample.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    first: Option<DateTime<Utc>>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(out: W) -> Result<Self, MeterError> {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(CSV_HEADER)?;
        Ok(Self { writer, first: None })
    }
}

impl<W: Write> Sink for CsvSink<W> {
    fn emit(&mut self, samples: &[Sample]) -> Result<(), MeterError> {
        for s in samples {
            let first = *self.first.get_or_insert(s.timestamp);
            let relative = (s.timestamp - first).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0;
            self.writer.write_record([
                s.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                format!("{relative:.3}"),
                format!("{:.5}", s.voltage_v),
                format!("{:.5}", s.current_a),
                format!("{:.3}", s.dp_v),
                format!("{:.3}", s.dn_v),
                format!("{:.3}", s.temperature_c),
                format!("{:.6}", s.energy_ws),
                format!("{:.6}", s.charge_as),
            ])?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), MeterError> {
        self.writer.flush().map_err(MeterError::Sink)
    }
}

/// Output format selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SinkFormat {
    #[default]
    Stream,
    Csv,
}

impl FromStr for SinkFormat {
    type Err = MeterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stream" => Ok(SinkFormat::Stream),
            "csv" => Ok(SinkFormat::Csv),
            other => Err(MeterError::InvalidConfig(format!(
                "unknown output format {other:?}, expected \"stream\" or \"csv\""
            ))),
        }
    }
}

/// The sink variants behind one type, so the caller picks by configuration.
pub enum OutputSink {
    Stream(StreamSink<Box<dyn Write>>),
    Csv(CsvSink<Box<dyn Write>>),
}

impl OutputSink {
    /// Open `path` for writing; `None` or `"-"` means stdout.
    pub fn create(format: SinkFormat, path: Option<&Path>) -> Result<Self, MeterError> {
        let out: Box<dyn Write> = match path {
            Some(p) if p != Path::new("-") => Box::new(BufWriter::new(File::create(p).map_err(MeterError::Sink)?)),
            _ => Box::new(io::stdout().lock()),
        };
        Self::from_writer(format, out)
    }

    pub fn from_writer(format: SinkFormat, out: Box<dyn Write>) -> Result<Self, MeterError> {
        Ok(match format {
            SinkFormat::Stream => OutputSink::Stream(StreamSink::new(out)?),
            SinkFormat::Csv => OutputSink::Csv(CsvSink::new(out)?),
        })
    }
}

impl Sink for OutputSink {
    fn emit(&mut self, samples: &[Sample]) -> Result<(), MeterError> {
        match self {
            OutputSink::Stream(sink) => sink.emit(samples),
            OutputSink::Csv(sink) => sink.emit(samples),
        }
    }

    fn flush(&mut self) -> Result<(), MeterError> {
        match self {
            OutputSink::Stream(sink) => sink.flush(),
            OutputSink::Csv(sink) => sink.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(ms: i64, energy_ws: f64) -> Sample {
        Sample {
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap(),
            voltage_v: 5.12345,
            current_a: 1.5,
            dp_v: 0.6,
            dn_v: 0.0,
            temperature_c: 24.96,
            energy_ws,
            charge_as: 0.015,
        }
    }

    #[test]
    fn stream_lines() {
        let mut buf = Vec::new();
        {
            let mut sink = StreamSink::new(&mut buf).unwrap();
            sink.emit(&[sample(0, 0.076852), sample(10, 0.153704)]).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], STREAM_HEADER);
        assert_eq!(
            lines[1],
            "1700000000.000 5.12345 1.50000 0.600 0.000 24.960 0.076852 0.015000"
        );
        assert!(lines[2].starts_with("1700000000.010 "));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn csv_rows_have_relative_time() {
        let mut buf = Vec::new();
        {
            let mut sink = CsvSink::new(&mut buf).unwrap();
            sink.emit(&[sample(0, 0.1)]).unwrap();
            sink.emit(&[sample(1_250, 0.2)]).unwrap();
            sink.flush().unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], CSV_HEADER.join(","));
        assert_eq!(
            lines[1],
            "2023-11-14T22:13:20.000Z,0.000,5.12345,1.50000,0.600,0.000,24.960,0.100000,0.015000"
        );
        assert!(lines[2].starts_with("2023-11-14T22:13:21.250Z,1.250,"));
    }

    #[test]
    fn format_names() {
        assert_eq!("csv".parse::<SinkFormat>().unwrap(), SinkFormat::Csv);
        assert_eq!("stream".parse::<SinkFormat>().unwrap(), SinkFormat::Stream);
        assert_eq!(SinkFormat::Csv.to_string(), "csv");
        assert!("json".parse::<SinkFormat>().is_err());
    }

    #[test]
    fn output_sink_dispatches() {
        let mut sink = OutputSink::from_writer(SinkFormat::Csv, Box::new(io::sink())).unwrap();
        assert!(matches!(sink, OutputSink::Csv(_)));
        sink.emit(&[sample(0, 0.0)]).unwrap();
        sink.flush().unwrap();
    }
}
