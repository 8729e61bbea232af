//! Session engine: handshake, stream, stop, drain.
//!
//! A [`Session`] owns the transport and the accumulator for one capture. It
//! walks `Idle -> Handshaking -> Streaming -> Stopping -> Draining ->
//! Terminated` exactly once. Fatal errors in the first two phases skip
//! straight to `Draining` so buffered reports never leak into the next user
//! of the handle.
//!
//! The engine does no logging of its own. Everything worth reporting is
//! handed to a [`SessionObserver`] as a [`SessionEvent`]; [`TracingObserver`]
//! turns those into `tracing` records.

use crate::constants::{DEFAULT_ALPHA, DRAIN_READ_TIMEOUT, HANDSHAKE_SETTLE, STREAM_READ_TIMEOUT};
use crate::decoder::{Decoded, Decoder};
use crate::device::DeviceIdentity;
use crate::error::MeterError;
use crate::frame::{handshake_frames, keep_alive_frame};
use crate::sample::Accumulator;
use crate::sink::Sink;
use crate::stop::StopSignal;
use crate::transport::Transport;
use chrono::Utc;
use std::time::{Duration, Instant};
use strum_macros::Display;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Idle,
    Handshaking,
    Streaming,
    Stopping,
    Draining,
    Terminated,
}

/// Diagnostics reported while a session runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged { from: SessionState, to: SessionState },
    HandshakeFrameSent { index: usize, code: u8 },
    FrameIgnored { frame_type: u8 },
    ChecksumMismatch { expected: u8, actual: u8 },
    FrameTruncated { len: usize },
    SamplesEmitted { count: usize },
    KeepAliveSent,
    ReadTimeout,
    StopRequested,
    FrameDrained { len: usize },
    DrainFailed { reason: String },
    SessionFailed { reason: String },
}

pub trait SessionObserver {
    fn on_event(&mut self, event: &SessionEvent);
}

impl<F: FnMut(&SessionEvent)> SessionObserver for F {
    fn on_event(&mut self, event: &SessionEvent) {
        self(event)
    }
}

/// Renders session events as log records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_event(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::StateChanged { from, to } => info!("Session {} -> {}", from, to),
            SessionEvent::HandshakeFrameSent { index, code } => {
                debug!("Handshake frame {} sent (0x{:02x})", index, code)
            }
            SessionEvent::FrameIgnored { frame_type } => trace!("Ignoring frame of type 0x{:02x}", frame_type),
            SessionEvent::ChecksumMismatch { expected, actual } => {
                warn!("CRC mismatch: expected {:02x}, got {:02x}", expected, actual)
            }
            SessionEvent::FrameTruncated { len } => debug!(len, "Short frame dropped"),
            SessionEvent::SamplesEmitted { count } => trace!(count, "Samples emitted"),
            SessionEvent::KeepAliveSent => trace!("Keep-alive sent"),
            SessionEvent::ReadTimeout => debug!("No data within read timeout"),
            SessionEvent::StopRequested => info!("Stop requested"),
            SessionEvent::FrameDrained { len } => debug!("Drained {} bytes", len),
            SessionEvent::DrainFailed { reason } => warn!("Buffer drain failed: {}", reason),
            // The caller reports the returned error
            SessionEvent::SessionFailed { reason } => warn!("Session aborted: {}", reason),
        }
    }
}

/// Per-session settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub verify_checksum: bool,
    pub alpha: f64,
    pub read_timeout: Duration,
    pub drain_timeout: Duration,
    pub settle_delay: Duration,
    /// Overrides the identity's keep-alive cadence
    pub refresh_interval: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            verify_checksum: false,
            alpha: DEFAULT_ALPHA,
            read_timeout: STREAM_READ_TIMEOUT,
            drain_timeout: DRAIN_READ_TIMEOUT,
            settle_delay: HANDSHAKE_SETTLE,
            refresh_interval: None,
        }
    }
}

impl SessionConfig {
    pub fn with_checksum(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    pub fn validate(&self) -> Result<(), MeterError> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(MeterError::InvalidConfig(format!(
                "alpha must be between 0 and 1 (exclusive), got {}",
                self.alpha
            )));
        }
        if self.read_timeout.is_zero() || self.drain_timeout.is_zero() {
            return Err(MeterError::InvalidConfig("read timeouts must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Counters and final totals of a finished session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionReport {
    pub frames_read: u64,
    pub frames_ignored: u64,
    pub checksum_failures: u64,
    pub frames_truncated: u64,
    pub samples_emitted: u64,
    pub keep_alives_sent: u64,
    pub frames_drained: u64,
    pub energy_ws: f64,
    pub charge_as: f64,
}

pub struct Session<T: Transport> {
    transport: T,
    identity: DeviceIdentity,
    config: SessionConfig,
    decoder: Decoder,
    accumulator: Accumulator,
    state: SessionState,
    report: SessionReport,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, identity: DeviceIdentity, config: SessionConfig) -> Result<Self, MeterError> {
        config.validate()?;
        Ok(Self {
            transport,
            identity,
            decoder: Decoder::new(config.verify_checksum, config.alpha),
            config,
            accumulator: Accumulator::new(),
            state: SessionState::Idle,
            report: SessionReport::default(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    fn refresh_interval(&self) -> Duration {
        self.config.refresh_interval.unwrap_or(self.identity.refresh_interval)
    }

    fn enter(&mut self, to: SessionState, observer: &mut (impl SessionObserver + ?Sized)) {
        let from = self.state;
        self.state = to;
        observer.on_event(&SessionEvent::StateChanged { from, to });
    }

    /// Run the whole lifecycle once.
    ///
    /// Returns the report on a clean stop. On a fatal error the buffer is
    /// still drained and the sink flushed before the error is returned.
    pub fn run<S, P, O>(&mut self, sink: &mut S, stop: &mut P, observer: &mut O) -> Result<SessionReport, MeterError>
    where
        S: Sink + ?Sized,
        P: StopSignal + ?Sized,
        O: SessionObserver + ?Sized,
    {
        if self.state != SessionState::Idle {
            return Err(MeterError::SessionFinished);
        }

        let outcome = self.handshake(observer).and_then(|()| self.stream(sink, stop, observer));
        if let Err(e) = &outcome {
            observer.on_event(&SessionEvent::SessionFailed { reason: e.to_string() });
        } else {
            self.enter(SessionState::Stopping, observer);
        }

        self.drain(observer);
        let flushed = sink.flush();
        self.enter(SessionState::Terminated, observer);

        self.report.energy_ws = self.accumulator.energy_ws();
        self.report.charge_as = self.accumulator.charge_as();
        outcome?;
        flushed?;
        Ok(self.report.clone())
    }

    fn handshake(&mut self, observer: &mut (impl SessionObserver + ?Sized)) -> Result<(), MeterError> {
        self.enter(SessionState::Handshaking, observer);
        for (index, frame) in handshake_frames(self.identity.kind).iter().enumerate() {
            self.transport.write(frame)?;
            observer.on_event(&SessionEvent::HandshakeFrameSent { index, code: frame[1] });
            if !self.config.settle_delay.is_zero() {
                std::thread::sleep(self.config.settle_delay);
            }
        }
        Ok(())
    }

    fn stream<S, P, O>(&mut self, sink: &mut S, stop: &mut P, observer: &mut O) -> Result<(), MeterError>
    where
        S: Sink + ?Sized,
        P: StopSignal + ?Sized,
        O: SessionObserver + ?Sized,
    {
        self.enter(SessionState::Streaming, observer);
        let refresh = self.refresh_interval();
        let keep_alive = keep_alive_frame();
        let mut last_keep_alive = Instant::now();

        loop {
            match self.transport.read(self.config.read_timeout)? {
                Some(frame) => {
                    self.report.frames_read += 1;
                    let captured = Utc::now();
                    match self.decoder.decode(&frame, captured, &mut self.accumulator) {
                        Decoded::Samples(samples) => {
                            sink.emit(&samples)?;
                            self.report.samples_emitted += samples.len() as u64;
                            observer.on_event(&SessionEvent::SamplesEmitted { count: samples.len() });
                        }
                        Decoded::Ignored { frame_type } => {
                            self.report.frames_ignored += 1;
                            observer.on_event(&SessionEvent::FrameIgnored { frame_type });
                        }
                        Decoded::ChecksumMismatch { expected, actual } => {
                            self.report.checksum_failures += 1;
                            observer.on_event(&SessionEvent::ChecksumMismatch { expected, actual });
                        }
                        Decoded::Truncated { len } => {
                            self.report.frames_truncated += 1;
                            observer.on_event(&SessionEvent::FrameTruncated { len });
                        }
                    }
                }
                None => observer.on_event(&SessionEvent::ReadTimeout),
            }

            if last_keep_alive.elapsed() >= refresh {
                self.transport.write(&keep_alive)?;
                last_keep_alive = Instant::now();
                self.report.keep_alives_sent += 1;
                observer.on_event(&SessionEvent::KeepAliveSent);
            }

            if stop.should_stop() {
                observer.on_event(&SessionEvent::StopRequested);
                return Ok(());
            }
        }
    }

    /// Discard buffered reports until one read times out. Never fails.
    fn drain(&mut self, observer: &mut (impl SessionObserver + ?Sized)) {
        self.enter(SessionState::Draining, observer);
        loop {
            match self.transport.read(self.config.drain_timeout) {
                Ok(Some(frame)) => {
                    self.report.frames_drained += 1;
                    observer.on_event(&SessionEvent::FrameDrained { len: frame.len() });
                }
                Ok(None) => return,
                Err(e) => {
                    observer.on_event(&SessionEvent::DrainFailed { reason: e.to_string() });
                    return;
                }
            }
        }
    }
}
