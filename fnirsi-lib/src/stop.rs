//! Stop conditions polled by the session between reads.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

pub trait StopSignal {
    fn should_stop(&mut self) -> bool;
}

impl<F: FnMut() -> bool> StopSignal for F {
    fn should_stop(&mut self) -> bool {
        self()
    }
}

/// Default marker file name
pub const DEFAULT_STOP_FILE: &str = "fnirsi_stop";

/// Stops once a marker file exists.
#[derive(Debug, Clone)]
pub struct FileStop {
    path: PathBuf,
}

impl FileStop {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileStop {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_FILE)
    }
}

impl StopSignal for FileStop {
    fn should_stop(&mut self) -> bool {
        if self.path.exists() {
            info!("Stop file ({}) found -> stopping...", self.path.display());
            return true;
        }
        false
    }
}

/// Stops when a wall-clock budget, counted from construction, runs out.
#[derive(Debug, Clone)]
pub struct Deadline {
    duration: Duration,
    end: Instant,
}

impl Deadline {
    pub fn after(duration: Duration) -> Self {
        Self {
            duration,
            end: Instant::now() + duration,
        }
    }
}

impl StopSignal for Deadline {
    fn should_stop(&mut self) -> bool {
        if Instant::now() >= self.end {
            info!("Timeout ({:?}) -> stopping...", self.duration);
            return true;
        }
        false
    }
}

/// Shared flag raised from another thread, e.g. a Ctrl+C handler.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl StopSignal for InterruptFlag {
    fn should_stop(&mut self) -> bool {
        if self.is_raised() {
            info!("Interrupt received -> stopping...");
            return true;
        }
        false
    }
}

/// Stops as soon as any of its members does.
#[derive(Default)]
pub struct AnyStop {
    signals: Vec<Box<dyn StopSignal + Send>>,
}

impl AnyStop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, signal: impl StopSignal + Send + 'static) -> Self {
        self.signals.push(Box::new(signal));
        self
    }

    pub fn push(&mut self, signal: impl StopSignal + Send + 'static) {
        self.signals.push(Box::new(signal));
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

impl StopSignal for AnyStop {
    fn should_stop(&mut self) -> bool {
        self.signals.iter_mut().any(|s| s.should_stop())
    }
}
