pub mod checksum;
pub mod constants;
pub mod decoder;
pub mod device;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod sample;
pub mod session;
pub mod sink;
pub mod stop;
pub mod transport;

// Re-export the types most callers need
pub use decoder::{Decoded, Decoder};
pub use device::{DeviceIdentity, DeviceKind, identify};
pub use discovery::{DeviceSelector, MeterDevice, find_meter, list_meters};
pub use error::MeterError;
pub use sample::{Accumulator, Sample};
pub use session::{Session, SessionConfig, SessionEvent, SessionObserver, SessionReport, SessionState, TracingObserver};
pub use sink::{OutputSink, Sink, SinkFormat};
pub use stop::{AnyStop, Deadline, FileStop, InterruptFlag, StopSignal};
pub use transport::{NusbTransport, OpenOptions, Transport};
