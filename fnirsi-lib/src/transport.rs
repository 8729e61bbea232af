//! Raw HID report transport.
//!
//! The session engine only needs two blocking primitives: write one report,
//! and read one report with a timeout. [`NusbTransport`] provides them on top
//! of `nusb` by driving its transfer futures on a tokio runtime handle.

use crate::constants::{FRAME_LEN, HID_CLASS, RESET_SETTLE, WRITE_TIMEOUT};
use crate::error::MeterError;
use bytes::Bytes;
use nusb::transfer::{Direction, Queue, RequestBuffer};
use nusb::{DeviceInfo, Interface};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, trace};

pub trait Transport {
    /// Send one report to the device.
    fn write(&mut self, frame: &[u8]) -> Result<(), MeterError>;

    /// Wait up to `timeout` for one report. `Ok(None)` means nothing arrived.
    fn read(&mut self, timeout: Duration) -> Result<Option<Bytes>, MeterError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, frame: &[u8]) -> Result<(), MeterError> {
        (**self).write(frame)
    }

    fn read(&mut self, timeout: Duration) -> Result<Option<Bytes>, MeterError> {
        (**self).read(timeout)
    }
}

/// How the USB device is prepared before the interface is claimed.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub reset: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self { reset: true }
    }
}

impl OpenOptions {
    /// Skip the USB port reset (needed on macOS)
    pub fn skip_reset(mut self) -> Self {
        self.reset = false;
        self
    }
}

/// HID interface and endpoints found in the active configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HidEndpoints {
    interface: u8,
    endpoint_in: u8,
    endpoint_out: u8,
}

/// Interrupt-endpoint transport over the meter's HID interface.
pub struct NusbTransport {
    interface: Interface,
    endpoint_out: u8,
    queue: Queue<RequestBuffer>,
    runtime: Handle,
}

impl NusbTransport {
    /// Open `device_info`, reset it, and claim its first HID interface.
    pub fn open(device_info: &DeviceInfo, options: &OpenOptions, runtime: Handle) -> Result<Self, MeterError> {
        info!(
            "Opening {:04x}:{:04x} on bus {} addr {}",
            device_info.vendor_id(),
            device_info.product_id(),
            device_info.bus_number(),
            device_info.device_address()
        );
        let device = device_info.open()?;

        if options.reset {
            info!("Performing USB device reset...");
            device.reset()?;
            std::thread::sleep(RESET_SETTLE);
        }

        let hid = {
            let config = device
                .active_configuration()
                .map_err(|e| MeterError::Protocol(format!("no active configuration: {e}")))?;
            let setting = config
                .interface_alt_settings()
                .find(|s| s.class() == HID_CLASS)
                .ok_or(MeterError::NoHidInterface)?;
            let interface = setting.interface_number();
            let find = |direction: Direction, name: &'static str| {
                setting
                    .endpoints()
                    .find(|e| e.direction() == direction)
                    .map(|e| e.address())
                    .ok_or(MeterError::EndpointNotFound { interface, direction: name })
            };
            HidEndpoints {
                interface,
                endpoint_in: find(Direction::In, "IN")?,
                endpoint_out: find(Direction::Out, "OUT")?,
            }
        };
        debug!(?hid, "HID interface selected");

        let interface = device.detach_and_claim_interface(hid.interface)?;
        info!("Interface {} claimed successfully.", hid.interface);

        let queue = interface.interrupt_in_queue(hid.endpoint_in);
        Ok(Self {
            interface,
            endpoint_out: hid.endpoint_out,
            queue,
            runtime,
        })
    }
}

impl Transport for NusbTransport {
    fn write(&mut self, frame: &[u8]) -> Result<(), MeterError> {
        trace!(bytes = hex::encode(frame), "USB Write");
        let transfer = self.interface.interrupt_out(self.endpoint_out, frame.to_vec());
        let completion = self
            .runtime
            .block_on(async { tokio::time::timeout(WRITE_TIMEOUT, transfer).await })?;
        completion.into_result()?;
        Ok(())
    }

    fn read(&mut self, timeout: Duration) -> Result<Option<Bytes>, MeterError> {
        // The request stays queued across timeouts so no report is lost.
        if self.queue.pending() == 0 {
            self.queue.submit(RequestBuffer::new(FRAME_LEN));
        }
        let queue = &mut self.queue;
        // The timer must be created inside the runtime context
        let Ok(completion) = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, queue.next_complete()).await })
        else {
            return Ok(None);
        };
        let data = completion.into_result()?;
        trace!(bytes = hex::encode(&data), "USB Read");
        Ok(Some(Bytes::from(data)))
    }
}

impl Drop for NusbTransport {
    fn drop(&mut self) {
        self.queue.cancel_all();
    }
}
