use nusb::transfer::TransferError;
use std::io;
use thiserror::Error;

/// The primary error type for the `fnirsi-lib` library.
#[derive(Error, Debug)]
pub enum MeterError {
    #[error("No supported USB meter found. Is an FNB48 / C1 / FNB58 / FNB48S connected?")]
    DeviceNotFound,

    #[error("No supported USB meter matches {selector}")]
    NoMatchingDevice { selector: String },

    #[error("{count} USB meters match {selector}, pick one by serial number")]
    AmbiguousSelector { selector: String, count: usize },

    #[error("Malformed {kind}: {value:?}")]
    MalformedIdentifier { kind: &'static str, value: String },

    #[error("Unsupported device {vendor_id:04x}:{product_id:04x}")]
    UnknownDevice { vendor_id: u16, product_id: u16 },

    #[error("No HID interface found on the device")]
    NoHidInterface,

    #[error("No {direction} endpoint on HID interface {interface}")]
    EndpointNotFound { interface: u8, direction: &'static str },

    #[error("USB error: {0}")]
    Usb(#[from] nusb::Error),

    #[error("USB transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Timeout during USB operation: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Sink write failed: {0}")]
    Sink(#[source] io::Error),

    #[error("CSV sink error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Session already ran to completion")]
    SessionFinished,

    #[error("Protocol error: {0}")]
    Protocol(String),
}
