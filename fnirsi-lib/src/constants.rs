// Protocol constants shared by FNB48, C1, FNB58 and FNB48S

use std::time::Duration;

/// Size of every HID report exchanged with the meter (64 bytes)
pub const FRAME_LEN: usize = 64;

/// Fixed vendor marker in byte 0 of every frame
pub const PREAMBLE: u8 = 0xAA;

/// Type byte of a measurement frame
pub const DATA_FRAME_TYPE: u8 = 0x04;

/// Offset of the first sub-record inside a data frame
pub const SUB_RECORD_OFFSET: usize = 2;

/// Size of one packed measurement sub-record (15 bytes)
pub const SUB_RECORD_LEN: usize = 15;

/// Sub-records carried by one data frame
pub const SAMPLES_PER_FRAME: usize = 4;

/// Range covered by the checksum: type byte through the unused byte
pub const CHECKSUM_RANGE: std::ops::Range<usize> = 1..FRAME_LEN - 1;

/// Index of the trailing checksum byte
pub const CHECKSUM_INDEX: usize = FRAME_LEN - 1;

/// Spacing between the sub-records of one frame
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

/// Integration step for energy and charge, in seconds. Fixed, never measured.
pub const INTEGRATION_STEP_S: f64 = 0.01;

/// Control frame codes
pub const CMD_INIT: u8 = 0x81;
pub const CMD_START: u8 = 0x82;
pub const CMD_REFRESH: u8 = 0x83;

/// USB interface class code for HID
pub const HID_CLASS: u8 = 0x03;

/// Default timeouts
pub const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(5);
pub const DRAIN_READ_TIMEOUT: Duration = Duration::from_secs(1);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Delay after each handshake frame so the firmware can settle
pub const HANDSHAKE_SETTLE: Duration = Duration::from_millis(10);

/// Delay after a USB reset before the interface is claimed
pub const RESET_SETTLE: Duration = Duration::from_millis(50);

/// Default temperature EMA factor
pub const DEFAULT_ALPHA: f64 = 0.9;
