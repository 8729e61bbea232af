//! Host-to-device control frames.

use crate::checksum::seal;
use crate::constants::{CMD_INIT, CMD_REFRESH, CMD_START, FRAME_LEN, PREAMBLE};
use crate::device::DeviceKind;

/// One 64-byte HID report.
pub type Frame = [u8; FRAME_LEN];

/// `AA <code> 00 .. 00 <crc>`
pub fn control_frame(code: u8) -> Frame {
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = PREAMBLE;
    frame[1] = code;
    seal(&mut frame);
    frame
}

/// Frames that switch the meter into streaming mode, in send order.
///
/// FNB58 and FNB48S repeat the start frame where FNB48 and C1 expect a
/// refresh frame.
pub fn handshake_frames(kind: DeviceKind) -> [Frame; 3] {
    let last = match kind {
        DeviceKind::Fnb58 | DeviceKind::Fnb48s => CMD_START,
        DeviceKind::Fnb48 | DeviceKind::C1 => CMD_REFRESH,
    };
    [control_frame(CMD_INIT), control_frame(CMD_START), control_frame(last)]
}

/// Frame sent every refresh interval while streaming.
pub fn keep_alive_frame() -> Frame {
    control_frame(CMD_REFRESH)
}
