//! CRC-8 used by FNB58 / FNB48S firmware to protect each HID report.
//!
//! Polynomial 0x39, initial value 0x42, no reflection, no final XOR. The CRC
//! covers the type byte through the unused byte (frame bytes `1..63`) and is
//! stored in the last byte of the frame.

use crate::constants::{CHECKSUM_INDEX, CHECKSUM_RANGE, FRAME_LEN};

const POLY: u8 = 0x39;
const INIT: u8 = 0x42;

const TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 { (crc << 1) ^ POLY } else { crc << 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the CRC-8 over `bytes`.
pub fn crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(INIT, |crc, &b| TABLE[(crc ^ b) as usize])
}

/// Expected vs. received checksum of a rejected frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumMismatch {
    pub expected: u8,
    pub actual: u8,
}

/// Check the trailing checksum byte of a full frame.
pub fn verify(frame: &[u8; FRAME_LEN]) -> Result<(), ChecksumMismatch> {
    let expected = crc8(&frame[CHECKSUM_RANGE]);
    let actual = frame[CHECKSUM_INDEX];
    if expected == actual {
        Ok(())
    } else {
        Err(ChecksumMismatch { expected, actual })
    }
}

/// Write the checksum of `frame` into its trailing byte.
pub fn seal(frame: &mut [u8; FRAME_LEN]) {
    frame[CHECKSUM_INDEX] = crc8(&frame[CHECKSUM_RANGE]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control(code: u8) -> [u8; FRAME_LEN] {
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = 0xAA;
        frame[1] = code;
        frame
    }

    #[test]
    fn matches_firmware_trailers() {
        // The fixed handshake frames carry these trailers on the wire.
        assert_eq!(crc8(&control(0x81)[CHECKSUM_RANGE]), 0x8E);
        assert_eq!(crc8(&control(0x82)[CHECKSUM_RANGE]), 0x96);
        assert_eq!(crc8(&control(0x83)[CHECKSUM_RANGE]), 0x9E);
    }

    #[test]
    fn empty_input_is_init() {
        assert_eq!(crc8(&[]), INIT);
    }

    #[test]
    fn sealed_frame_verifies() {
        let mut frame = control(0x04);
        frame[5] = 0x12;
        frame[40] = 0xFE;
        seal(&mut frame);
        assert_eq!(verify(&frame), Ok(()));
    }

    #[test]
    fn flipped_bit_fails() {
        let mut frame = control(0x04);
        frame[10] = 0x5A;
        seal(&mut frame);
        frame[10] ^= 0x01;
        let err = verify(&frame).unwrap_err();
        assert_eq!(err.actual, frame[CHECKSUM_INDEX]);
        assert_ne!(err.expected, err.actual);
    }

    #[test]
    fn preamble_not_covered() {
        let mut frame = control(0x04);
        seal(&mut frame);
        frame[0] = 0x00;
        assert_eq!(verify(&frame), Ok(()));
    }
}
