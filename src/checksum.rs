//! CRC-16/MODBUS checksum
//!
//! Reflected polynomial 0xA001, initial register 0xFFFF, no final xor. The
//! checksum travels on the wire low byte first.

use ::crc::{Crc, CRC_16_MODBUS};

use crate::constants::{CRC_LEN, MIN_FRAME_LEN};

/// CRC calculator for RTU frames
const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Compute the Modbus CRC-16 of `data`
#[inline]
pub fn compute(data: &[u8]) -> u16 {
    CRC_MODBUS.checksum(data)
}

/// Check the trailing little-endian CRC of a complete frame
///
/// Frames shorter than address + function + CRC never verify.
pub fn verify(frame: &[u8]) -> bool {
    if frame.len() < MIN_FRAME_LEN {
        return false;
    }
    let (data, tail) = frame.split_at(frame.len() - CRC_LEN);
    let received = u16::from_le_bytes([tail[0], tail[1]]);
    received == compute(data)
}

/// Append the CRC of everything already in `buf`
#[inline]
pub fn append(buf: &mut Vec<u8>) {
    let crc = compute(buf);
    buf.extend_from_slice(&crc.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        // Catalogue check value for CRC-16/MODBUS
        assert_eq!(compute(b"123456789"), 0x4B37);
    }

    #[test]
    fn test_empty_input_is_initial_register() {
        assert_eq!(compute(&[]), 0xFFFF);
    }

    #[test]
    fn test_known_request() {
        // Read one holding register at 0 from slave 1
        assert_eq!(compute(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]), 0x0A84);
    }

    #[test]
    fn test_verify_valid_frame() {
        assert!(verify(&[0x03, 0x03, 0x02, 0x00, 0x01, 0x00, 0x44]));
        assert!(verify(&[0x03, 0x83, 0x02, 0x61, 0x31]));
    }

    #[test]
    fn test_verify_rejects_corruption() {
        assert!(!verify(&[0x03, 0x03, 0x02, 0x00, 0x01, 0x00, 0x45]));
        assert!(!verify(&[0x03, 0x03, 0x02, 0x01, 0x01, 0x00, 0x44]));
    }

    #[test]
    fn test_verify_rejects_short_input() {
        assert!(!verify(&[]));
        assert!(!verify(&[0xFF, 0xFF]));
        assert!(!verify(&[0x01, 0x03, 0x84]));
    }

    #[test]
    fn test_append() {
        let mut buf = vec![0x07, 0x03, 0x00, 0x00, 0x00, 0x01];
        append(&mut buf);
        assert_eq!(buf, vec![0x07, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x6C]);
        assert!(verify(&buf));
    }
}
