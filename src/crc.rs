//! CRC-8/MAXIM checksum used as the trailing byte of every frame.
//!
//! Parameters: polynomial `0x31` (reflected `0x8c`), initial value `0x00`,
//! reflected input and output, no final XOR.
//! The device firmware rejects frames whose checksum deviates from this variant.

use crc::{CRC_8_MAXIM_DOW, Crc};

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_MAXIM_DOW);

/// Computes the CRC-8/MAXIM checksum of the given bytes.
///
/// Frames always checksum their leading 9 bytes, but any length is accepted.
#[must_use]
pub fn compute(data: &[u8]) -> u8 {
    CRC8.checksum(data)
}
