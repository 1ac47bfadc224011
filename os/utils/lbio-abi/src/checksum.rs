//! # Ones'-Complement Checksum
//!
//! The 16-bit Internet checksum (RFC 1071) used for both the header and the
//! record region. Bytes are summed as little-endian 16-bit words, an odd
//! trailing byte is padded with zero, carries out of bit 15 are folded back
//! in, and the complement of the sum is returned.

use core::ops::Range;

/// Checksum over `bytes`.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u16 {
    finish(bytes.iter().copied().enumerate().fold(0, add_byte))
}

/// Checksum over `bytes` with the bytes in `skip` treated as zero.
///
/// Used for the header, whose own checksum field is excluded from the sum.
#[must_use]
pub fn checksum_excluding(bytes: &[u8], skip: Range<usize>) -> u16 {
    let sum = bytes
        .iter()
        .copied()
        .enumerate()
        .map(|(i, b)| if skip.contains(&i) { (i, 0) } else { (i, b) })
        .fold(0, add_byte);
    finish(sum)
}

/// Recompute the checksum of `bytes` and compare against `expected`.
#[must_use]
pub fn verify(bytes: &[u8], expected: u16) -> bool {
    checksum(bytes) == expected
}

/// Add one byte at position `index` to a running 16-bit sum.
#[inline]
fn add_byte(sum: u32, (index, byte): (usize, u8)) -> u32 {
    let value = if index & 1 == 0 {
        u32::from(byte)
    } else {
        u32::from(byte) << 8
    };

    // end-around carry
    let sum = sum + value;
    if sum > 0xffff {
        (sum + (sum >> 16)) & 0xffff
    } else {
        sum
    }
}

#[inline]
#[allow(clippy::cast_possible_truncation)]
fn finish(sum: u32) -> u16 {
    !(sum as u16)
}
