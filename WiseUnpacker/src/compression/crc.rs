//! Table-driven CRC-32 (reflected, polynomial `0xEDB88320`)
//!
//! Streaming use follows `start` / `add` / `end`:
//!
//! ```
//! use wiseunpacker::compression::crc;
//!
//! let mut value = crc::start();
//! value = crc::add(value, b"1234");
//! value = crc::add(value, b"56789");
//! assert_eq!(crc::end(value), 0xCBF4_3926);
//! ```

const POLYNOMIAL: u32 = 0xEDB8_8320;

static TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { POLYNOMIAL ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

/// Initial accumulator value.
#[must_use]
pub const fn start() -> u32 {
    0xFFFF_FFFF
}

/// Fold one byte into the accumulator.
#[must_use]
#[inline]
pub fn add_byte(crc: u32, byte: u8) -> u32 {
    TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
}

/// Fold a slice into the accumulator.
#[must_use]
pub fn add(crc: u32, bytes: &[u8]) -> u32 {
    bytes.iter().fold(crc, |acc, &b| add_byte(acc, b))
}

/// Finalize the accumulator into the CRC-32 value.
#[must_use]
pub const fn end(crc: u32) -> u32 {
    crc ^ 0xFFFF_FFFF
}

/// CRC-32 of a complete buffer.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u32 {
    end(add(start(), bytes))
}
