//! LSB-first bit reader over a byte source

use std::io::{self, Read};

use super::inflate::InflateError;

/// Pulls bytes one at a time so the consumed count is exact.
pub(crate) struct BitReader<R> {
    inner: R,
    bit_buf: u32,
    bit_count: u32,
    consumed: u64,
}

impl<R: Read> BitReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bit_buf: 0,
            bit_count: 0,
            consumed: 0,
        }
    }

    /// Number of input bytes pulled so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Read one raw byte from the source, bypassing the bit buffer.
    pub fn next_byte(&mut self) -> Result<u8, InflateError> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Err(InflateError::UnexpectedEnd),
                Ok(_) => {
                    self.consumed += 1;
                    return Ok(byte[0]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(InflateError::Io(e)),
            }
        }
    }

    /// Read `count` bits (at most 16), least significant first.
    pub fn bits(&mut self, count: u32) -> Result<u32, InflateError> {
        debug_assert!(count <= 16);
        while self.bit_count < count {
            let byte = self.next_byte()?;
            self.bit_buf |= u32::from(byte) << self.bit_count;
            self.bit_count += 8;
        }
        let value = self.bit_buf & ((1u32 << count) - 1);
        self.bit_buf >>= count;
        self.bit_count -= count;
        Ok(value)
    }

    pub fn bit(&mut self) -> Result<u32, InflateError> {
        self.bits(1)
    }

    /// Discard the unread bits of the current byte.
    pub fn align(&mut self) {
        self.bit_buf = 0;
        self.bit_count = 0;
    }
}
