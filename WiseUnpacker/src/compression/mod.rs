//! Raw DEFLATE decompression and CRC-32
//!
//! Wise installers store every payload as a headerless DEFLATE stream
//! produced by an old compressor. There is no zlib or gzip framing, so the
//! decoder here reports the exact number of input bytes it consumed. Callers
//! use that count to find the CRC-32 trailer that follows each stream.

use std::fmt;

mod bits;
pub mod crc;
mod huffman;
mod inflate;
mod tables;

pub use inflate::{InflateError, InflateStats, inflate, inflate_limited};
pub use tables::WINDOW_SIZE;

/// What a decompression attempt is expected to produce.
///
/// `None` sizes are unknown and are discovered from the decoder's own
/// counters. A `crc32` of `0` means the checksum is not known up front and
/// must be read from the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeflateExpectation {
    /// Declared number of input bytes, including any trailing CRC.
    pub input_size: Option<u64>,
    /// Declared number of decompressed bytes.
    pub output_size: Option<u64>,
    /// Declared CRC-32 of the decompressed bytes (`0` = unknown).
    pub crc32: u32,
}

impl DeflateExpectation {
    /// An expectation with every field unknown.
    #[must_use]
    pub fn unknown() -> Self {
        Self::default()
    }

    /// An expectation built from raw header size fields, where `0` means
    /// "not declared".
    #[must_use]
    pub fn from_sizes(input_size: u32, output_size: u32) -> Self {
        Self {
            input_size: (input_size != 0).then_some(u64::from(input_size)),
            output_size: (output_size != 0).then_some(u64::from(output_size)),
            crc32: 0,
        }
    }

    #[must_use]
    pub fn with_input_size(mut self, size: u64) -> Self {
        self.input_size = Some(size);
        self
    }

    #[must_use]
    pub fn with_output_size(mut self, size: u64) -> Self {
        self.output_size = Some(size);
        self
    }

    #[must_use]
    pub fn with_crc32(mut self, crc32: u32) -> Self {
        self.crc32 = crc32;
        self
    }

    /// Check the expectation against the bytes left in the stream.
    ///
    /// Returns [`ExtractionStatus::Invalid`] when the declared input cannot
    /// fit, in which case the decoder must not be invoked.
    #[must_use]
    pub fn check(&self, remaining: u64) -> ExtractionStatus {
        match self.input_size {
            Some(size) if size > remaining => ExtractionStatus::Invalid,
            _ => ExtractionStatus::Good,
        }
    }
}

/// Outcome classification of one extraction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    /// Decoded and, when a CRC was available, verified.
    Good,
    /// Attempted, but the decoder failed or the CRC never matched.
    Fail,
    /// The expectation was impossible for this stream; never attempted.
    Invalid,
}

impl ExtractionStatus {
    #[must_use]
    pub fn is_good(self) -> bool {
        self == ExtractionStatus::Good
    }
}

impl fmt::Display for ExtractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractionStatus::Good => "good",
            ExtractionStatus::Fail => "fail",
            ExtractionStatus::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expectation_from_sizes_treats_zero_as_unknown() {
        let exp = DeflateExpectation::from_sizes(120, 0);
        assert_eq!(exp.input_size, Some(120));
        assert_eq!(exp.output_size, None);
        assert_eq!(exp.crc32, 0);
    }

    #[test]
    fn test_expectation_check_rejects_oversized_input() {
        let exp = DeflateExpectation::unknown().with_input_size(100);
        assert_eq!(exp.check(99), ExtractionStatus::Invalid);
        assert_eq!(exp.check(100), ExtractionStatus::Good);
        assert_eq!(DeflateExpectation::unknown().check(0), ExtractionStatus::Good);
    }
}
