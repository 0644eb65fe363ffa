//! Raw DEFLATE decoder (RFC 1951)
//!
//! The decoder pulls input one byte at a time from any [`Read`] and writes
//! output through a 32 KiB sliding window. The window is flushed to the sink
//! each time it wraps and once more at the end, and the CRC-32 of everything
//! flushed is accumulated on the way out.
//!
//! Every failure is an [`InflateError`]; nothing here panics on bad input,
//! since offset recovery deliberately feeds the decoder garbage.

use std::io::{self, Read, Write};
use std::sync::OnceLock;

use thiserror::Error;

use super::bits::BitReader;
use super::crc;
use super::huffman::HuffmanTree;
use super::tables::{
    CODE_LENGTH_ORDER, DISTANCE_BASE, DISTANCE_CODES, DISTANCE_EXTRA, END_OF_BLOCK, LENGTH_BASE,
    LENGTH_EXTRA, LITERAL_CODES, WINDOW_SIZE, fixed_distance_lengths, fixed_literal_lengths,
};

/// Decoder failures. All of them are recoverable by the caller.
#[derive(Error, Debug)]
pub enum InflateError {
    /// Block type 3 is reserved.
    #[error("invalid block type {0}")]
    InvalidBlockType(u32),

    /// A stored block's length does not match its one's complement.
    #[error("stored block length {len:04x} does not match complement {nlen:04x}")]
    StoredLengthMismatch { len: u16, nlen: u16 },

    #[error("incomplete Huffman tree")]
    IncompleteTree,

    #[error("over-subscribed Huffman tree")]
    OverfullTree,

    /// Code lengths are out of range or repeat a length that does not exist.
    #[error("invalid code length sequence")]
    InvalidCodeLengths,

    /// The bit pattern leads to an unused branch of an incomplete tree.
    #[error("invalid Huffman code")]
    InvalidCode,

    /// A decoded symbol has no meaning in its alphabet.
    #[error("invalid symbol {0}")]
    InvalidSymbol(u16),

    /// A back-reference points before the start of the output.
    #[error("distance {distance} exceeds the {available} bytes produced")]
    DistanceTooFar { distance: usize, available: u64 },

    /// More output was produced than the caller allowed.
    #[error("output exceeds limit of {0} bytes")]
    OutputLimit(u64),

    /// The source reported end-of-data inside the bitstream.
    #[error("unexpected end of compressed data")]
    UnexpectedEnd,

    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

/// Counters reported by a successful decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InflateStats {
    /// Input bytes consumed, including the partially used final byte.
    pub input_consumed: u64,
    /// Output bytes produced.
    pub output_produced: u64,
    /// CRC-32 of the output.
    pub crc32: u32,
}

struct FixedTrees {
    literal: HuffmanTree,
    distance: HuffmanTree,
}

fn fixed_trees() -> &'static FixedTrees {
    static FIXED: OnceLock<FixedTrees> = OnceLock::new();
    FIXED.get_or_init(|| FixedTrees {
        literal: HuffmanTree::from_lengths(&fixed_literal_lengths(), false)
            .expect("static literal lengths form a complete tree"),
        distance: HuffmanTree::from_lengths(&fixed_distance_lengths(), false)
            .expect("static distance lengths form a complete tree"),
    })
}

/// Sliding window that doubles as the output buffer.
struct Window<W> {
    sink: W,
    buf: Box<[u8]>,
    pos: usize,
    produced: u64,
    limit: Option<u64>,
    crc: u32,
}

impl<W: Write> Window<W> {
    fn new(sink: W, limit: Option<u64>) -> Self {
        Self {
            sink,
            buf: vec![0u8; WINDOW_SIZE].into_boxed_slice(),
            pos: 0,
            produced: 0,
            limit,
            crc: crc::start(),
        }
    }

    fn push(&mut self, byte: u8) -> Result<(), InflateError> {
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Err(InflateError::OutputLimit(self.produced));
        }
        self.buf[self.pos] = byte;
        self.pos += 1;
        self.produced += 1;
        if self.pos == WINDOW_SIZE {
            self.flush()?;
            self.pos = 0;
        }
        Ok(())
    }

    fn copy(&mut self, distance: usize, length: usize) -> Result<(), InflateError> {
        if distance as u64 > self.produced || distance > WINDOW_SIZE {
            return Err(InflateError::DistanceTooFar {
                distance,
                available: self.produced,
            });
        }
        for _ in 0..length {
            let src = (self.pos + WINDOW_SIZE - distance) % WINDOW_SIZE;
            self.push(self.buf[src])?;
        }
        Ok(())
    }

    /// Hand the filled part of the window to the sink.
    fn flush(&mut self) -> Result<(), InflateError> {
        let filled = &self.buf[..self.pos];
        self.crc = crc::add(self.crc, filled);
        self.sink.write_all(filled)?;
        Ok(())
    }
}

/// Decode a raw DEFLATE stream from `input` into `output`.
///
/// # Errors
/// Returns an [`InflateError`] if the stream is malformed or ends early.
pub fn inflate<R: Read, W: Write>(input: R, output: W) -> Result<InflateStats, InflateError> {
    inflate_limited(input, output, None)
}

/// Decode like [`inflate`], failing once more than `max_output` bytes would
/// be produced.
///
/// # Errors
/// Returns an [`InflateError`] if the stream is malformed, ends early, or
/// exceeds the output limit.
pub fn inflate_limited<R: Read, W: Write>(
    input: R,
    output: W,
    max_output: Option<u64>,
) -> Result<InflateStats, InflateError> {
    let mut bits = BitReader::new(input);
    let mut window = Window::new(output, max_output);

    loop {
        let last = bits.bit()? == 1;
        match bits.bits(2)? {
            0 => stored_block(&mut bits, &mut window)?,
            1 => {
                let fixed = fixed_trees();
                huffman_block(&mut bits, &mut window, &fixed.literal, &fixed.distance)?;
            }
            2 => {
                let (literal, distance) = dynamic_trees(&mut bits)?;
                huffman_block(&mut bits, &mut window, &literal, &distance)?;
            }
            block_type => return Err(InflateError::InvalidBlockType(block_type)),
        }
        if last {
            break;
        }
    }

    window.flush()?;
    window.sink.flush()?;

    Ok(InflateStats {
        input_consumed: bits.consumed(),
        output_produced: window.produced,
        crc32: crc::end(window.crc),
    })
}

fn stored_block<R: Read, W: Write>(
    bits: &mut BitReader<R>,
    window: &mut Window<W>,
) -> Result<(), InflateError> {
    bits.align();
    let len = bits.bits(16)? as u16;
    let nlen = bits.bits(16)? as u16;
    if len != !nlen {
        return Err(InflateError::StoredLengthMismatch { len, nlen });
    }
    for _ in 0..len {
        let byte = bits.next_byte()?;
        window.push(byte)?;
    }
    Ok(())
}

fn dynamic_trees<R: Read>(
    bits: &mut BitReader<R>,
) -> Result<(HuffmanTree, HuffmanTree), InflateError> {
    let literal_count = bits.bits(5)? as usize + 257;
    let distance_count = bits.bits(5)? as usize + 1;
    let code_length_count = bits.bits(4)? as usize + 4;

    let mut code_length_lengths = [0u8; 19];
    for &index in &CODE_LENGTH_ORDER[..code_length_count] {
        code_length_lengths[index] = bits.bits(3)? as u8;
    }
    let code_length_tree = HuffmanTree::from_lengths(&code_length_lengths, false)?;

    let total = literal_count + distance_count;
    let mut lengths = [0u8; LITERAL_CODES + DISTANCE_CODES];
    let mut i = 0;
    while i < total {
        let (value, repeat) = match code_length_tree.decode(bits)? {
            symbol @ 0..=15 => (symbol as u8, 1),
            16 => {
                if i == 0 {
                    return Err(InflateError::InvalidCodeLengths);
                }
                (lengths[i - 1], bits.bits(2)? as usize + 3)
            }
            17 => (0, bits.bits(3)? as usize + 3),
            18 => (0, bits.bits(7)? as usize + 11),
            symbol => return Err(InflateError::InvalidSymbol(symbol)),
        };
        if i + repeat > total {
            return Err(InflateError::InvalidCodeLengths);
        }
        lengths[i..i + repeat].fill(value);
        i += repeat;
    }

    if lengths[usize::from(END_OF_BLOCK)] == 0 {
        return Err(InflateError::InvalidCodeLengths);
    }

    let literal = HuffmanTree::from_lengths(&lengths[..literal_count], true)?;
    let distance = HuffmanTree::from_lengths(&lengths[literal_count..total], true)?;
    Ok((literal, distance))
}

fn huffman_block<R: Read, W: Write>(
    bits: &mut BitReader<R>,
    window: &mut Window<W>,
    literal: &HuffmanTree,
    distance: &HuffmanTree,
) -> Result<(), InflateError> {
    loop {
        let symbol = literal.decode(bits)?;
        match symbol {
            0..=255 => window.push(symbol as u8)?,
            END_OF_BLOCK => return Ok(()),
            257..=285 => {
                let index = usize::from(symbol - 257);
                let length = usize::from(LENGTH_BASE[index])
                    + bits.bits(u32::from(LENGTH_EXTRA[index]))? as usize;

                let dist_symbol = distance.decode(bits)?;
                let dist_index = usize::from(dist_symbol);
                if dist_index >= DISTANCE_BASE.len() {
                    return Err(InflateError::InvalidSymbol(dist_symbol));
                }
                let dist = usize::from(DISTANCE_BASE[dist_index])
                    + bits.bits(u32::from(DISTANCE_EXTRA[dist_index]))? as usize;

                window.copy(dist, length)?;
            }
            _ => return Err(InflateError::InvalidSymbol(symbol)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::DeflateEncoder;

    fn deflate(data: &[u8], level: u32) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level));
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn sample(len: usize) -> Vec<u8> {
        let text = b"Wise Installation Wizard copies files to %MAINDIR%. ";
        (0..len)
            .map(|i| if i % 97 < 60 { text[i % text.len()] } else { (i * 7 % 256) as u8 })
            .collect()
    }

    #[test]
    fn test_round_trip_all_levels() {
        let data = sample(100_000);
        for level in [0, 1, 6, 9] {
            let compressed = deflate(&data, level);
            let mut out = Vec::new();
            let stats = inflate(&compressed[..], &mut out).unwrap();
            assert_eq!(out, data, "level {level}");
            assert_eq!(stats.input_consumed, compressed.len() as u64);
            assert_eq!(stats.output_produced, data.len() as u64);
            assert_eq!(stats.crc32, crc32fast::hash(&data));
        }
    }

    #[test]
    fn test_consumed_count_ignores_trailing_bytes() {
        let data = sample(4000);
        let mut compressed = deflate(&data, 6);
        let stream_len = compressed.len() as u64;
        compressed.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00]);

        let mut out = Vec::new();
        let stats = inflate(&compressed[..], &mut out).unwrap();
        assert_eq!(stats.input_consumed, stream_len);
        assert_eq!(out, data);
    }

    #[test]
    fn test_fixed_block_literal() {
        // Fixed block, final, literal 'a' (0x61 -> code 0x91, 8 bits), EOB.
        let data = [0x4B, 0x04, 0x00];
        let mut out = Vec::new();
        let stats = inflate(&data[..], &mut out).unwrap();
        assert_eq!(out, b"a");
        assert_eq!(stats.input_consumed, 3);
    }

    #[test]
    fn test_empty_stream() {
        let compressed = deflate(b"", 6);
        let mut out = Vec::new();
        let stats = inflate(&compressed[..], &mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(stats.crc32, 0);
    }

    #[test]
    fn test_reserved_block_type_fails() {
        let mut out = Vec::new();
        let result = inflate(&[0x07u8][..], &mut out);
        assert!(matches!(result, Err(InflateError::InvalidBlockType(3))));
    }

    #[test]
    fn test_stored_length_complement_checked() {
        let data = [0x01, 0x05, 0x00, 0x00, 0x00, b'h', b'e', b'l', b'l', b'o'];
        let mut out = Vec::new();
        let result = inflate(&data[..], &mut out);
        assert!(matches!(result, Err(InflateError::StoredLengthMismatch { .. })));
    }

    #[test]
    fn test_truncated_stream_fails() {
        let compressed = deflate(&sample(10_000), 9);
        let mut out = Vec::new();
        let result = inflate(&compressed[..compressed.len() / 2], &mut out);
        assert!(matches!(result, Err(InflateError::UnexpectedEnd)));
    }

    #[test]
    fn test_output_limit() {
        let compressed = deflate(&[0u8; 5000], 9);
        let mut out = Vec::new();
        let result = inflate_limited(&compressed[..], &mut out, Some(4000));
        assert!(matches!(result, Err(InflateError::OutputLimit(_))));
    }
}
