//! Constant DEFLATE tables (RFC 1951 section 3.2.5)

/// Size of the LZ77 sliding window.
pub const WINDOW_SIZE: usize = 0x8000;

/// Longest Huffman code DEFLATE permits.
pub const MAX_CODE_BITS: u8 = 15;

/// Literal/length alphabet size, including the two reserved codes.
pub const LITERAL_CODES: usize = 288;

/// Distance alphabet size, including the two reserved codes.
pub const DISTANCE_CODES: usize = 32;

pub const END_OF_BLOCK: u16 = 256;

/// Order in which code-length code lengths are transmitted.
pub const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Base match length for symbols 257..=285.
pub const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115,
    131, 163, 195, 227, 258,
];

/// Extra bits for symbols 257..=285.
pub const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Base distance for distance symbols 0..=29.
pub const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Extra bits for distance symbols 0..=29.
pub const DISTANCE_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12,
    13, 13,
];

/// Code lengths of the static literal/length code.
pub fn fixed_literal_lengths() -> [u8; LITERAL_CODES] {
    let mut lengths = [0u8; LITERAL_CODES];
    lengths[..144].fill(8);
    lengths[144..256].fill(9);
    lengths[256..280].fill(7);
    lengths[280..].fill(8);
    lengths
}

/// Code lengths of the static distance code.
pub fn fixed_distance_lengths() -> [u8; DISTANCE_CODES] {
    [5; DISTANCE_CODES]
}
