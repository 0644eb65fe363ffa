//! Error types for `WiseUnpacker`

use std::path::PathBuf;

use thiserror::Error;

use crate::compression::{ExtractionStatus, InflateError};
use crate::container::ArchiveKind;

/// The error type for `WiseUnpacker` operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    // ==================== IO Errors ====================
    /// IO error from file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A spanned volume named explicitly could not be found on disk.
    #[error("volume not found: {path}")]
    VolumeMissing {
        /// The expected path to the volume.
        path: PathBuf,
    },

    // ==================== Container Errors ====================
    /// The file is not an MS-DOS/NE/PE executable (missing MZ magic).
    #[error("not an executable: missing MZ signature")]
    NotAnExecutable,

    /// The executable headers are present but describe an impossible image.
    #[error("invalid executable: {message}")]
    InvalidExecutable {
        /// Description of what is invalid.
        message: String,
    },

    /// The overlay holds a foreign archive format that must be handed off.
    #[error("overlay contains an embedded {kind} archive")]
    EmbeddedArchive {
        /// The detected archive kind.
        kind: ArchiveKind,
    },

    // ==================== Overlay Errors ====================
    /// The overlay header fields are out of range for this stream.
    #[error("invalid overlay header: {message}")]
    InvalidOverlayHeader {
        /// Description of what is invalid.
        message: String,
    },

    /// A record's declared extent lies outside the stream.
    #[error("record at {offset} with {size} bytes exceeds stream length {len}")]
    RecordOutOfRange {
        /// Absolute start offset of the record.
        offset: u64,
        /// Declared input size.
        size: u64,
        /// Total stream length.
        len: u64,
    },

    /// No offset near the approximation produced a CRC-verified record.
    #[error("no installer data found")]
    NoInstallerData,

    /// A positional item of the extraction sequence could not be recovered.
    #[error("extraction of {name} failed: {status}")]
    ExtractionFailed {
        /// Output name of the item.
        name: String,
        /// Final status of the attempt.
        status: ExtractionStatus,
        /// What went wrong with the record, when known.
        #[source]
        source: Option<Box<Error>>,
    },

    // ==================== Decompression Errors ====================
    /// The DEFLATE bitstream is malformed or truncated.
    #[error("inflate failed: {0}")]
    Inflate(#[from] InflateError),

    /// The decoded data does not match its recorded CRC-32.
    #[error("CRC mismatch: expected {expected:08x}, computed {actual:08x}")]
    CrcMismatch {
        /// CRC recorded next to (or declared for) the data.
        expected: u32,
        /// CRC of the decoded output.
        actual: u32,
    },

    /// The decoder produced a different number of bytes than declared.
    #[error("size mismatch: expected {expected} bytes, decoded {actual}")]
    SizeMismatch {
        /// Declared inflated size.
        expected: u64,
        /// Bytes actually produced.
        actual: u64,
    },

    /// The PKZIP local file header signature is missing.
    #[error("invalid PKZIP local header signature: {0:08x}")]
    InvalidPkzipSignature(u32),

    // ==================== Script Errors ====================
    /// The script header does not match any known layout.
    #[error("invalid script header: {message}")]
    InvalidScriptHeader {
        /// Description of what is invalid.
        message: String,
    },

    /// An opcode byte outside the known table was encountered.
    #[error("unknown opcode 0x{opcode:02x} at offset {offset}")]
    UnknownOpcode {
        /// The opcode byte.
        opcode: u8,
        /// Offset within the script blob.
        offset: u64,
    },

    /// The script ended inside a state payload.
    #[error("script truncated at offset {offset}")]
    ScriptTruncated {
        /// Offset within the script blob where data ran out.
        offset: u64,
    },

    /// Both script parse strategies failed.
    #[error("script could not be parsed: {first}; retry: {second}")]
    ScriptUnparseable {
        /// Error of the first strategy.
        first: Box<Error>,
        /// Error of the retry strategy.
        second: Box<Error>,
    },

    /// A state's payload variant does not belong to its opcode.
    #[error("state {index} has a payload that does not match opcode {opcode}")]
    PayloadMismatch {
        /// Position of the state in the machine.
        index: usize,
        /// Name of the opcode.
        opcode: String,
    },
}

/// A specialized Result type for `WiseUnpacker` operations.
pub type Result<T> = std::result::Result<T, Error>;
