//! Offset recovery for installers without a usable overlay header
//!
//! The start of the compressed data is first approximated from the shape of
//! the overlay (zero padding, an optional length-prefixed string, an
//! optional PKZIP signature) and then pinned down by trial decompression
//! until a stream whose trailing CRC matches is found.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use super::extractor::ExtractedFile;
use super::record::{Framing, RecordReader, read_record_to_vec};
use crate::compression::DeflateExpectation;
use crate::error::{Error, Result};
use crate::stream::{read_full, stream_len};

/// Bytes of overlay inspected by [`approximate`].
pub const APPROX_WINDOW: usize = 0xC000;

/// Width of the window checked for zero padding.
const PADDING_WINDOW: usize = 32;

/// Zero words needed in one window to count as padding.
const PADDING_MIN_ZERO_WORDS: usize = 4;

/// How far back from the candidate a PKZIP signature is looked for.
pub const SIGNATURE_LOOKBACK: usize = 128;

/// Candidate offsets tried on each side of the approximation.
pub const MAX_PROBE_DISTANCE: u64 = 256;

/// Forward reach of the search when nothing in the overlay anchored the
/// estimate.
pub const UNANCHORED_PROBE_DISTANCE: u64 = APPROX_WINDOW as u64;

const PKZIP_SIGNATURE: [u8; 4] = *b"PK\x03\x04";

/// First guess at where the compressed data starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApproximateOffset {
    /// Absolute offset.
    pub offset: u64,
    pub framing: Framing,
    /// Zero padding or a PKZIP signature was found. Without either the
    /// estimate is only the overlay start (or just past a leading string).
    pub anchored: bool,
}

/// Estimate the start of the compressed data from the overlay's layout.
///
/// # Errors
/// Returns [`Error::Io`] if the overlay cannot be read.
pub fn approximate<S: Read + Seek + ?Sized>(
    source: &mut S,
    overlay_offset: u64,
) -> Result<ApproximateOffset> {
    source.seek(SeekFrom::Start(overlay_offset))?;
    let mut buf = vec![0u8; APPROX_WINDOW];
    let n = read_full(source, &mut buf)?;
    buf.truncate(n);

    let approx = match approximate_in(&buf) {
        Candidate::Pkzip(pos) => ApproximateOffset {
            offset: overlay_offset + pos as u64,
            framing: Framing::Pkzip,
            anchored: true,
        },
        Candidate::Raw { pos, padded } => ApproximateOffset {
            offset: overlay_offset + pos as u64,
            framing: Framing::Raw,
            anchored: padded,
        },
    };
    tracing::debug!(
        "Approximated data start at {:#x} ({:?}, anchored: {})",
        approx.offset,
        approx.framing,
        approx.anchored
    );
    Ok(approx)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidate {
    Raw { pos: usize, padded: bool },
    Pkzip(usize),
}

fn word_at(buf: &[u8], pos: usize) -> Option<u32> {
    buf.get(pos..pos + 4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
}

fn approximate_in(buf: &[u8]) -> Candidate {
    let mut pos = 0;
    let padding = padding_boundary(buf);
    if let Some(boundary) = padding {
        pos = boundary;
        while word_at(buf, pos) == Some(0) {
            pos += 4;
        }
    }

    if let Some(len) = pascal_string_len(buf, pos) {
        pos += 1 + len;
    }

    let lookback = pos.saturating_sub(SIGNATURE_LOOKBACK);
    (lookback..=pos)
        .rev()
        .find(|&p| buf.get(p..p + 4) == Some(&PKZIP_SIGNATURE[..]))
        .map_or(
            Candidate::Raw {
                pos,
                padded: padding.is_some(),
            },
            Candidate::Pkzip,
        )
}

/// Scan backward for the last window that looks like zero padding.
fn padding_boundary(buf: &[u8]) -> Option<usize> {
    if buf.len() < PADDING_WINDOW {
        return None;
    }
    let mut pos = (buf.len() - PADDING_WINDOW) & !3;
    loop {
        let zero_words = buf[pos..pos + PADDING_WINDOW]
            .chunks_exact(4)
            .filter(|w| w.iter().all(|&b| b == 0))
            .count();
        if zero_words >= PADDING_MIN_ZERO_WORDS {
            return Some(pos);
        }
        if pos < 4 {
            return None;
        }
        pos -= 4;
    }
}

/// Length of a short length-prefixed string at `pos`, if one is there.
///
/// Compressed data sets the high bit in about half its bytes, text rarely
/// does.
fn pascal_string_len(buf: &[u8], pos: usize) -> Option<usize> {
    let len = usize::from(*buf.get(pos)?);
    if len == 0 {
        return None;
    }
    let body = buf.get(pos + 1..pos + 1 + len)?;
    let high = body.iter().filter(|&&b| b & 0x80 != 0).count();
    (high * 4 < len).then_some(len)
}

/// Find the exact start of the first raw record near `approx`.
///
/// Candidates are tried at `approx + 0 ..= 256`, then `approx - 1 ..= 256`,
/// each by full decompression with the CRC taken from the four bytes right
/// after the consumed input.
///
/// # Errors
/// Returns [`Error::NoInstallerData`] if no candidate verifies.
pub fn find_real<S: Read + Seek + ?Sized>(source: &mut S, approx: u64) -> Result<u64> {
    find_real_within(source, approx, MAX_PROBE_DISTANCE)
}

/// Like [`find_real`], but after the window on both sides has been tried the
/// forward search carries on up to `approx + reach`.
///
/// # Errors
/// Returns [`Error::NoInstallerData`] if no candidate verifies.
pub fn find_real_within<S: Read + Seek + ?Sized>(
    source: &mut S,
    approx: u64,
    reach: u64,
) -> Result<u64> {
    let len = stream_len(source)?;
    let reader = RecordReader::raw().strict();
    let expectation = DeflateExpectation::unknown();

    let near = MAX_PROBE_DISTANCE.min(reach);
    let forward = (0..=near).map_while(|d| approx.checked_add(d));
    let backward = (1..=MAX_PROBE_DISTANCE).map_while(|d| approx.checked_sub(d));
    let far = (near + 1..=reach).map_while(|d| approx.checked_add(d));

    for offset in forward.chain(backward).chain(far) {
        if offset >= len {
            continue;
        }
        let outcome = reader.read(source, offset, &expectation, &mut io::sink())?;
        if outcome.status.is_good() {
            tracing::debug!("Verified data start at {offset:#x} (approx {approx:#x})");
            return Ok(offset);
        }
    }

    Err(Error::NoInstallerData)
}

/// Locate the data by approximation and trial decompression.
///
/// # Errors
/// Returns [`Error::NoInstallerData`] if nothing near the estimate verifies.
pub fn locate_data<S: Read + Seek + ?Sized>(
    source: &mut S,
    overlay_offset: u64,
) -> Result<ApproximateOffset> {
    let approx = approximate(source, overlay_offset)?;
    if approx.framing == Framing::Pkzip {
        return Ok(approx);
    }
    let reach = if approx.anchored {
        MAX_PROBE_DISTANCE
    } else {
        UNANCHORED_PROBE_DISTANCE
    };
    Ok(ApproximateOffset {
        offset: find_real_within(source, approx.offset, reach)?,
        ..approx
    })
}

/// Extract consecutive records from `start` as `WISE0000`, `WISE0001`, ...
/// until the stream ends or a record fails to verify.
///
/// # Errors
/// Returns [`Error::NoInstallerData`] if not even the first record verifies,
/// or [`Error::Io`] on read or write failure.
pub fn extract_sequential<S, F>(
    source: &mut S,
    start: ApproximateOffset,
    output_dir: &Path,
    mut on_file: F,
) -> Result<Vec<ExtractedFile>>
where
    S: Read + Seek + ?Sized,
    F: FnMut(usize, &str),
{
    fs::create_dir_all(output_dir)?;
    let len = stream_len(source)?;
    let reader = RecordReader::new(start.framing);
    let expectation = DeflateExpectation::unknown();

    let mut files = Vec::new();
    let mut cursor = start.offset;
    while cursor < len {
        let (outcome, data) = read_record_to_vec(&reader, source, cursor, &expectation)?;
        let Some(data) = data else {
            tracing::debug!("Stopping at {cursor:#x}: {}", outcome.status);
            break;
        };

        let name = format!("WISE{:04X}", files.len());
        on_file(files.len(), &name);
        let path = output_dir.join(&name);
        fs::write(&path, &data)?;
        tracing::info!("Extracted {name} ({} bytes)", data.len());

        files.push(ExtractedFile {
            name,
            path,
            size: data.len() as u64,
            crc32: outcome.crc32,
        });
        if outcome.next_offset <= cursor {
            break;
        }
        cursor = outcome.next_offset;
    }

    if files.is_empty() {
        return Err(Error::NoInstallerData);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use flate2::Compression;
    use flate2::write::DeflateEncoder;
    use tempfile::TempDir;

    use super::*;
    use crate::compression::crc;

    fn raw_record(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        let mut out = encoder.finish().unwrap();
        out.extend_from_slice(&crc::checksum(data).to_le_bytes());
        out
    }

    fn payload() -> Vec<u8> {
        (0..2000u32)
            .map(|i| format!("line {i}: setup data\n"))
            .collect::<String>()
            .into_bytes()
    }

    #[test]
    fn test_padding_then_data() {
        let mut buf = vec![0x90u8; 64];
        buf.extend_from_slice(&[0u8; 40]);
        let data_start = buf.len();
        buf.extend(raw_record(&payload()));
        assert_eq!(
            approximate_in(&buf),
            Candidate::Raw {
                pos: data_start,
                padded: true
            }
        );
    }

    #[test]
    fn test_pascal_string_is_skipped() {
        let mut buf = vec![0u8; 48];
        buf.push(5);
        buf.extend_from_slice(b"Setup");
        let data_start = buf.len();
        buf.extend(raw_record(&payload()));
        assert_eq!(
            approximate_in(&buf),
            Candidate::Raw {
                pos: data_start,
                padded: true
            }
        );
    }

    #[test]
    fn test_pkzip_signature_found_behind_candidate() {
        let mut buf = vec![0u8; 48];
        let sig_at = buf.len();
        buf.extend_from_slice(&PKZIP_SIGNATURE);
        buf.extend_from_slice(&[0x14, 0x00, 0x00, 0x00, 0x08, 0x00]);
        buf.extend(raw_record(&payload()));
        assert_eq!(approximate_in(&buf), Candidate::Pkzip(sig_at));
    }

    #[test]
    fn test_find_real_forward_and_backward() {
        let mut bytes = vec![0x33u8; 100];
        bytes.extend(raw_record(&payload()));

        let mut source = Cursor::new(bytes);
        assert_eq!(find_real(&mut source, 40).unwrap(), 100);
        assert_eq!(find_real(&mut source, 180).unwrap(), 100);
    }

    #[test]
    fn test_unpadded_filler_is_searched_past_the_window() {
        let record = raw_record(&payload());
        for (filler, len) in [(0x33u8, 309usize), (0x7E, 0), (0x41, 512), (0xC5, 777)] {
            let mut bytes = vec![filler; len];
            bytes.extend(&record);
            let mut source = Cursor::new(bytes);

            let approx = approximate(&mut source, 0).unwrap();
            assert!(!approx.anchored, "filler {filler:#x}");
            let found = locate_data(&mut source, 0).unwrap();
            assert_eq!(found.offset, len as u64, "filler {filler:#x} x {len}");
        }
    }

    #[test]
    fn test_padding_keeps_the_narrow_window() {
        let mut bytes = vec![0u8; 64];
        bytes.extend(raw_record(&payload()));
        let mut source = Cursor::new(bytes);
        let approx = approximate(&mut source, 0).unwrap();
        assert!(approx.anchored);
        assert_eq!(approx.offset, 64);
    }

    #[test]
    fn test_find_real_gives_up() {
        let mut source = Cursor::new(vec![0x33u8; 600]);
        assert!(matches!(find_real(&mut source, 0), Err(Error::NoInstallerData)));
    }

    #[test]
    fn test_sequential_extraction() {
        let first = payload();
        let second = b"second file".repeat(30);
        let mut bytes = vec![0u8; 64];
        bytes.extend(raw_record(&first));
        bytes.extend(raw_record(&second));
        bytes.extend_from_slice(&[0xFF; 8]);

        let mut source = Cursor::new(bytes);
        let start = locate_data(&mut source, 0).unwrap();
        assert_eq!(start.offset, 64);

        let dir = TempDir::new().unwrap();
        let files = extract_sequential(&mut source, start, dir.path(), |_, _| {}).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["WISE0000", "WISE0001"]);
        assert_eq!(fs::read(dir.path().join("WISE0001")).unwrap(), second);
    }
}
