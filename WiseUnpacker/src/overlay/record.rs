//! Single record extraction
//!
//! A record is one deflate stream plus the CRC that vouches for it. Raw
//! records are laid out as `[stream][crc32 LE]`; PKZIP records carry a local
//! file header in front and take the CRC from it (or from the data
//! descriptor that follows the stream).

use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt};

use super::pkzip::{self, LocalFileHeader};
use crate::compression::{DeflateExpectation, ExtractionStatus, InflateError, inflate_limited};
use crate::error::{Error, Result};
use crate::stream::stream_len;

/// Size of the CRC stored after a raw stream.
pub const TRAILER_LEN: u64 = 4;

/// How far on either side of the expected trailer position a CRC is looked
/// for before a record is declared failed.
pub const DEFAULT_TRAILER_SCAN: u64 = 4;

/// How a record is wrapped around its deflate stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `[stream][crc32]`
    Raw,
    /// `[local file header][stream][optional data descriptor]`
    Pkzip,
}

/// Result of reading one record.
#[derive(Debug)]
pub struct RecordOutcome {
    pub status: ExtractionStatus,
    /// Absolute offset of the first byte of the deflate stream.
    pub data_start: u64,
    /// Deflate bytes consumed by the decoder.
    pub consumed: u64,
    /// Bytes written to the sink.
    pub produced: u64,
    /// CRC-32 of the decoded bytes.
    pub crc32: u32,
    /// Where the next record starts. The source is left positioned here.
    pub next_offset: u64,
    /// Why the record is not good: [`Error::RecordOutOfRange`],
    /// [`Error::Inflate`], [`Error::SizeMismatch`], [`Error::CrcMismatch`] or
    /// a broken PKZIP header.
    pub failure: Option<Error>,
}

impl RecordOutcome {
    fn rejected(status: ExtractionStatus, start: u64, failure: Error) -> Self {
        Self {
            status,
            data_start: start,
            consumed: 0,
            produced: 0,
            crc32: 0,
            next_offset: start,
            failure: Some(failure),
        }
    }

    /// The error reported when the item `name` could not be recovered.
    #[must_use]
    pub fn into_error(self, name: impl Into<String>) -> Error {
        Error::ExtractionFailed {
            name: name.into(),
            status: self.status,
            source: self.failure.map(Box::new),
        }
    }
}

/// Reads records of one framing from a seekable source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordReader {
    pub framing: Framing,
    /// Bytes to search around the trailer after a CRC mismatch (`0` = none).
    pub trailer_scan: u64,
}

impl RecordReader {
    #[must_use]
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            trailer_scan: DEFAULT_TRAILER_SCAN,
        }
    }

    #[must_use]
    pub fn raw() -> Self {
        Self::new(Framing::Raw)
    }

    #[must_use]
    pub fn for_pkzip_flag(pkzip: bool) -> Self {
        Self::new(if pkzip { Framing::Pkzip } else { Framing::Raw })
    }

    /// Only accept the CRC at the exact trailer position.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.trailer_scan = 0;
        self
    }

    /// Decode the record at `start` into `sink`.
    ///
    /// Decoder failures and CRC mismatches are reported through
    /// [`RecordOutcome::status`]. The sink may already hold partial output
    /// when the status is not [`ExtractionStatus::Good`], so callers decode
    /// into a scratch buffer before committing anything to disk.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the source or sink fails.
    pub fn read<S, W>(
        &self,
        source: &mut S,
        start: u64,
        expectation: &DeflateExpectation,
        sink: &mut W,
    ) -> Result<RecordOutcome>
    where
        S: Read + Seek + ?Sized,
        W: Write + ?Sized,
    {
        let len = stream_len(source)?;
        if start >= len || expectation.check(len - start) != ExtractionStatus::Good {
            tracing::debug!("Record at {start:#x} does not fit in {len} bytes");
            let failure = Error::RecordOutOfRange {
                offset: start,
                size: expectation.input_size.unwrap_or(0),
                len,
            };
            return Ok(RecordOutcome::rejected(ExtractionStatus::Invalid, start, failure));
        }

        source.seek(SeekFrom::Start(start))?;
        let local_header = match self.framing {
            Framing::Raw => None,
            Framing::Pkzip => match LocalFileHeader::read(source) {
                Ok(header) => Some(header),
                Err(Error::Io(e)) if e.kind() != io::ErrorKind::UnexpectedEof => {
                    return Err(Error::Io(e));
                }
                Err(e) => {
                    tracing::debug!("No local file header at {start:#x}: {e}");
                    return Ok(RecordOutcome::rejected(ExtractionStatus::Fail, start, e));
                }
            },
        };
        let data_start = start + local_header.as_ref().map_or(0, LocalFileHeader::encoded_len);

        let limit = match (self.framing, expectation.input_size) {
            (Framing::Raw, Some(size)) => size,
            _ => len.saturating_sub(data_start),
        };

        let mut counting = CountingWriter::new(sink);
        let decoded = {
            let mut input = BufReader::new((&mut *source).take(limit));
            inflate_limited(&mut input, &mut counting, expectation.output_size)
        };
        let stats = match decoded {
            Ok(stats) => stats,
            Err(InflateError::Io(e)) => return Err(Error::Io(e)),
            Err(e) => {
                tracing::debug!("Inflate failed for record at {start:#x}: {e}");
                let mut outcome =
                    RecordOutcome::rejected(ExtractionStatus::Fail, start, Error::Inflate(e));
                outcome.data_start = data_start;
                outcome.produced = counting.written;
                return Ok(outcome);
            }
        };

        let stream_end = data_start + stats.input_consumed;
        let mut outcome = RecordOutcome {
            status: ExtractionStatus::Fail,
            data_start,
            consumed: stats.input_consumed,
            produced: stats.output_produced,
            crc32: stats.crc32,
            next_offset: stream_end,
            failure: None,
        };

        if let Some(size) = expectation.output_size {
            if size != stats.output_produced {
                tracing::debug!(
                    "Record at {start:#x} produced {} bytes, expected {size}",
                    stats.output_produced
                );
                outcome.failure = Some(Error::SizeMismatch {
                    expected: size,
                    actual: stats.output_produced,
                });
                return Ok(outcome);
            }
        }

        match local_header {
            Some(header) => self.verify_pkzip(source, &header, expectation, &mut outcome)?,
            None => self.verify_raw(source, start, len, expectation, &mut outcome)?,
        }

        source.seek(SeekFrom::Start(outcome.next_offset))?;
        Ok(outcome)
    }

    fn verify_raw<S: Read + Seek + ?Sized>(
        &self,
        source: &mut S,
        start: u64,
        len: u64,
        expectation: &DeflateExpectation,
        outcome: &mut RecordOutcome,
    ) -> Result<()> {
        let stream_end = outcome.data_start + outcome.consumed;

        // Some encoders pad the stream by one byte before the trailer; the
        // declared size then exceeds the consumed count by exactly five.
        let padded = expectation
            .input_size
            .is_some_and(|size| outcome.consumed + TRAILER_LEN + 1 == size);
        let trailer_at = stream_end + u64::from(padded);

        let trailer_end = if expectation.crc32 != 0 {
            if expectation.crc32 == outcome.crc32 {
                Some(trailer_at + TRAILER_LEN)
            } else {
                tracing::debug!(
                    "Record at {start:#x}: CRC {:08x} does not match declared {:08x}",
                    outcome.crc32,
                    expectation.crc32
                );
                None
            }
        } else {
            self.find_trailer(source, trailer_at, len, outcome.crc32)?
        };

        if let Some(end) = trailer_end {
            outcome.status = ExtractionStatus::Good;
            outcome.next_offset = expectation.input_size.map_or(end, |size| start + size);
            return Ok(());
        }

        outcome.next_offset = trailer_at + TRAILER_LEN;
        outcome.failure = Some(if expectation.crc32 != 0 {
            Error::CrcMismatch {
                expected: expectation.crc32,
                actual: outcome.crc32,
            }
        } else if outcome.next_offset <= len {
            source.seek(SeekFrom::Start(trailer_at))?;
            Error::CrcMismatch {
                expected: source.read_u32::<LittleEndian>()?,
                actual: outcome.crc32,
            }
        } else {
            Error::RecordOutOfRange {
                offset: start,
                size: outcome.next_offset - start,
                len,
            }
        });
        Ok(())
    }

    /// Look for `crc` at `at`, then at nearby offsets up to the scan width.
    /// Returns the end of the matching trailer.
    fn find_trailer<S: Read + Seek + ?Sized>(
        &self,
        source: &mut S,
        at: u64,
        len: u64,
        crc: u32,
    ) -> Result<Option<u64>> {
        let scan = self.trailer_scan as i64;
        let candidates = std::iter::once(0).chain((1..=scan).flat_map(|d| [-d, d]));

        for delta in candidates {
            let Some(pos) = at.checked_add_signed(delta) else {
                continue;
            };
            if pos + TRAILER_LEN > len {
                continue;
            }
            source.seek(SeekFrom::Start(pos))?;
            if source.read_u32::<LittleEndian>()? == crc {
                if delta != 0 {
                    tracing::debug!("CRC trailer found {delta} bytes from {at:#x}");
                }
                return Ok(Some(pos + TRAILER_LEN));
            }
        }
        Ok(None)
    }

    fn verify_pkzip<S: Read + Seek + ?Sized>(
        &self,
        source: &mut S,
        header: &LocalFileHeader,
        expectation: &DeflateExpectation,
        outcome: &mut RecordOutcome,
    ) -> Result<()> {
        let stream_end = outcome.data_start + outcome.consumed;
        let (recorded, end) = if header.has_data_descriptor() {
            source.seek(SeekFrom::Start(stream_end))?;
            match pkzip::read_data_descriptor(source) {
                Ok((crc, descriptor_len)) => (crc, stream_end + descriptor_len),
                Err(Error::Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    tracing::debug!("Data descriptor after {stream_end:#x} is truncated");
                    outcome.failure = Some(Error::Io(e));
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        } else {
            (header.crc32, stream_end)
        };

        let expected = if expectation.crc32 != 0 {
            expectation.crc32
        } else {
            recorded
        };
        outcome.next_offset = end;
        if expected == outcome.crc32 {
            outcome.status = ExtractionStatus::Good;
        } else {
            tracing::debug!(
                "{}: CRC {:08x} does not match recorded {expected:08x}",
                header.file_name_lossy(),
                outcome.crc32
            );
            outcome.failure = Some(Error::CrcMismatch {
                expected,
                actual: outcome.crc32,
            });
        }
        Ok(())
    }
}

/// Decode the record at `start` into memory, returning the bytes only when
/// the outcome is good.
///
/// # Errors
/// Returns [`Error::Io`] if the source fails.
pub fn read_record_to_vec<S: Read + Seek + ?Sized>(
    reader: &RecordReader,
    source: &mut S,
    start: u64,
    expectation: &DeflateExpectation,
) -> Result<(RecordOutcome, Option<Vec<u8>>)> {
    let capacity = expectation
        .output_size
        .and_then(|size| usize::try_from(size).ok())
        .unwrap_or(0);
    let mut data = Vec::with_capacity(capacity);
    let outcome = reader.read(source, start, expectation, &mut data)?;
    let data = outcome.status.is_good().then_some(data);
    Ok((outcome, data))
}

struct CountingWriter<'a, W: ?Sized> {
    inner: &'a mut W,
    written: u64,
}

impl<'a, W: Write + ?Sized> CountingWriter<'a, W> {
    fn new(inner: &'a mut W) -> Self {
        Self { inner, written: 0 }
    }
}

impl<W: Write + ?Sized> Write for CountingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
