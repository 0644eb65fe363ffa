//! Seekable byte sources
//!
//! Everything downstream works on a `Read + Seek` value. A plain `File` or
//! `Cursor` serves single-file installers; [`SpannedSource`] stitches
//! disk-spanning volumes into one logical stream.

mod spanned;

pub use spanned::{SpannedSource, volume_candidates};

use std::io::{self, Read, Seek, SeekFrom};

/// Trait for types that can Read and Seek
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Total length of a seekable source, leaving its cursor where it was.
pub fn stream_len<S: Seek + ?Sized>(source: &mut S) -> io::Result<u64> {
    let pos = source.stream_position()?;
    let len = source.seek(SeekFrom::End(0))?;
    if pos != len {
        source.seek(SeekFrom::Start(pos))?;
    }
    Ok(len)
}

/// Read up to `buf.len()` bytes, stopping early only at end-of-data.
pub fn read_full<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
