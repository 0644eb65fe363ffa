//! Bounded reader over the decoded script blob

use std::io::{self, Cursor};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};

/// Longest string accepted before the blob is considered corrupt.
pub const MAX_STRING_LEN: usize = 0x1_0000;

/// Reads little-endian fields and NUL-terminated strings, reporting running
/// out of data as [`Error::ScriptTruncated`] at the offending offset.
#[derive(Debug, Clone)]
pub struct ScriptCursor<'a> {
    inner: Cursor<&'a [u8]>,
}

impl<'a> ScriptCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: Cursor::new(data),
        }
    }

    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    pub fn set_position(&mut self, position: u64) {
        self.inner.set_position(position);
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining().is_empty()
    }

    /// Unread bytes.
    pub fn remaining(&self) -> &'a [u8] {
        let data: &'a [u8] = *self.inner.get_ref();
        let pos = usize::try_from(self.inner.position()).unwrap_or(usize::MAX);
        data.get(pos..).unwrap_or(&[])
    }

    fn truncated(&self) -> Error {
        Error::ScriptTruncated {
            offset: self.position(),
        }
    }

    /// Run a fixed-size read, rewinding and reporting truncation at the
    /// field's start if it fails.
    fn read_with<T>(
        &mut self,
        read: impl FnOnce(&mut Cursor<&'a [u8]>) -> io::Result<T>,
    ) -> Result<T> {
        let start = self.position();
        read(&mut self.inner).map_err(|_| {
            self.inner.set_position(start);
            Error::ScriptTruncated { offset: start }
        })
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.remaining().first().copied()
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_with(|c| c.read_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_with(|c| c.read_u16::<LittleEndian>())
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_with(|c| c.read_u32::<LittleEndian>())
    }

    pub fn read_bytes<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self
            .remaining()
            .get(..N)
            .ok_or_else(|| self.truncated())?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.skip(N);
        Ok(out)
    }

    pub fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let bytes = self
            .remaining()
            .get(..len)
            .ok_or_else(|| self.truncated())?
            .to_vec();
        self.skip(len);
        Ok(bytes)
    }

    /// Read a NUL-terminated string. Bytes are taken as Latin-1 so that
    /// every code page the installer may have used survives unchanged.
    pub fn read_string(&mut self) -> Result<String> {
        let rest = self.remaining();
        let end = rest
            .iter()
            .take(MAX_STRING_LEN)
            .position(|&b| b == 0)
            .ok_or_else(|| self.truncated())?;
        let text = rest[..end].iter().map(|&b| char::from(b)).collect();
        self.skip(end + 1);
        Ok(text)
    }

    pub fn read_strings(&mut self, count: usize) -> Result<Vec<String>> {
        (0..count).map(|_| self.read_string()).collect()
    }

    fn skip(&mut self, n: usize) {
        let pos = self.inner.position() + n as u64;
        self.inner.set_position(pos);
    }
}
