//! PKZIP local file header wrapping
//!
//! Some installers wrap every deflate stream in a ZIP local file header
//! instead of the raw `[stream][crc]` framing. Only the header is parsed;
//! the stream itself still goes through the crate's own inflater.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};

/// `PK\x03\x04`
pub const LOCAL_HEADER_SIGNATURE: u32 = 0x04034B50;

/// `PK\x07\x08`
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074B50;

/// Fixed part of a local file header, excluding name and extra field.
pub const LOCAL_HEADER_LEN: u64 = 30;

/// General purpose flag: CRC and sizes follow the data.
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub version: u16,
    pub flags: u16,
    pub method: u16,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name: Vec<u8>,
    pub extra: Vec<u8>,
}

impl LocalFileHeader {
    /// Read a header, including its variable-length name and extra field.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPkzipSignature`] if the signature is wrong, or
    /// [`Error::Io`] if the header is truncated.
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let signature = reader.read_u32::<LittleEndian>()?;
        if signature != LOCAL_HEADER_SIGNATURE {
            return Err(Error::InvalidPkzipSignature(signature));
        }

        let version = reader.read_u16::<LittleEndian>()?;
        let flags = reader.read_u16::<LittleEndian>()?;
        let method = reader.read_u16::<LittleEndian>()?;
        let mod_time = reader.read_u16::<LittleEndian>()?;
        let mod_date = reader.read_u16::<LittleEndian>()?;
        let crc32 = reader.read_u32::<LittleEndian>()?;
        let compressed_size = reader.read_u32::<LittleEndian>()?;
        let uncompressed_size = reader.read_u32::<LittleEndian>()?;
        let name_len = reader.read_u16::<LittleEndian>()?;
        let extra_len = reader.read_u16::<LittleEndian>()?;

        let mut file_name = vec![0u8; usize::from(name_len)];
        reader.read_exact(&mut file_name)?;
        let mut extra = vec![0u8; usize::from(extra_len)];
        reader.read_exact(&mut extra)?;

        Ok(Self {
            version,
            flags,
            method,
            mod_time,
            mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            file_name,
            extra,
        })
    }

    /// Bytes occupied by the header in the stream.
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        LOCAL_HEADER_LEN + self.file_name.len() as u64 + self.extra.len() as u64
    }

    /// True when CRC and sizes are carried by a trailing data descriptor.
    #[must_use]
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    #[must_use]
    pub fn file_name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.file_name).into_owned()
    }
}

/// Read a data descriptor and return `(crc32, encoded_len)`.
///
/// The leading signature is optional in the wild.
///
/// # Errors
/// Returns [`Error::Io`] if the descriptor is truncated.
pub fn read_data_descriptor<R: Read + ?Sized>(reader: &mut R) -> Result<(u32, u64)> {
    let first = reader.read_u32::<LittleEndian>()?;
    let (crc32, signature_len) = if first == DATA_DESCRIPTOR_SIGNATURE {
        (reader.read_u32::<LittleEndian>()?, 4)
    } else {
        (first, 0)
    };
    let _compressed = reader.read_u32::<LittleEndian>()?;
    let _uncompressed = reader.read_u32::<LittleEndian>()?;
    Ok((crc32, signature_len + 12))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(flags: u16, crc32: u32, name: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&LOCAL_HEADER_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(&[0x00, 0x60, 0x21, 0x28]);
        out.extend_from_slice(&crc32.to_le_bytes());
        out.extend_from_slice(&100u32.to_le_bytes());
        out.extend_from_slice(&300u32.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&[0xAA, 0xBB]);
        out
    }

    #[test]
    fn test_read_local_header() {
        let bytes = header_bytes(0, 0x1234_5678, b"SETUP.EXE");
        let header = LocalFileHeader::read(&mut &bytes[..]).unwrap();
        assert_eq!(header.crc32, 0x1234_5678);
        assert_eq!(header.method, 8);
        assert_eq!(header.file_name_lossy(), "SETUP.EXE");
        assert_eq!(header.encoded_len(), bytes.len() as u64);
        assert!(!header.has_data_descriptor());
    }

    #[test]
    fn test_bad_signature() {
        let mut bytes = header_bytes(0, 0, b"X");
        bytes[0] = b'Q';
        let result = LocalFileHeader::read(&mut &bytes[..]);
        assert!(matches!(result, Err(Error::InvalidPkzipSignature(_))));
    }

    #[test]
    fn test_data_descriptor_with_and_without_signature() {
        let mut signed = DATA_DESCRIPTOR_SIGNATURE.to_le_bytes().to_vec();
        signed.extend_from_slice(&0xCAFE_F00Du32.to_le_bytes());
        signed.extend_from_slice(&[0u8; 8]);
        assert_eq!(read_data_descriptor(&mut &signed[..]).unwrap(), (0xCAFE_F00D, 16));

        let unsigned = signed[4..].to_vec();
        assert_eq!(read_data_descriptor(&mut &unsigned[..]).unwrap(), (0xCAFE_F00D, 12));
    }
}
