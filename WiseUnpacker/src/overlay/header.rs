//! Overlay header
//!
//! The overlay begins with a header describing the payload files bundled
//! with the installer: the compiled script, the runtime DLLs, the dialog
//! bitmap and a few opaque blobs. The header is variable-length: the DLL
//! name is optional, two trailing fields only exist in newer builds, and an
//! initialization text closes it.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::compression::{DeflateExpectation, ExtractionStatus};
use crate::error::{Error, Result};
use crate::stream::stream_len;

/// Flag bit marking records that are wrapped in PKZIP local headers.
pub const FLAG_PKZIP: u32 = 0x0000_0100;

/// Little-endian spelling of the byte order marker.
const ENDIANNESS_MARKER_LE: u16 = 0x1234;
/// Byte-swapped spelling of the byte order marker.
const ENDIANNESS_MARKER_BE: u16 = 0x3412;

/// Size of the opaque graphics block.
pub const GRAPHICS_DATA_LEN: usize = 12;

/// `u32` fields between the graphics block and the optional tail.
const FIXED_FIELD_COUNT: u64 = 18;

/// Marker found in the header of newer installer builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    fn from_marker(marker: u16) -> Option<Self> {
        match marker {
            ENDIANNESS_MARKER_LE => Some(Self::Little),
            ENDIANNESS_MARKER_BE => Some(Self::Big),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayHeader {
    /// Absolute offset the header was read from.
    pub offset: u64,
    /// Name of the runtime DLL, if the installer declares one.
    pub dll_name: Option<Vec<u8>>,
    pub dll_size: Option<u32>,
    pub flags: u32,
    pub graphics_data: [u8; GRAPHICS_DATA_LEN],
    pub wise_script_exit_event_offset: u32,
    pub wise_script_cancel_event_offset: u32,
    pub wise_script_inflated_size: u32,
    pub wise_script_deflated_size: u32,
    pub wise_dll_deflated_size: u32,
    pub ctl3d32_deflated_size: u32,
    pub some_data4_deflated_size: u32,
    pub regtool_deflated_size: u32,
    pub progress_dll_deflated_size: u32,
    pub some_data7_deflated_size: u32,
    pub some_data8_deflated_size: u32,
    pub some_data9_deflated_size: u32,
    pub some_data10_deflated_size: u32,
    pub final_file_deflated_size: u32,
    pub final_file_inflated_size: u32,
    pub eof: u32,
    pub dib_deflated_size: u32,
    pub dib_inflated_size: u32,
    pub install_script_deflated_size: Option<u32>,
    pub character_set: Option<u32>,
    pub endianness: Option<Endianness>,
    pub init_text: Vec<u8>,
}

/// Output name of the compiled script item.
pub const SCRIPT_ITEM: &str = "WiseScript.bin";

/// One positional item of the header-defined extraction sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderItem {
    pub name: &'static str,
    pub expectation: DeflateExpectation,
}

impl OverlayHeader {
    /// Parse the header starting at `offset`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidOverlayHeader`] if the header runs past the end
    /// of the stream, or [`Error::Io`] on read failure.
    pub fn parse<S: Read + Seek + ?Sized>(source: &mut S, offset: u64) -> Result<Self> {
        source.seek(SeekFrom::Start(offset))?;
        Self::read_fields(source, offset).map_err(|e| match e {
            Error::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                Error::InvalidOverlayHeader {
                    message: format!("header at {offset:#x} is truncated"),
                }
            }
            other => other,
        })
    }

    fn read_fields<S: Read + Seek + ?Sized>(source: &mut S, offset: u64) -> Result<Self> {
        let dll_name_len = source.read_u8()?;
        let (dll_name, dll_size) = if dll_name_len > 0 {
            let mut name = vec![0u8; usize::from(dll_name_len)];
            source.read_exact(&mut name)?;
            (Some(name), Some(source.read_u32::<LittleEndian>()?))
        } else {
            (None, None)
        };

        let flags = source.read_u32::<LittleEndian>()?;
        let mut graphics_data = [0u8; GRAPHICS_DATA_LEN];
        source.read_exact(&mut graphics_data)?;

        let mut fields = [0u32; FIXED_FIELD_COUNT as usize];
        source.read_u32_into::<LittleEndian>(&mut fields)?;
        let [
            wise_script_exit_event_offset,
            wise_script_cancel_event_offset,
            wise_script_inflated_size,
            wise_script_deflated_size,
            wise_dll_deflated_size,
            ctl3d32_deflated_size,
            some_data4_deflated_size,
            regtool_deflated_size,
            progress_dll_deflated_size,
            some_data7_deflated_size,
            some_data8_deflated_size,
            some_data9_deflated_size,
            some_data10_deflated_size,
            final_file_deflated_size,
            final_file_inflated_size,
            eof,
            dib_deflated_size,
            dib_inflated_size,
        ] = fields;

        // Newer builds append the install script size and character set,
        // followed by a byte order marker. Older ones go straight to the
        // init text, so the marker is probed before each optional field.
        let mut install_script_deflated_size = None;
        let mut character_set = None;
        let mut endianness = peek_endianness(source)?;
        if endianness.is_none() {
            install_script_deflated_size = Some(source.read_u32::<LittleEndian>()?);
            endianness = peek_endianness(source)?;
            if endianness.is_none() {
                character_set = Some(source.read_u32::<LittleEndian>()?);
                endianness = peek_endianness(source)?;
            }
        }
        if endianness.is_none() {
            // Neither optional field was followed by a marker, so they were
            // really the start of the init text.
            let rewind = 4 * (u64::from(install_script_deflated_size.is_some())
                + u64::from(character_set.is_some()));
            source.seek(SeekFrom::Current(-(rewind as i64)))?;
            install_script_deflated_size = None;
            character_set = None;
        }

        let init_text_len = source.read_u8()?;
        let mut init_text = vec![0u8; usize::from(init_text_len)];
        source.read_exact(&mut init_text)?;

        let header = Self {
            offset,
            dll_name,
            dll_size,
            flags,
            graphics_data,
            wise_script_exit_event_offset,
            wise_script_cancel_event_offset,
            wise_script_inflated_size,
            wise_script_deflated_size,
            wise_dll_deflated_size,
            ctl3d32_deflated_size,
            some_data4_deflated_size,
            regtool_deflated_size,
            progress_dll_deflated_size,
            some_data7_deflated_size,
            some_data8_deflated_size,
            some_data9_deflated_size,
            some_data10_deflated_size,
            final_file_deflated_size,
            final_file_inflated_size,
            eof,
            dib_deflated_size,
            dib_inflated_size,
            install_script_deflated_size,
            character_set,
            endianness,
            init_text,
        };
        tracing::debug!(
            "Overlay header at {offset:#x}: {} bytes, script {}/{} bytes",
            header.encoded_len(),
            header.wise_script_deflated_size,
            header.wise_script_inflated_size
        );
        Ok(header)
    }

    /// Bytes occupied by the header, derived from the fields present.
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        let dll = self
            .dll_name
            .as_ref()
            .map_or(0, |name| name.len() as u64 + 4);
        let optional = 4 * (u64::from(self.install_script_deflated_size.is_some())
            + u64::from(self.character_set.is_some()))
            + 2 * u64::from(self.endianness.is_some());

        1 + dll
            + 4
            + GRAPHICS_DATA_LEN as u64
            + 4 * FIXED_FIELD_COUNT
            + optional
            + 1
            + self.init_text.len() as u64
    }

    /// Absolute offset of the first compressed item.
    #[must_use]
    pub fn compressed_data_offset(&self) -> u64 {
        self.offset + self.encoded_len()
    }

    #[must_use]
    pub fn is_pkzip(&self) -> bool {
        self.flags & FLAG_PKZIP != 0
    }

    #[must_use]
    pub fn dll_name_lossy(&self) -> Option<String> {
        self.dll_name
            .as_ref()
            .map(|name| String::from_utf8_lossy(name).into_owned())
    }

    #[must_use]
    pub fn init_text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.init_text).into_owned()
    }

    /// The extraction sequence in its fixed positional order.
    ///
    /// Items with a declared size of zero are present but skipped by the
    /// extractor.
    #[must_use]
    pub fn items(&self) -> Vec<HeaderItem> {
        let item = |name, deflated: u32, inflated: u32| HeaderItem {
            name,
            expectation: DeflateExpectation::from_sizes(deflated, inflated),
        };
        vec![
            item("WiseColors.dib", self.dib_deflated_size, self.dib_inflated_size),
            item(
                SCRIPT_ITEM,
                self.wise_script_deflated_size,
                self.wise_script_inflated_size,
            ),
            item("WISE0001.DLL", self.wise_dll_deflated_size, 0),
            item("CTL3D32.DLL", self.ctl3d32_deflated_size, 0),
            item("FILE0004", self.some_data4_deflated_size, 0),
            item("Ocxreg32.EXE", self.regtool_deflated_size, 0),
            item("PROGRESS.DLL", self.progress_dll_deflated_size, 0),
            item("FILE0007", self.some_data7_deflated_size, 0),
            item("FILE0008", self.some_data8_deflated_size, 0),
            item("FILE0009", self.some_data9_deflated_size, 0),
            item("FILE000A", self.some_data10_deflated_size, 0),
            item("INSTALL_SCRIPT", self.install_script_deflated_size.unwrap_or(0), 0),
            item(
                "FILE000C.DAT",
                self.final_file_deflated_size,
                self.final_file_inflated_size,
            ),
        ]
    }

    /// Check the header against the stream it came from.
    ///
    /// A header is [`ExtractionStatus::Invalid`] when it declares no script or
    /// declares items that cannot fit in the stream. Callers fall back to
    /// offset recovery in that case.
    #[must_use]
    pub fn validate(&self, stream_len: u64) -> ExtractionStatus {
        if self.wise_script_deflated_size == 0 {
            return ExtractionStatus::Invalid;
        }
        let data_offset = self.compressed_data_offset();
        if data_offset > stream_len {
            return ExtractionStatus::Invalid;
        }
        let remaining = stream_len - data_offset;
        let total: u64 = self
            .items()
            .iter()
            .filter_map(|item| item.expectation.input_size)
            .sum();
        if total > remaining {
            return ExtractionStatus::Invalid;
        }
        ExtractionStatus::Good
    }

    /// Parse the header at `offset` and keep it only if it validates.
    ///
    /// # Errors
    /// Returns [`Error::Io`] on read failure. Malformed headers yield `None`.
    pub fn probe<S: Read + Seek + ?Sized>(source: &mut S, offset: u64) -> Result<Option<Self>> {
        let len = stream_len(source)?;
        match Self::parse(source, offset) {
            Ok(header) if header.validate(len).is_good() => Ok(Some(header)),
            Ok(_) => {
                tracing::debug!("Overlay header at {offset:#x} is out of range");
                Ok(None)
            }
            Err(Error::InvalidOverlayHeader { message }) => {
                tracing::debug!("{message}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

fn peek_endianness<S: Read + Seek + ?Sized>(source: &mut S) -> Result<Option<Endianness>> {
    let marker = source.read_u16::<LittleEndian>()?;
    let endianness = Endianness::from_marker(marker);
    if endianness.is_none() {
        source.seek(SeekFrom::Current(-2))?;
    }
    Ok(endianness)
}

/// Serialize a header in the layout [`OverlayHeader::parse`] reads.
#[cfg(test)]
pub(crate) fn encode_header(header: &OverlayHeader) -> Vec<u8> {
    let mut out = Vec::new();
    match &header.dll_name {
        Some(name) => {
            out.push(name.len() as u8);
            out.extend_from_slice(name);
            out.extend_from_slice(&header.dll_size.unwrap_or(0).to_le_bytes());
        }
        None => out.push(0),
    }
    out.extend_from_slice(&header.flags.to_le_bytes());
    out.extend_from_slice(&header.graphics_data);
    for value in [
        header.wise_script_exit_event_offset,
        header.wise_script_cancel_event_offset,
        header.wise_script_inflated_size,
        header.wise_script_deflated_size,
        header.wise_dll_deflated_size,
        header.ctl3d32_deflated_size,
        header.some_data4_deflated_size,
        header.regtool_deflated_size,
        header.progress_dll_deflated_size,
        header.some_data7_deflated_size,
        header.some_data8_deflated_size,
        header.some_data9_deflated_size,
        header.some_data10_deflated_size,
        header.final_file_deflated_size,
        header.final_file_inflated_size,
        header.eof,
        header.dib_deflated_size,
        header.dib_inflated_size,
    ] {
        out.extend_from_slice(&value.to_le_bytes());
    }
    if let Some(size) = header.install_script_deflated_size {
        out.extend_from_slice(&size.to_le_bytes());
    }
    if let Some(charset) = header.character_set {
        out.extend_from_slice(&charset.to_le_bytes());
    }
    match header.endianness {
        Some(Endianness::Little) => out.extend_from_slice(&ENDIANNESS_MARKER_LE.to_le_bytes()),
        Some(Endianness::Big) => out.extend_from_slice(&ENDIANNESS_MARKER_BE.to_le_bytes()),
        None => {}
    }
    out.push(header.init_text.len() as u8);
    out.extend_from_slice(&header.init_text);
    out
}

#[cfg(test)]
pub(crate) fn sample_header() -> OverlayHeader {
    OverlayHeader {
        offset: 0,
        dll_name: None,
        dll_size: None,
        flags: 0,
        graphics_data: [0; GRAPHICS_DATA_LEN],
        wise_script_exit_event_offset: 0,
        wise_script_cancel_event_offset: 0,
        wise_script_inflated_size: 300,
        wise_script_deflated_size: 120,
        wise_dll_deflated_size: 0,
        ctl3d32_deflated_size: 0,
        some_data4_deflated_size: 0,
        regtool_deflated_size: 0,
        progress_dll_deflated_size: 0,
        some_data7_deflated_size: 0,
        some_data8_deflated_size: 0,
        some_data9_deflated_size: 0,
        some_data10_deflated_size: 0,
        final_file_deflated_size: 0,
        final_file_inflated_size: 0,
        eof: 0,
        dib_deflated_size: 0,
        dib_inflated_size: 0,
        install_script_deflated_size: None,
        character_set: None,
        endianness: None,
        init_text: b"Initializing Wise Installation Wizard...".to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use pretty_assertions::assert_eq;

    use super::*;

    fn parse_bytes(bytes: Vec<u8>, offset: u64) -> OverlayHeader {
        OverlayHeader::parse(&mut Cursor::new(bytes), offset).unwrap()
    }

    #[test]
    fn test_parse_minimal_header() {
        let expected = sample_header();
        let bytes = encode_header(&expected);
        let header = parse_bytes(bytes.clone(), 0);
        assert_eq!(header, expected);
        assert_eq!(header.encoded_len(), bytes.len() as u64);
        assert!(!header.is_pkzip());
    }

    #[test]
    fn test_parse_full_header_at_offset() {
        let mut expected = sample_header();
        expected.offset = 7;
        expected.dll_name = Some(b"WISE0001.DLL".to_vec());
        expected.dll_size = Some(0x1234);
        expected.flags = FLAG_PKZIP;
        expected.install_script_deflated_size = Some(55);
        expected.character_set = Some(1252);
        expected.endianness = Some(Endianness::Little);

        let mut bytes = vec![0xCC; 7];
        bytes.extend(encode_header(&expected));
        bytes.extend_from_slice(&[0xAB; 16]);

        let header = parse_bytes(bytes, 7);
        assert_eq!(header, expected);
        assert!(header.is_pkzip());
        assert_eq!(header.dll_name_lossy().as_deref(), Some("WISE0001.DLL"));
        assert_eq!(
            header.compressed_data_offset(),
            7 + encode_header(&expected).len() as u64
        );
    }

    #[test]
    fn test_marker_after_install_script_only() {
        let mut expected = sample_header();
        expected.install_script_deflated_size = Some(9);
        expected.endianness = Some(Endianness::Big);
        let header = parse_bytes(encode_header(&expected), 0);
        assert_eq!(header, expected);
    }

    #[test]
    fn test_truncated_header() {
        let mut bytes = encode_header(&sample_header());
        bytes.truncate(30);
        let result = OverlayHeader::parse(&mut Cursor::new(bytes), 0);
        assert!(matches!(result, Err(Error::InvalidOverlayHeader { .. })));
    }

    #[test]
    fn test_validate() {
        let header = sample_header();
        let data_offset = header.compressed_data_offset();
        assert_eq!(header.validate(data_offset + 120), ExtractionStatus::Good);
        assert_eq!(header.validate(data_offset + 119), ExtractionStatus::Invalid);

        let mut no_script = sample_header();
        no_script.wise_script_deflated_size = 0;
        assert_eq!(no_script.validate(u64::MAX), ExtractionStatus::Invalid);
    }

    #[test]
    fn test_item_order() {
        let names: Vec<_> = sample_header().items().iter().map(|i| i.name).collect();
        assert_eq!(names[0], "WiseColors.dib");
        assert_eq!(names[1], "WiseScript.bin");
        assert_eq!(names[2], "WISE0001.DLL");
        assert_eq!(names[12], "FILE000C.DAT");
        assert_eq!(names.len(), 13);
    }
}
