//! Script header
//!
//! A fixed 21-byte prefix is followed by an opaque block whose length depends
//! on the compiler version that produced the script. Nothing in the prefix
//! records that version, so the block length is found by checking which
//! candidate leaves three sensible strings after it.

use super::cursor::ScriptCursor;
use crate::error::{Error, Result};

/// Bytes in the fixed prefix preceding the layout block.
pub const FIXED_PREFIX_LEN: usize = 21;

/// Header strings stored for each language.
pub const HEADER_STRINGS_PER_LANGUAGE: usize = 56;

/// Longest string the layout probe accepts as plausible.
const MAX_PLAUSIBLE_STRING: usize = 260;

/// Length variant of the opaque block after the fixed prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayout {
    Compact,
    Standard,
    Extended,
    Extended2,
}

impl HeaderLayout {
    /// Probe order used by [`HeaderLayout::detect`].
    pub const PROBE_ORDER: [Self; 4] = [
        Self::Standard,
        Self::Compact,
        Self::Extended,
        Self::Extended2,
    ];

    #[must_use]
    pub fn block_len(self) -> usize {
        match self {
            Self::Compact => 22,
            Self::Standard => 26,
            Self::Extended => 38,
            Self::Extended2 => 42,
        }
    }

    /// Offset of the first header string for this layout.
    #[must_use]
    pub fn strings_offset(self) -> usize {
        FIXED_PREFIX_LEN + self.block_len()
    }

    /// Pick the layout whose string offset yields plausible strings, falling
    /// back to [`HeaderLayout::Standard`].
    #[must_use]
    pub fn detect(script: &[u8]) -> Self {
        Self::PROBE_ORDER
            .into_iter()
            .find(|layout| {
                script
                    .get(layout.strings_offset()..)
                    .is_some_and(has_plausible_strings)
            })
            .unwrap_or(Self::Standard)
    }
}

/// Three NUL-terminated, printable, bounded strings where the last one (the
/// message font) is not empty.
fn has_plausible_strings(data: &[u8]) -> bool {
    let mut rest = data;
    for index in 0..3 {
        let Some(end) = rest
            .iter()
            .take(MAX_PLAUSIBLE_STRING + 1)
            .position(|&b| b == 0)
        else {
            return false;
        };
        let text = &rest[..end];
        if !text.iter().all(|&b| b >= 0x20 && b != 0x7F) {
            return false;
        }
        if index == 2 && text.is_empty() {
            return false;
        }
        rest = &rest[end + 1..];
    }
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptHeader {
    pub flags: u8,
    pub unknown_1: u16,
    pub unknown_2: u16,
    pub some_offset_1: u32,
    pub some_offset_2: u32,
    pub unknown_3: [u8; 4],
    pub date_time: u32,
    pub layout: HeaderLayout,
    pub layout_block: Vec<u8>,
    pub ftp_url: String,
    pub log_pathname: String,
    pub message_font: String,
    pub font_size: u32,
    pub unknown_4: u16,
    pub language_count: u8,
    pub header_strings: Vec<String>,
}

impl ScriptHeader {
    /// Parse the header from the start of `cursor`'s data.
    ///
    /// # Errors
    /// Returns [`Error::InvalidScriptHeader`] if the blob is too short to
    /// hold a header.
    pub fn parse(cursor: &mut ScriptCursor<'_>) -> Result<Self> {
        let layout = HeaderLayout::detect(cursor.remaining());
        tracing::debug!("Script header layout: {layout:?}");

        Self::read_fields(cursor, layout).map_err(|e| match e {
            Error::ScriptTruncated { offset } => Error::InvalidScriptHeader {
                message: format!("{layout:?} header truncated at offset {offset}"),
            },
            other => other,
        })
    }

    fn read_fields(cursor: &mut ScriptCursor<'_>, layout: HeaderLayout) -> Result<Self> {
        let flags = cursor.read_u8()?;
        let unknown_1 = cursor.read_u16()?;
        let unknown_2 = cursor.read_u16()?;
        let some_offset_1 = cursor.read_u32()?;
        let some_offset_2 = cursor.read_u32()?;
        let unknown_3 = cursor.read_bytes::<4>()?;
        let date_time = cursor.read_u32()?;
        let layout_block = cursor.read_vec(layout.block_len())?;

        let ftp_url = cursor.read_string()?;
        let log_pathname = cursor.read_string()?;
        let message_font = cursor.read_string()?;
        let font_size = cursor.read_u32()?;
        let unknown_4 = cursor.read_u16()?;
        let language_count = cursor.read_u8()?;
        let header_strings =
            cursor.read_strings(HEADER_STRINGS_PER_LANGUAGE * usize::from(language_count))?;

        Ok(Self {
            flags,
            unknown_1,
            unknown_2,
            some_offset_1,
            some_offset_2,
            unknown_3,
            date_time,
            layout,
            layout_block,
            ftp_url,
            log_pathname,
            message_font,
            font_size,
            unknown_4,
            language_count,
            header_strings,
        })
    }

    /// Number of per-language repetitions in state payloads.
    #[must_use]
    pub fn languages(&self) -> usize {
        usize::from(self.language_count).max(1)
    }
}

/// Serialize a header in the layout [`ScriptHeader::parse`] reads.
#[cfg(test)]
pub(crate) fn encode_header(layout: HeaderLayout, language_count: u8) -> Vec<u8> {
    let mut out = vec![0x01];
    out.extend_from_slice(&0x0102u16.to_le_bytes());
    out.extend_from_slice(&0x0304u16.to_le_bytes());
    out.extend_from_slice(&0x1000u32.to_le_bytes());
    out.extend_from_slice(&0x2000u32.to_le_bytes());
    out.extend_from_slice(&[0x05; 4]);
    out.extend_from_slice(&0x2A5B_7C00u32.to_le_bytes());
    out.extend(std::iter::repeat_n(0x01, layout.block_len()));
    out.extend_from_slice(b"\0");
    out.extend_from_slice(b"%MAINDIR%\\INSTALL.LOG\0");
    out.extend_from_slice(b"MS Sans Serif\0");
    out.extend_from_slice(&8u32.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.push(language_count);
    for i in 0..HEADER_STRINGS_PER_LANGUAGE * usize::from(language_count) {
        out.extend_from_slice(format!("string {i}\0").as_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_every_layout() {
        for layout in HeaderLayout::PROBE_ORDER {
            let bytes = encode_header(layout, 1);
            assert_eq!(HeaderLayout::detect(&bytes), layout);

            let mut cursor = ScriptCursor::new(&bytes);
            let header = ScriptHeader::parse(&mut cursor).unwrap();
            assert_eq!(header.layout, layout);
            assert_eq!(header.log_pathname, "%MAINDIR%\\INSTALL.LOG");
            assert_eq!(header.message_font, "MS Sans Serif");
            assert_eq!(header.font_size, 8);
            assert_eq!(header.header_strings.len(), HEADER_STRINGS_PER_LANGUAGE);
            assert!(cursor.is_at_end());
        }
    }

    #[test]
    fn test_detection_is_deterministic() {
        let bytes = encode_header(HeaderLayout::Extended, 2);
        let first = HeaderLayout::detect(&bytes);
        assert!((0..5).all(|_| HeaderLayout::detect(&bytes) == first));
    }

    #[test]
    fn test_fallback_is_standard() {
        assert_eq!(HeaderLayout::detect(&[0x01; 100]), HeaderLayout::Standard);
        assert_eq!(HeaderLayout::detect(&[]), HeaderLayout::Standard);
    }

    #[test]
    fn test_truncated_header() {
        let bytes = encode_header(HeaderLayout::Standard, 1);
        let mut cursor = ScriptCursor::new(&bytes[..60]);
        let result = ScriptHeader::parse(&mut cursor);
        assert!(matches!(result, Err(Error::InvalidScriptHeader { .. })));
    }

    #[test]
    fn test_language_count_zero_still_repeats_once() {
        let bytes = encode_header(HeaderLayout::Compact, 0);
        let header = ScriptHeader::parse(&mut ScriptCursor::new(&bytes)).unwrap();
        assert!(header.header_strings.is_empty());
        assert_eq!(header.languages(), 1);
    }
}
