//! Executable container handling
//!
//! Finds where the installer's overlay starts inside the MZ/NE/PE image and
//! recognizes foreign archive formats that some distributions append in its
//! place.

use std::fmt;
use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};
use crate::stream::{read_full, stream_len};

/// Added to the furthest NE segment end to reach the overlay.
pub const NE_SEGMENT_OVERLAY_ADJUST: u64 = 738;

/// Added to the furthest NE resource end to reach the overlay.
pub const NE_RESOURCE_OVERLAY_ADJUST: u64 = 705;

const MZ_SIGNATURE: u16 = 0x5A4D;
const PE_SIGNATURE: u32 = 0x0000_4550;
const NE_SIGNATURE: u16 = 0x454E;

/// Offset of `e_lfanew` in the DOS header.
const E_LFANEW_OFFSET: u64 = 0x3C;

const PE_SECTION_HEADER_LEN: u64 = 40;

/// Archive formats recognized in place of Wise data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    SevenZip,
    Rar,
    Cabinet,
}

impl ArchiveKind {
    const SIGNATURES: [(Self, &'static [u8]); 3] = [
        (Self::SevenZip, b"7z\xBC\xAF\x27\x1C"),
        (Self::Rar, b"Rar!\x1A\x07"),
        (Self::Cabinet, b"MSCF"),
    ];
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SevenZip => "7-Zip",
            Self::Rar => "RAR",
            Self::Cabinet => "Microsoft Cabinet",
        };
        f.write_str(name)
    }
}

/// Identify a foreign archive from the first bytes of the overlay.
#[must_use]
pub fn sniff_archive(bytes: &[u8]) -> Option<ArchiveKind> {
    ArchiveKind::SIGNATURES
        .iter()
        .find(|(_, signature)| bytes.starts_with(signature))
        .map(|&(kind, _)| kind)
}

/// Read the start of the region at `offset` and sniff it.
///
/// # Errors
/// Returns [`Error::Io`] on read failure.
pub fn sniff_archive_at<S: Read + Seek + ?Sized>(
    source: &mut S,
    offset: u64,
) -> Result<Option<ArchiveKind>> {
    source.seek(SeekFrom::Start(offset))?;
    let mut magic = [0u8; 8];
    let n = read_full(source, &mut magic)?;
    Ok(sniff_archive(&magic[..n]))
}

/// Executable flavour of the installer stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutableKind {
    Dos,
    NewExecutable,
    PortableExecutable,
}

impl fmt::Display for ExecutableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dos => "MS-DOS",
            Self::NewExecutable => "NE",
            Self::PortableExecutable => "PE",
        };
        f.write_str(name)
    }
}

/// Where the overlay of an executable starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerInfo {
    pub kind: ExecutableKind,
    pub overlay_offset: u64,
}

/// Locate the overlay of the executable in `source`.
///
/// # Errors
/// Returns [`Error::NotAnExecutable`] if the MZ signature is missing,
/// [`Error::InvalidExecutable`] if NE tables point past any possible image,
/// or [`Error::Io`] if the headers are truncated.
pub fn locate_overlay<S: Read + Seek + ?Sized>(source: &mut S) -> Result<ContainerInfo> {
    let len = stream_len(source)?;
    source.seek(SeekFrom::Start(0))?;
    if source.read_u16::<LittleEndian>()? != MZ_SIGNATURE {
        return Err(Error::NotAnExecutable);
    }
    let bytes_in_last_page = u64::from(source.read_u16::<LittleEndian>()?);
    let pages = u64::from(source.read_u16::<LittleEndian>()?);
    let dos_image_end = match bytes_in_last_page {
        0 => pages * 512,
        n => pages.saturating_sub(1) * 512 + n,
    };

    source.seek(SeekFrom::Start(E_LFANEW_OFFSET))?;
    let e_lfanew = u64::from(source.read_u32::<LittleEndian>()?);

    let info = if e_lfanew > 0 && e_lfanew + 4 <= len {
        source.seek(SeekFrom::Start(e_lfanew))?;
        let signature = source.read_u32::<LittleEndian>()?;
        if signature == PE_SIGNATURE {
            ContainerInfo {
                kind: ExecutableKind::PortableExecutable,
                overlay_offset: pe_overlay(source, e_lfanew)?,
            }
        } else if signature as u16 == NE_SIGNATURE {
            ContainerInfo {
                kind: ExecutableKind::NewExecutable,
                overlay_offset: ne_overlay(source, e_lfanew)?,
            }
        } else {
            dos_info(dos_image_end)
        }
    } else {
        dos_info(dos_image_end)
    };

    tracing::debug!("{} executable, overlay at {:#x}", info.kind, info.overlay_offset);
    Ok(info)
}

fn dos_info(image_end: u64) -> ContainerInfo {
    ContainerInfo {
        kind: ExecutableKind::Dos,
        overlay_offset: image_end,
    }
}

/// End of the furthest section's raw data.
fn pe_overlay<S: Read + Seek + ?Sized>(source: &mut S, pe_offset: u64) -> Result<u64> {
    // COFF header follows the signature.
    source.seek(SeekFrom::Start(pe_offset + 4 + 2))?;
    let section_count = u64::from(source.read_u16::<LittleEndian>()?);
    source.seek(SeekFrom::Start(pe_offset + 4 + 16))?;
    let optional_header_len = u64::from(source.read_u16::<LittleEndian>()?);

    let table = pe_offset + 4 + 20 + optional_header_len;
    let mut end = table + section_count * PE_SECTION_HEADER_LEN;
    for index in 0..section_count {
        source.seek(SeekFrom::Start(table + index * PE_SECTION_HEADER_LEN + 16))?;
        let raw_size = u64::from(source.read_u32::<LittleEndian>()?);
        let raw_pointer = u64::from(source.read_u32::<LittleEndian>()?);
        end = end.max(raw_pointer + raw_size);
    }
    Ok(end)
}

/// Furthest segment or resource end, adjusted to where the overlay begins.
fn ne_overlay<S: Read + Seek + ?Sized>(source: &mut S, ne_offset: u64) -> Result<u64> {
    source.seek(SeekFrom::Start(ne_offset + 0x1C))?;
    let segment_count = u64::from(source.read_u16::<LittleEndian>()?);
    source.seek(SeekFrom::Start(ne_offset + 0x22))?;
    let segment_table = ne_offset + u64::from(source.read_u16::<LittleEndian>()?);
    let resource_table = ne_offset + u64::from(source.read_u16::<LittleEndian>()?);
    let resident_names = ne_offset + u64::from(source.read_u16::<LittleEndian>()?);
    source.seek(SeekFrom::Start(ne_offset + 0x32))?;
    let segment_shift = u32::from(source.read_u16::<LittleEndian>()?);

    let malformed = |table: &str| Error::InvalidExecutable {
        message: format!("NE {table} extent does not fit in 64 bits"),
    };

    let mut segment_end = 0u64;
    for index in 0..segment_count {
        source.seek(SeekFrom::Start(segment_table + index * 8))?;
        let sector = u64::from(source.read_u16::<LittleEndian>()?);
        let length = match source.read_u16::<LittleEndian>()? {
            0 => 0x1_0000,
            n => u64::from(n),
        };
        if sector != 0 {
            let end = scaled(sector, segment_shift)
                .and_then(|start| start.checked_add(length))
                .ok_or_else(|| malformed("segment"))?;
            segment_end = segment_end.max(end);
        }
    }

    let mut resource_end = 0u64;
    if resource_table < resident_names {
        source.seek(SeekFrom::Start(resource_table))?;
        let resource_shift = u32::from(source.read_u16::<LittleEndian>()?);
        loop {
            let type_id = source.read_u16::<LittleEndian>()?;
            if type_id == 0 {
                break;
            }
            let count = source.read_u16::<LittleEndian>()?;
            source.seek(SeekFrom::Current(4))?;
            for _ in 0..count {
                let offset = u64::from(source.read_u16::<LittleEndian>()?);
                let length = u64::from(source.read_u16::<LittleEndian>()?);
                source.seek(SeekFrom::Current(8))?;
                let end =
                    scaled(offset + length, resource_shift).ok_or_else(|| malformed("resource"))?;
                resource_end = resource_end.max(end);
            }
        }
    }

    let overlay = if resource_end > segment_end {
        resource_end.checked_add(NE_RESOURCE_OVERLAY_ADJUST)
    } else {
        segment_end.checked_add(NE_SEGMENT_OVERLAY_ADJUST)
    };
    overlay.ok_or_else(|| malformed("image"))
}

/// `value << shift`, or `None` when any bit would be shifted out.
fn scaled(value: u64, shift: u32) -> Option<u64> {
    value
        .checked_shl(shift)
        .filter(|&shifted| shifted >> shift == value)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn dos_stub(e_lfanew: u32, pages: u16, last_page: u16) -> Vec<u8> {
        let mut out = vec![0u8; 0x40];
        out[0..2].copy_from_slice(b"MZ");
        out[2..4].copy_from_slice(&last_page.to_le_bytes());
        out[4..6].copy_from_slice(&pages.to_le_bytes());
        out[0x3C..0x40].copy_from_slice(&e_lfanew.to_le_bytes());
        out
    }

    #[test]
    fn test_sniff_archive() {
        assert_eq!(sniff_archive(b"7z\xBC\xAF\x27\x1C\x00\x04"), Some(ArchiveKind::SevenZip));
        assert_eq!(sniff_archive(b"Rar!\x1A\x07\x00"), Some(ArchiveKind::Rar));
        assert_eq!(sniff_archive(b"MSCF\0\0\0\0"), Some(ArchiveKind::Cabinet));
        assert_eq!(sniff_archive(b"PK\x03\x04"), None);
        assert_eq!(sniff_archive(b"7z"), None);
        assert_eq!(ArchiveKind::Cabinet.to_string(), "Microsoft Cabinet");
    }

    #[test]
    fn test_not_an_executable() {
        let mut source = Cursor::new(b"ZM\0\0".to_vec());
        assert!(matches!(locate_overlay(&mut source), Err(Error::NotAnExecutable)));
    }

    #[test]
    fn test_dos_image_size() {
        let mut bytes = dos_stub(0, 3, 100);
        bytes.resize(2000, 0);
        let info = locate_overlay(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(info.kind, ExecutableKind::Dos);
        assert_eq!(info.overlay_offset, 2 * 512 + 100);
    }

    #[test]
    fn test_pe_overlay_is_end_of_last_section() {
        let mut bytes = dos_stub(0x40, 1, 0);
        bytes.extend_from_slice(b"PE\0\0");
        let mut coff = [0u8; 20];
        coff[2..4].copy_from_slice(&2u16.to_le_bytes());
        coff[16..18].copy_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&coff);
        for (size, pointer) in [(0x200u32, 0x400u32), (0x600, 0x200)] {
            let mut section = [0u8; 40];
            section[16..20].copy_from_slice(&size.to_le_bytes());
            section[20..24].copy_from_slice(&pointer.to_le_bytes());
            bytes.extend_from_slice(&section);
        }
        bytes.resize(0x1000, 0);

        let info = locate_overlay(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(info.kind, ExecutableKind::PortableExecutable);
        assert_eq!(info.overlay_offset, 0x800);
    }

    /// NE image with one segment at `sector` and no resources.
    fn ne_image(shift: u16, sector: u16) -> Vec<u8> {
        let mut bytes = dos_stub(0x40, 1, 0);
        let mut ne = vec![0u8; 0x40];
        ne[0..2].copy_from_slice(b"NE");
        ne[0x1C..0x1E].copy_from_slice(&1u16.to_le_bytes());
        ne[0x22..0x24].copy_from_slice(&0x40u16.to_le_bytes());
        // Resource table equal to resident name table: no resources.
        ne[0x24..0x26].copy_from_slice(&0x48u16.to_le_bytes());
        ne[0x26..0x28].copy_from_slice(&0x48u16.to_le_bytes());
        ne[0x32..0x34].copy_from_slice(&shift.to_le_bytes());
        bytes.extend(ne);
        bytes.extend_from_slice(&sector.to_le_bytes());
        bytes.extend_from_slice(&0x80u16.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        bytes.resize(0x1000, 0);
        bytes
    }

    #[test]
    fn test_ne_overlay_applies_segment_adjustment() {
        // Sector 0x10 << 4 = 0x100, plus 0x80 bytes.
        let info = locate_overlay(&mut Cursor::new(ne_image(4, 0x10))).unwrap();
        assert_eq!(info.kind, ExecutableKind::NewExecutable);
        assert_eq!(info.overlay_offset, 0x180 + NE_SEGMENT_OVERLAY_ADJUST);
    }

    #[test]
    fn test_ne_oversized_alignment_shift_is_an_error() {
        for shift in [64u16, 70, 0xFFFF, 60] {
            let result = locate_overlay(&mut Cursor::new(ne_image(shift, 0x10)));
            assert!(
                matches!(result, Err(Error::InvalidExecutable { .. })),
                "shift {shift}: {result:?}"
            );
        }
    }

    #[test]
    fn test_scaled_detects_lost_bits() {
        assert_eq!(scaled(0x10, 4), Some(0x100));
        assert_eq!(scaled(1, 63), Some(1 << 63));
        assert_eq!(scaled(2, 63), None);
        assert_eq!(scaled(1, 64), None);
    }
}
