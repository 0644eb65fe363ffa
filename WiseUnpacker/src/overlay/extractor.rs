//! Header-defined extraction sequence

use std::fs;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use super::header::{HeaderItem, OverlayHeader, SCRIPT_ITEM};
use super::record::{RecordOutcome, RecordReader, read_record_to_vec};
use crate::error::{Error, Result};

/// A file written during extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub crc32: u32,
}

/// Everything the header path produced.
#[derive(Debug, Clone, Default)]
pub struct HeaderExtraction {
    pub files: Vec<ExtractedFile>,
    /// Anchor for script-relative offsets: the position after the last item.
    pub data_start: u64,
    /// Decoded `WiseScript.bin`, kept for the script parser.
    pub script: Option<Vec<u8>>,
}

/// Decode every item the header declares, in order, handing each to
/// `visit`. Returns the position after the last item.
///
/// Items with a zero size are skipped without consuming input. Any other
/// item that does not decode and verify aborts the walk.
///
/// # Errors
/// Returns [`Error::ExtractionFailed`] naming the first bad item, or
/// whatever `visit` returns.
pub fn walk_header_items<S, F>(
    source: &mut S,
    header: &OverlayHeader,
    mut visit: F,
) -> Result<u64>
where
    S: Read + Seek + ?Sized,
    F: FnMut(usize, &HeaderItem, &RecordOutcome, Vec<u8>) -> Result<()>,
{
    let reader = RecordReader::for_pkzip_flag(header.is_pkzip());
    let mut cursor = header.compressed_data_offset();

    for (index, item) in header.items().iter().enumerate() {
        if item.expectation.input_size.is_none() {
            continue;
        }
        let (outcome, data) = read_record_to_vec(&reader, source, cursor, &item.expectation)?;
        let Some(data) = data else {
            tracing::warn!("{} at {cursor:#x}: {}", item.name, outcome.status);
            return Err(outcome.into_error(item.name));
        };
        visit(index, item, &outcome, data)?;
        cursor = outcome.next_offset;
    }

    tracing::debug!("Header items end at {cursor:#x}");
    Ok(cursor)
}

/// Extract every item the header declares into `output_dir`.
///
/// `on_item` receives the item's position in the fixed sequence, the
/// sequence length and the item name.
///
/// # Errors
/// Returns [`Error::ExtractionFailed`] naming the first bad item, or
/// [`Error::Io`] on read or write failure.
pub fn extract_header_files<S, F>(
    source: &mut S,
    header: &OverlayHeader,
    output_dir: &Path,
    mut on_item: F,
) -> Result<HeaderExtraction>
where
    S: Read + Seek + ?Sized,
    F: FnMut(usize, usize, &str),
{
    fs::create_dir_all(output_dir)?;
    let total = header.items().len();
    let mut result = HeaderExtraction::default();

    let data_start = walk_header_items(source, header, |index, item, outcome, data| {
        on_item(index, total, item.name);
        let path = output_dir.join(item.name);
        fs::write(&path, &data)?;
        tracing::info!("Extracted {} ({} bytes)", item.name, data.len());

        result.files.push(ExtractedFile {
            name: item.name.to_string(),
            path,
            size: data.len() as u64,
            crc32: outcome.crc32,
        });
        if item.name == SCRIPT_ITEM {
            result.script = Some(data);
        }
        Ok(())
    })?;
    result.data_start = data_start;
    Ok(result)
}

/// Decode only the script, walking past the items before and after it.
///
/// # Errors
/// Returns [`Error::ExtractionFailed`] naming the first bad item.
pub fn read_header_script<S: Read + Seek + ?Sized>(
    source: &mut S,
    header: &OverlayHeader,
) -> Result<(Option<Vec<u8>>, u64)> {
    let mut script = None;
    let data_start = walk_header_items(source, header, |_, item, _, data| {
        if item.name == SCRIPT_ITEM {
            script = Some(data);
        }
        Ok(())
    })?;
    Ok((script, data_start))
}
