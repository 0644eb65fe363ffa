//! Overlay parsing and extraction
//!
//! Two ways into the data exist. When the overlay header validates, its
//! declared sizes drive a fixed extraction sequence ([`extractor`]). When it
//! does not, the data start is recovered heuristically and consecutive
//! records are pulled out until one fails ([`offset`]).

pub mod extractor;
pub mod header;
pub mod offset;
pub mod pkzip;
pub mod record;

pub use extractor::{
    ExtractedFile, HeaderExtraction, extract_header_files, read_header_script, walk_header_items,
};
pub use header::{Endianness, HeaderItem, OverlayHeader};
pub use offset::{
    ApproximateOffset, approximate, extract_sequential, find_real, find_real_within, locate_data,
};
pub use record::{Framing, RecordOutcome, RecordReader, read_record_to_vec};
