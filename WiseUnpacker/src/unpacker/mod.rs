//! Installer extraction
//!
//! [`WiseUnpacker`] runs the whole pipeline: open the (possibly spanned)
//! installer, find the overlay, pick the header or legacy path, extract, and
//! replay the script.

mod operations;
mod options;
mod progress;

pub use operations::{ExtractionPath, ExtractionReport, InstallerInfo, WiseUnpacker};
pub use options::ExtractionOptions;
pub use progress::{ExtractPhase, ExtractProgress, ProgressCallback};
