//! # WiseUnpacker
//!
//! A pure-Rust extractor for Wise Installer self-extracting executables.
//!
//! ## Supported Layouts
//!
//! - **Overlay header** - Installers that describe their embedded files in a
//!   header right after the executable image
//! - **Legacy overlays** - Headerless installers, whose data offset is
//!   recovered by trial decompression
//! - **PKZIP framing** - Records wrapped in ZIP local file headers
//! - **Spanned sets** - Installers split over `.W01`/`.001` volumes
//! - **WiseScript** - The install script is parsed and replayed to place
//!   files under their install names
//!
//! ## Quick Start
//!
//! ```no_run
//! use wiseunpacker::WiseUnpacker;
//!
//! let report = WiseUnpacker::extract("SETUP.EXE", "output/")?;
//! println!("Extracted {} files", report.written_files().count());
//! # Ok::<(), wiseunpacker::Error>(())
//! ```
//!
//! ### Options and Progress
//!
//! ```no_run
//! use wiseunpacker::{ExtractionOptions, WiseUnpacker};
//!
//! let options = ExtractionOptions::new()
//!     .with_source_directory(Some("D:\\".into()))
//!     .with_force_legacy(false);
//! WiseUnpacker::extract_with_progress("SETUP.EXE", "output/", &options, &|progress| {
//!     println!("{} {}/{}", progress.phase.as_str(), progress.current, progress.total);
//! })?;
//! # Ok::<(), wiseunpacker::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` - Enables the `wiseunpacker` command-line binary

pub mod compression;
pub mod container;
pub mod error;
pub mod overlay;
pub mod script;
pub mod stream;
pub mod unpacker;
pub mod utils;

// Re-exports for convenience
pub use error::{Error, Result};
pub use unpacker::{
    ExtractPhase, ExtractProgress, ExtractionOptions, ExtractionPath, ExtractionReport,
    InstallerInfo, WiseUnpacker,
};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{Error, Result};

    pub use crate::compression::{DeflateExpectation, ExtractionStatus, inflate, inflate_limited};
    pub use crate::container::{ArchiveKind, ContainerInfo, ExecutableKind, locate_overlay};
    pub use crate::overlay::{
        ApproximateOffset, ExtractedFile, Framing, OverlayHeader, RecordOutcome, RecordReader,
        find_real,
    };
    pub use crate::script::{Environment, Interpreter, MachineState, OperationCode, WiseScript};
    pub use crate::stream::SpannedSource;

    pub use crate::unpacker::{
        ExtractPhase, ExtractProgress, ExtractionOptions, ExtractionPath, ExtractionReport,
        InstallerInfo, WiseUnpacker,
    };
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// CLI module (feature-gated)
#[cfg(feature = "cli")]
pub mod cli;
