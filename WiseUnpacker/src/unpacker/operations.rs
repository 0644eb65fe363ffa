//! High-level extraction entry points

use std::io::{Read, Seek};
use std::path::Path;

use super::options::ExtractionOptions;
use super::progress::{ExtractPhase, ExtractProgress, ProgressCallback};
use crate::container::{self, ContainerInfo};
use crate::error::{Error, Result};
use crate::overlay::{self, ApproximateOffset, ExtractedFile, OverlayHeader, RecordReader};
use crate::script::{Environment, Interpreter, RunSummary, WiseScript};
use crate::stream::{SpannedSource, stream_len};

/// Which way into the data an extraction took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionPath {
    /// The overlay header validated and drove the extraction.
    Header,
    /// The data start was recovered heuristically.
    Legacy,
}

/// Outcome of a successful extraction
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub path: ExtractionPath,
    pub overlay_offset: u64,
    /// Anchor for script offsets (header path) or first record (legacy path).
    pub data_start: u64,
    /// Files written before the script ran.
    pub files: Vec<ExtractedFile>,
    /// Set when the script was parsed and replayed.
    pub script: Option<RunSummary>,
    /// Variables as the script left them.
    pub environment: Option<Environment>,
}

impl ExtractionReport {
    /// Every file written, header items first.
    pub fn written_files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path.as_path()).chain(
            self.script
                .iter()
                .flat_map(|summary| summary.files.iter().map(std::path::PathBuf::as_path)),
        )
    }
}

/// What [`WiseUnpacker::inspect`] found without writing anything.
#[derive(Debug, Clone)]
pub struct InstallerInfo {
    /// `None` when the overlay offset was given explicitly.
    pub container: Option<ContainerInfo>,
    pub overlay_offset: u64,
    pub total_len: u64,
    pub volumes: usize,
    pub header: Option<OverlayHeader>,
    pub script: Option<WiseScript>,
    /// Anchor for script offsets when the header path applies.
    pub data_start: Option<u64>,
    /// Recovered data start when it does not.
    pub legacy_start: Option<ApproximateOffset>,
}

/// Operations on Wise installer executables
pub struct WiseUnpacker;

impl WiseUnpacker {
    /// Extract an installer into `output_dir` with default options.
    ///
    /// # Errors
    /// Returns an error if the installer cannot be read or no data can be
    /// recovered from it.
    pub fn extract<P: AsRef<Path>, Q: AsRef<Path>>(
        installer: P,
        output_dir: Q,
    ) -> Result<ExtractionReport> {
        let options = ExtractionOptions::default();
        Self::extract_with_progress(installer, output_dir, &options, &|_| {})
    }

    /// Extract an installer into `output_dir`, reporting progress.
    ///
    /// # Errors
    /// Returns an error if the installer cannot be read or no data can be
    /// recovered from it.
    pub fn extract_with_progress<P: AsRef<Path>, Q: AsRef<Path>>(
        installer: P,
        output_dir: Q,
        options: &ExtractionOptions,
        progress: ProgressCallback,
    ) -> Result<ExtractionReport> {
        let installer = installer.as_ref();
        tracing::info!("Extracting {}", installer.display());

        progress(&ExtractProgress::new(ExtractPhase::LocatingData, 0, 1));
        let mut source = open_source(installer, options)?;
        let overlay_offset = match options.overlay_offset {
            Some(offset) => offset,
            None => container::locate_overlay(&mut source)?.overlay_offset,
        };

        Self::extract_from_source(
            &mut source,
            overlay_offset,
            output_dir.as_ref(),
            options,
            progress,
        )
    }

    /// Extract from an already opened source whose overlay starts at
    /// `overlay_offset`.
    ///
    /// # Errors
    /// Returns [`Error::EmbeddedArchive`] if the overlay is a foreign
    /// archive, [`Error::NoInstallerData`] if nothing can be recovered, or
    /// the first extraction or script error.
    pub fn extract_from_source<S: Read + Seek + ?Sized>(
        source: &mut S,
        overlay_offset: u64,
        output_dir: &Path,
        options: &ExtractionOptions,
        progress: ProgressCallback,
    ) -> Result<ExtractionReport> {
        if let Some(kind) = container::sniff_archive_at(source, overlay_offset)? {
            return Err(Error::EmbeddedArchive { kind });
        }

        let header = if options.force_legacy {
            None
        } else {
            OverlayHeader::probe(source, overlay_offset)?
        };

        let report = match header {
            Some(header) => {
                Self::extract_header_path(source, &header, output_dir, options, progress)?
            }
            None => Self::extract_legacy_path(source, overlay_offset, output_dir, progress)?,
        };

        progress(&ExtractProgress::new(ExtractPhase::Complete, 1, 1));
        tracing::info!(
            "Extraction complete: {} files via {:?} path",
            report.written_files().count(),
            report.path
        );
        Ok(report)
    }

    fn extract_header_path<S: Read + Seek + ?Sized>(
        source: &mut S,
        header: &OverlayHeader,
        output_dir: &Path,
        options: &ExtractionOptions,
        progress: ProgressCallback,
    ) -> Result<ExtractionReport> {
        tracing::debug!("Using overlay header at {:#x}", header.offset);
        let extraction = overlay::extract_header_files(source, header, output_dir, |i, n, name| {
            progress(&ExtractProgress::with_file(
                ExtractPhase::ExtractingHeaderFiles,
                i + 1,
                n,
                name,
            ));
        })?;

        let mut report = ExtractionReport {
            path: ExtractionPath::Header,
            overlay_offset: header.offset,
            data_start: extraction.data_start,
            files: extraction.files,
            script: None,
            environment: None,
        };

        let script_data = match extraction.script {
            Some(data) if options.run_script => data,
            _ => return Ok(report),
        };

        progress(&ExtractProgress::new(ExtractPhase::ParsingScript, 0, 1));
        let script = WiseScript::parse(&script_data)?;
        tracing::info!("Script has {} states", script.len());

        let environment = options
            .source_directory
            .clone()
            .map(Environment::with_source_directory)
            .unwrap_or_default();
        let mut interpreter = Interpreter::new(
            output_dir,
            extraction.data_start,
            RecordReader::for_pkzip_flag(header.is_pkzip()),
            environment,
        );
        let summary = interpreter.process_state_machine(source, &script.states, |i, n, state| {
            progress(&ExtractProgress::with_file(
                ExtractPhase::RunningScript,
                i + 1,
                n,
                state.opcode.to_string(),
            ));
        })?;

        report.script = Some(summary);
        report.environment = Some(interpreter.into_environment());
        Ok(report)
    }

    fn extract_legacy_path<S: Read + Seek + ?Sized>(
        source: &mut S,
        overlay_offset: u64,
        output_dir: &Path,
        progress: ProgressCallback,
    ) -> Result<ExtractionReport> {
        tracing::debug!("No usable overlay header; recovering data offset");
        let start = overlay::locate_data(source, overlay_offset)?;
        let files = overlay::extract_sequential(source, start, output_dir, |i, name| {
            progress(&ExtractProgress::with_file(
                ExtractPhase::ExtractingRecords,
                i + 1,
                0,
                name,
            ));
        })?;

        Ok(ExtractionReport {
            path: ExtractionPath::Legacy,
            overlay_offset,
            data_start: start.offset,
            files,
            script: None,
            environment: None,
        })
    }

    /// Describe an installer without writing anything.
    ///
    /// # Errors
    /// Returns an error if the installer cannot be read, holds a foreign
    /// archive, or neither path finds any data.
    pub fn inspect<P: AsRef<Path>>(
        installer: P,
        options: &ExtractionOptions,
    ) -> Result<InstallerInfo> {
        let mut source = open_source(installer.as_ref(), options)?;
        let container = match options.overlay_offset {
            Some(_) => None,
            None => Some(container::locate_overlay(&mut source)?),
        };
        let overlay_offset = options
            .overlay_offset
            .or(container.map(|c| c.overlay_offset))
            .unwrap_or(0);

        if let Some(kind) = container::sniff_archive_at(&mut source, overlay_offset)? {
            return Err(Error::EmbeddedArchive { kind });
        }

        let mut info = InstallerInfo {
            container,
            overlay_offset,
            total_len: stream_len(&mut source)?,
            volumes: source.volume_count(),
            header: None,
            script: None,
            data_start: None,
            legacy_start: None,
        };

        let header = if options.force_legacy {
            None
        } else {
            OverlayHeader::probe(&mut source, overlay_offset)?
        };
        match header {
            Some(header) => {
                let (script, data_start) = overlay::read_header_script(&mut source, &header)?;
                info.script = script.as_deref().map(WiseScript::parse).transpose()?;
                info.data_start = Some(data_start);
                info.header = Some(header);
            }
            None => info.legacy_start = Some(overlay::locate_data(&mut source, overlay_offset)?),
        }
        Ok(info)
    }
}

fn open_source(installer: &Path, options: &ExtractionOptions) -> Result<SpannedSource> {
    let source = if options.discover_volumes {
        SpannedSource::discover(installer)?
    } else {
        SpannedSource::open(installer)?
    };
    if source.volume_count() > 1 {
        tracing::info!("Installer spans {} volumes", source.volume_count());
    }
    Ok(source)
}
