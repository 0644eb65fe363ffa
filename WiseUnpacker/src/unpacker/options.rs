//! Extraction options
//!
//! Library callers configure an extraction through this builder; the CLI
//! maps its flags onto it one to one. There is no configuration file and no
//! environment lookup.

/// Options controlling how an installer is unpacked.
///
/// # Example
///
/// ```no_run
/// use wiseunpacker::unpacker::ExtractionOptions;
///
/// let options = ExtractionOptions::new()
///     .with_source_directory(Some("C:\\Setup".to_string()))
///     .with_run_script(false);
/// ```
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    /// Overlay offset to use instead of locating it from the executable
    /// headers.
    pub overlay_offset: Option<u64>,

    /// Value bound to `INST` before the script runs.
    pub source_directory: Option<String>,

    /// Replay the installer script after extracting the header files.
    /// Default: true
    pub run_script: bool,

    /// Look for `.W01`/`.001` continuation volumes next to the installer.
    /// Default: true
    pub discover_volumes: bool,

    /// Skip the overlay header and go straight to offset recovery.
    pub force_legacy: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            overlay_offset: None,
            source_directory: None,
            run_script: true,
            discover_volumes: true,
            force_legacy: false,
        }
    }

    #[must_use]
    pub fn with_overlay_offset(mut self, offset: Option<u64>) -> Self {
        self.overlay_offset = offset;
        self
    }

    #[must_use]
    pub fn with_source_directory(mut self, directory: Option<String>) -> Self {
        self.source_directory = directory;
        self
    }

    #[must_use]
    pub fn with_run_script(mut self, run: bool) -> Self {
        self.run_script = run;
        self
    }

    #[must_use]
    pub fn with_discover_volumes(mut self, discover: bool) -> Self {
        self.discover_volumes = discover;
        self
    }

    #[must_use]
    pub fn with_force_legacy(mut self, force: bool) -> Self {
        self.force_legacy = force;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ExtractionOptions::default();
        assert!(options.run_script);
        assert!(options.discover_volumes);
        assert!(!options.force_legacy);
        assert_eq!(options.overlay_offset, None);
    }

    #[test]
    fn test_builder() {
        let options = ExtractionOptions::new()
            .with_overlay_offset(Some(0x6000))
            .with_force_legacy(true)
            .with_discover_volumes(false);
        assert_eq!(options.overlay_offset, Some(0x6000));
        assert!(options.force_legacy);
        assert!(!options.discover_volumes);
    }
}
