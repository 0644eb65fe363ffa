//! Extraction progress reporting

/// Progress information during extraction
#[derive(Debug, Clone)]
pub struct ExtractProgress {
    /// Current operation phase
    pub phase: ExtractPhase,
    /// Current item number (1-indexed)
    pub current: usize,
    /// Total number of items
    pub total: usize,
    /// Current file being processed (if applicable)
    pub current_file: Option<String>,
}

impl ExtractProgress {
    #[must_use]
    pub fn new(phase: ExtractPhase, current: usize, total: usize) -> Self {
        Self {
            phase,
            current,
            total,
            current_file: None,
        }
    }

    #[must_use]
    pub fn with_file(
        phase: ExtractPhase,
        current: usize,
        total: usize,
        file: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            current,
            total,
            current_file: Some(file.into()),
        }
    }

    /// Get the progress percentage (0.0 - 1.0)
    #[must_use]
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            1.0
        } else {
            self.current as f32 / self.total as f32
        }
    }
}

/// Phase of an extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractPhase {
    /// Finding the overlay and the start of the data
    LocatingData,
    /// Writing the files the overlay header declares
    ExtractingHeaderFiles,
    /// Writing files found by offset recovery
    ExtractingRecords,
    ParsingScript,
    /// Replaying script states
    RunningScript,
    Complete,
}

impl ExtractPhase {
    /// Get a human-readable description of this phase
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LocatingData => "Locating data",
            Self::ExtractingHeaderFiles => "Extracting header files",
            Self::ExtractingRecords => "Extracting records",
            Self::ParsingScript => "Parsing script",
            Self::RunningScript => "Running script",
            Self::Complete => "Complete",
        }
    }
}

/// Progress callback for extraction.
///
/// # Example
/// ```ignore
/// use wiseunpacker::{ExtractPhase, WiseUnpacker};
///
/// WiseUnpacker::extract_with_progress(installer, dest, &options, &|progress| {
///     if progress.phase == ExtractPhase::RunningScript {
///         println!("{}/{}", progress.current, progress.total);
///     }
/// })?;
/// ```
pub type ProgressCallback<'a> = &'a (dyn Fn(&ExtractProgress) + Sync + Send);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        let done = ExtractProgress::new(ExtractPhase::Complete, 0, 0);
        assert!((done.percentage() - 1.0).abs() < f32::EPSILON);
        let half = ExtractProgress::with_file(ExtractPhase::RunningScript, 5, 10, "a.txt");
        assert!((half.percentage() - 0.5).abs() < f32::EPSILON);
        assert_eq!(half.current_file.as_deref(), Some("a.txt"));
    }
}
