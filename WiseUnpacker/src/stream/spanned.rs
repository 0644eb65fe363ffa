//! Multi-volume stream for disk-spanned installers
//!
//! Volumes are kept in order with precomputed cumulative end offsets, so a
//! logical position maps to (volume, local offset) by binary search. Reads
//! that cross a boundary continue into the next volume.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::{ReadSeek, read_full, stream_len};
use crate::error::{Error, Result};

/// Highest volume number probed during discovery.
const MAX_VOLUMES: u32 = 99;

struct Volume {
    path: Option<PathBuf>,
    reader: Box<dyn ReadSeek>,
    /// Logical offset of the first byte.
    start: u64,
    /// Logical offset one past the last byte.
    end: u64,
}

/// Several byte sources presented as one logical random-access stream.
#[derive(Default)]
pub struct SpannedSource {
    volumes: Vec<Volume>,
    position: u64,
}

impl SpannedSource {
    /// Create an empty source (no volumes).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `primary` as the first volume.
    ///
    /// # Errors
    /// Returns [`Error::VolumeMissing`] if the file does not exist.
    pub fn open<P: AsRef<Path>>(primary: P) -> Result<Self> {
        let mut source = Self::new();
        source.append(primary)?;
        Ok(source)
    }

    /// Open `primary` and append every sibling volume that follows the
    /// `.W01` / `.w01` / `.001` naming convention, stopping at the first gap.
    ///
    /// # Errors
    /// Returns an error if the primary file or a discovered volume cannot be
    /// opened.
    pub fn discover<P: AsRef<Path>>(primary: P) -> Result<Self> {
        let primary = primary.as_ref();
        let mut source = Self::open(primary)?;

        for number in 1..=MAX_VOLUMES {
            let Some(path) = volume_candidates(primary, number)
                .into_iter()
                .find(|candidate| candidate.is_file())
            else {
                break;
            };
            tracing::debug!("Found spanned volume {}", path.display());
            source.append(&path)?;
        }

        Ok(source)
    }

    /// Append the file at `path` as the next volume.
    ///
    /// # Errors
    /// Returns [`Error::VolumeMissing`] if the file does not exist, or
    /// [`Error::Io`] if it cannot be opened.
    pub fn append<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::VolumeMissing {
                path: path.to_path_buf(),
            });
        }
        let file = BufReader::new(File::open(path)?);
        self.push(Some(path.to_path_buf()), Box::new(file))?;
        Ok(())
    }

    /// Append an in-memory or already opened reader as the next volume.
    ///
    /// # Errors
    /// Returns an error if the reader's length cannot be determined.
    pub fn append_reader<R: Read + Seek + 'static>(&mut self, reader: R) -> io::Result<()> {
        self.push(None, Box::new(reader))
    }

    fn push(&mut self, path: Option<PathBuf>, mut reader: Box<dyn ReadSeek>) -> io::Result<()> {
        let len = stream_len(&mut reader)?;
        let start = self.len();
        // Empty volumes would break strictly increasing boundaries.
        if len == 0 {
            tracing::debug!("Skipping empty volume {:?}", path);
            return Ok(());
        }
        self.volumes.push(Volume {
            path,
            reader,
            start,
            end: start + len,
        });
        Ok(())
    }

    /// Total logical length.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.volumes.last().map_or(0, |v| v.end)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn volume_count(&self) -> usize {
        self.volumes.len()
    }

    /// Paths of the file-backed volumes, in order.
    pub fn volume_paths(&self) -> impl Iterator<Item = &Path> {
        self.volumes.iter().filter_map(|v| v.path.as_deref())
    }

    /// Index of the volume holding logical offset `pos`.
    fn locate(&self, pos: u64) -> Option<usize> {
        let index = self.volumes.partition_point(|v| v.end <= pos);
        (index < self.volumes.len()).then_some(index)
    }
}

impl Read for SpannedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let Some(index) = self.locate(self.position) else {
                break;
            };
            let volume = &mut self.volumes[index];
            let local = self.position - volume.start;
            let available = (volume.end - self.position).min((buf.len() - filled) as u64) as usize;

            volume.reader.seek(SeekFrom::Start(local))?;
            let n = read_full(&mut volume.reader, &mut buf[filled..filled + available])?;
            if n == 0 {
                break;
            }
            filled += n;
            self.position += n as u64;
        }
        Ok(filled)
    }
}

impl Seek for SpannedSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of spanned stream")
        })?;
        self.position = target;
        Ok(target)
    }
}

/// Candidate file names for volume `number` of `primary`, in probe order.
///
/// `setup.exe` volume 1 yields `setup.W01`, `setup.w01`, `setup.001`.
#[must_use]
pub fn volume_candidates(primary: &Path, number: u32) -> Vec<PathBuf> {
    let Some(stem) = primary.file_stem().and_then(|s| s.to_str()) else {
        return Vec::new();
    };
    let parent = primary.parent().unwrap_or_else(|| Path::new(""));
    [
        format!("{stem}.W{number:02}"),
        format!("{stem}.w{number:02}"),
        format!("{stem}.{number:03}"),
    ]
    .into_iter()
    .map(|name| parent.join(name))
    .collect()
}
