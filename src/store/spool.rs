//! Spooled content buffer.
//!
//! Writes land in memory until the cumulative size of the current write
//! cycle exceeds the threshold, at which point everything written so far
//! moves into a temporary file and all further bytes are appended there.
//! The switch is invisible to the writer.

use std::fmt;
use std::io::{self, BufReader, Read, Write};
use std::mem;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::source::ByteSource;

/// Default spill threshold (1 MB).
pub const DEFAULT_THRESHOLD: usize = 1024 * 1024;

/// Prefix for spool file names in the temp directory.
const TEMP_PREFIX: &str = "attachspool-";

/// Tuning for a [`SpooledBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolOptions {
    /// Largest write cycle kept in memory, in bytes.
    pub threshold: usize,
    /// Directory for spool files (`None` = system temp dir).
    pub temp_dir: Option<PathBuf>,
}

impl Default for SpoolOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            temp_dir: None,
        }
    }
}

impl SpoolOptions {
    /// Default options with a custom threshold.
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }
}

enum Backing {
    Memory(Vec<u8>),
    File { file: NamedTempFile, len: u64 },
}

/// Write-once, read-many content holder that spills to disk past a threshold.
///
/// A buffer is populated through [`open_write_cycle`](Self::open_write_cycle)
/// and read back any number of times through its [`ByteSource`] view. Only one
/// backing store is live at a time. Dropping the buffer runs
/// [`delete`](Self::delete), so a temp file never outlives its owner.
pub struct SpooledBuffer {
    options: SpoolOptions,
    backing: Backing,
    generation: u64,
}

impl SpooledBuffer {
    /// Empty buffer with the default 1 MB threshold.
    pub fn new() -> Self {
        Self::with_options(SpoolOptions::default())
    }

    /// Empty buffer spilling once a write cycle exceeds `threshold` bytes.
    pub fn with_threshold(threshold: usize) -> Self {
        Self::with_options(SpoolOptions::with_threshold(threshold))
    }

    pub fn with_options(options: SpoolOptions) -> Self {
        Self {
            options,
            backing: Backing::Memory(Vec::new()),
            generation: 0,
        }
    }

    /// Start a new write cycle, discarding the previous content.
    ///
    /// The returned sink borrows the buffer mutably, so the content cannot
    /// be read until the cycle is over.
    pub fn open_write_cycle(&mut self) -> SpoolSink<'_> {
        self.delete();
        self.generation += 1;
        debug!(
            generation = self.generation,
            threshold = self.options.threshold,
            "Opened spool write cycle"
        );
        SpoolSink {
            buffer: self,
            written: 0,
        }
    }

    /// Byte-source view over the most recently completed write cycle.
    pub fn as_source(&self) -> &dyn ByteSource {
        self
    }

    /// Release the temp file (if any) and leave the buffer empty.
    ///
    /// Safe to call repeatedly. A failed file deletion is logged, never returned.
    pub fn delete(&mut self) {
        match mem::replace(&mut self.backing, Backing::Memory(Vec::new())) {
            Backing::Memory(_) => {}
            Backing::File { file, len } => {
                let path = file.path().to_path_buf();
                match file.close() {
                    Ok(()) => debug!(path = %path.display(), len, "Deleted spool file"),
                    Err(e) => warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to delete spool file"
                    ),
                }
            }
        }
    }

    /// Number of bytes held by the current write cycle.
    pub fn len(&self) -> u64 {
        match &self.backing {
            Backing::Memory(mem) => mem.len() as u64,
            Backing::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` when the content lives in a temp file.
    pub fn is_spilled(&self) -> bool {
        matches!(self.backing, Backing::File { .. })
    }

    /// Path of the backing temp file, if the content has spilled.
    pub fn temp_path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Memory(_) => None,
            Backing::File { file, .. } => Some(file.path()),
        }
    }

    /// Number of write cycles opened so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn threshold(&self) -> usize {
        self.options.threshold
    }

    /// Move the in-memory bytes into a fresh temp file.
    fn spill(&mut self) -> io::Result<()> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX);
        let mut file = match &self.options.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        if let Backing::Memory(mem) = &self.backing {
            file.write_all(mem)?;
            let len = mem.len() as u64;
            debug!(
                path = %file.path().display(),
                len,
                generation = self.generation,
                "Spooled content to temp file"
            );
            self.backing = Backing::File { file, len };
        }
        Ok(())
    }
}

impl Default for SpooledBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SpooledBuffer {
    fn drop(&mut self) {
        self.delete();
    }
}

impl fmt::Debug for SpooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpooledBuffer")
            .field("threshold", &self.options.threshold)
            .field("len", &self.len())
            .field("spilled", &self.is_spilled())
            .field("generation", &self.generation)
            .finish()
    }
}

impl ByteSource for SpooledBuffer {
    /// Independent stream at offset 0; a spilled buffer reopens its file.
    fn open_stream(&self) -> io::Result<Box<dyn Read + '_>> {
        match &self.backing {
            Backing::Memory(mem) => Ok(Box::new(mem.as_slice())),
            Backing::File { file, .. } => Ok(Box::new(BufReader::new(file.reopen()?))),
        }
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len())
    }
}

/// Writing end of one [`SpooledBuffer`] write cycle.
pub struct SpoolSink<'a> {
    buffer: &'a mut SpooledBuffer,
    written: u64,
}

impl SpoolSink<'_> {
    /// Bytes accepted so far in this cycle.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush the backing store and close the cycle.
    pub fn finish(mut self) -> io::Result<u64> {
        self.flush()?;
        debug!(
            written = self.written,
            spilled = self.buffer.is_spilled(),
            "Closed spool write cycle"
        );
        Ok(self.written)
    }
}

impl Write for SpoolSink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let threshold = self.buffer.options.threshold;
        let must_spill = matches!(
            &self.buffer.backing,
            Backing::Memory(mem) if mem.len() + buf.len() > threshold
        );
        if must_spill {
            self.buffer.spill()?;
        }

        match &mut self.buffer.backing {
            Backing::Memory(mem) => mem.extend_from_slice(buf),
            Backing::File { file, len } => {
                file.write_all(buf)?;
                *len += buf.len() as u64;
            }
        }
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.buffer.backing {
            Backing::Memory(_) => Ok(()),
            Backing::File { file, .. } => file.flush(),
        }
    }
}
