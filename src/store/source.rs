//! Re-openable byte sources.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::SpoolError;

/// Read-only content that can be streamed from the start any number of times.
pub trait ByteSource {
    /// Open an independent stream positioned at offset 0.
    fn open_stream(&self) -> io::Result<Box<dyn Read + '_>>;

    /// Total size in bytes. Falls back to a full read.
    fn size(&self) -> io::Result<u64> {
        let mut stream = self.open_stream()?;
        io::copy(&mut stream, &mut io::sink())
    }

    /// Read the whole content into memory.
    fn read_to_vec(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.open_stream()?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Lowercase hex SHA-256 of the content.
    fn sha256(&self) -> io::Result<String> {
        let mut hasher = Sha256::new();
        let mut stream = self.open_stream()?;
        io::copy(&mut stream, &mut hasher)?;
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Caller-owned source shared with a field for upload.
pub type SharedSource = Arc<dyn ByteSource + Send + Sync>;

impl ByteSource for [u8] {
    fn open_stream(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(self))
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl ByteSource for Vec<u8> {
    fn open_stream(&self) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.as_slice()))
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl<T: ByteSource + ?Sized> ByteSource for Arc<T> {
    fn open_stream(&self) -> io::Result<Box<dyn Read + '_>> {
        (**self).open_stream()
    }

    fn size(&self) -> io::Result<u64> {
        (**self).size()
    }
}

/// A file on disk, reopened for every read.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Source for an existing regular file, checked up front.
    pub fn open(path: impl Into<PathBuf>) -> crate::error::Result<Self> {
        let path = path.into();
        let metadata = std::fs::metadata(&path).map_err(|e| SpoolError::io(&path, e))?;
        if !metadata.is_file() {
            return Err(SpoolError::io(
                &path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn open_stream(&self) -> io::Result<Box<dyn Read + '_>> {
        let file = File::open(&self.path)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn size(&self) -> io::Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }
}
