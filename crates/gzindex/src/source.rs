//! Source abstraction
//!
//! Normalizes the supported open modes (filesystem path, pre-opened handle,
//! raw descriptor, generic stream) into one byte-addressable input with a
//! `read_at`-style primitive. Seekability is probed once at construction;
//! pipes and other one-way handles are rejected up front because checkpoint
//! resumption jumps backward in the compressed data.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{GzIndexError, GzResult};

trait ReadSeek: Read + Seek + Send {}
impl<T: Read + Seek + Send> ReadSeek for T {}

/// A seekable store of compressed bytes, read at absolute offsets.
pub struct Source {
    inner: Box<dyn ReadSeek>,
    /// Current position of `inner`, to skip redundant seeks.
    pos: u64,
    len: u64,
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("pos", &self.pos)
            .field("len", &self.len)
            .finish()
    }
}

impl Source {
    /// Open a file by path.
    pub fn from_path(path: impl AsRef<Path>) -> GzResult<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_stream(file)
    }

    /// Wrap an already-open file handle.
    pub fn from_file(file: File) -> GzResult<Self> {
        Self::from_stream(file)
    }

    /// Adopt a raw file descriptor. Takes ownership: the descriptor is
    /// closed when the source is dropped.
    ///
    /// # Safety
    /// `fd` must be a valid, open descriptor not owned elsewhere.
    #[cfg(unix)]
    pub unsafe fn from_raw_fd(fd: std::os::unix::io::RawFd) -> GzResult<Self> {
        use std::os::unix::io::FromRawFd;
        Self::from_stream(File::from_raw_fd(fd))
    }

    /// Wrap any seekable byte stream (e.g. a `Cursor<Vec<u8>>`).
    pub fn from_stream<S: Read + Seek + Send + 'static>(mut stream: S) -> GzResult<Self> {
        // Probing both ends verifies seekability; ESPIPE surfaces here for
        // pipes, sockets and the like.
        let len = stream
            .seek(SeekFrom::End(0))
            .map_err(|e| GzIndexError::UnsupportedSource(e.to_string()))?;
        let pos = stream
            .seek(SeekFrom::Start(0))
            .map_err(|e| GzIndexError::UnsupportedSource(e.to_string()))?;
        Ok(Self {
            inner: Box::new(stream),
            pos,
            len,
        })
    }

    /// Total size of the compressed source in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read up to `buf.len()` bytes starting at absolute `offset`.
    /// Returns 0 only at end of source.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> GzResult<usize> {
        if offset != self.pos {
            self.inner.seek(SeekFrom::Start(offset))?;
            self.pos = offset;
        }
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    /// Read exactly `buf.len()` bytes at `offset`.
    pub fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> GzResult<()> {
        if offset != self.pos {
            self.inner.seek(SeekFrom::Start(offset))?;
            self.pos = offset;
        }
        self.inner.read_exact(buf)?;
        self.pos += buf.len() as u64;
        Ok(())
    }
}
