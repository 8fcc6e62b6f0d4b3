//! Seek/read controller
//!
//! `GzReader` owns one source, one cursor, and at most one live inflate
//! session. Seeks extend the checkpoint index as far as they need (and no
//! further); reads resume from the nearest checkpoint at or before the
//! cursor, discard up to `spacing` bytes, then deliver. Sequential reads
//! keep the live session and pay no resume cost.
//!
//! Seeking beyond the end of the stream clamps to the (by then known) total
//! length; reading at or past the end returns zero bytes. Neither is an
//! error.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::builder::{note_progress, IndexBuilder, InflateSession};
use crate::config::ReaderOptions;
use crate::error::{GzIndexError, GzResult};
use crate::format::{self, StreamKind};
use crate::index::{CheckpointIndex, SharedIndex};
use crate::source::Source;

/// Random-access reader over the decompressed content of a gzip or zlib
/// stream.
pub struct GzReader {
    source: Source,
    index: SharedIndex,
    opts: ReaderOptions,
    ring_size: usize,
    kind: StreamKind,
    /// Logical read position in the decompressed stream.
    cursor: u64,
    /// Live decompression state; `None` means the next read must resume
    /// from a checkpoint.
    session: Option<InflateSession>,
}

impl GzReader {
    /// Open a compressed file by path.
    pub fn open(path: impl AsRef<Path>) -> GzResult<Self> {
        Self::open_with_options(path, ReaderOptions::default())
    }

    pub fn open_with_options(path: impl AsRef<Path>, opts: ReaderOptions) -> GzResult<Self> {
        Self::from_source(Source::from_path(path)?, opts)
    }

    /// Wrap an already-open file handle.
    pub fn from_file(file: File) -> GzResult<Self> {
        Self::from_file_with_options(file, ReaderOptions::default())
    }

    pub fn from_file_with_options(file: File, opts: ReaderOptions) -> GzResult<Self> {
        Self::from_source(Source::from_file(file)?, opts)
    }

    /// Adopt a raw file descriptor.
    ///
    /// # Safety
    /// `fd` must be a valid, open descriptor not owned elsewhere.
    #[cfg(unix)]
    pub unsafe fn from_raw_fd(fd: std::os::unix::io::RawFd) -> GzResult<Self> {
        Self::from_source(Source::from_raw_fd(fd)?, ReaderOptions::default())
    }

    /// # Safety
    /// See [`GzReader::from_raw_fd`].
    #[cfg(unix)]
    pub unsafe fn from_raw_fd_with_options(
        fd: std::os::unix::io::RawFd,
        opts: ReaderOptions,
    ) -> GzResult<Self> {
        Self::from_source(Source::from_raw_fd(fd)?, opts)
    }

    /// Wrap any seekable byte stream (e.g. a `Cursor<Vec<u8>>`).
    pub fn from_stream<S: Read + Seek + Send + 'static>(stream: S) -> GzResult<Self> {
        Self::from_stream_with_options(stream, ReaderOptions::default())
    }

    pub fn from_stream_with_options<S: Read + Seek + Send + 'static>(
        stream: S,
        opts: ReaderOptions,
    ) -> GzResult<Self> {
        Self::from_source(Source::from_stream(stream)?, opts)
    }

    fn from_source(mut source: Source, opts: ReaderOptions) -> GzResult<Self> {
        opts.validate()?;
        let info = format::detect(&mut source)?;
        let index = Arc::new(RwLock::new(CheckpointIndex::new(info.payload_start)));
        Ok(Self {
            source,
            index,
            ring_size: opts.ring_size(),
            opts,
            kind: info.kind,
            cursor: 0,
            session: None,
        })
    }

    /// Open a second reader over the same compressed content, reusing an
    /// index built elsewhere. The index must belong to this stream.
    pub fn with_shared_index(
        mut source: Source,
        index: SharedIndex,
        opts: ReaderOptions,
    ) -> GzResult<Self> {
        opts.validate()?;
        let info = format::detect(&mut source)?;
        {
            let idx = index.read().expect("index lock poisoned");
            if idx.payload_start() != info.payload_start {
                return Err(GzIndexError::InvalidIndex(
                    "shared index does not match this stream".into(),
                ));
            }
        }
        Ok(Self {
            source,
            index,
            ring_size: opts.ring_size(),
            opts,
            kind: info.kind,
            cursor: 0,
            session: None,
        })
    }

    /// Container format detected at open time.
    pub fn stream_kind(&self) -> StreamKind {
        self.kind
    }

    /// Handle to the checkpoint index, for sharing across readers or for
    /// inspection.
    pub fn index(&self) -> SharedIndex {
        Arc::clone(&self.index)
    }

    /// Current logical position in the decompressed stream.
    pub fn position(&self) -> u64 {
        self.cursor
    }

    /// Move the cursor to `offset`, extending the index on demand. Offsets
    /// beyond the end of the stream clamp to the total length (which
    /// becomes known as a byproduct); the clamped cursor is returned.
    pub fn seek(&mut self, offset: u64) -> GzResult<u64> {
        let needs_build = {
            let idx = self.index.read().expect("index lock poisoned");
            !idx.is_complete() && offset > idx.indexed_extent()
        };
        if needs_build {
            self.builder().extend_to(offset)?;
        }

        let cursor = {
            let idx = self.index.read().expect("index lock poisoned");
            match idx.total_len() {
                Some(total) => offset.min(total),
                None => offset,
            }
        };
        self.cursor = cursor;
        self.session = None;
        Ok(cursor)
    }

    /// Read up to `buf.len()` bytes at the cursor, advancing it by the
    /// number actually produced. Returns fewer than requested only at
    /// end-of-stream, and zero at or past it.
    pub fn read(&mut self, buf: &mut [u8]) -> GzResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        {
            let idx = self.index.read().expect("index lock poisoned");
            if let Some(total) = idx.total_len() {
                if self.cursor >= total {
                    return Ok(0);
                }
            }
        }

        self.ensure_positioned()?;

        let mut copied = 0;
        loop {
            let session = self.session.as_mut().expect("positioned above");
            copied += session.take(&mut buf[copied..]);
            if copied == buf.len() {
                break;
            }
            if session.finished() {
                let total = session.out_pos();
                self.index
                    .write()
                    .expect("index lock poisoned")
                    .mark_complete(total);
                break;
            }
            let step = session.step(&mut self.source)?;
            note_progress(&self.index, session, step.boundary, self.opts.spacing)?;
        }

        self.cursor += copied as u64;
        Ok(copied)
    }

    /// Proactively extend the index to end-of-stream, so every later seek
    /// pays at most one `spacing`-bounded discard.
    pub fn build_full_index(&mut self) -> GzResult<()> {
        self.builder().extend_to(u64::MAX)
    }

    /// Exact uncompressed length. Builds the rest of the index on first
    /// call if the end of the stream has not been reached yet.
    pub fn uncompressed_len(&mut self) -> GzResult<u64> {
        if let Some(total) = self.index.read().expect("index lock poisoned").total_len() {
            return Ok(total);
        }
        self.build_full_index()?;
        Ok(self
            .index
            .read()
            .expect("index lock poisoned")
            .total_len()
            .expect("complete after full build"))
    }

    /// Serialize the checkpoint index for reuse in a later session.
    pub fn export_index<W: Write>(&self, w: W) -> GzResult<()> {
        self.index.read().expect("index lock poisoned").export(w)
    }

    /// Replace this reader's index with a previously exported one.
    pub fn import_index<R: Read>(&mut self, r: R) -> GzResult<()> {
        let imported = CheckpointIndex::import(r)?;
        {
            let idx = self.index.read().expect("index lock poisoned");
            if imported.payload_start() != idx.payload_start() {
                return Err(GzIndexError::InvalidIndex(
                    "imported index does not match this stream".into(),
                ));
            }
        }
        self.index = Arc::new(RwLock::new(imported));
        self.session = None;
        Ok(())
    }

    fn builder(&mut self) -> IndexBuilder<'_> {
        IndexBuilder {
            source: &mut self.source,
            index: &self.index,
            spacing: self.opts.spacing,
            ring_size: self.ring_size,
        }
    }

    /// Make the live session deliver at exactly the cursor, resuming from
    /// the nearest checkpoint and discarding the gap when necessary.
    fn ensure_positioned(&mut self) -> GzResult<()> {
        if let Some(session) = &self.session {
            if session.delivered() == self.cursor {
                return Ok(());
            }
        }

        let point = {
            let idx = self.index.read().expect("index lock poisoned");
            idx.nearest_at_or_before(self.cursor).clone()
        };
        tracing::trace!(
            cursor = self.cursor,
            checkpoint = point.uncompressed_offset,
            "resuming from checkpoint"
        );

        let mut session = InflateSession::resume(&mut self.source, &point, self.ring_size)?;
        while session.delivered() < self.cursor {
            let gap = self.cursor - session.delivered();
            if session.available() > 0 {
                session.discard(gap.min(session.available()));
                continue;
            }
            if session.finished() {
                // Stream turned out shorter than the cursor; clamp.
                let total = session.out_pos();
                self.index
                    .write()
                    .expect("index lock poisoned")
                    .mark_complete(total);
                self.cursor = total;
                break;
            }
            let step = session.step(&mut self.source)?;
            note_progress(&self.index, &session, step.boundary, self.opts.spacing)?;
        }
        self.session = Some(session);
        Ok(())
    }
}

impl std::fmt::Debug for GzReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzReader")
            .field("kind", &self.kind)
            .field("cursor", &self.cursor)
            .field("positioned", &self.session.is_some())
            .finish()
    }
}

fn into_io(e: GzIndexError) -> std::io::Error {
    match e {
        GzIndexError::Io(io) => io,
        other => std::io::Error::other(other),
    }
}

impl Read for GzReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        GzReader::read(self, buf).map_err(into_io)
    }
}

impl Seek for GzReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => n,
            SeekFrom::Current(d) => {
                let t = self.cursor as i128 + d as i128;
                u64::try_from(t).map_err(|_| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "seek before start of stream",
                    )
                })?
            }
            SeekFrom::End(d) => {
                let total = self.uncompressed_len().map_err(into_io)?;
                let t = total as i128 + d as i128;
                u64::try_from(t).map_err(|_| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "seek before start of stream",
                    )
                })?
            }
        };
        GzReader::seek(self, target).map_err(into_io)
    }
}
