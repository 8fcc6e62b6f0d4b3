//! gzindex: random-access reads over gzip/zlib streams
//!
//! gzip does not support random access: reaching byte N of the decompressed
//! content normally means decompressing everything before it. gzindex builds
//! a sparse index of checkpoints while decompressing forward, each one a
//! (compressed offset, uncompressed offset, 32 KiB dictionary window) triple,
//! and resumes decompression from the nearest checkpoint on every seek, so
//! a seek costs at most one checkpoint interval of discarded output.
//!
//! The index grows lazily as far as reads and seeks require, or eagerly via
//! [`GzReader::build_full_index`], and can be exported to a side file and
//! reused across sessions.
//!
//! ```no_run
//! use gzindex::GzReader;
//!
//! fn tail() -> gzindex::GzResult<Vec<u8>> {
//!     let mut reader = GzReader::open("big.log.gz")?;
//!     let len = reader.uncompressed_len()?;
//!     reader.seek(len.saturating_sub(4096))?;
//!     let mut buf = vec![0u8; 4096];
//!     let n = reader.read(&mut buf)?;
//!     buf.truncate(n);
//!     Ok(buf)
//! }
//! ```

mod builder;
mod config;
mod error;
mod format;
mod index;
mod inflate;
mod reader;
mod source;

pub use config::{ReaderOptions, DEFAULT_READ_BUFFER_SIZE, DEFAULT_SPACING};
pub use error::{GzIndexError, GzResult};
pub use format::StreamKind;
pub use index::{Checkpoint, CheckpointIndex, SharedIndex};
pub use inflate::MAX_WINDOW;
pub use reader::GzReader;
pub use source::Source;
