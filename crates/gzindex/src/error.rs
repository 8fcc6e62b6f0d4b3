use thiserror::Error;

use crate::inflate::MAX_WINDOW;

pub type GzResult<T> = Result<T, GzIndexError>;

#[derive(Debug, Error)]
pub enum GzIndexError {
    /// Malformed DEFLATE data. Fatal to the read or index build that hit it;
    /// checkpoints appended before the failure remain usable.
    #[error("corrupt stream near compressed offset {offset}: {reason}")]
    CorruptStream { offset: u64, reason: &'static str },

    /// The source cannot seek (e.g. a pipe). Raised at construction, since
    /// checkpoint resumption requires jumping backward in the compressed data.
    #[error("source does not support random access: {0}")]
    UnsupportedSource(String),

    /// A checkpoint window larger than the DEFLATE history limit.
    /// Indicates a builder bug.
    #[error("checkpoint window of {len} bytes exceeds the {MAX_WINDOW}-byte limit")]
    InvalidWindow { len: usize },

    /// An appended checkpoint did not advance past the previous one.
    #[error("checkpoint at uncompressed offset {new} does not advance past {last}")]
    Ordering { new: u64, last: u64 },

    /// An exported index that is malformed or does not match this stream.
    #[error("invalid index data: {0}")]
    InvalidIndex(String),

    #[error("invalid reader options: {0}")]
    Options(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
