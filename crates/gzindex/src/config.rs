//! Reader tunables
//!
//! Both knobs trade memory/startup cost against seek latency; neither may
//! change the bytes a reader returns, only how fast it returns them.

use crate::error::{GzIndexError, GzResult};
use crate::inflate::MAX_WINDOW;

/// Default checkpoint interval: 64 KiB of uncompressed output.
pub const DEFAULT_SPACING: u64 = 64 * 1024;

/// Default bound on bytes decompressed per internal fetch.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Smallest output ring that still holds a full back-reference window
/// with room to produce ahead of it.
pub(crate) const MIN_RING_SIZE: usize = 64 * 1024;

/// Tunables for a [`GzReader`](crate::GzReader).
#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    /// Interval, in uncompressed bytes, between successive checkpoints.
    /// Smaller spacing means faster seeks and a larger index. Must be at
    /// least the 32 KiB window size, so consecutive checkpoints never share
    /// window bytes.
    pub spacing: u64,
    /// Upper bound on bytes decompressed per internal fetch. Rounded up
    /// internally to a power of two of at least 64 KiB.
    pub read_buffer_size: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            spacing: DEFAULT_SPACING,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ReaderOptions {
    pub(crate) fn validate(&self) -> GzResult<()> {
        if self.spacing < MAX_WINDOW as u64 {
            return Err(GzIndexError::Options(format!(
                "spacing {} is below the minimum of {} bytes",
                self.spacing, MAX_WINDOW
            )));
        }
        if self.read_buffer_size == 0 {
            return Err(GzIndexError::Options(
                "read_buffer_size must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Output ring size backing the decompressor: a power of two, never
    /// smaller than [`MIN_RING_SIZE`].
    pub(crate) fn ring_size(&self) -> usize {
        self.read_buffer_size
            .next_power_of_two()
            .max(MIN_RING_SIZE)
    }
}
