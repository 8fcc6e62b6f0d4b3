//! Index building
//!
//! [`InflateSession`] is one forward decompression walk: a resume point, the
//! adapter, and a compressed staging buffer, with absolute offset accounting
//! on both sides of the decompressor. [`IndexBuilder`] drives a session from
//! the frontier of the index until a target uncompressed offset is covered
//! or the stream ends, appending a checkpoint whenever a DEFLATE block
//! boundary lands at least `spacing` bytes past the previous checkpoint.
//!
//! Reads use the same machinery: a positioned read that walks into unindexed
//! territory reports its progress through [`note_progress`], so the read is
//! also the build.

use std::sync::RwLock;

use crate::error::GzResult;
use crate::index::{Checkpoint, CheckpointIndex};
use crate::inflate::{Event, Inflater};
use crate::source::Source;

/// Compressed bytes fetched from the source per refill.
const INPUT_CHUNK: usize = 32 * 1024;

/// Compressed-side position of a block boundary, as stored in a checkpoint.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BoundaryPos {
    pub compressed_offset: u64,
    pub bits: u8,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct StepOutcome {
    pub boundary: Option<BoundaryPos>,
    pub finished: bool,
}

/// A live decompression walk over one source.
pub(crate) struct InflateSession {
    inflater: Inflater,
    /// Uncompressed offset at which this session was resumed.
    base_out: u64,
    /// Absolute compressed offset of `in_buf[in_start]`.
    in_pos: u64,
    in_buf: Vec<u8>,
    in_start: usize,
    in_end: usize,
    eof_in: bool,
}

impl InflateSession {
    /// Resume decompression at `point`. Seeks the source, replays the
    /// checkpoint's bit remainder, and primes the dictionary window.
    pub fn resume(source: &mut Source, point: &Checkpoint, ring_size: usize) -> GzResult<Self> {
        let mut inflater = Inflater::new(ring_size);
        let mut in_pos = point.compressed_offset;
        if point.bits != 0 {
            // The boundary falls inside this byte: re-read it and hand its
            // unconsumed high bits to the decompressor.
            let mut byte = [0u8; 1];
            source.read_exact_at(in_pos, &mut byte)?;
            inflater.reset_at(point.bits, byte[0]);
            in_pos += 1;
        }
        if !point.window().is_empty() {
            inflater.prime(point.window())?;
        }
        Ok(Self {
            inflater,
            base_out: point.uncompressed_offset,
            in_pos,
            in_buf: vec![0; INPUT_CHUNK],
            in_start: 0,
            in_end: 0,
            eof_in: false,
        })
    }

    /// Absolute uncompressed offset of the produce cursor.
    pub fn out_pos(&self) -> u64 {
        self.base_out + self.inflater.produced()
    }

    /// Absolute uncompressed offset up to which output has been delivered
    /// (taken or discarded).
    pub fn delivered(&self) -> u64 {
        self.base_out + self.inflater.drained()
    }

    pub fn available(&self) -> u64 {
        self.inflater.available()
    }

    pub fn finished(&self) -> bool {
        self.inflater.finished()
    }

    pub fn take(&mut self, dst: &mut [u8]) -> usize {
        self.inflater.take(dst)
    }

    pub fn discard(&mut self, n: u64) -> u64 {
        self.inflater.discard(n)
    }

    pub fn window(&self) -> Vec<u8> {
        self.inflater.window()
    }

    /// One decompression step: refill the staging buffer if needed and feed
    /// it to the adapter, stopping at block boundaries. All prior output
    /// must already be taken or discarded.
    pub fn step(&mut self, source: &mut Source) -> GzResult<StepOutcome> {
        if self.in_start == self.in_end && !self.eof_in {
            let n = source.read_at(self.in_pos, &mut self.in_buf)?;
            self.in_start = 0;
            self.in_end = n;
            if n == 0 {
                self.eof_in = true;
            }
        }

        let input = &self.in_buf[self.in_start..self.in_end];
        let more_input = !self.eof_in;
        let advance = self
            .inflater
            .advance(input, more_input, true, self.in_pos)?;
        self.in_start += advance.consumed;
        self.in_pos += advance.consumed as u64;

        let outcome = match advance.event {
            Event::BlockBoundary { num_bits } => StepOutcome {
                boundary: Some(BoundaryPos {
                    // With pending bits the boundary byte was already
                    // consumed; resumption re-reads it.
                    compressed_offset: if num_bits == 0 {
                        self.in_pos
                    } else {
                        self.in_pos - 1
                    },
                    bits: num_bits,
                }),
                finished: false,
            },
            Event::Finished => StepOutcome {
                boundary: None,
                finished: true,
            },
            Event::More => StepOutcome {
                boundary: None,
                finished: false,
            },
        };
        Ok(outcome)
    }
}

/// Record a session's progress in the index: append a checkpoint when a
/// boundary lands in new territory at least `spacing` bytes past the last
/// one, and advance the indexed extent. Checkpoints become visible to other
/// readers only here, fully constructed, under the write lock.
pub(crate) fn note_progress(
    index: &RwLock<CheckpointIndex>,
    session: &InflateSession,
    boundary: Option<BoundaryPos>,
    spacing: u64,
) -> GzResult<()> {
    let out = session.out_pos();
    let mut idx = index.write().expect("index lock poisoned");
    if let Some(b) = boundary {
        if out > idx.indexed_extent() && out >= idx.last().uncompressed_offset + spacing {
            let point = Checkpoint::new(b.compressed_offset, b.bits, out, session.window())?;
            idx.append(point)?;
        }
    }
    idx.note_extent(out);
    Ok(())
}

/// Extends the index forward on demand.
pub(crate) struct IndexBuilder<'a> {
    pub source: &'a mut Source,
    pub index: &'a RwLock<CheckpointIndex>,
    pub spacing: u64,
    pub ring_size: usize,
}

impl IndexBuilder<'_> {
    /// Extend coverage until `indexed_extent() >= target` or end-of-stream
    /// (which completes the index and records the exact total length). A
    /// target beyond the true end is therefore not an error.
    pub fn extend_to(&mut self, target: u64) -> GzResult<()> {
        let point = {
            let idx = self.index.read().expect("index lock poisoned");
            if idx.is_complete() || idx.indexed_extent() >= target {
                return Ok(());
            }
            idx.nearest_at_or_before(idx.indexed_extent()).clone()
        };
        tracing::debug!(
            target,
            resume_at = point.uncompressed_offset,
            "extending checkpoint index"
        );

        let mut session = InflateSession::resume(self.source, &point, self.ring_size)?;
        loop {
            let step = session.step(self.source)?;
            session.discard(session.available());
            note_progress(self.index, &session, step.boundary, self.spacing)?;

            if step.finished {
                let total = session.out_pos();
                self.index
                    .write()
                    .expect("index lock poisoned")
                    .mark_complete(total);
                return Ok(());
            }
            let covered = self
                .index
                .read()
                .expect("index lock poisoned")
                .indexed_extent();
            if covered >= target {
                return Ok(());
            }
        }
    }
}
