//! Decompressor adapter
//!
//! Wraps the miniz_oxide core inflate state machine behind three operations:
//! reset (optionally at a bit-aligned block boundary), prime-with-dictionary,
//! and consume. No other module touches the decompressor's representation.
//!
//! Output goes into a power-of-two ring that doubles as the DEFLATE
//! back-reference window: priming a checkpoint window just means loading it
//! into the ring behind the produce cursor. Produced/drained counters since
//! the last reset give the caller exact byte accounting.

use miniz_oxide::inflate::core::{
    decompress, inflate_flags, BlockBoundaryState, DecompressorOxide,
};
use miniz_oxide::inflate::TINFLStatus;

use crate::error::{GzIndexError, GzResult};

/// Maximum DEFLATE back-reference distance; also the largest checkpoint
/// window that can ever be needed.
pub const MAX_WINDOW: usize = 32 * 1024;

/// Outcome of one [`Inflater::advance`] call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Advance {
    /// Compressed bytes consumed from the input slice.
    pub consumed: usize,
    /// Decompressed bytes appended to the ring.
    pub produced: usize,
    pub event: Event,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    /// Needs more input, or stopped because the ring filled up.
    More,
    /// Stopped at a DEFLATE block boundary; a checkpoint may be taken here.
    /// `num_bits` is how many bits of the last consumed byte belong to the
    /// next block (0 = the boundary is byte-aligned).
    BlockBoundary { num_bits: u8 },
    /// The DEFLATE stream's logical end was reached.
    Finished,
}

pub(crate) struct Inflater {
    core: Box<DecompressorOxide>,
    ring: Vec<u8>,
    mask: u64,
    /// Bytes produced since the last reset.
    produced: u64,
    /// Bytes taken or discarded by the caller since the last reset.
    drained: u64,
    /// Valid history behind the produce cursor (primed window + produced).
    history: u64,
    finished: bool,
}

impl Inflater {
    /// `ring_size` must be a power of two and at least `2 * MAX_WINDOW`.
    pub fn new(ring_size: usize) -> Self {
        debug_assert!(ring_size.is_power_of_two() && ring_size >= 2 * MAX_WINDOW);
        Self {
            core: Box::new(DecompressorOxide::new()),
            ring: vec![0; ring_size],
            mask: ring_size as u64 - 1,
            produced: 0,
            drained: 0,
            history: 0,
            finished: false,
        }
    }

    /// Discard all state; the next byte consumed is treated as the start of
    /// a fresh DEFLATE block stream.
    pub fn reset(&mut self) {
        *self.core = DecompressorOxide::new();
        self.produced = 0;
        self.drained = 0;
        self.history = 0;
        self.finished = false;
    }

    /// Reset positioned at a block boundary that begins `num_bits` bits into
    /// `byte`. The caller re-reads that byte from the compressed stream; the
    /// unconsumed high bits are replayed into the bit buffer.
    pub fn reset_at(&mut self, num_bits: u8, byte: u8) {
        debug_assert!(num_bits < 8);
        let state = BlockBoundaryState {
            num_bits,
            bit_buf: if num_bits == 0 { 0 } else { byte >> (8 - num_bits) },
            ..Default::default()
        };
        *self.core = DecompressorOxide::from_block_boundary_state(&state);
        self.produced = 0;
        self.drained = 0;
        self.history = 0;
        self.finished = false;
    }

    /// Load `window` as the preset dictionary, so back-references into the
    /// bytes preceding the resume point resolve. Call once, directly after a
    /// reset and before any input is consumed.
    pub fn prime(&mut self, window: &[u8]) -> GzResult<()> {
        if window.len() > MAX_WINDOW {
            return Err(GzIndexError::InvalidWindow { len: window.len() });
        }
        debug_assert_eq!(self.produced, 0, "prime must precede input");
        let tail = self.ring.len() - window.len();
        self.ring[tail..].copy_from_slice(window);
        self.history = window.len() as u64;
        Ok(())
    }

    /// Feed compressed bytes, producing into the ring. `more_input` tells
    /// the decompressor whether bytes beyond `input` exist; `at` is the
    /// absolute compressed offset of `input[0]`, used only for errors.
    ///
    /// All previously produced output must have been taken or discarded:
    /// the ring is overwritten from the produce cursor forward.
    pub fn advance(
        &mut self,
        input: &[u8],
        more_input: bool,
        stop_at_boundary: bool,
        at: u64,
    ) -> GzResult<Advance> {
        debug_assert_eq!(self.drained, self.produced, "undrained output would be clobbered");

        let mut flags = 0;
        if more_input {
            flags |= inflate_flags::TINFL_FLAG_HAS_MORE_INPUT;
        }
        if stop_at_boundary {
            flags |= inflate_flags::TINFL_FLAG_STOP_ON_BLOCK_BOUNDARY;
        }

        let out_cur = (self.produced & self.mask) as usize;
        let (status, consumed, produced) =
            decompress(&mut self.core, input, &mut self.ring, out_cur, flags);

        self.produced += produced as u64;
        self.history += produced as u64;

        let event = match status {
            TINFLStatus::Done => {
                self.finished = true;
                Event::Finished
            }
            TINFLStatus::BlockBoundary => {
                let num_bits = self
                    .core
                    .block_boundary_state()
                    .map(|s| s.num_bits)
                    .unwrap_or(0);
                Event::BlockBoundary { num_bits }
            }
            TINFLStatus::NeedsMoreInput | TINFLStatus::HasMoreOutput => Event::More,
            TINFLStatus::FailedCannotMakeProgress => {
                return Err(GzIndexError::CorruptStream {
                    offset: at,
                    reason: "truncated deflate stream",
                })
            }
            _ => {
                return Err(GzIndexError::CorruptStream {
                    offset: at,
                    reason: "malformed deflate data",
                })
            }
        };

        Ok(Advance {
            consumed,
            produced,
            event,
        })
    }

    /// Undrained bytes currently in the ring.
    pub fn available(&self) -> u64 {
        self.produced - self.drained
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Bytes produced since the last reset.
    pub fn produced(&self) -> u64 {
        self.produced
    }

    /// Bytes taken or discarded since the last reset.
    pub fn drained(&self) -> u64 {
        self.drained
    }

    /// Copy undrained output into `dst`, returning the number of bytes moved.
    pub fn take(&mut self, dst: &mut [u8]) -> usize {
        let n = (self.available()).min(dst.len() as u64) as usize;
        self.copy_ring(self.drained, &mut dst[..n]);
        self.drained += n as u64;
        n
    }

    /// Drop up to `n` undrained bytes without copying them out.
    pub fn discard(&mut self, n: u64) -> u64 {
        let m = n.min(self.available());
        self.drained += m;
        m
    }

    /// The trailing window preceding the produce cursor: up to `MAX_WINDOW`
    /// bytes, fewer when less history exists (near the stream start).
    pub fn window(&self) -> Vec<u8> {
        let len = self.history.min(MAX_WINDOW as u64) as usize;
        let mut out = vec![0u8; len];
        self.copy_ring(self.produced.wrapping_sub(len as u64), &mut out);
        out
    }

    /// Copy `dst.len()` ring bytes starting at logical position `pos`
    /// (wrapping across the ring seam if needed).
    fn copy_ring(&self, pos: u64, dst: &mut [u8]) {
        let len = dst.len();
        let start = (pos & self.mask) as usize;
        let first = len.min(self.ring.len() - start);
        dst[..first].copy_from_slice(&self.ring[start..start + first]);
        dst[first..].copy_from_slice(&self.ring[..len - first]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    fn pattern(len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        let mut i = 0usize;
        while out.len() < len {
            out.extend_from_slice(format!("chunk {i:08} ").as_bytes());
            i += 1;
        }
        out.truncate(len);
        out
    }

    /// Drive the inflater over the whole input, draining after every call.
    fn inflate_all(compressed: &[u8], ring_size: usize) -> Vec<u8> {
        let mut inf = Inflater::new(ring_size);
        let mut out = Vec::new();
        let mut pos = 0usize;
        let mut buf = vec![0u8; ring_size];
        loop {
            let step = inf
                .advance(&compressed[pos..], false, false, pos as u64)
                .unwrap();
            pos += step.consumed;
            let n = inf.take(&mut buf);
            out.extend_from_slice(&buf[..n]);
            if inf.finished() {
                break;
            }
        }
        out
    }

    #[test]
    fn inflates_across_ring_wraps() {
        let data = pattern(300_000);
        assert_eq!(inflate_all(&deflate(&data), 64 * 1024), data);
    }

    #[test]
    fn counters_track_produced_and_drained() {
        let data = pattern(10_000);
        let compressed = deflate(&data);
        let mut inf = Inflater::new(64 * 1024);
        let step = inf.advance(&compressed, false, false, 0).unwrap();
        assert_eq!(step.consumed, compressed.len());
        assert_eq!(inf.produced(), 10_000);
        assert_eq!(inf.available(), 10_000);
        assert_eq!(inf.discard(4_000), 4_000);
        let mut buf = vec![0u8; 10_000];
        assert_eq!(inf.take(&mut buf), 6_000);
        assert_eq!(&buf[..6_000], &data[4_000..]);
        assert_eq!(inf.available(), 0);
    }

    #[test]
    fn window_is_trailing_output() {
        let data = pattern(100_000);
        let compressed = deflate(&data);
        let mut inf = Inflater::new(64 * 1024);
        let mut pos = 0usize;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let step = inf.advance(&compressed[pos..], false, false, 0).unwrap();
            pos += step.consumed;
            inf.take(&mut buf);
            if inf.finished() {
                break;
            }
        }
        let window = inf.window();
        assert_eq!(window.len(), MAX_WINDOW);
        assert_eq!(window, &data[100_000 - MAX_WINDOW..]);
    }

    #[test]
    fn short_history_gives_short_window() {
        let data = pattern(1_000);
        let compressed = deflate(&data);
        let mut inf = Inflater::new(64 * 1024);
        inf.advance(&compressed, false, false, 0).unwrap();
        inf.discard(1_000);
        assert_eq!(inf.window(), data);
    }

    #[test]
    fn oversized_prime_rejected() {
        let mut inf = Inflater::new(64 * 1024);
        let err = inf.prime(&vec![0u8; MAX_WINDOW + 1]).unwrap_err();
        assert!(matches!(err, GzIndexError::InvalidWindow { len } if len == MAX_WINDOW + 1));
    }

    #[test]
    fn stop_at_boundary_reports_bit_position() {
        // Force several deflate blocks with an incompressible-ish payload.
        let data = pattern(400_000);
        let compressed = deflate(&data);
        let mut inf = Inflater::new(64 * 1024);
        let mut pos = 0usize;
        let mut buf = vec![0u8; 64 * 1024];
        let mut boundaries = 0;
        loop {
            let step = inf
                .advance(&compressed[pos..], false, true, pos as u64)
                .unwrap();
            pos += step.consumed;
            inf.take(&mut buf);
            match step.event {
                Event::BlockBoundary { num_bits } => {
                    assert!(num_bits < 8);
                    boundaries += 1;
                }
                Event::Finished => break,
                Event::More => {}
            }
        }
        assert!(boundaries >= 1, "expected at least one block boundary");
    }

    #[test]
    fn garbage_input_is_corrupt() {
        let mut inf = Inflater::new(64 * 1024);
        // An invalid block type in the first byte.
        let err = inf.advance(&[0x07, 0xff, 0xff], false, false, 42);
        match err {
            Err(GzIndexError::CorruptStream { offset, .. }) => assert_eq!(offset, 42),
            other => panic!("expected CorruptStream, got {other:?}"),
        }
    }
}
