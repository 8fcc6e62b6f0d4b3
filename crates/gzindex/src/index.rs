//! Checkpoint index
//!
//! An ordered, append-only sequence of resume points over one compressed
//! stream. Checkpoints are only ever appended, never rewritten, so readers
//! sharing an index through `Arc<RwLock<_>>` can trust every checkpoint they
//! observe. The index also remembers how far the stream has been walked
//! (`indexed_extent`) and, once end-of-stream is hit, the exact total
//! uncompressed length.
//!
//! Export format: `b"GZRX"` magic, little-endian u32 version, then a
//! postcard-encoded body with each window deflated. Import re-validates
//! everything it reads.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::error::{GzIndexError, GzResult};
use crate::inflate::MAX_WINDOW;

const EXPORT_MAGIC: [u8; 4] = *b"GZRX";
const EXPORT_VERSION: u32 = 1;

/// Reference-counted, read-mostly index shared between readers over the
/// same compressed source. Append-only: readers never observe a partially
/// built checkpoint.
pub type SharedIndex = std::sync::Arc<std::sync::RwLock<CheckpointIndex>>;

/// A point at which decompression can resume without replaying from the
/// stream start.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// Byte offset into the compressed source at which resumption begins.
    pub compressed_offset: u64,
    /// Bits of the byte at `compressed_offset` that belong to the next
    /// DEFLATE block (0 = byte-aligned; the byte itself is then unconsumed).
    pub bits: u8,
    /// Corresponding offset into the decompressed stream.
    pub uncompressed_offset: u64,
    /// Decompressed bytes immediately preceding `uncompressed_offset`, up to
    /// `MAX_WINDOW`; shorter only near the stream start.
    window: Vec<u8>,
}

impl Checkpoint {
    pub(crate) fn new(
        compressed_offset: u64,
        bits: u8,
        uncompressed_offset: u64,
        window: Vec<u8>,
    ) -> GzResult<Self> {
        if window.len() > MAX_WINDOW {
            return Err(GzIndexError::InvalidWindow { len: window.len() });
        }
        Ok(Self {
            compressed_offset,
            bits,
            uncompressed_offset,
            window,
        })
    }

    /// Dictionary bytes used to prime the decompressor on resume.
    pub fn window(&self) -> &[u8] {
        &self.window
    }
}

#[derive(Debug)]
pub struct CheckpointIndex {
    points: Vec<Checkpoint>,
    /// Highest uncompressed offset the builder has walked.
    extent: u64,
    /// Exact uncompressed length, known once the stream has been fully read.
    total_len: Option<u64>,
}

impl CheckpointIndex {
    /// A fresh index over a stream whose DEFLATE payload starts at
    /// `payload_start`. The origin checkpoint (offset 0, empty window) is
    /// installed here, so lookups always succeed.
    pub fn new(payload_start: u64) -> Self {
        Self {
            points: vec![Checkpoint {
                compressed_offset: payload_start,
                bits: 0,
                uncompressed_offset: 0,
                window: Vec::new(),
            }],
            extent: 0,
            total_len: None,
        }
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.points
    }

    pub(crate) fn payload_start(&self) -> u64 {
        self.points[0].compressed_offset
    }

    /// Highest uncompressed offset covered so far.
    pub fn indexed_extent(&self) -> u64 {
        self.extent
    }

    /// Whether the underlying stream has been consumed to its end.
    pub fn is_complete(&self) -> bool {
        self.total_len.is_some()
    }

    /// Exact uncompressed length, if end-of-stream has been observed.
    pub fn total_len(&self) -> Option<u64> {
        self.total_len
    }

    pub(crate) fn last(&self) -> &Checkpoint {
        self.points.last().expect("origin checkpoint always present")
    }

    /// Append a checkpoint. The uncompressed offset must advance strictly
    /// and the compressed offset must not move backward.
    pub fn append(&mut self, point: Checkpoint) -> GzResult<()> {
        let last = self.last();
        if point.uncompressed_offset <= last.uncompressed_offset {
            return Err(GzIndexError::Ordering {
                new: point.uncompressed_offset,
                last: last.uncompressed_offset,
            });
        }
        if point.compressed_offset < last.compressed_offset {
            return Err(GzIndexError::Ordering {
                new: point.compressed_offset,
                last: last.compressed_offset,
            });
        }
        tracing::debug!(
            uncompressed = point.uncompressed_offset,
            compressed = point.compressed_offset,
            bits = point.bits,
            window = point.window.len(),
            "checkpoint appended"
        );
        self.points.push(point);
        Ok(())
    }

    /// The checkpoint with the greatest uncompressed offset not exceeding
    /// `target`. Falls back to the origin for targets before it.
    pub fn nearest_at_or_before(&self, target: u64) -> &Checkpoint {
        let i = self
            .points
            .partition_point(|p| p.uncompressed_offset <= target);
        &self.points[i.saturating_sub(1)]
    }

    /// Record that the builder has walked up to `offset`.
    pub(crate) fn note_extent(&mut self, offset: u64) {
        self.extent = self.extent.max(offset);
    }

    /// Record that end-of-stream was reached at `total_len`.
    pub(crate) fn mark_complete(&mut self, total_len: u64) {
        self.extent = self.extent.max(total_len);
        if self.total_len.is_none() {
            tracing::debug!(total_len, points = self.points.len(), "index complete");
        }
        self.total_len = Some(total_len);
    }

    /// Serialize the index, bit-exact, for reuse across sessions.
    pub fn export<W: Write>(&self, mut w: W) -> GzResult<()> {
        let body = IndexBody {
            extent: self.extent,
            total_len: self.total_len,
            points: self
                .points
                .iter()
                .map(|p| PointRecord {
                    compressed_offset: p.compressed_offset,
                    bits: p.bits,
                    uncompressed_offset: p.uncompressed_offset,
                    window_deflated: miniz_oxide::deflate::compress_to_vec(&p.window, 6),
                })
                .collect(),
        };
        let body = postcard::to_stdvec(&body)
            .map_err(|e| GzIndexError::InvalidIndex(format!("serializing index: {e}")))?;

        w.write_all(&EXPORT_MAGIC)?;
        w.write_u32::<LittleEndian>(EXPORT_VERSION)?;
        w.write_all(&body)?;
        Ok(())
    }

    /// Deserialize an exported index, re-validating ordering and windows.
    pub fn import<R: Read>(mut r: R) -> GzResult<Self> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic != EXPORT_MAGIC {
            return Err(GzIndexError::InvalidIndex("bad magic".into()));
        }
        let version = r.read_u32::<LittleEndian>()?;
        if version != EXPORT_VERSION {
            return Err(GzIndexError::InvalidIndex(format!(
                "unsupported version {version}"
            )));
        }

        let mut body = Vec::new();
        r.read_to_end(&mut body)?;
        let body: IndexBody = postcard::from_bytes(&body)
            .map_err(|e| GzIndexError::InvalidIndex(format!("decoding index: {e}")))?;

        let mut records = body.points.into_iter();
        let origin = records
            .next()
            .ok_or_else(|| GzIndexError::InvalidIndex("no origin checkpoint".into()))?;
        if origin.uncompressed_offset != 0 {
            return Err(GzIndexError::InvalidIndex(
                "origin checkpoint not at offset 0".into(),
            ));
        }

        let mut index = CheckpointIndex::new(origin.compressed_offset);
        for record in records {
            let window = miniz_oxide::inflate::decompress_to_vec(&record.window_deflated)
                .map_err(|_| GzIndexError::InvalidIndex("corrupt checkpoint window".into()))?;
            if window.len() > MAX_WINDOW {
                return Err(GzIndexError::InvalidIndex(format!(
                    "checkpoint window of {} bytes",
                    window.len()
                )));
            }
            let point = Checkpoint {
                compressed_offset: record.compressed_offset,
                bits: record.bits,
                uncompressed_offset: record.uncompressed_offset,
                window,
            };
            index
                .append(point)
                .map_err(|e| GzIndexError::InvalidIndex(format!("out-of-order index: {e}")))?;
        }

        index.note_extent(body.extent);
        if let Some(total) = body.total_len {
            index.mark_complete(total);
        }
        Ok(index)
    }
}

#[derive(Serialize, Deserialize)]
struct IndexBody {
    extent: u64,
    total_len: Option<u64>,
    points: Vec<PointRecord>,
}

#[derive(Serialize, Deserialize)]
struct PointRecord {
    compressed_offset: u64,
    bits: u8,
    uncompressed_offset: u64,
    window_deflated: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(c: u64, u: u64) -> Checkpoint {
        Checkpoint::new(c, 3, u, vec![0xab; 64]).unwrap()
    }

    #[test]
    fn starts_with_origin() {
        let index = CheckpointIndex::new(10);
        assert_eq!(index.checkpoints().len(), 1);
        assert_eq!(index.payload_start(), 10);
        assert_eq!(index.nearest_at_or_before(0).uncompressed_offset, 0);
        assert_eq!(index.indexed_extent(), 0);
        assert!(!index.is_complete());
    }

    #[test]
    fn append_enforces_ordering() {
        let mut index = CheckpointIndex::new(0);
        index.append(point(100, 1000)).unwrap();
        index.append(point(200, 2000)).unwrap();

        // Non-advancing uncompressed offset.
        let err = index.append(point(300, 2000)).unwrap_err();
        assert!(matches!(err, GzIndexError::Ordering { new: 2000, last: 2000 }));

        // Backwards compressed offset.
        let err = index.append(point(150, 3000)).unwrap_err();
        assert!(matches!(err, GzIndexError::Ordering { .. }));

        assert_eq!(index.checkpoints().len(), 3);
    }

    #[test]
    fn nearest_lookup() {
        let mut index = CheckpointIndex::new(0);
        index.append(point(100, 1000)).unwrap();
        index.append(point(200, 2000)).unwrap();

        assert_eq!(index.nearest_at_or_before(0).uncompressed_offset, 0);
        assert_eq!(index.nearest_at_or_before(999).uncompressed_offset, 0);
        assert_eq!(index.nearest_at_or_before(1000).uncompressed_offset, 1000);
        assert_eq!(index.nearest_at_or_before(1999).uncompressed_offset, 1000);
        assert_eq!(index.nearest_at_or_before(u64::MAX).uncompressed_offset, 2000);
    }

    #[test]
    fn oversized_window_rejected() {
        let err = Checkpoint::new(0, 0, 1, vec![0; MAX_WINDOW + 1]).unwrap_err();
        assert!(matches!(err, GzIndexError::InvalidWindow { .. }));
    }

    #[test]
    fn export_import_is_bit_exact() {
        let mut index = CheckpointIndex::new(18);
        let window: Vec<u8> = (0..MAX_WINDOW).map(|i| (i % 251) as u8).collect();
        index
            .append(Checkpoint::new(5_000, 5, 70_000, window.clone()).unwrap())
            .unwrap();
        index
            .append(Checkpoint::new(9_000, 0, 140_000, window.clone()).unwrap())
            .unwrap();
        index.note_extent(150_000);
        index.mark_complete(163_840);

        let mut buf = Vec::new();
        index.export(&mut buf).unwrap();
        let imported = CheckpointIndex::import(buf.as_slice()).unwrap();

        assert_eq!(imported.payload_start(), 18);
        assert_eq!(imported.indexed_extent(), 163_840);
        assert_eq!(imported.total_len(), Some(163_840));
        assert_eq!(imported.checkpoints().len(), 3);
        for (a, b) in index.checkpoints().iter().zip(imported.checkpoints()) {
            assert_eq!(a.compressed_offset, b.compressed_offset);
            assert_eq!(a.bits, b.bits);
            assert_eq!(a.uncompressed_offset, b.uncompressed_offset);
            assert_eq!(a.window(), b.window());
        }
    }

    #[test]
    fn import_rejects_garbage() {
        assert!(matches!(
            CheckpointIndex::import(&b"NOPE\x01\x00\x00\x00"[..]),
            Err(GzIndexError::InvalidIndex(_))
        ));
        // Right magic, wrong version.
        assert!(matches!(
            CheckpointIndex::import(&b"GZRX\xff\x00\x00\x00"[..]),
            Err(GzIndexError::InvalidIndex(_))
        ));
    }
}
