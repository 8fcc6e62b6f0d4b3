//! Container detection
//!
//! gzindex reads the raw DEFLATE payload; the gzip or zlib wrapper is parsed
//! once at open time to find where that payload starts. Trailers (gzip
//! CRC32/ISIZE, zlib Adler-32) are left unvalidated: decompression stops at
//! the end of the first member.

use std::io::Read;

use crate::error::{GzIndexError, GzResult};
use crate::source::Source;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Gzip,
    Zlib,
}

/// Where the DEFLATE payload of a stream begins.
#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub kind: StreamKind,
    /// Absolute offset of the first DEFLATE payload byte.
    pub payload_start: u64,
}

/// `Read` view over a `Source`, for header parsers that want a stream.
struct SourceReader<'a> {
    source: &'a mut Source,
    pos: u64,
}

impl Read for SourceReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self
            .source
            .read_at(self.pos, buf)
            .map_err(std::io::Error::other)?;
        self.pos += n as u64;
        Ok(n)
    }
}

/// Sniff the container format and locate the payload.
pub fn detect(source: &mut Source) -> GzResult<StreamInfo> {
    let mut head = [0u8; 2];
    source.read_exact_at(0, &mut head).map_err(|_| {
        GzIndexError::CorruptStream {
            offset: 0,
            reason: "stream too short for a gzip or zlib header",
        }
    })?;

    if head == GZIP_MAGIC {
        // Full header walk: honors FEXTRA, FNAME, FCOMMENT, FHCRC.
        let mut reader = SourceReader { source, pos: 0 };
        gzip_header::read_gz_header(&mut reader).map_err(|_| GzIndexError::CorruptStream {
            offset: 0,
            reason: "malformed gzip header",
        })?;
        return Ok(StreamInfo {
            kind: StreamKind::Gzip,
            payload_start: reader.pos,
        });
    }

    // RFC 1950: CM must be 8 (deflate) and CMF<<8 | FLG must be a multiple
    // of 31. FDICT streams need an out-of-band dictionary we cannot supply.
    let (cmf, flg) = (head[0], head[1]);
    if cmf & 0x0f == 8 && (u16::from(cmf) << 8 | u16::from(flg)) % 31 == 0 {
        if flg & 0x20 != 0 {
            return Err(GzIndexError::CorruptStream {
                offset: 0,
                reason: "zlib stream requires a preset dictionary",
            });
        }
        return Ok(StreamInfo {
            kind: StreamKind::Zlib,
            payload_start: 2,
        });
    }

    Err(GzIndexError::CorruptStream {
        offset: 0,
        reason: "not a gzip or zlib stream",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::{Cursor, Write};

    fn detect_bytes(bytes: Vec<u8>) -> GzResult<StreamInfo> {
        let mut src = Source::from_stream(Cursor::new(bytes)).unwrap();
        detect(&mut src)
    }

    #[test]
    fn detects_gzip_payload_offset() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"hello").unwrap();
        let info = detect_bytes(enc.finish().unwrap()).unwrap();
        assert_eq!(info.kind, StreamKind::Gzip);
        // Minimal gzip header with no optional fields is 10 bytes.
        assert_eq!(info.payload_start, 10);
    }

    #[test]
    fn detects_gzip_with_filename_field() {
        let builder = flate2::GzBuilder::new().filename("data.bin");
        let mut enc = builder.write(Vec::new(), Compression::default());
        enc.write_all(b"hello").unwrap();
        let info = detect_bytes(enc.finish().unwrap()).unwrap();
        assert_eq!(info.kind, StreamKind::Gzip);
        // 10 fixed bytes + "data.bin" + NUL terminator.
        assert_eq!(info.payload_start, 10 + 8 + 1);
    }

    #[test]
    fn detects_zlib() {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"hello").unwrap();
        let info = detect_bytes(enc.finish().unwrap()).unwrap();
        assert_eq!(info.kind, StreamKind::Zlib);
        assert_eq!(info.payload_start, 2);
    }

    #[test]
    fn rejects_garbage() {
        let err = detect_bytes(b"PK\x03\x04not-deflate".to_vec()).unwrap_err();
        assert!(matches!(err, GzIndexError::CorruptStream { .. }));
    }

    #[test]
    fn rejects_truncated() {
        let err = detect_bytes(vec![0x1f]).unwrap_err();
        assert!(matches!(err, GzIndexError::CorruptStream { .. }));
    }
}
