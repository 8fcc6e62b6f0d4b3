//! Shared fixture helpers: deterministic payloads and compressed streams.
#![allow(dead_code)] // not every test binary uses every helper

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use std::io::Write;

/// Aperiodic, compressible payload of exactly `len` bytes. Every offset
/// carries distinct text, so a misplaced read shows up immediately.
pub fn payload(len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len + 32);
    let mut i = 0u64;
    while out.len() < len {
        out.extend_from_slice(format!("record {i:010} lorem ipsum dolor sit\n").as_bytes());
        i += 1;
    }
    out.truncate(len);
    out
}

pub fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

pub fn zlib_bytes(data: &[u8]) -> Vec<u8> {
    let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Read exactly `len` bytes at `offset` (shorter only at end of stream).
pub fn read_at(reader: &mut gzindex::GzReader, offset: u64, len: usize) -> Vec<u8> {
    reader.seek(offset).unwrap();
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    loop {
        let n = reader.read(&mut buf[filled..]).unwrap();
        filled += n;
        if n == 0 || filled == len {
            break;
        }
    }
    buf.truncate(filled);
    buf
}
