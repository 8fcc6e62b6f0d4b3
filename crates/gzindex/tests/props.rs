//! Property coverage: any sequence of seek/read requests returns exactly
//! the bytes a fully decompressed copy would.

mod common;

use common::{gzip_bytes, payload, read_at};
use gzindex::{GzReader, ReaderOptions};
use proptest::prelude::*;
use std::io::Cursor;
use std::sync::OnceLock;

const LEN: usize = 400_000;

fn fixture() -> &'static (Vec<u8>, Vec<u8>) {
    static FIXTURE: OnceLock<(Vec<u8>, Vec<u8>)> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        let data = payload(LEN);
        let gz = gzip_bytes(&data);
        (data, gz)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn arbitrary_request_sequences_match_reference(
        ops in proptest::collection::vec(
            (0u64..(LEN as u64 + 50_000), 1usize..16_384),
            1..12,
        ),
        spacing_kib in 32u64..256,
        readbuf_kib in 1usize..256,
    ) {
        let (data, gz) = fixture();
        let opts = ReaderOptions {
            spacing: spacing_kib * 1024,
            read_buffer_size: readbuf_kib * 1024,
        };
        let mut reader =
            GzReader::from_stream_with_options(Cursor::new(gz.clone()), opts).unwrap();

        for &(offset, len) in &ops {
            let got = read_at(&mut reader, offset, len);
            let start = (offset as usize).min(LEN);
            let end = (start + len).min(LEN);
            prop_assert_eq!(got.as_slice(), &data[start..end], "request at {}+{}", offset, len);
        }
    }
}
