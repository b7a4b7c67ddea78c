#![no_main]

//! Stored snapshots come from disk; decoding must reject anything malformed
//! without panicking.

use libfuzzer_sys::fuzz_target;
use snapshot_webp::decode_webp;

fuzz_target!(|data: &[u8]| {
    if let Ok(image) = decode_webp(data) {
        assert_eq!(
            image.buffer_len(),
            image.height() as usize * image.stride()
        );
    }
});
