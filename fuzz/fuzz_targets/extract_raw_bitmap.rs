#![no_main]

//! Arbitrary bitmap layouts over arbitrary storage. Extraction either
//! produces an image with consistent geometry or an error, never a panic.

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use snapshot_webp::engine::{BitmapInfo, ColorModel, RawBitmap};
use snapshot_webp::{extract, SnapshotError};

#[derive(Arbitrary, Debug)]
struct LayoutSeed {
    width: u8,
    height: u8,
    bits_per_component: u8,
    bits_per_pixel: u8,
    extra_row_bytes: u8,
    gray: bool,
    info: u8,
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);
    let seed: LayoutSeed = match LayoutSeed::arbitrary(&mut unstructured) {
        Ok(s) => s,
        Err(_) => return,
    };
    let storage = unstructured.take_rest();
    let width = seed.width as u32 % 48;
    let height = seed.height as u32 % 48;
    let raw = RawBitmap {
        width,
        height,
        bits_per_component: seed.bits_per_component,
        bits_per_pixel: seed.bits_per_pixel,
        bytes_per_row: width as usize * (seed.bits_per_pixel as usize / 8)
            + seed.extra_row_bytes as usize % 8,
        color_model: if seed.gray { ColorModel::Gray } else { ColorModel::Rgb },
        info: BitmapInfo::from_bits_truncate(seed.info as u32),
        data: storage,
    };

    match extract(&raw) {
        Ok(image) => {
            assert_eq!(image.dimensions(), (width, height));
            assert!(image.stride() >= image.row_bytes());
            assert_eq!(image.buffer_len(), height as usize * image.stride());
        }
        Err(SnapshotError::InternalPanic { message }) => panic!("extract panicked: {message}"),
        Err(_) => {}
    }
});
