// src/engine/canonical.rs
//
// CanonicalImage: the single pixel representation every engine component
// agrees on. RGBA8, premultiplied alpha, row-major, explicit stride.

use crate::engine::common::EngineResult;
use crate::error::SnapshotError;
use image::RgbaImage;

/// Bytes per canonical pixel (R, G, B, A).
pub const BYTES_PER_PIXEL: usize = 4;

/// Immutable RGBA8 premultiplied-alpha bitmap.
///
/// Invariants (checked by every constructor):
/// - `stride >= width * 4`
/// - `data.len() == height * stride`
///
/// Zero-sized images are representable so that an empty render can be
/// reported by the comparator instead of failing extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalImage {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl CanonicalImage {
    /// Wrap an owned buffer, validating its geometry.
    pub fn new(width: u32, height: u32, stride: usize, data: Vec<u8>) -> EngineResult<Self> {
        let min_stride = width as usize * BYTES_PER_PIXEL;
        let expected = height as usize * stride;
        if stride < min_stride || data.len() != expected {
            return Err(SnapshotError::invalid_geometry(
                width,
                height,
                stride,
                expected.max(height as usize * min_stride),
                data.len(),
            ));
        }
        Ok(Self {
            width,
            height,
            stride,
            data,
        })
    }

    /// Wrap a tightly packed buffer (`stride == width * 4`).
    pub fn from_packed(width: u32, height: u32, data: Vec<u8>) -> EngineResult<Self> {
        Self::new(width, height, width as usize * BYTES_PER_PIXEL, data)
    }

    /// Build from a pixel function returning premultiplied RGBA.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [u8; 4]) -> Self {
        let stride = width as usize * BYTES_PER_PIXEL;
        let mut data = Vec::with_capacity(stride * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Self {
            width,
            height,
            stride,
            data,
        }
    }

    /// A fully transparent image of the given size.
    pub fn transparent(width: u32, height: u32) -> Self {
        let stride = width as usize * BYTES_PER_PIXEL;
        Self {
            width,
            height,
            stride,
            data: vec![0; stride * height as usize],
        }
    }

    /// A 0x0 image.
    pub fn empty() -> Self {
        Self::transparent(0, 0)
    }

    /// Premultiply a straight-alpha `RgbaImage`.
    pub fn from_straight_rgba(img: &RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        let mut data = img.as_raw().clone();
        premultiply_in_place(&mut data);
        Self {
            width,
            height,
            stride: width as usize * BYTES_PER_PIXEL,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Bytes per row, including padding.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The full backing buffer, padding included.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Bytes of pixel data per row, excluding padding.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Total pixel bytes (`width * height * 4`), excluding padding.
    pub fn pixel_byte_count(&self) -> usize {
        self.row_bytes() * self.height as usize
    }

    /// Size of the backing buffer (`height * stride`).
    pub fn buffer_len(&self) -> usize {
        self.data.len()
    }

    /// Iterate the pixel rows without padding.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let row_bytes = self.row_bytes();
        let stride = self.stride.max(1);
        self.data
            .chunks(stride)
            .take(self.height as usize)
            .map(move |row| &row[..row_bytes])
    }

    /// Pixel bytes of row `y`, without padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.row_bytes()]
    }

    /// One premultiplied RGBA pixel.
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        let offset = y as usize * self.stride + x as usize * BYTES_PER_PIXEL;
        let p = &self.data[offset..offset + BYTES_PER_PIXEL];
        [p[0], p[1], p[2], p[3]]
    }

    /// True when the visible pixels of both images are byte-identical.
    /// Row padding is ignored, so differing strides can still match.
    pub fn pixels_eq(&self, other: &CanonicalImage) -> bool {
        if self.dimensions() != other.dimensions() {
            return false;
        }
        if self.stride == other.stride {
            return self.data == other.data || self.rows().eq(other.rows());
        }
        self.rows().eq(other.rows())
    }

    /// Copy into a tightly packed buffer, dropping row padding.
    pub fn to_packed(&self) -> Vec<u8> {
        if self.stride == self.row_bytes() {
            return self.data.clone();
        }
        let mut packed = Vec::with_capacity(self.pixel_byte_count());
        for row in self.rows() {
            packed.extend_from_slice(row);
        }
        packed
    }

    /// Un-premultiplied copy as an `image::RgbaImage` (for saving or display).
    pub fn to_straight_rgba(&self) -> RgbaImage {
        let mut packed = self.to_packed();
        unpremultiply_in_place(&mut packed);
        // Length is width * height * 4 by construction.
        RgbaImage::from_raw(self.width, self.height, packed)
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }
}

/// Scale RGB by alpha, rounding to nearest.
pub fn premultiply_in_place(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
        let a = px[3] as u32;
        if a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((*c as u32 * a + 127) / 255) as u8;
        }
    }
}

/// Inverse of `premultiply_in_place`.
///
/// For valid premultiplied input (every channel <= alpha) the pair is an
/// exact round trip: `premultiply(unpremultiply(p)) == p`.
pub fn unpremultiply_in_place(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
        let a = px[3] as u32;
        match a {
            255 => {}
            0 => {
                px[0] = 0;
                px[1] = 0;
                px[2] = 0;
            }
            _ => {
                for c in &mut px[..3] {
                    *c = ((*c as u32 * 255 + a / 2) / a).min(255) as u8;
                }
            }
        }
    }
}
