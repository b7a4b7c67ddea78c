// src/engine/extract.rs
//
// Pixel buffer extraction: normalize any pixel source into a CanonicalImage.
//
// Fast path: 32bpp / 8bpc RGB sources whose trailing byte is premultiplied
// alpha (or an ignored padding byte) and whose rows are tightly packed are
// copied straight from their backing store.
// Fallback: everything else is rasterized pixel by pixel into a fresh
// premultiplied RGBA8 buffer with stride = width * 4.

use crate::engine::canonical::{CanonicalImage, BYTES_PER_PIXEL};
use crate::engine::common::{check_dimensions, run_with_panic_policy, EngineResult};
use crate::error::SnapshotError;
use bitflags::bitflags;
use fast_image_resize::{self as fir, PixelType, ResizeOptions};
use image::DynamicImage;

bitflags! {
    /// Alpha and byte-order layout of a raw bitmap, modeled on the flag
    /// words native graphics stacks attach to their bitmaps.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BitmapInfo: u32 {
        /// Color channels are already scaled by alpha.
        const ALPHA_PREMULTIPLIED = 1 << 0;
        /// Alpha channel present, color channels not scaled.
        const ALPHA_STRAIGHT = 1 << 1;
        /// A padding byte occupies the alpha slot and must be ignored.
        const ALPHA_SKIP = 1 << 2;
        /// The alpha (or skip) slot leads the pixel instead of trailing it.
        const ALPHA_FIRST = 1 << 3;
        /// Color channels are stored B, G, R.
        const ORDER_BGR = 1 << 4;
        /// 16-bit components are big-endian (network order).
        const BIG_ENDIAN_16 = 1 << 5;
    }
}

/// Color model of a raw bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorModel {
    Rgb,
    Gray,
}

/// Borrowed view of a raw bitmap's backing store.
#[derive(Debug, Clone, Copy)]
pub struct RawBitmap<'a> {
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u8,
    pub bits_per_pixel: u8,
    pub bytes_per_row: usize,
    pub color_model: ColorModel,
    pub info: BitmapInfo,
    pub data: &'a [u8],
}

impl<'a> RawBitmap<'a> {
    /// Tightly packed RGBA8 with premultiplied alpha (the canonical layout).
    pub fn premultiplied_rgba(width: u32, height: u32, data: &'a [u8]) -> Self {
        Self::rgba8(width, height, BitmapInfo::ALPHA_PREMULTIPLIED, data)
    }

    /// Tightly packed 32bpp RGB with the given alpha layout.
    pub fn rgba8(width: u32, height: u32, info: BitmapInfo, data: &'a [u8]) -> Self {
        Self {
            width,
            height,
            bits_per_component: 8,
            bits_per_pixel: 32,
            bytes_per_row: width as usize * 4,
            color_model: ColorModel::Rgb,
            info,
            data,
        }
    }

    /// Override the row stride (for padded rows).
    pub fn with_bytes_per_row(mut self, bytes_per_row: usize) -> Self {
        self.bytes_per_row = bytes_per_row;
        self
    }

    fn channels(&self) -> usize {
        let has_alpha_slot = self.info.intersects(
            BitmapInfo::ALPHA_PREMULTIPLIED | BitmapInfo::ALPHA_STRAIGHT | BitmapInfo::ALPHA_SKIP,
        );
        let color = match self.color_model {
            ColorModel::Rgb => 3,
            ColorModel::Gray => 1,
        };
        color + usize::from(has_alpha_slot)
    }

    fn has_alpha(&self) -> bool {
        self.info
            .intersects(BitmapInfo::ALPHA_PREMULTIPLIED | BitmapInfo::ALPHA_STRAIGHT)
    }

    /// Check that the layout is self-consistent and the storage covers it.
    fn validate(&self) -> EngineResult<()> {
        if !matches!(self.bits_per_component, 8 | 16) {
            return Err(SnapshotError::extraction(format!(
                "unsupported bits per component: {}",
                self.bits_per_component
            )));
        }
        let expected_bpp = self.channels() * self.bits_per_component as usize;
        if self.bits_per_pixel as usize != expected_bpp {
            return Err(SnapshotError::extraction(format!(
                "bits per pixel {} does not match layout ({} expected)",
                self.bits_per_pixel, expected_bpp
            )));
        }
        let alpha_modes = (self.info
            & (BitmapInfo::ALPHA_PREMULTIPLIED
                | BitmapInfo::ALPHA_STRAIGHT
                | BitmapInfo::ALPHA_SKIP))
            .bits()
            .count_ones();
        if alpha_modes > 1 {
            return Err(SnapshotError::extraction(format!(
                "conflicting alpha flags: {:?}",
                self.info
            )));
        }
        let min_row = self.width as usize * self.bits_per_pixel as usize / 8;
        if self.bytes_per_row < min_row {
            return Err(SnapshotError::extraction(format!(
                "bytes per row {} is smaller than one row of pixels ({min_row})",
                self.bytes_per_row
            )));
        }
        if self.height > 0 {
            let needed = (self.height as usize - 1) * self.bytes_per_row + min_row;
            if self.data.len() < needed {
                return Err(SnapshotError::extraction(format!(
                    "pixel storage holds {} bytes, layout needs {needed}",
                    self.data.len()
                )));
            }
        }
        Ok(())
    }

    /// True when rows can be copied byte-for-byte into a canonical buffer.
    fn is_canonical_compatible(&self) -> bool {
        self.bits_per_component == 8
            && self.bits_per_pixel == 32
            && self.color_model == ColorModel::Rgb
            && !self.info.intersects(BitmapInfo::ALPHA_FIRST | BitmapInfo::ORDER_BGR)
            && self
                .info
                .intersects(BitmapInfo::ALPHA_PREMULTIPLIED | BitmapInfo::ALPHA_SKIP)
            && self.bytes_per_row == self.width as usize * BYTES_PER_PIXEL
    }

    fn component(&self, bytes: &[u8], index: usize) -> u8 {
        if self.bits_per_component == 8 {
            return bytes[index];
        }
        let hi_lo = [bytes[index * 2], bytes[index * 2 + 1]];
        let value = if self.info.contains(BitmapInfo::BIG_ENDIAN_16) {
            u16::from_be_bytes(hi_lo)
        } else {
            u16::from_le_bytes(hi_lo)
        };
        ((value as u32 * 255 + 32767) / 65535) as u8
    }

    /// Read one pixel as premultiplied RGBA8.
    fn read_premultiplied(&self, px: &[u8]) -> [u8; 4] {
        let channels = self.channels();
        let has_alpha_slot = channels == 2 || channels == 4;
        let (alpha_index, first_color) = if !has_alpha_slot {
            (None, 0)
        } else if self.info.contains(BitmapInfo::ALPHA_FIRST) {
            (Some(0), 1)
        } else {
            (Some(channels - 1), 0)
        };
        let alpha = match alpha_index {
            Some(i) if self.has_alpha() => self.component(px, i),
            _ => 255,
        };
        let (mut r, mut g, mut b) = match self.color_model {
            ColorModel::Gray => {
                let v = self.component(px, first_color);
                (v, v, v)
            }
            ColorModel::Rgb => {
                let c0 = self.component(px, first_color);
                let c1 = self.component(px, first_color + 1);
                let c2 = self.component(px, first_color + 2);
                if self.info.contains(BitmapInfo::ORDER_BGR) {
                    (c2, c1, c0)
                } else {
                    (c0, c1, c2)
                }
            }
        };
        if self.info.contains(BitmapInfo::ALPHA_PREMULTIPLIED) {
            // Clamp malformed premultiplied samples to the valid range.
            r = r.min(alpha);
            g = g.min(alpha);
            b = b.min(alpha);
        } else if alpha < 255 {
            let a = alpha as u32;
            r = ((r as u32 * a + 127) / 255) as u8;
            g = ((g as u32 * a + 127) / 255) as u8;
            b = ((b as u32 * a + 127) / 255) as u8;
        }
        [r, g, b, alpha]
    }
}

/// Capability set every snapshot source exposes to the engine.
///
/// Platform or toolkit bitmap types plug in by implementing this trait.
pub trait PixelSource {
    fn dimensions(&self) -> (u32, u32);

    /// Direct access to the backing store, if the source has one.
    fn backing(&self) -> Option<RawBitmap<'_>> {
        None
    }

    /// Render the source into a fresh canonical buffer.
    fn rasterize(&self) -> EngineResult<CanonicalImage>;
}

impl PixelSource for RawBitmap<'_> {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn backing(&self) -> Option<RawBitmap<'_>> {
        Some(*self)
    }

    fn rasterize(&self) -> EngineResult<CanonicalImage> {
        self.validate()?;
        let stride = self.width as usize * BYTES_PER_PIXEL;
        let mut out = allocate(stride * self.height as usize)?;
        let pixel_bytes = self.bits_per_pixel as usize / 8;
        let row_len = self.width as usize * pixel_bytes;
        for y in 0..self.height as usize {
            let start = y * self.bytes_per_row;
            let row = &self.data[start..start + row_len];
            for px in row.chunks_exact(pixel_bytes) {
                out.extend_from_slice(&self.read_premultiplied(px));
            }
        }
        CanonicalImage::new(self.width, self.height, stride, out)
    }
}

impl PixelSource for CanonicalImage {
    fn dimensions(&self) -> (u32, u32) {
        CanonicalImage::dimensions(self)
    }

    fn backing(&self) -> Option<RawBitmap<'_>> {
        Some(
            RawBitmap::premultiplied_rgba(self.width(), self.height(), self.raw_bytes())
                .with_bytes_per_row(self.stride()),
        )
    }

    fn rasterize(&self) -> EngineResult<CanonicalImage> {
        CanonicalImage::from_packed(self.width(), self.height(), self.to_packed())
    }
}

impl PixelSource for DynamicImage {
    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    fn rasterize(&self) -> EngineResult<CanonicalImage> {
        // image-rs buffers carry straight alpha, so they always take this path.
        let rgba = self.to_rgba8();
        Ok(CanonicalImage::from_straight_rgba(&rgba))
    }
}

fn allocate(len: usize) -> EngineResult<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| {
        SnapshotError::extraction(format!("failed to allocate {len} byte pixel buffer: {e}"))
    })?;
    Ok(buf)
}

/// Normalize a pixel source into a canonical RGBA8 premultiplied buffer.
pub fn extract(source: &dyn PixelSource) -> EngineResult<CanonicalImage> {
    run_with_panic_policy("extract", || {
        let (width, height) = source.dimensions();
        check_dimensions(width, height)?;

        if let Some(raw) = source.backing() {
            if (raw.width, raw.height) != (width, height) {
                return Err(SnapshotError::extraction(format!(
                    "backing store is {}x{} but source reports {width}x{height}",
                    raw.width, raw.height
                )));
            }
            raw.validate()?;
            if raw.is_canonical_compatible() {
                tracing::trace!(width, height, "extract: direct copy from backing store");
                let mut data = allocate(raw.bytes_per_row * height as usize)?;
                data.extend_from_slice(&raw.data[..raw.bytes_per_row * height as usize]);
                if raw.info.contains(BitmapInfo::ALPHA_SKIP) {
                    for px in data.chunks_exact_mut(BYTES_PER_PIXEL) {
                        px[3] = 255;
                    }
                }
                return CanonicalImage::new(width, height, raw.bytes_per_row, data);
            }
            tracing::debug!(
                width,
                height,
                info = ?raw.info,
                bpp = raw.bits_per_pixel,
                "extract: layout needs rasterization"
            );
        }

        source.rasterize()
    })
}

/// Extract and resample to an explicit output size (Lanczos3).
///
/// Resampling runs on premultiplied data, which is what keeps edges of
/// translucent shapes from picking up dark fringes.
pub fn extract_resized(
    source: &dyn PixelSource,
    width: u32,
    height: u32,
) -> EngineResult<CanonicalImage> {
    if width == 0 || height == 0 {
        return Err(SnapshotError::invalid_argument(
            "output_size",
            format!("{width}x{height}"),
            "output dimensions must be greater than 0",
        ));
    }
    check_dimensions(width, height)?;
    let image = extract(source)?;
    if image.dimensions() == (width, height) {
        return Ok(image);
    }
    if image.is_empty() {
        return Ok(image);
    }

    run_with_panic_policy("extract:resize", || {
        let (src_w, src_h) = image.dimensions();
        let src = fir::images::Image::from_vec_u8(src_w, src_h, image.to_packed(), PixelType::U8x4)
            .map_err(|e| SnapshotError::extraction(format!("resize source buffer: {e}")))?;
        let mut dst = fir::images::Image::new(width, height, PixelType::U8x4);
        let options = ResizeOptions::new()
            .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));
        fir::Resizer::new()
            .resize(&src, &mut dst, &options)
            .map_err(|e| SnapshotError::extraction(format!("resize failed: {e:?}")))?;

        let mut pixels = dst.into_vec();
        // Lanczos ringing can push a channel above its alpha.
        for px in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            let a = px[3];
            px[0] = px[0].min(a);
            px[1] = px[1].min(a);
            px[2] = px[2].min(a);
        }
        CanonicalImage::from_packed(width, height, pixels)
    })
}
